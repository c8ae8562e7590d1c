//! `audioseg` — a deterministic, offline batch audio segmentation engine.
//!
//! Given long audio files, produces an ordered list of speech segments suitable for downstream
//! transcription or cleanup. The core is the segmentation pipeline: interchangeable
//! speech-detection strategies (`silence`, `energy`, `vad`), a shared postprocess chain that
//! shapes raw detections into final segments, an automatic strategy-fallback controller, and a
//! canonical record/report writer plus a strict validator that round-trips with it.
//!
//! Everything outside the pipeline itself — CLI parsing, input resolution, dependency probing,
//! logging configuration, visualization exports, and the read-only `summarize` view — lives
//! alongside it as the ambient stack a runnable tool needs, built the same way as the core.

// Core data model: Job, AnalysisResult, SegmentRecord, and the provenance/quality flag
// vocabulary.
pub mod model;

// Interval algebra and the rounding/tolerance constants it (and everything downstream) shares.
pub mod interval;
pub mod time;

// Audio probing and feature reading: duration lookup, RMS, fingerprinting, PCM16 frame access.
pub mod audio;

// Detection strategies, dispatched by tag, and their shared morphological cleanup.
pub mod strategy;

// Strategy orchestration: single-strategy dispatch and the auto-strategy fallback controller.
pub mod orchestrator;

// The deterministic postprocess pipeline: pad, merge, enforce-min, enforce-max, with
// provenance tracking.
pub mod postprocess;

// Turns postprocessed spans into durable SegmentRecords.
pub mod segment_builder;

// Report and manifest writer: per-job reports, run summary, run manifest.
pub mod report;

// Validator: per-file and corpus-level consistency checks against the writer's own output.
pub mod validator;

// Collaborator interfaces: CLI surface, input resolution, dependency probing, configuration,
// logging, visualization exports, and the read-only summarize view.
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod deps;
pub mod export;
pub mod job;
pub mod logging;
pub mod summarize;

// Crate-wide error type and exit-code mapping.
pub mod error;

// The segmentation engine itself: turns a resolved Job into a finished output directory, and
// fans a job list out across a worker pool.
pub mod run;

// Timeout + hard-kill wrapper around external tool invocation, shared by the strategies and
// the dependency probe.
pub mod process;
