//! Report and manifest writer: per-job reports, the run-level summary, and the run manifest.
//!
//! The per-job report is modeled as one in-memory `JobReport` struct, built up over the "up to
//! three phases" described in the design notes (initial, analysis, segments) and serialized once
//! per phase with an atomic write — never a disk read-modify-write. Every write goes through
//! `atomic_write_json`: write to a `NamedTempFile` in the same directory, flush, `persist` over
//! the destination.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::orchestrator::Attempt;

/// Which phase a [`JobReport`] has reached. Always holds the highest phase seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPhase {
    Initial,
    Analysis,
    Segments,
}

/// Per-job report, written atomically at each phase boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub tool: String,
    pub tool_version: String,
    pub phase: ReportPhase,
    pub audio_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_path: Option<String>,
    pub config_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<SegmentsSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_strategy: Option<AutoStrategySummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentsSummary {
    pub count: usize,
    pub speech_total_sec: f64,
    pub min_seg_sec: f64,
    pub max_seg_sec: f64,
    pub pad_sec: f64,
    pub strategy: String,
    pub outputs: Value,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoStrategySummary {
    pub enabled: bool,
    pub order: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chosen: Option<String>,
    pub attempts: Vec<Attempt>,
}

impl JobReport {
    pub fn new_initial(
        audio_path: &str,
        metadata_path: Option<&str>,
        config_hash: String,
        fingerprint: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        JobReport {
            version: "1".to_string(),
            created_at: now,
            tool: "audioseg".to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            phase: ReportPhase::Initial,
            audio_path: audio_path.to_string(),
            metadata_path: metadata_path.map(|s| s.to_string()),
            config_hash,
            fingerprint,
            analysis: None,
            segments: None,
            auto_strategy: None,
        }
    }

    pub fn set_analysis(&mut self, analysis: Value) {
        self.analysis = Some(analysis);
        if self.phase < ReportPhase::Analysis {
            self.phase = ReportPhase::Analysis;
        }
    }

    pub fn set_segments(&mut self, segments: SegmentsSummary, auto_strategy: Option<AutoStrategySummary>) {
        self.segments = Some(segments);
        self.auto_strategy = auto_strategy;
        self.phase = ReportPhase::Segments;
    }

    /// Load an existing on-disk report, tolerating a report at any of the three phases.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse report {}", path.display()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        atomic_write_json(path, self)
    }
}

/// Run-level summary written at the common parent of all job outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cli_args: Vec<String>,
    pub counts: RunCounts,
    pub totals: RunTotals,
    pub failures: Vec<JobFailure>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunCounts {
    pub jobs_total: usize,
    pub planned: usize,
    pub analyzed: usize,
    pub emitted: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunTotals {
    pub speech_total_sec: f64,
    pub silences_total_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFailure {
    pub job_id: String,
    pub audio_path: String,
    pub error: String,
}

impl RunSummary {
    pub fn new(cli_args: Vec<String>, started_at: DateTime<Utc>) -> Self {
        RunSummary {
            run_id: Uuid::new_v4().to_string(),
            started_at,
            finished_at: started_at,
            cli_args,
            counts: RunCounts::default(),
            totals: RunTotals::default(),
            failures: Vec::new(),
            dry_run: false,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        atomic_write_json(path, self)
    }
}

/// Environment fingerprint embedded in the run manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentFingerprint {
    pub language_runtime_version: String,
    pub platform: String,
    pub deps: std::collections::BTreeMap<String, String>,
}

/// Per-job status row in the run manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestJobRow {
    pub job_id: String,
    pub audio_path: String,
    pub out_dir: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chosen_strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments_count: Option<usize>,
    pub errors_count: usize,
    pub warnings_count: usize,
}

/// Run-level reproducibility manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub tool: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcs_commit: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub command: Vec<String>,
    pub config: Value,
    pub environment: EnvironmentFingerprint,
    pub jobs: Vec<ManifestJobRow>,
}

impl RunManifest {
    pub fn write(&self, path: &Path) -> Result<()> {
        atomic_write_json(path, self)
    }
}

/// Write `value` as pretty JSON to `path`, atomically: write to a sibling temp file in the same
/// directory, flush, then rename over the destination.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut tmp, value).context("failed to serialize JSON")?;
    use std::io::Write;
    tmp.flush().context("failed to flush temp file")?;
    tmp.persist(path)
        .with_context(|| format!("failed to persist {}", path.display()))?;
    Ok(())
}
