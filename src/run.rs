//! The segmentation engine: turns one resolved [`Job`] into a finished output directory, and
//! fans a job list out across a small worker pool (plain `std::thread` + `mpsc`, matching the
//! rest of this crate's avoidance of an async runtime or thread-pool crate for a concern this
//! small).

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;

use crate::audio::{fingerprint, probe};
use crate::config;
use crate::error::{ErrorKind, mark};
use crate::export;
use crate::model::{Job, SegmentRecord, StrategyName};
use crate::orchestrator::{self, AutoStrategyConfig, QualityGate};
use crate::postprocess::PostprocessParams;
use crate::report::{
    AutoStrategySummary, EnvironmentFingerprint, JobFailure, JobReport, ManifestJobRow,
    RunCounts, RunManifest, RunSummary, RunTotals, SegmentsSummary,
};
use crate::strategy::{Strategy, StrategyParams};
use crate::time::round3;

/// Export toggles for one run, resolved from config + CLI flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    pub timeline: bool,
    pub csv: bool,
    pub mask: bool,
    pub mask_bin_ms: u64,
    pub emit_wav: bool,
}

/// Fully-resolved parameters for processing one job, pulled out of the merged effective config.
#[derive(Debug, Clone)]
pub struct JobParams {
    pub strategy_params: StrategyParams,
    pub post_params: PostprocessParams,
    pub auto_strategy: AutoStrategyConfig,
    pub single_strategy: Strategy,
    pub export: ExportOptions,
    pub config_hash: String,
    pub config_value: Value,
    /// When `false`, a job whose output directory already has a `segments.jsonl` is refused
    /// rather than overwritten.
    pub overwrite: bool,
    /// Stop after the analysis phase (write the detector artifact and analysis-phase report)
    /// unless `emit_segments_when_analyze_only` is also set.
    pub analyze_only: bool,
    pub emit_segments_when_analyze_only: bool,
}

fn parse_strategy_params(config: &Value) -> StrategyParams {
    let mut params = StrategyParams::default();
    if let Some(v) = config["silence"]["threshold_db"].as_f64() {
        params.silence.threshold_db = v;
    }
    if let Some(v) = config["silence"]["min_silence_sec"].as_f64() {
        params.silence.min_silence_sec = v;
    }
    if let Some(v) = config["energy"]["frame_ms"].as_u64() {
        params.energy.frame_ms = v as u32;
    }
    if let Some(v) = config["energy"]["hop_ms"].as_u64() {
        params.energy.hop_ms = v as u32;
    }
    if let Some(v) = config["energy"]["smooth_ms"].as_u64() {
        params.energy.smooth_ms = v as u32;
    }
    if let Some(v) = config["energy"]["threshold_rms"].as_f64() {
        params.energy.threshold_rms = v;
    }
    if let Some(v) = config["energy"]["min_speech_sec"].as_f64() {
        params.energy.min_speech_sec = v;
    }
    if let Some(v) = config["energy"]["min_silence_sec"].as_f64() {
        params.energy.min_silence_sec = v;
    }
    if let Some(v) = config["vad"]["aggressiveness"].as_u64() {
        params.vad.aggressiveness = v as u8;
    }
    if let Some(v) = config["vad"]["sample_rate"].as_u64() {
        params.vad.sample_rate = v as u32;
    }
    params
}

fn parse_postprocess_params(config: &Value) -> PostprocessParams {
    let mut params = PostprocessParams::default();
    if let Some(v) = config["postprocess"]["pad_sec"].as_f64() {
        params.pad_sec = v;
    }
    if let Some(v) = config["postprocess"]["min_seg_sec"].as_f64() {
        params.min_seg_sec = v;
    }
    if let Some(v) = config["postprocess"]["max_seg_sec"].as_f64() {
        params.max_seg_sec = v;
    }
    if let Some(v) = config["postprocess"]["low_energy_threshold"].as_f64() {
        params.low_energy_threshold = v;
    }
    if let Some(v) = config["postprocess"]["strict_isolated_short"].as_bool() {
        params.strict_isolated_short = v;
    }
    params
}

fn parse_auto_strategy(config: &Value) -> AutoStrategyConfig {
    let mut auto = AutoStrategyConfig::default();
    if let Some(v) = config["auto_strategy"]["enabled"].as_bool() {
        auto.enabled = v;
    }
    if let Some(arr) = config["auto_strategy"]["order"].as_array() {
        let order: Vec<Strategy> = arr
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(|s| s.parse().ok())
            .collect();
        if !order.is_empty() {
            auto.order = order;
        }
    }
    let mut gate = QualityGate::default();
    if let Some(v) = config["auto_strategy"]["min_segments"].as_u64() {
        gate.min_segments = v as usize;
    }
    if let Some(v) = config["auto_strategy"]["min_speech_total_sec"].as_f64() {
        gate.min_speech_total_sec = v;
    }
    if let Some(v) = config["auto_strategy"]["max_speech_ratio"].as_f64() {
        gate.max_speech_ratio = v;
    }
    auto.gate = gate;
    auto
}

fn parse_export_options(config: &Value) -> ExportOptions {
    ExportOptions {
        timeline: config["export"]["timeline"].as_bool().unwrap_or(false),
        csv: config["export"]["csv"].as_bool().unwrap_or(false),
        mask: config["export"]["mask"].as_bool().unwrap_or(false),
        mask_bin_ms: config["export"]["mask_bin_ms"].as_u64().unwrap_or(1000),
        emit_wav: config["export"]["emit_wav"].as_bool().unwrap_or(false),
    }
}

/// Resolve a merged effective config (defaults < file < `--set`) into the strongly-typed
/// parameter bundles the engine needs.
pub fn resolve_job_params(config: Value) -> JobParams {
    let config_hash = config::compute_config_hash(&config);
    let single_strategy: Strategy = config["strategy"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Strategy::Silence);

    JobParams {
        strategy_params: parse_strategy_params(&config),
        post_params: parse_postprocess_params(&config),
        auto_strategy: parse_auto_strategy(&config),
        single_strategy,
        export: parse_export_options(&config),
        config_hash,
        config_value: config,
        overwrite: false,
        analyze_only: false,
        emit_segments_when_analyze_only: false,
    }
}

/// Final outcome of processing one job, used to populate the run summary/manifest.
pub struct JobOutcome {
    pub job_id: String,
    pub chosen_strategy: Option<StrategyName>,
    pub segments: Vec<SegmentRecord>,
    pub warnings: Vec<String>,
}

fn to_strategy_name(s: Strategy) -> StrategyName {
    match s {
        Strategy::Silence => StrategyName::Silence,
        Strategy::Energy => StrategyName::Energy,
        Strategy::Vad => StrategyName::Vad,
    }
}

/// Process one job end to end: probe duration, run the strategy (single or auto), postprocess,
/// build segment records, write `segments.jsonl` + `seg_report.json` + any requested exports.
pub fn process_job(job: &Job, params: &JobParams) -> Result<JobOutcome> {
    std::fs::create_dir_all(&job.out_dir)
        .with_context(|| format!("failed to create output directory {}", job.out_dir.display()))?;

    if !params.overwrite && job.out_dir.join("segments.jsonl").is_file() {
        return Err(mark(
            ErrorKind::InvalidArgument,
            anyhow::anyhow!(
                "{} already has a segments.jsonl; pass --overwrite to replace it",
                job.out_dir.display()
            ),
        ));
    }

    let duration_sec = probe::get_duration(&job.audio_path, job.metadata_path.as_deref())
        .ok_or_else(|| mark(ErrorKind::RuntimeProcessing, anyhow::anyhow!("could not determine audio duration")))?;

    let mut report = JobReport::new_initial(
        &job.audio_path.to_string_lossy(),
        job.metadata_path.as_ref().map(|p| p.to_string_lossy().into_owned()).as_deref(),
        params.config_hash.clone(),
        fingerprint::compute(&job.audio_path),
        Utc::now(),
    );
    report.write(&job.out_dir.join("seg_report.json"))?;

    let mut warnings = job.warnings.clone();

    let (chosen_strategy, postprocessed, analysis, auto_chosen, auto_summary) = if params.auto_strategy.enabled {
        let result = orchestrator::run_auto(
            &params.auto_strategy,
            &job.audio_path,
            duration_sec,
            &params.strategy_params,
            &params.post_params,
        );
        let Some((strategy, outcome)) = result.chosen else {
            return Err(mark(
                ErrorKind::RuntimeProcessing,
                anyhow::anyhow!("no candidate strategy satisfied the quality gate"),
            ));
        };
        warnings.extend(outcome.warnings.clone());
        let summary = AutoStrategySummary {
            enabled: true,
            order: params.auto_strategy.order.iter().map(|s| s.to_string()).collect(),
            chosen: Some(strategy.to_string()),
            attempts: result.attempts,
        };
        (
            to_strategy_name(strategy),
            outcome.final_spans,
            outcome.analysis,
            true,
            Some(summary),
        )
    } else {
        let outcome = orchestrator::run_single(
            params.single_strategy,
            &job.audio_path,
            duration_sec,
            &params.strategy_params,
            &params.post_params,
        )?;
        warnings.extend(outcome.warnings.clone());
        (
            to_strategy_name(params.single_strategy),
            outcome.final_spans,
            outcome.analysis,
            false,
            None,
        )
    };

    write_strategy_artifact(&job.out_dir, chosen_strategy, &analysis)?;
    report.set_analysis(serde_json::json!({ chosen_strategy.as_str(): analysis.stats.clone() }));
    report.write(&job.out_dir.join("seg_report.json"))?;

    if params.analyze_only && !params.emit_segments_when_analyze_only {
        return Ok(JobOutcome {
            job_id: job.job_id.clone(),
            chosen_strategy: Some(chosen_strategy),
            segments: Vec::new(),
            warnings,
        });
    }

    let (segments, build_warnings) = crate::segment_builder::build_segments(
        &postprocessed,
        &job.audio_path,
        chosen_strategy,
        auto_chosen,
        analysis.nonspeech_segments_raw.as_deref(),
        params.post_params.low_energy_threshold,
    );
    warnings.extend(build_warnings);

    write_segments_jsonl(&job.out_dir.join("segments.jsonl"), &segments)?;

    let speech_total_sec: f64 = segments.iter().map(|s| s.duration_sec).sum();
    report.set_segments(
        SegmentsSummary {
            count: segments.len(),
            speech_total_sec: round3(speech_total_sec),
            min_seg_sec: params.post_params.min_seg_sec,
            max_seg_sec: params.post_params.max_seg_sec,
            pad_sec: params.post_params.pad_sec,
            strategy: chosen_strategy.to_string(),
            outputs: serde_json::json!({
                "segments_jsonl": "segments.jsonl",
            }),
            warnings: warnings.clone(),
        },
        auto_summary,
    );
    report.write(&job.out_dir.join("seg_report.json"))?;

    if params.export.timeline {
        export::write_timeline_json(&job.out_dir.join("timeline.json"), &segments)?;
    }
    if params.export.csv {
        export::write_segments_csv(&job.out_dir.join("segments.csv"), &segments)?;
    }
    if params.export.mask {
        export::write_mask_json(&job.out_dir.join("mask.json"), &segments, duration_sec, params.export.mask_bin_ms)?;
    }
    if params.export.emit_wav {
        let clip_warnings = export::write_segment_clips(&job.out_dir, &job.audio_path, &segments);
        warnings.extend(clip_warnings);
    }

    Ok(JobOutcome {
        job_id: job.job_id.clone(),
        chosen_strategy: Some(chosen_strategy),
        segments,
        warnings,
    })
}

/// Persist the chosen strategy's raw detector output as its own artifact (`silences.json` /
/// `energy.json` / `vad.json`), alongside `seg_report.json`'s summarized stats.
fn write_strategy_artifact(out_dir: &Path, strategy: StrategyName, analysis: &crate::model::AnalysisResult) -> Result<()> {
    let filename = match strategy {
        StrategyName::Silence => "silences.json",
        StrategyName::Energy => "energy.json",
        StrategyName::Vad => "vad.json",
    };

    let mut value = analysis.stats.clone();
    if let Value::Object(obj) = &mut value {
        if let Some(nonspeech) = &analysis.nonspeech_segments_raw {
            obj.insert(
                "silences".to_string(),
                serde_json::to_value(
                    nonspeech
                        .iter()
                        .map(|&(s, e)| serde_json::json!({ "start_sec": round3(s), "end_sec": round3(e) }))
                        .collect::<Vec<_>>(),
                )?,
            );
        }
        obj.insert(
            "speech_segments_raw".to_string(),
            serde_json::to_value(
                analysis
                    .speech_segments_raw
                    .iter()
                    .map(|&(s, e)| serde_json::json!({ "start_sec": round3(s), "end_sec": round3(e) }))
                    .collect::<Vec<_>>(),
            )?,
        );
    }

    crate::report::atomic_write_json(&out_dir.join(filename), &value)
}

fn write_segments_jsonl(path: &Path, segments: &[SegmentRecord]) -> Result<()> {
    let mut out = String::new();
    for seg in segments {
        out.push_str(&serde_json::to_string(seg)?);
        out.push('\n');
    }
    std::fs::write(path, out).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Result of processing one job in a multi-job run: either an outcome, or the error it failed
/// with, keyed by job id/audio path for the run summary.
pub enum JobRunResult {
    Ok(JobOutcome),
    Err { job_id: String, audio_path: PathBuf, error: String },
}

/// Run `jobs` across `worker_count` threads (default: `num_cpus::get()`), returning one result
/// per job in an unspecified order (callers that need stable order should sort by `job_id`).
pub fn run_jobs(jobs: Vec<Job>, params: &JobParams, worker_count: usize) -> Vec<JobRunResult> {
    let worker_count = worker_count.max(1);
    let (work_tx, work_rx) = mpsc::channel::<Job>();
    let (result_tx, result_rx) = mpsc::channel::<JobRunResult>();
    let work_rx = std::sync::Arc::new(std::sync::Mutex::new(work_rx));

    let total = jobs.len();
    for job in jobs {
        work_tx.send(job).expect("receiver outlives sender");
    }
    drop(work_tx);

    std::thread::scope(|scope| {
        for _ in 0..worker_count.min(total.max(1)) {
            let work_rx = std::sync::Arc::clone(&work_rx);
            let result_tx = result_tx.clone();
            let params = &*params;
            scope.spawn(move || {
                loop {
                    let job = {
                        let rx = work_rx.lock().unwrap();
                        rx.recv()
                    };
                    let Ok(job) = job else { break };
                    let job_id = job.job_id.clone();
                    let audio_path = job.audio_path.clone();
                    let result = match process_job(&job, params) {
                        Ok(outcome) => JobRunResult::Ok(outcome),
                        Err(e) => JobRunResult::Err {
                            job_id,
                            audio_path,
                            error: format!("{e:#}"),
                        },
                    };
                    let _ = result_tx.send(result);
                }
            });
        }
        drop(result_tx);
    });

    result_rx.into_iter().collect()
}

/// Number of worker threads to use by default: one per logical CPU.
pub fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

/// Build the run-level summary and manifest at the common parent of all job outputs. Called once,
/// after all jobs finish (or, for `--dry-run`, immediately after job resolution with `results`
/// `None` so every planned job is recorded with status `planned` and zero counts).
pub fn build_run_report(
    cli_args: Vec<String>,
    started_at: chrono::DateTime<Utc>,
    finished_at: chrono::DateTime<Utc>,
    config_value: &Value,
    environment: EnvironmentFingerprint,
    planned_jobs: &[Job],
    results: Option<&[JobRunResult]>,
) -> (RunSummary, RunManifest) {
    let dry_run = results.is_none();
    let mut counts = RunCounts {
        jobs_total: planned_jobs.len(),
        planned: planned_jobs.len(),
        ..RunCounts::default()
    };
    let mut totals = RunTotals::default();
    let mut failures = Vec::new();
    let mut rows = Vec::new();

    if let Some(results) = results {
        let mut by_id: std::collections::HashMap<&str, &JobRunResult> = std::collections::HashMap::new();
        for result in results {
            let id = match result {
                JobRunResult::Ok(outcome) => outcome.job_id.as_str(),
                JobRunResult::Err { job_id, .. } => job_id.as_str(),
            };
            by_id.insert(id, result);
        }

        for job in planned_jobs {
            match by_id.get(job.job_id.as_str()) {
                Some(JobRunResult::Ok(outcome)) => {
                    counts.analyzed += 1;
                    counts.emitted += 1;
                    let speech_sec: f64 = outcome.segments.iter().map(|s| s.duration_sec).sum();
                    totals.speech_total_sec = round3(totals.speech_total_sec + speech_sec);
                    rows.push(ManifestJobRow {
                        job_id: job.job_id.clone(),
                        audio_path: job.audio_path.to_string_lossy().into_owned(),
                        out_dir: job.out_dir.to_string_lossy().into_owned(),
                        status: "ok".to_string(),
                        chosen_strategy: outcome.chosen_strategy.map(|s| s.to_string()),
                        segments_count: Some(outcome.segments.len()),
                        errors_count: 0,
                        warnings_count: outcome.warnings.len(),
                    });
                }
                Some(JobRunResult::Err { error, .. }) => {
                    counts.failed += 1;
                    failures.push(JobFailure {
                        job_id: job.job_id.clone(),
                        audio_path: job.audio_path.to_string_lossy().into_owned(),
                        error: error.clone(),
                    });
                    rows.push(ManifestJobRow {
                        job_id: job.job_id.clone(),
                        audio_path: job.audio_path.to_string_lossy().into_owned(),
                        out_dir: job.out_dir.to_string_lossy().into_owned(),
                        status: "failed".to_string(),
                        chosen_strategy: None,
                        segments_count: None,
                        errors_count: 1,
                        warnings_count: 0,
                    });
                }
                None => {
                    counts.skipped += 1;
                    rows.push(ManifestJobRow {
                        job_id: job.job_id.clone(),
                        audio_path: job.audio_path.to_string_lossy().into_owned(),
                        out_dir: job.out_dir.to_string_lossy().into_owned(),
                        status: "skipped".to_string(),
                        chosen_strategy: None,
                        segments_count: None,
                        errors_count: 0,
                        warnings_count: 0,
                    });
                }
            }
        }
    } else {
        for job in planned_jobs {
            rows.push(ManifestJobRow {
                job_id: job.job_id.clone(),
                audio_path: job.audio_path.to_string_lossy().into_owned(),
                out_dir: job.out_dir.to_string_lossy().into_owned(),
                status: "planned".to_string(),
                chosen_strategy: None,
                segments_count: None,
                errors_count: 0,
                warnings_count: 0,
            });
        }
    }

    let summary = RunSummary {
        run_id: uuid::Uuid::new_v4().to_string(),
        started_at,
        finished_at,
        cli_args: cli_args.clone(),
        counts,
        totals,
        failures,
        dry_run,
    };

    let manifest = RunManifest {
        tool: "audioseg".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        vcs_commit: None,
        started_at,
        finished_at,
        command: cli_args,
        config: config_value.clone(),
        environment,
        jobs: rows,
    };

    (summary, manifest)
}

/// Timeout applied when the run itself needs a coarse wall-clock budget (not currently wired to
/// any CLI flag; reserved for a future `--run-timeout`).
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(3600);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_job_params_reads_strategy_and_thresholds() {
        let config = config::defaults();
        let params = resolve_job_params(config);
        assert_eq!(params.single_strategy, Strategy::Silence);
        assert_eq!(params.post_params.min_seg_sec, 0.2);
        assert!(!params.auto_strategy.enabled);
    }

    #[test]
    fn export_options_default_to_disabled() {
        let config = config::defaults();
        let params = resolve_job_params(config);
        assert!(!params.export.timeline);
        assert!(!params.export.csv);
        assert!(!params.export.mask);
        assert_eq!(params.export.mask_bin_ms, 1000);
    }

    fn test_job(id: &str) -> Job {
        Job {
            job_id: id.to_string(),
            audio_path: PathBuf::from(format!("{id}.wav")),
            metadata_path: None,
            out_dir: PathBuf::from(format!("out/{id}")),
            rel_key: id.to_string(),
            input_type: crate::model::InputType::File,
            warnings: vec![],
        }
    }

    #[test]
    fn build_run_report_dry_run_marks_every_job_planned() {
        let jobs = vec![test_job("job_a"), test_job("job_b")];
        let now = Utc::now();
        let (summary, manifest) = build_run_report(
            vec!["audioseg".to_string(), "segment".to_string()],
            now,
            now,
            &Value::Null,
            EnvironmentFingerprint {
                language_runtime_version: "rustc test".to_string(),
                platform: "test".to_string(),
                deps: Default::default(),
            },
            &jobs,
            None,
        );
        assert!(summary.dry_run);
        assert_eq!(summary.counts.jobs_total, 2);
        assert_eq!(summary.counts.planned, 2);
        assert_eq!(summary.counts.analyzed, 0);
        assert_eq!(manifest.jobs.len(), 2);
        assert!(manifest.jobs.iter().all(|row| row.status == "planned"));
    }

    #[test]
    fn build_run_report_counts_ok_and_failed_jobs() {
        let jobs = vec![test_job("job_a"), test_job("job_b")];
        let now = Utc::now();
        let results = vec![
            JobRunResult::Ok(JobOutcome {
                job_id: "job_a".to_string(),
                chosen_strategy: Some(StrategyName::Energy),
                segments: vec![],
                warnings: vec![],
            }),
            JobRunResult::Err {
                job_id: "job_b".to_string(),
                audio_path: PathBuf::from("job_b.wav"),
                error: "boom".to_string(),
            },
        ];
        let (summary, manifest) = build_run_report(
            vec!["audioseg".to_string()],
            now,
            now,
            &Value::Null,
            EnvironmentFingerprint {
                language_runtime_version: "rustc test".to_string(),
                platform: "test".to_string(),
                deps: Default::default(),
            },
            &jobs,
            Some(&results),
        );
        assert!(!summary.dry_run);
        assert_eq!(summary.counts.analyzed, 1);
        assert_eq!(summary.counts.emitted, 1);
        assert_eq!(summary.counts.failed, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].job_id, "job_b");
        let ok_row = manifest.jobs.iter().find(|r| r.job_id == "job_a").unwrap();
        assert_eq!(ok_row.status, "ok");
        let failed_row = manifest.jobs.iter().find(|r| r.job_id == "job_b").unwrap();
        assert_eq!(failed_row.status, "failed");
    }
}
