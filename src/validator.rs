//! Validator: checks a job's `segments.jsonl` for internal consistency and against the sibling
//! `seg_report.json`, producing a per-file result that the `validate` subcommand rolls up across
//! a whole corpus.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::SegmentRecord;
use crate::report::JobReport;
use crate::time::{ADJACENCY_EPS, DURATION_EPS, is_round3};

/// One validation finding, always carrying the segment id it concerns (when applicable) so a
/// reader can locate the offending line without re-deriving the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
}

impl Finding {
    fn new(code: &str, message: impl Into<String>, segment_id: Option<&str>) -> Self {
        Finding {
            code: code.to_string(),
            message: message.into(),
            segment_id: segment_id.map(|s| s.to_string()),
        }
    }
}

/// Aggregate stats recorded alongside a validation result, independent of pass/fail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationStats {
    pub segments_count: usize,
    pub speech_total_sec: f64,
    pub min_seg_sec: Option<f64>,
    pub max_seg_sec: Option<f64>,
}

/// Result of validating a single job's output directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobValidation {
    pub job_id: String,
    pub ok: bool,
    pub warnings: Vec<Finding>,
    pub errors: Vec<Finding>,
    pub stats: ValidationStats,
}

/// Parse `segments.jsonl` (one JSON object per line) into records, tagging any unparsable line
/// as an error rather than failing the whole validation outright.
fn parse_segments_jsonl(text: &str, errors: &mut Vec<Finding>) -> Vec<SegmentRecord> {
    let mut records = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<SegmentRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => errors.push(Finding::new(
                "malformed_line",
                format!("segments.jsonl line {}: {e}", line_no + 1),
                None,
            )),
        }
    }
    records
}

/// Validate the field-level and ordering invariants of one segment list in isolation, ignoring
/// the sibling report.
fn validate_records(records: &[SegmentRecord], strict: bool, errors: &mut Vec<Finding>, warnings: &mut Vec<Finding>) {
    for (i, rec) in records.iter().enumerate() {
        let expected_id = crate::model::segment_id(i + 1);
        if rec.id != expected_id {
            errors.push(Finding::new(
                "id_out_of_sequence",
                format!("expected {expected_id}, found {}", rec.id),
                Some(&rec.id),
            ));
        }
        if rec.start_sec < 0.0 {
            errors.push(Finding::new("negative_start", "start_sec is negative", Some(&rec.id)));
        }
        if rec.end_sec <= rec.start_sec {
            errors.push(Finding::new(
                "non_positive_duration",
                format!("end_sec ({}) <= start_sec ({})", rec.end_sec, rec.start_sec),
                Some(&rec.id),
            ));
            continue;
        }
        let computed_duration = rec.end_sec - rec.start_sec;
        if (computed_duration - rec.duration_sec).abs() > DURATION_EPS {
            errors.push(Finding::new(
                "duration_mismatch",
                format!(
                    "duration_sec ({}) does not match end_sec - start_sec ({computed_duration})",
                    rec.duration_sec
                ),
                Some(&rec.id),
            ));
        }
        if !is_round3(rec.start_sec) || !is_round3(rec.end_sec) {
            // Warning only, regardless of strict mode: the round-3 check is advisory.
            warnings.push(Finding::new(
                "precision_violation",
                "start_sec/end_sec not rounded to 3 decimals",
                Some(&rec.id),
            ));
        }
        if !rec.is_speech {
            warnings.push(Finding::new("not_speech", "is_speech is false", Some(&rec.id)));
        }

        if i > 0 {
            let prev = &records[i - 1];
            if rec.start_sec + ADJACENCY_EPS < prev.end_sec {
                let finding = Finding::new(
                    "overlap",
                    format!("{} starts before {} ends", rec.id, prev.id),
                    Some(&rec.id),
                );
                if strict {
                    errors.push(finding);
                } else {
                    warnings.push(finding);
                }
            }
            if rec.start_sec < prev.start_sec {
                errors.push(Finding::new(
                    "out_of_order",
                    format!("{} starts before {} despite following it", rec.id, prev.id),
                    Some(&rec.id),
                ));
            }
        }
    }
}

fn compute_stats(records: &[SegmentRecord]) -> ValidationStats {
    let durations: Vec<f64> = records.iter().map(|r| r.duration_sec).collect();
    ValidationStats {
        segments_count: records.len(),
        speech_total_sec: durations.iter().sum(),
        min_seg_sec: durations.iter().cloned().fold(None, |acc, d| Some(acc.map_or(d, |m: f64| m.min(d)))),
        max_seg_sec: durations.iter().cloned().fold(None, |acc, d| Some(acc.map_or(d, |m: f64| m.max(d)))),
    }
}

/// Cross-check the segment list's aggregate stats against the job's `seg_report.json`, when one
/// is present. A missing report is a warning, not an error: `validate` may run against output
/// from a tool version that predates atomic report writing.
fn cross_check_report(
    report_path: &Path,
    segments_path: &Path,
    stats: &ValidationStats,
    strict: bool,
    errors: &mut Vec<Finding>,
    warnings: &mut Vec<Finding>,
) {
    if !report_path.is_file() {
        warnings.push(Finding::new("report_missing", format!("{} not found", report_path.display()), None));
        return;
    }
    let report = match JobReport::load(report_path) {
        Ok(r) => r,
        Err(e) => {
            errors.push(Finding::new("report_unreadable", e.to_string(), None));
            return;
        }
    };
    let Some(segments) = report.segments else {
        warnings.push(Finding::new(
            "report_incomplete",
            "report has not reached the segments phase",
            None,
        ));
        return;
    };
    if segments.count != stats.segments_count {
        let finding = Finding::new(
            "count_mismatch",
            format!("report says {} segments, segments.jsonl has {}", segments.count, stats.segments_count),
            None,
        );
        if strict {
            errors.push(finding);
        } else {
            warnings.push(finding);
        }
    }
    if (segments.speech_total_sec - stats.speech_total_sec).abs() > DURATION_EPS {
        let finding = Finding::new(
            "speech_total_mismatch",
            format!(
                "report speech_total_sec {} does not match computed {}",
                segments.speech_total_sec, stats.speech_total_sec
            ),
            None,
        );
        if strict {
            errors.push(finding);
        } else {
            warnings.push(finding);
        }
    }

    if strict {
        if let Some(pointed) = segments.outputs.get("segments_jsonl").and_then(|v| v.as_str()) {
            let resolved = report_path.parent().map(|dir| dir.join(pointed));
            let points_to_file = resolved
                .as_deref()
                .and_then(|p| same_file(p, segments_path))
                .unwrap_or(false);
            if !points_to_file {
                errors.push(Finding::new(
                    "outputs_mismatch",
                    format!("report outputs.segments_jsonl ({pointed}) does not point to the file under inspection"),
                    None,
                ));
            }
        }
    }

    if let Some(analysis) = &report.analysis {
        cross_check_silence_artifact(report_path, analysis, strict, errors, warnings);
    }
}

/// Best-effort comparison of two paths referring to the same file: prefers canonicalized
/// comparison (handles `.`/`..` and symlinks) and falls back to the raw path when either side
/// does not exist on disk (e.g. validating against an in-memory report in tests).
fn same_file(a: &Path, b: &Path) -> Option<bool> {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(ca), Ok(cb)) => Some(ca == cb),
        _ => Some(a == b || a.file_name() == b.file_name()),
    }
}

/// If the silence strategy was used, `silences.json` sits next to `report_path`: check that its
/// total silence duration agrees with what the report recorded within 0.1s.
fn cross_check_silence_artifact(
    report_path: &Path,
    analysis: &serde_json::Value,
    strict: bool,
    errors: &mut Vec<Finding>,
    warnings: &mut Vec<Finding>,
) {
    let Some(silence) = analysis.get("silence") else {
        return;
    };
    let Some(reported_total) = silence.get("silences_total_sec").and_then(|v| v.as_f64()) else {
        return;
    };
    let Some(dir) = report_path.parent() else { return };
    let artifact_path = dir.join("silences.json");
    if !artifact_path.is_file() {
        return;
    }
    let artifact_total = std::fs::read_to_string(&artifact_path)
        .ok()
        .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
        .and_then(|v| {
            v.get("silences")
                .and_then(|s| s.as_array())
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|e| {
                            let start = e.get("start_sec").and_then(|v| v.as_f64())?;
                            let end = e.get("end_sec").and_then(|v| v.as_f64())?;
                            Some(end - start)
                        })
                        .sum::<f64>()
                })
        });
    let Some(artifact_total) = artifact_total else {
        warnings.push(Finding::new(
            "silence_artifact_unreadable",
            format!("{} could not be parsed", artifact_path.display()),
            None,
        ));
        return;
    };
    if (artifact_total - reported_total).abs() > 0.1 {
        let finding = Finding::new(
            "silence_artifact_mismatch",
            format!(
                "silences.json total {artifact_total:.3}s does not match report's {reported_total:.3}s within 0.1s"
            ),
            None,
        );
        if strict {
            errors.push(finding);
        } else {
            warnings.push(finding);
        }
    }
}

/// Validate one job's output directory: `segments.jsonl` is read from `segments_path`, and if
/// `report_path` exists it is cross-checked for consistency.
pub fn validate_job(job_id: &str, segments_path: &Path, report_path: &Path, strict: bool) -> JobValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let text = match std::fs::read_to_string(segments_path) {
        Ok(t) => t,
        Err(e) => {
            errors.push(Finding::new(
                "segments_unreadable",
                format!("failed to read {}: {e}", segments_path.display()),
                None,
            ));
            return JobValidation {
                job_id: job_id.to_string(),
                ok: false,
                warnings,
                errors,
                stats: ValidationStats::default(),
            };
        }
    };

    let records = parse_segments_jsonl(&text, &mut errors);
    validate_records(&records, strict, &mut errors, &mut warnings);
    let stats = compute_stats(&records);
    cross_check_report(report_path, segments_path, &stats, strict, &mut errors, &mut warnings);

    let ok = errors.is_empty() && (!strict || warnings.is_empty());
    JobValidation {
        job_id: job_id.to_string(),
        ok,
        warnings,
        errors,
        stats,
    }
}

/// Corpus-level rollup across many [`JobValidation`] results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusValidation {
    pub jobs_checked: usize,
    pub jobs_ok: usize,
    pub jobs_failed: usize,
    pub total_errors: usize,
    pub total_warnings: usize,
    pub results: Vec<JobValidation>,
}

impl CorpusValidation {
    pub fn from_results(results: Vec<JobValidation>) -> Self {
        let jobs_ok = results.iter().filter(|r| r.ok).count();
        let total_errors = results.iter().map(|r| r.errors.len()).sum();
        let total_warnings = results.iter().map(|r| r.warnings.len()).sum();
        CorpusValidation {
            jobs_checked: results.len(),
            jobs_ok,
            jobs_failed: results.len() - jobs_ok,
            total_errors,
            total_warnings,
            results,
        }
    }

    /// `2` when any job failed, else `0`, matching the exit-code convention used elsewhere for
    /// validation-class errors.
    pub fn exit_code(&self) -> i32 {
        if self.jobs_failed > 0 { 2 } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SourceInfo, StrategyName};
    use tempfile::tempdir;

    fn sample_record(index: usize, start: f64, end: f64) -> SegmentRecord {
        SegmentRecord::new(
            index,
            start,
            end,
            "a.wav".to_string(),
            StrategyName::Silence,
            Some(0.0),
            Some(0.0),
            None,
            None,
            vec![],
            SourceInfo {
                strategy: StrategyName::Silence,
                auto_chosen: false,
                raw_index: Some(index - 1),
                derived_from: None,
            },
        )
    }

    #[test]
    fn valid_sequence_produces_no_errors() {
        let records = vec![sample_record(1, 0.0, 1.0), sample_record(2, 1.2, 2.0)];
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        validate_records(&records, false, &mut errors, &mut warnings);
        assert!(errors.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn overlap_is_detected() {
        let records = vec![sample_record(1, 0.0, 1.5), sample_record(2, 1.0, 2.0)];
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        validate_records(&records, false, &mut errors, &mut warnings);
        assert!(warnings.iter().any(|f| f.code == "overlap"));
        assert!(errors.is_empty());

        let mut strict_errors = Vec::new();
        let mut strict_warnings = Vec::new();
        validate_records(&records, true, &mut strict_errors, &mut strict_warnings);
        assert!(strict_errors.iter().any(|f| f.code == "overlap"));
    }

    #[test]
    fn out_of_sequence_id_is_error() {
        let mut second = sample_record(2, 1.0, 2.0);
        second.id = "seg_000005".to_string();
        let records = vec![sample_record(1, 0.0, 1.0), second];
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        validate_records(&records, false, &mut errors, &mut warnings);
        assert!(errors.iter().any(|f| f.code == "id_out_of_sequence"));
    }

    #[test]
    fn validate_job_reports_missing_segments_file_as_error() {
        let dir = tempdir().unwrap();
        let result = validate_job(
            "job_abc",
            &dir.path().join("segments.jsonl"),
            &dir.path().join("seg_report.json"),
            false,
        );
        assert!(!result.ok);
        assert!(result.errors.iter().any(|f| f.code == "segments_unreadable"));
    }

    #[test]
    fn silence_artifact_mismatch_is_detected() {
        let dir = tempdir().unwrap();
        let report_path = dir.path().join("seg_report.json");
        let mut report = JobReport::new_initial("a.wav", None, "hash".to_string(), None, chrono::Utc::now());
        report.set_analysis(serde_json::json!({ "silence": { "silences_total_sec": 5.0 } }));
        report.set_segments(
            crate::report::SegmentsSummary {
                count: 1,
                speech_total_sec: 1.0,
                min_seg_sec: 0.2,
                max_seg_sec: 30.0,
                pad_sec: 0.0,
                strategy: "silence".to_string(),
                outputs: serde_json::json!({}),
                warnings: vec![],
            },
            None,
        );
        report.write(&report_path).unwrap();

        std::fs::write(
            dir.path().join("silences.json"),
            serde_json::to_string(&serde_json::json!({
                "silences": [{"start_sec": 0.0, "end_sec": 1.0}],
            }))
            .unwrap(),
        )
        .unwrap();

        let stats = ValidationStats {
            segments_count: 1,
            speech_total_sec: 1.0,
            min_seg_sec: Some(1.0),
            max_seg_sec: Some(1.0),
        };
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        cross_check_report(
            &report_path,
            &dir.path().join("segments.jsonl"),
            &stats,
            false,
            &mut errors,
            &mut warnings,
        );
        assert!(warnings.iter().any(|f| f.code == "silence_artifact_mismatch"));
    }

    #[test]
    fn strict_mode_flags_outputs_pointing_elsewhere() {
        let dir = tempdir().unwrap();
        let report_path = dir.path().join("seg_report.json");
        let mut report = JobReport::new_initial("a.wav", None, "hash".to_string(), None, chrono::Utc::now());
        report.set_segments(
            crate::report::SegmentsSummary {
                count: 1,
                speech_total_sec: 1.0,
                min_seg_sec: 0.2,
                max_seg_sec: 30.0,
                pad_sec: 0.0,
                strategy: "silence".to_string(),
                outputs: serde_json::json!({ "segments_jsonl": "other.jsonl" }),
                warnings: vec![],
            },
            None,
        );
        report.write(&report_path).unwrap();

        let stats = ValidationStats {
            segments_count: 1,
            speech_total_sec: 1.0,
            min_seg_sec: Some(1.0),
            max_seg_sec: Some(1.0),
        };
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        cross_check_report(
            &report_path,
            &dir.path().join("segments.jsonl"),
            &stats,
            true,
            &mut errors,
            &mut warnings,
        );
        assert!(errors.iter().any(|f| f.code == "outputs_mismatch"));
    }

    #[test]
    fn corpus_rollup_counts_failures() {
        let ok_job = JobValidation {
            job_id: "a".into(),
            ok: true,
            warnings: vec![],
            errors: vec![],
            stats: ValidationStats::default(),
        };
        let bad_job = JobValidation {
            job_id: "b".into(),
            ok: false,
            warnings: vec![],
            errors: vec![Finding::new("overlap", "x", None)],
            stats: ValidationStats::default(),
        };
        let corpus = CorpusValidation::from_results(vec![ok_job, bad_job]);
        assert_eq!(corpus.jobs_checked, 2);
        assert_eq!(corpus.jobs_failed, 1);
        assert_eq!(corpus.exit_code(), 2);
    }
}
