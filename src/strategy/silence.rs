//! Silence strategy: invoke an external silence detector (ffmpeg's `silencedetect` filter),
//! parse its event log with a small state machine, and derive the speech complement.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use serde_json::json;

use crate::error::{ErrorKind, tagged};
use crate::interval::{Span, complement, normalize};
use crate::model::{AnalysisResult, StrategyName};
use crate::process::run_with_timeout;
use crate::time::round3;

const DETECTOR_TIMEOUT: Duration = Duration::from_secs(300);

/// Parameters for the silence detector.
#[derive(Debug, Clone, Copy)]
pub struct SilenceParams {
    pub threshold_db: f64,
    pub min_silence_sec: f64,
}

impl Default for SilenceParams {
    fn default() -> Self {
        SilenceParams {
            threshold_db: -30.0,
            min_silence_sec: 0.5,
        }
    }
}

/// Parse the concatenated stdout+stderr of `ffmpeg ... silencedetect=...` into silence spans.
///
/// State: at most one pending `start`. A stray second `start` discards the prior pending value
/// and logs a warning; a stray `end` without a `start` is ignored. If the stream ends with a
/// pending start, it is closed at `duration_sec` when known, otherwise discarded.
pub fn parse_silence_log(log: &str, duration_sec: Option<f64>) -> (Vec<Span>, Vec<String>) {
    let start_re = Regex::new(r"silence_start:\s*(-?[0-9.]+)").unwrap();
    let end_re = Regex::new(r"silence_end:\s*(-?[0-9.]+)").unwrap();

    let mut spans = Vec::new();
    let mut warnings = Vec::new();
    let mut pending_start: Option<f64> = None;

    for line in log.lines() {
        if let Some(caps) = start_re.captures(line) {
            let value: f64 = caps[1].parse().unwrap_or(0.0);
            if pending_start.is_some() {
                warnings.push(format!(
                    "stray silence_start at {value} discarded prior pending start"
                ));
            }
            pending_start = Some(value);
            continue;
        }
        if let Some(caps) = end_re.captures(line) {
            let value: f64 = caps[1].parse().unwrap_or(0.0);
            match pending_start.take() {
                Some(start) => spans.push((start, value)),
                None => warnings.push(format!("stray silence_end at {value} ignored")),
            }
        }
    }

    if let Some(start) = pending_start {
        match duration_sec {
            Some(d) => spans.push((start, d)),
            None => warnings.push(format!(
                "trailing pending silence_start at {start} discarded: duration unknown"
            )),
        }
    }

    (spans, warnings)
}

/// Run the external silence detector and return its combined stdout+stderr.
fn invoke_detector(audio_path: &Path, params: SilenceParams) -> Result<String> {
    let filter = format!(
        "silencedetect=noise={}dB:d={}",
        params.threshold_db, params.min_silence_sec
    );
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-nostats", "-i"])
        .arg(audio_path)
        .args(["-af", &filter, "-f", "null", "-"]);

    let output = run_with_timeout(cmd, DETECTOR_TIMEOUT)?;
    Ok(format!("{}\n{}", output.stdout, output.stderr))
}

/// Run the silence strategy end to end: invoke the detector, parse, normalize, complement.
pub fn analyze(audio_path: &Path, duration_sec: f64, params: SilenceParams) -> Result<AnalysisResult> {
    let log = invoke_detector(audio_path, params)
        .map_err(|e| tagged(ErrorKind::DependencyMissing, format!("silence detector unavailable: {e:#}")))?;

    let (raw_silences, mut warnings) = parse_silence_log(&log, Some(duration_sec));
    let silences = normalize(&raw_silences, duration_sec);
    let speech = complement(&silences, duration_sec);

    if speech.is_empty() && silences.is_empty() {
        warnings.push("silence detector produced no events".to_string());
    }

    let mut artifacts = BTreeMap::new();
    artifacts.insert(
        "silences_json".to_string(),
        PathBuf::from("silences.json"),
    );

    let stats = json!({
        "threshold_db": params.threshold_db,
        "min_silence_sec": params.min_silence_sec,
        "duration_sec": round3(duration_sec),
        "silences_total_sec": round3(silences.iter().map(|(s, e)| e - s).sum()),
    });

    Ok(AnalysisResult {
        strategy: StrategyName::Silence,
        duration_sec,
        speech_segments_raw: speech,
        nonspeech_segments_raw: Some(silences),
        artifacts,
        stats,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_balanced_start_end_pairs() {
        let log = "silence_start: 0.0\nsilence_end: 0.5 | silence_duration: 0.5\n\
                    silence_start: 2.0\nsilence_end: 2.5 | silence_duration: 0.5\n\
                    silence_start: 9.0\nsilence_end: 10.0 | silence_duration: 1.0\n";
        let (spans, warnings) = parse_silence_log(log, Some(10.0));
        assert_eq!(spans, vec![(0.0, 0.5), (2.0, 2.5), (9.0, 10.0)]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn stray_start_discards_prior_pending() {
        let log = "silence_start: 1.0\nsilence_start: 2.0\nsilence_end: 3.0\n";
        let (spans, warnings) = parse_silence_log(log, Some(10.0));
        assert_eq!(spans, vec![(2.0, 3.0)]);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn stray_end_without_start_is_ignored() {
        let log = "silence_end: 3.0\n";
        let (spans, warnings) = parse_silence_log(log, Some(10.0));
        assert!(spans.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn trailing_pending_start_closes_at_duration() {
        let log = "silence_start: 8.0\n";
        let (spans, warnings) = parse_silence_log(log, Some(10.0));
        assert_eq!(spans, vec![(8.0, 10.0)]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn trailing_pending_start_discarded_when_duration_unknown() {
        let log = "silence_start: 8.0\n";
        let (spans, warnings) = parse_silence_log(log, None);
        assert!(spans.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn normalize_then_complement_recovers_speech_spans() {
        let silences = vec![(0.0, 0.5), (2.0, 2.5), (9.0, 10.0)];
        let normalized = normalize(&silences, 10.0);
        let speech = complement(&normalized, 10.0);
        assert_eq!(speech, vec![(0.5, 2.0), (2.5, 9.0)]);
    }
}
