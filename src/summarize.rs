//! Summarize: read-only aggregate statistics over one or more jobs' `segments.jsonl` trees.
//! Never writes anything; purely a reporting view for the `summarize` subcommand.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::SegmentRecord;

/// Aggregate stats for one job's segment list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub segments_count: usize,
    pub speech_total_sec: f64,
    pub min_seg_sec: Option<f64>,
    pub max_seg_sec: Option<f64>,
    pub mean_seg_sec: Option<f64>,
    pub median_seg_sec: Option<f64>,
    pub strategy_counts: BTreeMap<String, usize>,
    pub flag_counts: BTreeMap<String, usize>,
}

fn median(durations: &[f64]) -> Option<f64> {
    if durations.is_empty() {
        return None;
    }
    let mut sorted = durations.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Keep only the `n` most frequent entries of `flag_counts` (ties broken alphabetically by the
/// `BTreeMap`'s natural order). `n == 0` means unlimited.
pub fn top_n_flag_counts(flag_counts: &BTreeMap<String, usize>, n: usize) -> BTreeMap<String, usize> {
    if n == 0 || flag_counts.len() <= n {
        return flag_counts.clone();
    }
    let mut entries: Vec<(&String, &usize)> = flag_counts.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    entries.into_iter().take(n).map(|(k, v)| (k.clone(), *v)).collect()
}

fn parse_segments_jsonl(text: &str) -> Vec<SegmentRecord> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect()
}

pub fn summarize_records(job_id: &str, records: &[SegmentRecord]) -> JobSummary {
    let durations: Vec<f64> = records.iter().map(|r| r.duration_sec).collect();
    let speech_total: f64 = durations.iter().sum();
    let min_seg = durations.iter().cloned().fold(None, |acc, d| Some(acc.map_or(d, |m: f64| m.min(d))));
    let max_seg = durations.iter().cloned().fold(None, |acc, d| Some(acc.map_or(d, |m: f64| m.max(d))));
    let mean_seg = if records.is_empty() { None } else { Some(speech_total / records.len() as f64) };
    let median_seg = median(&durations);

    let mut strategy_counts = BTreeMap::new();
    let mut flag_counts = BTreeMap::new();
    for rec in records {
        *strategy_counts.entry(rec.strategy.as_str().to_string()).or_insert(0) += 1;
        for flag in &rec.flags {
            *flag_counts.entry(format!("{flag:?}").to_ascii_lowercase()).or_insert(0) += 1;
        }
    }

    JobSummary {
        job_id: job_id.to_string(),
        segments_count: records.len(),
        speech_total_sec: speech_total,
        min_seg_sec: min_seg,
        max_seg_sec: max_seg,
        mean_seg_sec: mean_seg,
        median_seg_sec: median_seg,
        strategy_counts,
        flag_counts,
    }
}

/// Read and summarize a job's `segments.jsonl` file. Missing or empty input yields a zeroed
/// summary rather than an error; `summarize` is a best-effort reporting tool.
pub fn summarize_file(job_id: &str, segments_path: &Path) -> JobSummary {
    let text = std::fs::read_to_string(segments_path).unwrap_or_default();
    let records = parse_segments_jsonl(&text);
    summarize_records(job_id, &records)
}

/// Corpus-level rollup: sums and a per-job breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusSummary {
    pub jobs: Vec<JobSummary>,
    pub total_segments: usize,
    pub total_speech_sec: f64,
}

pub fn summarize_corpus(jobs: Vec<JobSummary>) -> CorpusSummary {
    let total_segments = jobs.iter().map(|j| j.segments_count).sum();
    let total_speech_sec = jobs.iter().map(|j| j.speech_total_sec).sum();
    CorpusSummary {
        jobs,
        total_segments,
        total_speech_sec,
    }
}
