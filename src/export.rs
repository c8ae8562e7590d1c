//! Visualization exports: `timeline.json`, `segments.csv`, and `mask.json`. These are derived
//! views over a job's final [`SegmentRecord`] list; none of them are read back by this crate.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::audio::wav;
use crate::model::SegmentRecord;
use crate::report::atomic_write_json;

/// `timeline.json`: a flat array of `{start_sec, end_sec, id, flags}`, convenient for a
/// browser-side waveform viewer to consume directly.
#[derive(Debug, Clone, Serialize)]
struct TimelineEntry {
    id: String,
    start_sec: f64,
    end_sec: f64,
    flags: Vec<String>,
}

pub fn write_timeline_json(path: &Path, segments: &[SegmentRecord]) -> anyhow::Result<()> {
    let entries: Vec<TimelineEntry> = segments
        .iter()
        .map(|s| TimelineEntry {
            id: s.id.clone(),
            start_sec: s.start_sec,
            end_sec: s.end_sec,
            flags: s.flags.iter().map(|f| format!("{f:?}")).collect(),
        })
        .collect();
    atomic_write_json(path, &entries)
}

const CSV_COLUMNS: &[&str] = &[
    "id",
    "start_sec",
    "end_sec",
    "duration_sec",
    "rms",
    "strategy",
    "flags",
    "pre_silence_sec",
    "post_silence_sec",
    "source_audio",
];

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// `segments.csv`: a fixed-column hand-rolled writer (the corpus carries no CSV crate).
pub fn write_segments_csv(path: &Path, segments: &[SegmentRecord]) -> anyhow::Result<()> {
    let mut out = String::new();
    out.push_str(&CSV_COLUMNS.join(","));
    out.push('\n');
    for s in segments {
        let flags = s
            .flags
            .iter()
            .map(|f| format!("{f:?}").to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join("|");
        let row = [
            s.id.clone(),
            s.start_sec.to_string(),
            s.end_sec.to_string(),
            s.duration_sec.to_string(),
            s.rms.map(|v| v.to_string()).unwrap_or_default(),
            s.strategy.as_str().to_string(),
            flags,
            s.pre_silence_sec.map(|v| v.to_string()).unwrap_or_default(),
            s.post_silence_sec.map(|v| v.to_string()).unwrap_or_default(),
            s.source_audio.clone(),
        ];
        out.push_str(&row.iter().map(|f| csv_escape(f)).collect::<Vec<_>>().join(","));
        out.push('\n');
    }

    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, out)?;
    Ok(())
}

/// `mask.json`: a coarse speech/silence bitmap over `[0, duration_sec)`, reconstructed from the
/// final segment list at `bin_ms` resolution, for quick visual sanity checks without decoding
/// audio.
pub fn write_mask_json(path: &Path, segments: &[SegmentRecord], duration_sec: f64, bin_ms: u64) -> anyhow::Result<()> {
    let bin_sec = (bin_ms as f64) / 1000.0;
    let bin_count = if bin_sec > 0.0 {
        (duration_sec / bin_sec).ceil().max(0.0) as usize
    } else {
        0
    };

    let mut mask = vec![false; bin_count];
    for seg in segments {
        let start_bin = (seg.start_sec / bin_sec).floor().max(0.0) as usize;
        let end_bin = ((seg.end_sec / bin_sec).ceil() as usize).min(bin_count);
        for bin in start_bin..end_bin.max(start_bin) {
            if bin < mask.len() {
                mask[bin] = true;
            }
        }
    }

    let value: Value = serde_json::json!({
        "bin_ms": bin_ms,
        "duration_sec": duration_sec,
        "bins": mask,
    });
    atomic_write_json(path, &value)
}

/// Extract one `segments/seg_NNNNNN.wav` clip per segment, under `out_dir` (`--emit-wav`).
/// Best-effort: a clip that fails to extract (format mismatch, I/O error) is skipped with its
/// error returned to the caller as a warning string rather than aborting the rest of the job.
pub fn write_segment_clips(out_dir: &Path, source_audio: &Path, segments: &[SegmentRecord]) -> Vec<String> {
    let clips_dir = out_dir.join("segments");
    let mut warnings = Vec::new();
    for seg in segments {
        let dest = clips_dir.join(format!("{}.wav", seg.id));
        if let Err(e) = wav::extract_clip(source_audio, &dest, seg.start_sec, seg.end_sec) {
            warnings.push(format!("could not emit clip for {}: {e:#}", seg.id));
        }
    }
    warnings
}
