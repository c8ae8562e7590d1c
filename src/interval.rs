//! Interval algebra: normalize, complement, pad/clip, merge-overlap, min-merge, max-split on
//! closed time intervals. Operates purely on `(f64, f64)` pairs and a known `duration_sec`;
//! callers own the mapping back to [`crate::model::SegmentRecord`]/provenance.
//!
//! Rounding discipline: every function rounds its *output* to 3 decimals at the return boundary;
//! comparisons inside a function body always use the raw (unrounded) values plus the explicit
//! tolerances in [`crate::time`].

use crate::time::{ADJACENCY_EPS, round3};

/// A half-open-in-spirit, closed-in-representation `(start_sec, end_sec)` pair.
pub type Span = (f64, f64);

/// Sort by start, merge pairs whose gap is `<= 1e-3`, clip to `[0, duration]`, and discard any
/// interval that collapses (`end <= start`) after clipping.
pub fn normalize(intervals: &[Span], duration: f64) -> Vec<Span> {
    let mut sorted: Vec<Span> = intervals.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut merged: Vec<Span> = Vec::with_capacity(sorted.len());
    for (s, e) in sorted {
        let (s, e) = (s.max(0.0), e.min(duration));
        if e <= s {
            continue;
        }
        if let Some(last) = merged.last_mut() {
            if s - last.1 <= ADJACENCY_EPS {
                last.1 = last.1.max(e);
                continue;
            }
        }
        merged.push((s, e));
    }

    merged.into_iter().map(|(s, e)| (round3(s), round3(e))).collect()
}

/// Given normalized, in-range silences, return the speech gaps between them.
///
/// An empty silence list yields `[(0, duration)]` when `duration > 0`, otherwise `[]`.
pub fn complement(silences: &[Span], duration: f64) -> Vec<Span> {
    if silences.is_empty() {
        return if duration > 0.0 {
            vec![(round3(0.0), round3(duration))]
        } else {
            Vec::new()
        };
    }

    let mut out = Vec::with_capacity(silences.len() + 1);
    let first = silences[0];
    if first.0 > 0.0 {
        out.push((0.0, first.0));
    }
    for pair in silences.windows(2) {
        let (prev_end, next_start) = (pair[0].1, pair[1].0);
        if next_start > prev_end {
            out.push((prev_end, next_start));
        }
    }
    let last = silences[silences.len() - 1];
    if last.1 < duration {
        out.push((last.1, duration));
    }

    out.into_iter().map(|(s, e)| (round3(s), round3(e))).collect()
}

/// Pad every segment by `pad` on both sides and clip to `[0, duration]`; drop any interval that
/// collapses.
pub fn pad_and_clip(segments: &[Span], pad: f64, duration: f64) -> Vec<Span> {
    segments
        .iter()
        .filter_map(|&(s, e)| {
            let s = (s - pad).max(0.0);
            let e = (e + pad).min(duration);
            if e <= s { None } else { Some((round3(s), round3(e))) }
        })
        .collect()
}

/// Coalesce adjacent segments when `next.start - prev.end <= max(overlap_tolerance, gap_merge)`.
///
/// `segments` is assumed sorted by start; the output remains sorted and non-overlapping.
pub fn merge_overlaps(segments: &[Span], gap_merge: f64, overlap_tolerance: f64) -> Vec<Span> {
    let threshold = overlap_tolerance.max(gap_merge);
    let mut out: Vec<Span> = Vec::with_capacity(segments.len());
    for &(s, e) in segments {
        if let Some(last) = out.last_mut() {
            if s - last.1 <= threshold {
                last.1 = last.1.max(e);
                continue;
            }
        }
        out.push((s, e));
    }
    out.into_iter().map(|(s, e)| (round3(s), round3(e))).collect()
}

/// Result of a merge/split pass: the output spans plus, for each output span, the index range
/// `[lo, hi)` into the *input* slice that contributed to it. Used by the caller to derive
/// provenance flags (`split_from_long`, `merged_short`) without recomputing overlap from scratch.
#[derive(Debug, Clone)]
pub struct PassResult {
    pub spans: Vec<Span>,
    pub sources: Vec<(usize, usize)>,
}

/// A short segment with no neighbor to merge with is dropped; this records that event so callers
/// can emit a warning (and, under strict mode, fail the job — see `postprocess::strict`).
#[derive(Debug, Clone)]
pub struct DroppedIsolated {
    pub span: Span,
}

/// Iteratively eliminate segments shorter than `min_sec` by merging them with a neighbor.
///
/// Tie-break, applied per short segment as it is encountered scanning left to right:
/// 1. If both neighbors exist, merge with the one with the smaller gap; ties favor the right.
/// 2. If only one neighbor exists, merge with it.
/// 3. If none exists (the segment is alone), drop it and record a warning.
///
/// Implementation follows the reference behavior: the *left* neighbor is the last entry already
/// placed into the result being built; the *right* neighbor is the next entry in the original
/// (pre-pass) sequence. Iterates to a fixed point.
pub fn enforce_min_by_merge(
    segments: &[Span],
    min_sec: f64,
) -> (PassResult, Vec<DroppedIsolated>) {
    let mut current: Vec<Span> = segments.to_vec();
    let mut sources: Vec<(usize, usize)> = (0..current.len()).map(|i| (i, i + 1)).collect();
    let mut dropped = Vec::new();

    loop {
        let mut out: Vec<Span> = Vec::with_capacity(current.len());
        let mut out_sources: Vec<(usize, usize)> = Vec::with_capacity(current.len());
        let mut changed = false;
        let mut i = 0usize;

        while i < current.len() {
            let (s, e) = current[i];
            let dur = e - s;
            if dur + 1e-9 >= min_sec {
                out.push((s, e));
                out_sources.push(sources[i]);
                i += 1;
                continue;
            }

            let has_left = !out.is_empty();
            let has_right = i + 1 < current.len();

            if !has_left && !has_right {
                dropped.push(DroppedIsolated { span: (s, e) });
                i += 1;
                changed = true;
                continue;
            }

            if has_left && has_right {
                let left_gap = s - out.last().unwrap().1;
                let right_gap = current[i + 1].0 - e;
                if left_gap < right_gap {
                    let last = out.last_mut().unwrap();
                    last.1 = last.1.max(e);
                    let last_src = out_sources.last_mut().unwrap();
                    last_src.1 = sources[i].1;
                    i += 1;
                } else {
                    let (ns, ne) = current[i + 1];
                    out.push((s.min(ns), e.max(ne)));
                    out_sources.push((sources[i].0, sources[i + 1].1));
                    i += 2;
                }
                changed = true;
                continue;
            }

            if has_left {
                let last = out.last_mut().unwrap();
                last.1 = last.1.max(e);
                let last_src = out_sources.last_mut().unwrap();
                last_src.1 = sources[i].1;
                i += 1;
                changed = true;
                continue;
            }

            // has_right only
            let (ns, ne) = current[i + 1];
            out.push((s.min(ns), e.max(ne)));
            out_sources.push((sources[i].0, sources[i + 1].1));
            i += 2;
            changed = true;
        }

        current = out;
        sources = out_sources;

        if !changed {
            break;
        }
        if current.is_empty() {
            break;
        }
        // Re-check whether any segment is still short; if not, stop.
        if current.iter().all(|&(s, e)| e - s + 1e-9 >= min_sec) {
            break;
        }
    }

    let spans = current.into_iter().map(|(s, e)| (round3(s), round3(e))).collect();
    (PassResult { spans, sources }, dropped)
}

/// Split strategy for `enforce_max_by_split`. Only `Equal` is implemented; other tags are
/// reserved for future splitting strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStrategy {
    Equal,
}

/// Error returned when `max_sec < min_sec`.
#[derive(Debug, thiserror::Error)]
#[error("invalid parameters: max_seg_sec ({max_sec}) < min_seg_sec ({min_sec})")]
pub struct InvalidSplitParams {
    pub max_sec: f64,
    pub min_sec: f64,
}

/// For each segment longer than `max_sec`, split into `k = max(1, ceil((duration - 1e-6) /
/// max_sec))` equal-length pieces; the final piece's end is snapped to the original segment's
/// end exactly. After splitting, re-runs `merge_overlaps` then `enforce_min_by_merge` once over
/// the whole output list (to absorb round-off adjacency and any too-short remainder).
pub fn enforce_max_by_split(
    segments: &[Span],
    max_sec: f64,
    min_sec: f64,
    strategy: SplitStrategy,
) -> Result<(PassResult, Vec<DroppedIsolated>), InvalidSplitParams> {
    if max_sec < min_sec {
        return Err(InvalidSplitParams { max_sec, min_sec });
    }
    let SplitStrategy::Equal = strategy;

    let mut spans: Vec<Span> = Vec::with_capacity(segments.len());
    let mut sources: Vec<(usize, usize)> = Vec::with_capacity(segments.len());

    for (idx, &(s, e)) in segments.iter().enumerate() {
        let dur = e - s;
        if dur <= max_sec + 1e-9 {
            spans.push((s, e));
            sources.push((idx, idx + 1));
            continue;
        }
        let k = (((dur - 1e-6) / max_sec).ceil() as i64).max(1) as usize;
        let piece = dur / k as f64;
        for p in 0..k {
            let piece_start = s + piece * p as f64;
            let piece_end = if p + 1 == k { e } else { s + piece * (p + 1) as f64 };
            spans.push((piece_start, piece_end));
            sources.push((idx, idx + 1));
        }
    }

    let merged = merge_overlaps(&spans, 0.0, ADJACENCY_EPS);
    let (min_pass, dropped) = enforce_min_by_merge(&merged, min_sec);

    Ok((
        PassResult {
            spans: min_pass.spans,
            sources,
        },
        dropped,
    ))
}
