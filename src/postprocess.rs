//! Postprocess pipeline: pad → merge-overlap → enforce-min (merge) → enforce-max (split),
//! with provenance tracking across the min-merge and max-split passes.
//!
//! Provenance is computed directly from the before/after span lists of each pass (not from an
//! index threaded through the interval algebra): for a given pass, an output span inherits
//! `merged_short` when it time-overlaps two or more spans of that pass's input, and
//! `split_from_long` when it sits strictly inside one (longer) input span. This keeps the
//! two concerns — interval arithmetic and provenance bookkeeping — independent, and matches the
//! documented behavior that only the *direct* before/after of a pass is consulted (an
//! intermediate merge inside `enforce_min_by_merge`'s fixed-point loop is not separately
//! tagged — see the Open Questions in DESIGN.md).

use crate::interval::{
    DroppedIsolated, Span, SplitStrategy, enforce_max_by_split, enforce_min_by_merge,
    merge_overlaps, pad_and_clip,
};
use crate::model::SegmentFlag;
use crate::time::ADJACENCY_EPS;

/// Parameters controlling the postprocess pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PostprocessParams {
    pub pad_sec: f64,
    pub min_seg_sec: f64,
    pub max_seg_sec: f64,
    pub low_energy_threshold: f64,
    /// Whether an isolated short segment with no merge neighbor should fail the job instead of
    /// being dropped with a warning. Default `false` preserves the drop-with-warning behavior.
    pub strict_isolated_short: bool,
}

impl Default for PostprocessParams {
    fn default() -> Self {
        PostprocessParams {
            pad_sec: 0.0,
            min_seg_sec: 0.2,
            max_seg_sec: 30.0,
            low_energy_threshold: 0.01,
            strict_isolated_short: false,
        }
    }
}

/// One final postprocessed span plus its provenance flags (quality flags like `low_energy` are
/// added later, once RMS has been computed).
#[derive(Debug, Clone)]
pub struct PostprocessedSpan {
    pub span: Span,
    pub flags: Vec<SegmentFlag>,
}

#[derive(Debug, thiserror::Error)]
pub enum PostprocessError {
    #[error("invalid parameters: max_seg_sec ({max_sec}) < min_seg_sec ({min_sec})")]
    InvalidParams { max_sec: f64, min_sec: f64 },
    #[error("{0} isolated short segment(s) dropped under strict mode")]
    StrictIsolatedShort(usize),
}

/// Run the pipeline end to end, returning final spans with provenance flags and the list of
/// warnings (isolated-short drops) the caller should surface.
pub fn run(
    raw_speech: &[Span],
    duration: f64,
    params: &PostprocessParams,
) -> Result<(Vec<PostprocessedSpan>, Vec<String>), PostprocessError> {
    let mut warnings = Vec::new();

    let padded = pad_and_clip(raw_speech, params.pad_sec, duration);
    let pre_min = merge_overlaps(&padded, 0.0, ADJACENCY_EPS);

    let (min_result, dropped_min) = enforce_min_by_merge(&pre_min, params.min_seg_sec);
    record_drops(&dropped_min, &mut warnings);
    if params.strict_isolated_short && !dropped_min.is_empty() {
        return Err(PostprocessError::StrictIsolatedShort(dropped_min.len()));
    }

    let min_tags = tag_pass(&pre_min, &min_result.spans);

    let (max_result, dropped_max) = enforce_max_by_split(
        &min_result.spans,
        params.max_seg_sec,
        params.min_seg_sec,
        SplitStrategy::Equal,
    )
    .map_err(|e| PostprocessError::InvalidParams {
        max_sec: e.max_sec,
        min_sec: e.min_sec,
    })?;
    record_drops(&dropped_max, &mut warnings);
    if params.strict_isolated_short && !dropped_max.is_empty() {
        return Err(PostprocessError::StrictIsolatedShort(dropped_max.len()));
    }

    let max_tags = tag_pass(&min_result.spans, &max_result.spans);

    let out = max_result
        .spans
        .iter()
        .enumerate()
        .map(|(i, &span)| {
            let mut flags: Vec<SegmentFlag> = Vec::new();

            // Inherit merged_short from the min-merge pass when this output sits inside a span
            // that pass already flagged.
            if let Some(parent_idx) = containing_span_index(&min_result.spans, span) {
                if min_tags[parent_idx].contains(&SegmentFlag::MergedShort) {
                    flags.push(SegmentFlag::MergedShort);
                }
            }
            flags.extend(max_tags[i].iter().copied());

            if span.0 <= ADJACENCY_EPS || span.1 >= duration - ADJACENCY_EPS {
                flags.push(SegmentFlag::EdgeClipped);
            }

            PostprocessedSpan { span, flags }
        })
        .collect();

    Ok((out, warnings))
}

fn record_drops(dropped: &[DroppedIsolated], warnings: &mut Vec<String>) {
    for d in dropped {
        warnings.push(format!(
            "dropped isolated short segment ({:.3}, {:.3}): no merge neighbor available",
            d.span.0, d.span.1
        ));
    }
}

/// Index of the `previous` span that contains `span`, if any (used to walk provenance forward
/// across a pass boundary).
fn containing_span_index(previous: &[Span], span: Span) -> Option<usize> {
    previous
        .iter()
        .position(|&(ps, pe)| span.0 >= ps - ADJACENCY_EPS && span.1 <= pe + ADJACENCY_EPS)
}

/// Tag each span in `current` against `previous`: `merged_short` when it overlaps >= 2 distinct
/// previous spans, `split_from_long` when it sits strictly inside one strictly-longer previous
/// span.
fn tag_pass(previous: &[Span], current: &[Span]) -> Vec<Vec<SegmentFlag>> {
    current
        .iter()
        .map(|&(s, e)| {
            let overlapping: Vec<usize> = previous
                .iter()
                .enumerate()
                .filter(|&(_, &(ps, pe))| pe > s + 1e-9 && ps < e - 1e-9)
                .map(|(i, _)| i)
                .collect();

            let mut tags = Vec::new();
            if overlapping.len() >= 2 {
                tags.push(SegmentFlag::MergedShort);
            } else if let Some(&idx) = overlapping.first() {
                let (ps, pe) = previous[idx];
                let cur_dur = e - s;
                let prev_dur = pe - ps;
                let contained = s >= ps - 1e-9 && e <= pe + 1e-9;
                if contained && prev_dur > cur_dur + 1e-9 {
                    tags.push(SegmentFlag::SplitFromLong);
                }
            }
            tags
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_and_min_merge_absorbs_short_leading_span() {
        let (out, warnings) = run(
            &[(1.0, 1.4), (3.0, 5.0)],
            10.0,
            &PostprocessParams {
                pad_sec: 0.2,
                min_seg_sec: 1.0,
                max_seg_sec: 30.0,
                ..PostprocessParams::default()
            },
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].span, (2.8, 5.2));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn split_segment_gets_split_from_long_flag() {
        let (out, _) = run(
            &[(0.0, 10.0)],
            10.0,
            &PostprocessParams {
                pad_sec: 0.0,
                min_seg_sec: 0.5,
                max_seg_sec: 3.0,
                ..PostprocessParams::default()
            },
        )
        .unwrap();
        assert_eq!(out.len(), 4);
        for span in &out {
            assert!(span.flags.contains(&SegmentFlag::SplitFromLong));
        }
    }

    #[test]
    fn merged_segment_gets_merged_short_flag() {
        let (out, _) = run(
            &[(0.0, 0.4), (0.6, 2.0)],
            10.0,
            &PostprocessParams {
                pad_sec: 0.0,
                min_seg_sec: 1.0,
                max_seg_sec: 30.0,
                ..PostprocessParams::default()
            },
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].flags.contains(&SegmentFlag::MergedShort));
    }

    #[test]
    fn edge_clipped_flag_on_boundary_segment() {
        let (out, _) = run(
            &[(0.0, 2.0)],
            10.0,
            &PostprocessParams {
                pad_sec: 0.0,
                min_seg_sec: 0.5,
                max_seg_sec: 30.0,
                ..PostprocessParams::default()
            },
        )
        .unwrap();
        assert!(out[0].flags.contains(&SegmentFlag::EdgeClipped));
    }

    #[test]
    fn invalid_params_rejected() {
        let err = run(
            &[(0.0, 1.0)],
            10.0,
            &PostprocessParams {
                max_seg_sec: 0.1,
                min_seg_sec: 1.0,
                ..PostprocessParams::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, PostprocessError::InvalidParams { .. }));
    }

    #[test]
    fn strict_mode_fails_on_isolated_short_drop() {
        let err = run(
            &[(1.0, 1.1)],
            10.0,
            &PostprocessParams {
                min_seg_sec: 1.0,
                strict_isolated_short: true,
                ..PostprocessParams::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, PostprocessError::StrictIsolatedShort(1)));
    }
}
