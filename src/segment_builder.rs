//! Turn postprocessed spans into durable [`SegmentRecord`]s: compute per-segment RMS/energy,
//! pre/post silence (silence strategy only), assign IDs, and attach provenance.

use std::path::Path;

use crate::audio::rms::{compute_rms, rms_to_db};
use crate::interval::Span;
use crate::model::{
    QualityInfo, SegmentFlag, SegmentRecord, SourceInfo, StrategyName, canonical_flag_order,
};
use crate::postprocess::PostprocessedSpan;
use crate::time::ADJACENCY_EPS;

/// Look up `pre_silence_sec` / `post_silence_sec` for `span` by finding non-speech intervals
/// abutting it within the adjacency tolerance. Only meaningful for the silence strategy; other
/// strategies pass `None` for `nonspeech`.
fn silence_padding(span: Span, nonspeech: Option<&[Span]>) -> (Option<f64>, Option<f64>) {
    let Some(nonspeech) = nonspeech else {
        return (None, None);
    };
    let pre = nonspeech
        .iter()
        .find(|&&(_, e)| (e - span.0).abs() <= ADJACENCY_EPS)
        .map(|&(s, e)| e - s);
    let post = nonspeech
        .iter()
        .find(|&&(s, _)| (s - span.1).abs() <= ADJACENCY_EPS)
        .map(|&(s, e)| e - s);
    (pre, post)
}

/// Build the final [`SegmentRecord`] list for one job, in `start_sec` order.
pub fn build_segments(
    spans: &[PostprocessedSpan],
    source_audio: &Path,
    strategy: StrategyName,
    auto_chosen: bool,
    nonspeech: Option<&[Span]>,
    low_energy_threshold: f64,
) -> (Vec<SegmentRecord>, Vec<String>) {
    let mut out = Vec::with_capacity(spans.len());
    let mut warnings = Vec::new();
    let source_audio_str = source_audio.to_string_lossy().into_owned();

    for (i, pspan) in spans.iter().enumerate() {
        let (start, end) = pspan.span;
        let rms = compute_rms(source_audio, start, end);
        let energy_db = rms.map(|r| rms_to_db(r, 1e-12));
        if rms.is_none() {
            warnings.push(format!(
                "could not compute rms for segment {} ({:.3}, {:.3})",
                i + 1,
                start,
                end
            ));
        }

        let mut flags = pspan.flags.clone();
        if let Some(r) = rms {
            if r < low_energy_threshold {
                flags.push(SegmentFlag::LowEnergy);
            }
        }
        let flags = canonical_flag_order(flags);

        let (pre_silence_sec, post_silence_sec) = if matches!(strategy, StrategyName::Silence) {
            silence_padding(pspan.span, nonspeech)
        } else {
            (Some(0.0), Some(0.0))
        };

        let source = SourceInfo {
            strategy,
            auto_chosen,
            raw_index: Some(i),
            derived_from: None,
        };

        let quality = Some(QualityInfo {
            rms: rms.map(crate::time::round6),
            energy_db: energy_db.map(crate::time::round2),
            confidence_hint: None,
        });

        let mut record = SegmentRecord::new(
            i + 1,
            start,
            end,
            source_audio_str.clone(),
            strategy,
            pre_silence_sec,
            post_silence_sec,
            rms,
            energy_db,
            flags,
            source,
        );
        record.quality = quality;
        out.push(record);
    }

    (out, warnings)
}
