//! Core data model: [`Job`], [`AnalysisResult`], [`SegmentRecord`], and the fixed vocabulary of
//! provenance/quality flags. These types are deliberately decoupled from any particular
//! strategy or I/O concern so the postprocess pipeline and report writer can share them.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::time::{round2, round3, round6};

/// Where a `Job`'s audio path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    File,
    Workdir,
    Root,
    Manifest,
}

/// A unit of work binding a source audio file to an output directory.
#[derive(Debug, Clone)]
pub struct Job {
    /// Stable hash of the resolved, absolute audio path: `job_<first 10 hex chars of sha1>`.
    pub job_id: String,
    pub audio_path: PathBuf,
    pub metadata_path: Option<PathBuf>,
    pub out_dir: PathBuf,
    /// Sanitized relative key, used for mirrored output layouts (out-mode `out_root`).
    pub rel_key: String,
    pub input_type: InputType,
    pub warnings: Vec<String>,
}

/// The fixed provenance/quality flag vocabulary. Serializes in canonical order: a segment's
/// `flags` field is always emitted as a subsequence of
/// `[split_from_long, merged_short, edge_clipped, low_energy]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentFlag {
    SplitFromLong,
    MergedShort,
    EdgeClipped,
    LowEnergy,
}

impl SegmentFlag {
    /// Canonical ordering index, lower sorts first.
    fn rank(self) -> u8 {
        match self {
            SegmentFlag::SplitFromLong => 0,
            SegmentFlag::MergedShort => 1,
            SegmentFlag::EdgeClipped => 2,
            SegmentFlag::LowEnergy => 3,
        }
    }
}

/// Sort a flag set into the canonical serialization order.
pub fn canonical_flag_order(mut flags: Vec<SegmentFlag>) -> Vec<SegmentFlag> {
    flags.sort_by_key(|f| f.rank());
    flags.dedup();
    flags
}

/// Which strategy variant produced an [`AnalysisResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyName {
    Silence,
    Energy,
    Vad,
}

impl StrategyName {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyName::Silence => "silence",
            StrategyName::Energy => "energy",
            StrategyName::Vad => "vad",
        }
    }
}

impl std::fmt::Display for StrategyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StrategyName {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "silence" => Ok(StrategyName::Silence),
            "energy" => Ok(StrategyName::Energy),
            "vad" => Ok(StrategyName::Vad),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// Output of a strategy's `analyze` call, before postprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub strategy: StrategyName,
    pub duration_sec: f64,
    pub speech_segments_raw: Vec<(f64, f64)>,
    pub nonspeech_segments_raw: Option<Vec<(f64, f64)>>,
    pub artifacts: BTreeMap<String, PathBuf>,
    pub stats: serde_json::Value,
    pub warnings: Vec<String>,
}

/// `source` record embedded in a [`SegmentRecord`]: where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub strategy: StrategyName,
    pub auto_chosen: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<String>,
}

/// `quality` record embedded in a [`SegmentRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_hint: Option<f64>,
}

/// The durable per-segment entity persisted to `segments.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub id: String,
    pub start_sec: f64,
    pub end_sec: f64,
    pub duration_sec: f64,
    pub source_audio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_silence_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_silence_sec: Option<f64>,
    pub is_speech: bool,
    pub strategy: StrategyName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_db: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub flags: Vec<SegmentFlag>,
    pub source: SourceInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Format a 1-based segment index as `seg_NNNNNN`.
pub fn segment_id(one_based_index: usize) -> String {
    format!("seg_{one_based_index:06}")
}

impl SegmentRecord {
    /// Build a record, rounding all time/quality fields to their mandated precision.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index_one_based: usize,
        start_sec: f64,
        end_sec: f64,
        source_audio: String,
        strategy: StrategyName,
        pre_silence_sec: Option<f64>,
        post_silence_sec: Option<f64>,
        rms: Option<f64>,
        energy_db: Option<f64>,
        flags: Vec<SegmentFlag>,
        source: SourceInfo,
    ) -> Self {
        let quality = if rms.is_some() || energy_db.is_some() {
            Some(QualityInfo {
                rms: rms.map(round6),
                energy_db: energy_db.map(round2),
                confidence_hint: None,
            })
        } else {
            None
        };
        SegmentRecord {
            id: segment_id(index_one_based),
            start_sec: round3(start_sec),
            end_sec: round3(end_sec),
            duration_sec: round3(end_sec - start_sec),
            source_audio,
            pre_silence_sec: pre_silence_sec.map(round3),
            post_silence_sec: post_silence_sec.map(round3),
            is_speech: true,
            strategy,
            rms: rms.map(round6),
            energy_db: energy_db.map(round2),
            flags: canonical_flag_order(flags),
            source,
            quality,
            notes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_id_is_1_based_and_padded() {
        assert_eq!(segment_id(1), "seg_000001");
        assert_eq!(segment_id(42), "seg_000042");
    }

    #[test]
    fn canonical_flag_order_sorts_and_dedups() {
        let flags = canonical_flag_order(vec![
            SegmentFlag::LowEnergy,
            SegmentFlag::SplitFromLong,
            SegmentFlag::LowEnergy,
            SegmentFlag::EdgeClipped,
        ]);
        assert_eq!(
            flags,
            vec![
                SegmentFlag::SplitFromLong,
                SegmentFlag::EdgeClipped,
                SegmentFlag::LowEnergy
            ]
        );
    }

    #[test]
    fn strategy_name_round_trips_through_str() {
        use std::str::FromStr;
        assert_eq!(StrategyName::from_str("energy").unwrap(), StrategyName::Energy);
        assert!(StrategyName::from_str("bogus").is_err());
    }
}
