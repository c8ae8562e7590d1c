//! VAD strategy: stream PCM16 mono frames through an external voice-activity classifier, mask
//! → runs via the same morphological cleanup used by the energy strategy.
//!
//! The classifier is modeled as a trait object so the production implementation can shell out
//! to, or link against, a real library without the core depending on it directly, and tests can
//! substitute a deterministic fake.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde_json::json;

use crate::audio::pcm::pcm16_mono_frames;
use crate::error::{ErrorKind, tagged};
use crate::model::{AnalysisResult, StrategyName};
use crate::strategy::morph::cleanup_mask;
use crate::time::round3;

/// Parameters for the VAD strategy.
#[derive(Debug, Clone, Copy)]
pub struct VadParams {
    pub aggressiveness: u8,
    pub frame_ms: u32,
    pub sample_rate: u32,
    pub min_speech_sec: f64,
    pub min_silence_sec: f64,
}

impl Default for VadParams {
    fn default() -> Self {
        VadParams {
            aggressiveness: 2,
            frame_ms: 30,
            sample_rate: 16_000,
            min_speech_sec: 0.20,
            min_silence_sec: 0.35,
        }
    }
}

impl VadParams {
    /// Validate the enumerated ranges for aggressiveness/frame length/sample rate.
    pub fn validate(&self) -> Result<()> {
        if !(0..=3).contains(&self.aggressiveness) {
            anyhow::bail!("aggressiveness must be in 0..=3, got {}", self.aggressiveness);
        }
        if !matches!(self.frame_ms, 10 | 20 | 30) {
            anyhow::bail!("frame_ms must be one of 10/20/30, got {}", self.frame_ms);
        }
        if !matches!(self.sample_rate, 8_000 | 16_000 | 32_000 | 48_000) {
            anyhow::bail!(
                "sample_rate must be one of 8000/16000/32000/48000, got {}",
                self.sample_rate
            );
        }
        Ok(())
    }
}

/// An external voice-activity classifier: given one PCM16 little-endian mono frame, decide
/// whether it is speech.
pub trait VadClassifier {
    fn is_speech(&mut self, frame: &[u8]) -> Result<bool>;
}

/// Construct the production classifier, initialized at `aggressiveness`.
///
/// Returns [`ErrorKind::DependencyMissing`] when the classifier library is unavailable; the
/// orchestrator treats this as a per-candidate reason under auto-strategy and as a direct
/// failure otherwise (exit code 2 when the VAD strategy is invoked directly).
pub fn build_classifier(_aggressiveness: u8) -> Result<Box<dyn VadClassifier>> {
    Err(tagged(
        ErrorKind::DependencyMissing,
        "no voice-activity classifier library is linked into this build",
    ))
}

/// Run the VAD strategy end to end using `classifier` for per-frame decisions.
pub fn analyze_with_classifier(
    audio_path: &Path,
    duration_sec: f64,
    params: VadParams,
    classifier: &mut dyn VadClassifier,
) -> Result<AnalysisResult> {
    params.validate()?;

    let frames = pcm16_mono_frames(audio_path, params.sample_rate, params.frame_ms)?;
    let frame_sec = params.frame_ms as f64 / 1000.0;

    let mut mask = Vec::with_capacity(frames.len());
    for frame in &frames {
        mask.push(classifier.is_speech(frame)?);
    }

    let min_speech_frames = ((params.min_speech_sec / frame_sec).ceil() as usize).max(1);
    let min_silence_frames = ((params.min_silence_sec / frame_sec).ceil() as usize).max(1);
    let runs = cleanup_mask(&mask, min_speech_frames, min_silence_frames);

    let speech: Vec<(f64, f64)> = runs
        .into_iter()
        .map(|(start_idx, end_idx)| {
            let start = start_idx as f64 * frame_sec;
            let end = ((end_idx as f64 + 1.0) * frame_sec).min(duration_sec);
            (round3(start), round3(end))
        })
        .filter(|&(s, e)| e > s)
        .collect();

    let speech_frames = mask.iter().filter(|&&v| v).count();

    let stats = json!({
        "frames": mask.len(),
        "speech_frames": speech_frames,
        "aggressiveness": params.aggressiveness,
    });

    let mut artifacts = BTreeMap::new();
    artifacts.insert("vad_json".to_string(), std::path::PathBuf::from("vad.json"));

    Ok(AnalysisResult {
        strategy: StrategyName::Vad,
        duration_sec,
        speech_segments_raw: speech,
        nonspeech_segments_raw: None,
        artifacts,
        stats,
        warnings: Vec::new(),
    })
}

/// Run the VAD strategy end to end with the production classifier.
pub fn analyze(audio_path: &Path, duration_sec: f64, params: VadParams) -> Result<AnalysisResult> {
    let mut classifier = build_classifier(params.aggressiveness)?;
    analyze_with_classifier(audio_path, duration_sec, params, classifier.as_mut())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeClassifier {
        pattern: Vec<bool>,
        idx: usize,
    }

    impl VadClassifier for FakeClassifier {
        fn is_speech(&mut self, _frame: &[u8]) -> Result<bool> {
            let v = self.pattern[self.idx % self.pattern.len()];
            self.idx += 1;
            Ok(v)
        }
    }

    #[test]
    fn validate_rejects_bad_sample_rate() {
        let params = VadParams {
            sample_rate: 44_100,
            ..VadParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(VadParams::default().validate().is_ok());
    }

    #[test]
    fn missing_classifier_is_dependency_missing() {
        let err = build_classifier(2).unwrap_err();
        let converted: crate::error::Error = err.into();
        assert!(matches!(converted, crate::error::Error::DependencyMissing(_)));
    }

    #[test]
    fn fake_classifier_produces_speech_runs() {
        use hound::{SampleFormat, WavSpec, WavWriter};
        use tempfile::NamedTempFile;

        let file = NamedTempFile::new().unwrap();
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(file.path(), spec).unwrap();
        for _ in 0..16_000 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let mut fake = FakeClassifier {
            pattern: vec![false, false, true, true, true, true, true, true, true, true],
            idx: 0,
        };

        let result = analyze_with_classifier(
            file.path(),
            1.0,
            VadParams {
                aggressiveness: 1,
                frame_ms: 30,
                sample_rate: 16_000,
                min_speech_sec: 0.05,
                min_silence_sec: 0.05,
            },
            &mut fake,
        )
        .unwrap();

        assert!(!result.speech_segments_raw.is_empty());
    }
}
