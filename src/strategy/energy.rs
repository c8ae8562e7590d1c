//! Energy strategy: sliding-window RMS, smoothing, thresholding, and morphological cleanup.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use crate::audio::wav;
use crate::model::{AnalysisResult, StrategyName};
use crate::strategy::morph::cleanup_mask;
use crate::time::round3;

/// Parameters for the energy strategy.
#[derive(Debug, Clone, Copy)]
pub struct EnergyParams {
    pub frame_ms: u32,
    pub hop_ms: u32,
    pub smooth_ms: u32,
    pub threshold_rms: f64,
    pub min_speech_sec: f64,
    pub min_silence_sec: f64,
}

impl Default for EnergyParams {
    fn default() -> Self {
        EnergyParams {
            frame_ms: 30,
            hop_ms: 10,
            smooth_ms: 100,
            threshold_rms: 0.02,
            min_speech_sec: 0.20,
            min_silence_sec: 0.35,
        }
    }
}

/// Per-frame RMS values and their hop-aligned start times, shared between `analyze` and tests.
///
/// Reads the whole mono signal once and windows over it in memory, rather than re-opening and
/// re-scanning the file per frame — a multi-minute file at a 10ms hop is tens of thousands of
/// frames, and a per-frame seek-from-zero read would make this quadratic in frame count.
pub fn frame_rms_series(path: &Path, frame_ms: u32, hop_ms: u32) -> Result<(Vec<f64>, f64, f64)> {
    wav::open_spec(path)?;
    let (mono, sr) = wav::read_mono_i16(path).context("failed to read wav samples")?;
    let sr = sr as f64;
    let frame_sec = frame_ms as f64 / 1000.0;
    let hop_sec = hop_ms as f64 / 1000.0;
    let frame_len = (sr * frame_sec).round() as usize;
    let hop_len = (sr * hop_sec).round().max(1.0) as usize;
    let total_frames = mono.len();

    let mut rms_series = Vec::new();
    let mut start = 0usize;
    while start < total_frames {
        let end = (start + frame_len).min(total_frames);
        let samples = &mono[start..end];
        let rms = if samples.is_empty() {
            0.0
        } else {
            let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
            (sum_sq / samples.len() as f64).sqrt() / 32768.0
        };
        rms_series.push(rms);
        if end >= total_frames {
            break;
        }
        start += hop_len;
    }

    Ok((rms_series, frame_sec, hop_sec))
}

/// Centered rectangular smoothing over a series, width `max(1, smooth_ms / hop_ms)` frames.
pub fn smooth(series: &[f64], smooth_ms: u32, hop_ms: u32) -> Vec<f64> {
    let width = if hop_ms == 0 {
        1
    } else {
        (smooth_ms / hop_ms).max(1) as usize
    };
    if width <= 1 || series.is_empty() {
        return series.to_vec();
    }
    let half = width / 2;
    let n = series.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(n - 1);
            let slice = &series[lo..=hi];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Run the energy strategy end to end.
pub fn analyze(audio_path: &Path, duration_sec: f64, params: EnergyParams) -> Result<AnalysisResult> {
    let (rms_series, frame_sec, hop_sec) =
        frame_rms_series(audio_path, params.frame_ms, params.hop_ms)?;
    let smoothed = smooth(&rms_series, params.smooth_ms, params.hop_ms);
    let mask: Vec<bool> = smoothed.iter().map(|&v| v >= params.threshold_rms).collect();

    let min_speech_frames = ((params.min_speech_sec / hop_sec).ceil() as usize).max(1);
    let min_silence_frames = ((params.min_silence_sec / hop_sec).ceil() as usize).max(1);

    let runs = cleanup_mask(&mask, min_speech_frames, min_silence_frames);

    // A frame's time span for run-length purposes is [frame_times[i], frame_times[i] + frame_sec).
    let speech: Vec<(f64, f64)> = runs
        .into_iter()
        .map(|(start_idx, end_idx)| {
            let start = start_idx as f64 * hop_sec;
            let end = (end_idx as f64 * hop_sec + frame_sec).min(duration_sec);
            (round3(start), round3(end))
        })
        .filter(|&(s, e)| e > s)
        .collect();

    let speech_frames = mask.iter().filter(|&&v| v).count();

    let stats = json!({
        "frames": mask.len(),
        "speech_frames": speech_frames,
        "threshold_rms": params.threshold_rms,
    });

    let mut artifacts = BTreeMap::new();
    artifacts.insert("energy_json".to_string(), std::path::PathBuf::from("energy.json"));

    Ok(AnalysisResult {
        strategy: StrategyName::Energy,
        duration_sec,
        speech_segments_raw: speech,
        nonspeech_segments_raw: None,
        artifacts,
        stats,
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use tempfile::NamedTempFile;

    fn write_tone_wav(sample_rate: u32, loud_ranges: &[(usize, usize)], total_samples: usize) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(file.path(), spec).unwrap();
        for i in 0..total_samples {
            let loud = loud_ranges.iter().any(|&(s, e)| i >= s && i < e);
            let v = if loud {
                if i % 2 == 0 { 20000 } else { -20000 }
            } else {
                0
            };
            writer.write_sample(v as i16).unwrap();
        }
        writer.finalize().unwrap();
        file
    }

    #[test]
    fn smooth_is_identity_for_width_one() {
        let series = vec![1.0, 2.0, 3.0];
        assert_eq!(smooth(&series, 10, 10), series);
    }

    #[test]
    fn smooth_averages_centered_window() {
        let series = vec![0.0, 10.0, 0.0];
        let out = smooth(&series, 30, 10);
        assert!((out[1] - 10.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn detects_loud_region_as_speech() {
        let sr = 16_000;
        let file = write_tone_wav(sr, &[(sr as usize / 2, sr as usize)], sr as usize);
        let result = analyze(
            file.path(),
            1.0,
            EnergyParams {
                frame_ms: 30,
                hop_ms: 10,
                smooth_ms: 30,
                threshold_rms: 0.1,
                min_speech_sec: 0.05,
                min_silence_sec: 0.05,
            },
        )
        .unwrap();
        assert!(!result.speech_segments_raw.is_empty());
        let (s, _e) = result.speech_segments_raw[0];
        assert!(s > 0.3 && s < 0.7);
    }
}
