//! RMS (root-mean-square) amplitude computation over a WAV time range.

use std::path::Path;

use crate::audio::wav;

/// Open the WAV container, seek to `start` seconds, read `end - start` worth of frames,
/// averaging channels, and return `sqrt(mean(x^2)) / 32768`. Returns `None` on format mismatch
/// or I/O error, signaling "unknown" rather than a fabricated value.
pub fn compute_rms(path: &Path, start_sec: f64, end_sec: f64) -> Option<f64> {
    let spec = wav::open_spec(path).ok()?;
    let sr = spec.sample_rate as f64;
    if sr <= 0.0 || end_sec <= start_sec {
        return None;
    }
    let start_frame = (start_sec * sr).round().max(0.0) as u32;
    let end_frame = (end_sec * sr).round().max(start_frame as f64) as u32;
    let samples = wav::read_mono_f32_range(path, start_frame, end_frame).ok()?;
    if samples.is_empty() {
        return None;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let mean_sq = sum_sq / samples.len() as f64;
    Some(mean_sq.sqrt() / 32768.0)
}

/// Convert a linear RMS value to decibels, floored at `eps` to avoid `log(0)`.
pub fn rms_to_db(rms: f64, eps: f64) -> f64 {
    20.0 * rms.max(eps).log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use tempfile::NamedTempFile;

    #[test]
    fn rms_of_silence_is_zero() {
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

        let rms = compute_rms(file.path(), 0.0, 1.0).unwrap();
        assert!(rms < 1e-9);
    }

    #[test]
    fn rms_of_full_scale_square_wave_is_near_one() {
        let file = NamedTempFile::new().unwrap();
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(file.path(), spec).unwrap();
        for i in 0..16_000 {
            let v = if i % 2 == 0 { i16::MAX } else { i16::MIN };
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let rms = compute_rms(file.path(), 0.0, 1.0).unwrap();
        assert!(rms > 0.99);
    }

    #[test]
    fn rms_to_db_floors_at_eps() {
        let db = rms_to_db(0.0, 1e-12);
        assert!((db - (20.0 * 1e-12_f64.log10())).abs() < 1e-9);
    }
}
