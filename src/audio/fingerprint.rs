//! Audio fingerprint: `<sha256[:16]>:<sr>x<channels>:<frames>`, computed over the first `N`
//! seconds of PCM16 payload plus header metadata. Embedded in the per-job report when available.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::audio::wav;

/// Seconds of payload hashed into the fingerprint.
pub const FINGERPRINT_WINDOW_SEC: f64 = 10.0;

/// Compute the fingerprint for `path`, or `None` on any read/format failure.
pub fn compute(path: &Path) -> Option<String> {
    let spec = wav::open_spec(path).ok()?;
    let total_frames = {
        let reader = hound::WavReader::open(path).ok()?;
        reader.duration()
    };
    let window_frames = (FINGERPRINT_WINDOW_SEC * spec.sample_rate as f64).round() as u32;
    let end_frame = window_frames.min(total_frames);

    let samples = wav::read_mono_f32_range(path, 0, end_frame).ok()?;

    let mut hasher = Sha256::new();
    hasher.update(spec.sample_rate.to_le_bytes());
    hasher.update(spec.channels.to_le_bytes());
    hasher.update(total_frames.to_le_bytes());
    for s in &samples {
        hasher.update(s.to_le_bytes());
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    let short = &hex[..16.min(hex.len())];

    Some(format!(
        "{short}:{}x{}:{total_frames}",
        spec.sample_rate, spec.channels
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use tempfile::NamedTempFile;

    #[test]
    fn fingerprint_is_stable_across_calls() {
        let file = NamedTempFile::new().unwrap();
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(file.path(), spec).unwrap();
        for i in 0..8_000 {
            writer.write_sample((i % 50) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let a = compute(file.path()).unwrap();
        let b = compute(file.path()).unwrap();
        assert_eq!(a, b);
        assert!(a.ends_with(":8000x1:8000"));
    }
}
