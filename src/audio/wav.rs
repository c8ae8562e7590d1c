//! PCM16 WAV container access: duration, RMS, and native-rate frame reading.
//!
//! 16-bit PCM is required; sample rate and channel count are not constrained, since this engine
//! must cope with whatever source audio a job points at.

use std::path::Path;

use anyhow::{Context, Result, bail};
use hound::{SampleFormat, WavReader, WavSpec};

/// Open `path` and return its `hound::WavSpec`, validating 16-bit PCM.
pub fn open_spec(path: &Path) -> Result<WavSpec> {
    let reader = WavReader::open(path)
        .with_context(|| format!("failed to open wav file {}", path.display()))?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        bail!(
            "expected 16-bit PCM WAV, got {:?} at {} bits",
            spec.sample_format,
            spec.bits_per_sample
        );
    }
    Ok(spec)
}

/// Duration of a WAV file in seconds, derived from its header (sample count / sample rate).
pub fn duration_from_header(path: &Path) -> Result<f64> {
    let reader = WavReader::open(path)
        .with_context(|| format!("failed to open wav file {}", path.display()))?;
    let spec = reader.spec();
    let frames = reader.duration() as f64;
    if spec.sample_rate == 0 {
        bail!("wav file {} reports a zero sample rate", path.display());
    }
    Ok(frames / spec.sample_rate as f64)
}

/// Read channel-averaged PCM16 samples for frames `[start_frame, end_frame)`, on the native
/// i16 scale (callers divide by 32768 themselves where a `[-1, 1]` range is needed). Returns an
/// error on I/O failure or format mismatch.
pub fn read_mono_f32_range(path: &Path, start_frame: u32, end_frame: u32) -> Result<Vec<f32>> {
    let mut reader = WavReader::open(path)
        .with_context(|| format!("failed to open wav file {}", path.display()))?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        bail!("expected 16-bit PCM WAV, got {:?}", spec.sample_format);
    }
    let channels = spec.channels as usize;
    if channels == 0 {
        bail!("wav file {} reports zero channels", path.display());
    }

    reader
        .seek(start_frame)
        .with_context(|| format!("failed to seek to frame {start_frame} in {}", path.display()))?;

    let n_samples = (end_frame.saturating_sub(start_frame)) as usize * channels;

    let mut out = Vec::with_capacity((end_frame.saturating_sub(start_frame)) as usize);
    let mut frame_acc = 0i64;
    let mut frame_fill = 0usize;

    for (i, s) in reader.samples::<i16>().enumerate() {
        if i >= n_samples {
            break;
        }
        let v = s.context("failed to read wav sample")?;
        frame_acc += v as i64;
        frame_fill += 1;
        if frame_fill == channels {
            out.push((frame_acc as f64 / channels as f64) as f32);
            frame_acc = 0;
            frame_fill = 0;
        }
    }

    Ok(out)
}

/// Read raw PCM16 little-endian bytes for the whole file, downmixed to mono at the file's
/// native sample rate. Used by the WAV-native path of `pcm16_mono_frames` when the file's rate
/// already matches the caller's `target_sr`.
pub fn read_mono_i16(path: &Path) -> Result<(Vec<i16>, u32)> {
    let mut reader = WavReader::open(path)
        .with_context(|| format!("failed to open wav file {}", path.display()))?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        bail!("expected 16-bit PCM WAV, got {:?}", spec.sample_format);
    }
    let channels = spec.channels as usize;
    if channels == 0 {
        bail!("wav file {} reports zero channels", path.display());
    }

    let mut mono = Vec::with_capacity(reader.duration() as usize);
    let mut acc = 0i64;
    let mut fill = 0usize;
    for s in reader.samples::<i16>() {
        let v = s.context("failed to read wav sample")? as i64;
        acc += v;
        fill += 1;
        if fill == channels {
            mono.push((acc / channels as i64) as i16);
            acc = 0;
            fill = 0;
        }
    }

    Ok((mono, spec.sample_rate))
}

/// Extract `[start_sec, end_sec)` from `path` into a new WAV file at `dest`, preserving the
/// source's channel layout and sample rate. Used by `--emit-wav` to write
/// `segments/seg_NNNNNN.wav` clips alongside `segments.jsonl`.
pub fn extract_clip(path: &Path, dest: &Path, start_sec: f64, end_sec: f64) -> Result<()> {
    let mut reader = WavReader::open(path)
        .with_context(|| format!("failed to open wav file {}", path.display()))?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        bail!("expected 16-bit PCM WAV, got {:?}", spec.sample_format);
    }
    let channels = spec.channels as usize;
    if channels == 0 {
        bail!("wav file {} reports zero channels", path.display());
    }
    let sr = spec.sample_rate as f64;
    let start_frame = (start_sec * sr).round().max(0.0) as u32;
    let end_frame = (end_sec * sr).round().max(start_frame as f64) as u32;

    reader
        .seek(start_frame)
        .with_context(|| format!("failed to seek to frame {start_frame} in {}", path.display()))?;

    if let Some(dir) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut writer =
        hound::WavWriter::create(dest, spec).with_context(|| format!("failed to create {}", dest.display()))?;

    let total_samples = (end_frame.saturating_sub(start_frame)) as usize * channels;
    for (i, sample) in reader.samples::<i16>().enumerate() {
        if i >= total_samples {
            break;
        }
        let v = sample.context("failed to read wav sample")?;
        writer.write_sample(v)?;
    }
    writer.finalize().context("failed to finalize wav clip")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use tempfile::NamedTempFile;

    fn write_test_wav(sample_rate: u32, channels: u16, samples: &[i16]) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(file.path(), spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        file
    }

    #[test]
    fn duration_from_header_matches_sample_count() {
        let file = write_test_wav(16_000, 1, &[0; 16_000]);
        let dur = duration_from_header(file.path()).unwrap();
        assert!((dur - 1.0).abs() < 1e-6);
    }

    #[test]
    fn read_mono_downmixes_stereo() {
        let file = write_test_wav(8_000, 2, &[100, 200, 300, 400]);
        let mono = read_mono_f32_range(file.path(), 0, 2).unwrap();
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 150.0).abs() < 1e-6);
        assert!((mono[1] - 350.0).abs() < 1e-6);
    }

    #[test]
    fn open_spec_rejects_non_pcm16() {
        let file = NamedTempFile::new().unwrap();
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(file.path(), spec).unwrap();
        writer.write_sample(0.0f32).unwrap();
        writer.finalize().unwrap();
        assert!(open_spec(file.path()).is_err());
    }

    #[test]
    fn extract_clip_writes_the_requested_frame_range() {
        let samples: Vec<i16> = (0..16_000).map(|i| i as i16).collect();
        let file = write_test_wav(16_000, 1, &samples);
        let dest = NamedTempFile::new().unwrap();
        extract_clip(file.path(), dest.path(), 0.5, 1.0).unwrap();

        let dur = duration_from_header(dest.path()).unwrap();
        assert!((dur - 0.5).abs() < 1e-3);
        let clipped = read_mono_f32_range(dest.path(), 0, 8_000).unwrap();
        assert_eq!(clipped.len(), 8_000);
        assert!((clipped[0] - 8_000.0).abs() < 1.0);
    }
}
