//! Fixed-size PCM16 mono frame streaming, the shared input for the energy and VAD strategies.
//!
//! Two backends: reading directly from a WAV file whose sample rate already matches
//! `target_sr` (no subprocess — exercised by the test suite), and invoking an external
//! resampler (ffmpeg-shaped: decode to signed 16-bit little-endian mono PCM on stdout at the
//! requested rate) when it does not. Incomplete trailing frames are discarded, a determinism
//! requirement.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::audio::wav;
use crate::process::run_with_timeout;

const RESAMPLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Bytes per frame at `target_sr` Hz, `frame_ms` milliseconds wide, 16-bit mono.
pub fn frame_byte_len(target_sr: u32, frame_ms: u32) -> usize {
    (target_sr as u64 * frame_ms as u64 / 1000 * 2) as usize
}

/// Yield fixed-size PCM16 little-endian mono frames of `target_sr * frame_ms / 1000` samples.
///
/// Reads directly from `path` when its native sample rate already equals `target_sr`; otherwise
/// shells out to an external resampler. Trailing bytes that don't fill a whole frame are
/// discarded.
pub fn pcm16_mono_frames(path: &Path, target_sr: u32, frame_ms: u32) -> Result<Vec<Vec<u8>>> {
    let frame_bytes = frame_byte_len(target_sr, frame_ms);
    if frame_bytes == 0 {
        bail!("frame_ms/target_sr combination yields a zero-length frame");
    }

    let raw = if let Ok((mono, native_sr)) = wav::read_mono_i16(path) {
        if native_sr == target_sr {
            let mut bytes = Vec::with_capacity(mono.len() * 2);
            for s in mono {
                bytes.extend_from_slice(&s.to_le_bytes());
            }
            bytes
        } else {
            resample_via_external_tool(path, target_sr)?
        }
    } else {
        resample_via_external_tool(path, target_sr)?
    };

    let n_frames = raw.len() / frame_bytes;
    let mut frames = Vec::with_capacity(n_frames);
    for i in 0..n_frames {
        frames.push(raw[i * frame_bytes..(i + 1) * frame_bytes].to_vec());
    }
    Ok(frames)
}

/// Invoke an external resampler, shaped like ffmpeg, to produce signed 16-bit little-endian mono
/// PCM at `target_sr` on stdout.
fn resample_via_external_tool(path: &Path, target_sr: u32) -> Result<Vec<u8>> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-loglevel", "error", "-i"])
        .arg(path)
        .args([
            "-f",
            "s16le",
            "-acodec",
            "pcm_s16le",
            "-ac",
            "1",
            "-ar",
            &target_sr.to_string(),
            "-",
        ])
        .stdout(Stdio::piped());

    let output = run_with_timeout(cmd, RESAMPLER_TIMEOUT)?;
    if !output.success {
        bail!("resampler failed: {}", output.stderr.trim());
    }
    Ok(output.stdout_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use tempfile::NamedTempFile;

    #[test]
    fn frame_byte_len_computes_bytes_per_frame() {
        assert_eq!(frame_byte_len(16_000, 30), 960);
        assert_eq!(frame_byte_len(8_000, 10), 160);
    }

    #[test]
    fn native_rate_wav_is_framed_without_subprocess() {
        let file = NamedTempFile::new().unwrap();
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(file.path(), spec).unwrap();
        for i in 0..1600 {
            writer.write_sample((i % 100) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let frames = pcm16_mono_frames(file.path(), 16_000, 10).unwrap();
        // 1600 samples / 160 samples-per-10ms-frame = 10 frames exactly.
        assert_eq!(frames.len(), 10);
        assert_eq!(frames[0].len(), 320);
    }

    #[test]
    fn discards_incomplete_trailing_frame() {
        let file = NamedTempFile::new().unwrap();
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(file.path(), spec).unwrap();
        for i in 0..1605 {
            writer.write_sample((i % 100) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let frames = pcm16_mono_frames(file.path(), 16_000, 10).unwrap();
        assert_eq!(frames.len(), 10);
    }
}
