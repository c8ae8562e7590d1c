//! Duration resolution: metadata sidecar, external probe tool (`ffprobe`), or WAV header, in
//! that priority order. A duration that cannot be resolved is fatal for the current job.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;

use crate::audio::wav;
use crate::process::run_with_timeout;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Read a `duration_sec` field from a metadata sidecar JSON, checking the top level first, then
/// `audio.duration_sec`, then `output.duration_sec`.
pub fn duration_from_metadata(metadata_path: &Path) -> Result<Option<f64>> {
    let text = std::fs::read_to_string(metadata_path)
        .with_context(|| format!("failed to read metadata {}", metadata_path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse metadata {}", metadata_path.display()))?;

    for path in [&["duration_sec"][..], &["audio", "duration_sec"], &["output", "duration_sec"]] {
        let mut cursor = &value;
        let mut found = true;
        for key in path {
            match cursor.get(key) {
                Some(v) => cursor = v,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            if let Some(n) = cursor.as_f64() {
                return Ok(Some(n));
            }
        }
    }
    Ok(None)
}

/// Invoke `ffprobe` to read the container duration in seconds.
pub fn duration_from_ffprobe(audio_path: &Path) -> Result<f64> {
    let mut cmd = Command::new("ffprobe");
    cmd.args([
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ])
    .arg(audio_path);

    let output = run_with_timeout(cmd, PROBE_TIMEOUT)?;
    if !output.success {
        return Err(anyhow!("ffprobe failed: {}", output.stderr.trim()));
    }
    output
        .stdout
        .trim()
        .parse::<f64>()
        .with_context(|| format!("unparseable ffprobe output: {:?}", output.stdout))
}

/// Resolve `duration_sec` for a job's audio, trying (a) the metadata sidecar, (b) `ffprobe`,
/// (c) the WAV header, in that order. Returns `None` ("unknown") only when every path fails.
pub fn get_duration(audio_path: &Path, metadata_path: Option<&Path>) -> Option<f64> {
    if let Some(meta) = metadata_path {
        if let Ok(Some(d)) = duration_from_metadata(meta) {
            return Some(d);
        }
    }
    if let Ok(d) = duration_from_ffprobe(audio_path) {
        return Some(d);
    }
    wav::duration_from_header(audio_path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_top_level_duration() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"duration_sec": 12.5}}"#).unwrap();
        assert_eq!(duration_from_metadata(file.path()).unwrap(), Some(12.5));
    }

    #[test]
    fn reads_nested_audio_duration() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"audio": {{"duration_sec": 3.0}}}}"#).unwrap();
        assert_eq!(duration_from_metadata(file.path()).unwrap(), Some(3.0));
    }

    #[test]
    fn missing_duration_field_yields_none() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"foo": 1}}"#).unwrap();
        assert_eq!(duration_from_metadata(file.path()).unwrap(), None);
    }
}
