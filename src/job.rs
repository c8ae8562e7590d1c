//! Input resolution: turn a CLI `--in` path (or a job-list file) into a list of [`Job`]s.
//!
//! Four input shapes, matching `Job::input_type`:
//! - `file`: a single audio file.
//! - `workdir`: a directory holding `audio.wav` (and optionally `meta.json`).
//! - `root`: a directory tree scanned (by glob pattern) for audio files or workdirs.
//! - `manifest`: a newline-delimited JSON job-list file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::error::{ErrorKind, mark};
use crate::model::{InputType, Job};
use crate::time::sanitize_path_component;

const DEFAULT_WORKDIR_AUDIO_NAME: &str = "audio.wav";
const DEFAULT_WORKDIR_META_NAME: &str = "meta.json";

/// Stable job id: `job_<first 10 hex chars of sha1(absolute audio path)>`.
pub fn stable_job_id(audio_path: &Path) -> String {
    let canonical = audio_path
        .canonicalize()
        .unwrap_or_else(|_| audio_path.to_path_buf());
    let digest = Sha1::digest(canonical.to_string_lossy().as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("job_{}", &hex[..10.min(hex.len())])
}

fn make_job(
    audio_path: PathBuf,
    metadata_path: Option<PathBuf>,
    out_dir: PathBuf,
    rel_key: &str,
    input_type: InputType,
) -> Job {
    Job {
        job_id: stable_job_id(&audio_path),
        audio_path,
        metadata_path,
        out_dir,
        rel_key: sanitize_path_component(rel_key),
        input_type,
        warnings: Vec::new(),
    }
}

/// Resolve a single audio file into one job.
pub fn resolve_file(audio_path: &Path, out_dir: &Path) -> Result<Job> {
    if !audio_path.is_file() {
        return Err(mark(
            ErrorKind::InputNotFound,
            anyhow::anyhow!("audio file not found: {}", audio_path.display()),
        ));
    }
    let rel_key = audio_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "job".to_string());
    Ok(make_job(
        audio_path.to_path_buf(),
        None,
        out_dir.to_path_buf(),
        &rel_key,
        InputType::File,
    ))
}

/// Resolve a workdir (a directory holding `audio.wav` and optionally `meta.json`) into one job.
pub fn resolve_workdir(workdir: &Path, out_dir: &Path) -> Result<Job> {
    let audio_path = workdir.join(DEFAULT_WORKDIR_AUDIO_NAME);
    if !audio_path.is_file() {
        return Err(mark(
            ErrorKind::InputNotFound,
            anyhow::anyhow!("no {DEFAULT_WORKDIR_AUDIO_NAME} in workdir {}", workdir.display()),
        ));
    }
    let meta_path = workdir.join(DEFAULT_WORKDIR_META_NAME);
    let metadata_path = meta_path.is_file().then_some(meta_path);

    let mut warnings = Vec::new();
    if metadata_path.is_none() {
        warnings.push(format!("{DEFAULT_WORKDIR_META_NAME} not found"));
    }

    let rel_key = workdir
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "job".to_string());

    let mut job = make_job(audio_path, metadata_path, out_dir.to_path_buf(), &rel_key, InputType::Workdir);
    job.warnings = warnings;
    Ok(job)
}

/// Translate a simple shell glob (`*` any run of characters, `?` any one character, everything
/// else literal) into an anchored regex and test it against `name`.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    regex::Regex::new(&re).map(|r| r.is_match(name)).unwrap_or(false)
}

/// Recursively scan `root` for workdirs (subdirectories containing `audio.wav`), optionally
/// filtered by `pattern` (a simple glob matched against each workdir's directory name; `None`
/// matches everything).
pub fn resolve_root(root: &Path, out_mode_mirrors_structure: bool, out_dir: &Path) -> Result<Vec<Job>> {
    resolve_root_filtered(root, out_mode_mirrors_structure, out_dir, None)
}

/// Same as [`resolve_root`], additionally filtering workdirs by `pattern`.
pub fn resolve_root_filtered(
    root: &Path,
    out_mode_mirrors_structure: bool,
    out_dir: &Path,
    pattern: Option<&str>,
) -> Result<Vec<Job>> {
    let mut jobs = Vec::new();
    visit_root(root, root, out_mode_mirrors_structure, out_dir, pattern, &mut jobs)?;
    jobs.sort_by(|a, b| a.audio_path.cmp(&b.audio_path));
    Ok(jobs)
}

fn visit_root(
    root: &Path,
    dir: &Path,
    mirror: bool,
    out_dir: &Path,
    pattern: Option<&str>,
    jobs: &mut Vec<Job>,
) -> Result<()> {
    let candidate = dir.join(DEFAULT_WORKDIR_AUDIO_NAME);
    if candidate.is_file() {
        let name = dir.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        if let Some(pattern) = pattern {
            if !glob_match(pattern, &name) {
                return Ok(());
            }
        }
        let rel = dir.strip_prefix(root).unwrap_or(dir).to_string_lossy().into_owned();
        let job_out_dir = if mirror { out_dir.join(&rel) } else { out_dir.to_path_buf() };
        if let Ok(job) = resolve_workdir(dir, &job_out_dir) {
            jobs.push(job);
        }
        return Ok(());
    }

    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            visit_root(root, &path, mirror, out_dir, pattern, jobs)?;
        }
    }
    Ok(())
}

/// Resolve `audio_path` from a job-list record by field-priority chain:
/// `output.audio_wav`, `output.audio_path`, `audio_wav`, `audio_path`, else
/// `<workdir>/audio.wav` when the record names a `workdir`.
fn job_list_audio_path(record: &Value) -> Option<PathBuf> {
    for path in [&["output", "audio_wav"][..], &["output", "audio_path"]] {
        if let Some(v) = dig(record, path).and_then(Value::as_str) {
            return Some(PathBuf::from(v));
        }
    }
    for key in ["audio_wav", "audio_path"] {
        if let Some(v) = record.get(key).and_then(Value::as_str) {
            return Some(PathBuf::from(v));
        }
    }
    record
        .get("workdir")
        .and_then(Value::as_str)
        .map(|w| Path::new(w).join(DEFAULT_WORKDIR_AUDIO_NAME))
}

fn dig<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cursor = value;
    for key in path {
        cursor = cursor.get(key)?;
    }
    Some(cursor)
}

/// True when a job-list record should be skipped: a `status` not in
/// `{success, ok, done}`, an `ok` field that is `false`, or a non-empty `error` field.
fn should_skip_record(record: &Value) -> bool {
    if let Some(status) = record.get("status").and_then(Value::as_str) {
        if !matches!(status, "success" | "ok" | "done") {
            return true;
        }
    }
    if record.get("ok").and_then(Value::as_bool) == Some(false) {
        return true;
    }
    if let Some(err) = record.get("error").and_then(Value::as_str) {
        if !err.is_empty() {
            return true;
        }
    }
    false
}

/// Resolve a newline-delimited-JSON job-list file into jobs, skipping ignored records.
pub fn resolve_manifest(manifest_path: &Path, out_dir: &Path) -> Result<Vec<Job>> {
    let text = std::fs::read_to_string(manifest_path)
        .with_context(|| format!("failed to read job-list file {}", manifest_path.display()))?;

    let mut jobs = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: Value = serde_json::from_str(line)
            .with_context(|| format!("invalid JSON on job-list line {}", line_no + 1))?;
        if should_skip_record(&record) {
            continue;
        }
        let Some(audio_path) = job_list_audio_path(&record) else {
            continue;
        };
        if !audio_path.is_file() {
            continue;
        }

        let metadata_path = record
            .get("metadata_path")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .filter(|p| p.is_file());

        let rel_key = audio_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("job{line_no}"));

        jobs.push(make_job(
            audio_path,
            metadata_path,
            out_dir.to_path_buf(),
            &rel_key,
            InputType::Manifest,
        ));
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn stable_job_id_is_deterministic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        let id1 = stable_job_id(&path);
        let id2 = stable_job_id(&path);
        assert_eq!(id1, id2);
        assert!(id1.starts_with("job_"));
        assert_eq!(id1.len(), "job_".len() + 10);
    }

    #[test]
    fn resolve_file_requires_existing_path() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.wav");
        let err = resolve_file(&missing, dir.path()).unwrap_err();
        let converted: crate::error::Error = err.into();
        assert!(matches!(converted, crate::error::Error::InputNotFound(_)));
    }

    #[test]
    fn resolve_workdir_warns_on_missing_metadata() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("audio.wav"), b"RIFF").unwrap();
        let job = resolve_workdir(dir.path(), dir.path()).unwrap();
        assert_eq!(job.warnings.len(), 1);
        assert!(job.metadata_path.is_none());
    }

    #[test]
    fn job_list_field_priority_prefers_output_audio_wav() {
        let record = serde_json::json!({
            "output": {"audio_wav": "/a.wav", "audio_path": "/b.wav"},
            "audio_wav": "/c.wav",
        });
        assert_eq!(job_list_audio_path(&record), Some(PathBuf::from("/a.wav")));
    }

    #[test]
    fn glob_match_supports_star_and_question_mark() {
        assert!(glob_match("job_*", "job_001"));
        assert!(!glob_match("job_*", "call_001"));
        assert!(glob_match("job_00?", "job_001"));
        assert!(!glob_match("job_00?", "job_0012"));
        assert!(glob_match("*", "anything"));
    }

    #[test]
    fn resolve_root_filtered_skips_non_matching_workdirs() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("alpha")).unwrap();
        std::fs::create_dir_all(dir.path().join("beta")).unwrap();
        std::fs::write(dir.path().join("alpha/audio.wav"), b"RIFF").unwrap();
        std::fs::write(dir.path().join("beta/audio.wav"), b"RIFF").unwrap();

        let jobs = resolve_root_filtered(dir.path(), false, dir.path(), Some("alpha")).unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].audio_path.starts_with(dir.path().join("alpha")));
    }

    #[test]
    fn job_list_skip_rules() {
        assert!(should_skip_record(&serde_json::json!({"status": "failed"})));
        assert!(should_skip_record(&serde_json::json!({"ok": false})));
        assert!(should_skip_record(&serde_json::json!({"error": "boom"})));
        assert!(!should_skip_record(&serde_json::json!({"status": "success"})));
    }
}
