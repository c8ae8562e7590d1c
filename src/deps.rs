//! Dependency probe: the `check-deps` subcommand's library-level implementation.
//!
//! Looks for `ffmpeg`/`ffprobe` on `PATH` by hand (no `which`-style crate in the dependency
//! stack), runs each with `-version` to extract a version string, and for `ffmpeg` additionally
//! checks that the `silencedetect` filter is compiled in, since the silence strategy depends on
//! it specifically.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::process::run_with_timeout;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Probe result for one external tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStatus {
    pub name: String,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub notes: Vec<String>,
    /// `ffmpeg` only: whether the `silencedetect` filter was found in `-filters` output.
    /// `None` for tools where the check does not apply, or where the probe itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silencedetect: Option<bool>,
}

/// Full dependency report: one [`ToolStatus`] per tool plus an overall pass/fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyReport {
    pub ok: bool,
    pub tools: Vec<ToolStatus>,
}

/// Search `PATH` by hand for an executable file named `name`, returning its first match.
fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            let with_exe = dir.join(format!("{name}.exe"));
            if with_exe.is_file() {
                return Some(with_exe);
            }
        }
    }
    None
}

fn extract_version(text: &str) -> Option<String> {
    let re = Regex::new(r"version\s+(\S+)").ok()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches(',').to_string())
}

fn probe_ffprobe() -> ToolStatus {
    let mut notes = Vec::new();
    let Some(path) = find_on_path("ffprobe") else {
        notes.push("install ffmpeg (which bundles ffprobe) and ensure it is on PATH".to_string());
        return ToolStatus {
            name: "ffprobe".to_string(),
            found: false,
            path: None,
            version: None,
            notes,
            silencedetect: None,
        };
    };

    let mut cmd = Command::new(&path);
    cmd.arg("-version");
    let version = match run_with_timeout(cmd, PROBE_TIMEOUT) {
        Ok(out) => extract_version(&out.stdout),
        Err(e) => {
            notes.push(format!("found but failed to run: {e}"));
            None
        }
    };

    ToolStatus {
        name: "ffprobe".to_string(),
        found: true,
        path: Some(path.display().to_string()),
        version,
        notes,
        silencedetect: None,
    }
}

fn probe_ffmpeg() -> ToolStatus {
    let mut notes = Vec::new();
    let Some(path) = find_on_path("ffmpeg") else {
        notes.push("install ffmpeg and ensure it is on PATH".to_string());
        return ToolStatus {
            name: "ffmpeg".to_string(),
            found: false,
            path: None,
            version: None,
            notes,
            silencedetect: None,
        };
    };

    let mut version_cmd = Command::new(&path);
    version_cmd.arg("-version");
    let version = match run_with_timeout(version_cmd, PROBE_TIMEOUT) {
        Ok(out) => extract_version(&out.stdout),
        Err(e) => {
            notes.push(format!("found but failed to run: {e}"));
            None
        }
    };

    let mut filters_cmd = Command::new(&path);
    filters_cmd.args(["-hide_banner", "-filters"]);
    let silencedetect = match run_with_timeout(filters_cmd, PROBE_TIMEOUT) {
        Ok(out) if out.stdout.contains("silencedetect") => Some(true),
        Ok(_) => {
            notes.push(
                "this ffmpeg build does not list the silencedetect filter; the silence strategy will fail"
                    .to_string(),
            );
            Some(false)
        }
        Err(e) => {
            notes.push(format!("could not list filters: {e}"));
            None
        }
    };

    ToolStatus {
        name: "ffmpeg".to_string(),
        found: true,
        path: Some(path.display().to_string()),
        version,
        notes,
        silencedetect,
    }
}

/// Run the full dependency probe with default (non-strict) semantics: `ffmpeg`/`ffprobe`
/// missing is reported, never a hard error.
pub fn check_dependencies() -> DependencyReport {
    check_dependencies_with(false)
}

/// Run the full dependency probe. Under `strict`, an `ffmpeg` build that is found but is
/// missing the `silencedetect` filter counts as a failed dependency rather than a note.
pub fn check_dependencies_with(strict: bool) -> DependencyReport {
    let tools = vec![probe_ffmpeg(), probe_ffprobe()];
    let ok = tools.iter().all(|t| t.found) && (!strict || tools.iter().all(|t| t.silencedetect != Some(false)));
    DependencyReport { ok, tools }
}

/// Render a [`DependencyReport`] as the human-readable text the CLI prints by default. Under
/// `verbose`, a found tool with no notes gets an explicit "looks good" line instead of being
/// silent about it.
pub fn render_text(report: &DependencyReport, verbose: bool) -> String {
    let mut out = String::new();
    for tool in &report.tools {
        if tool.found {
            out.push_str(&format!(
                "[ok] {} ({})\n",
                tool.name,
                tool.version.as_deref().unwrap_or("unknown version")
            ));
        } else {
            out.push_str(&format!("[missing] {}\n", tool.name));
        }
        for note in &tool.notes {
            out.push_str(&format!("    {note}\n"));
        }
        if verbose && tool.found && tool.notes.is_empty() {
            out.push_str("    no issues detected\n");
        }
    }
    out.push_str(if report.ok { "all dependencies satisfied\n" } else { "one or more dependencies missing\n" });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_version_parses_ffmpeg_banner() {
        let banner = "ffmpeg version 6.1.1-static Copyright (c) 2000-2023 the FFmpeg developers";
        assert_eq!(extract_version(banner), Some("6.1.1-static".to_string()));
    }

    #[test]
    fn extract_version_returns_none_without_match() {
        assert_eq!(extract_version("no version info here"), None);
    }

    #[test]
    fn render_text_lists_missing_tools_with_hints() {
        let report = DependencyReport {
            ok: false,
            tools: vec![ToolStatus {
                name: "ffmpeg".to_string(),
                found: false,
                path: None,
                version: None,
                notes: vec!["install ffmpeg and ensure it is on PATH".to_string()],
                silencedetect: None,
            }],
        };
        let text = render_text(&report, false);
        assert!(text.contains("[missing] ffmpeg"));
        assert!(text.contains("install ffmpeg"));
        assert!(text.contains("one or more dependencies missing"));
    }

    #[test]
    fn strict_mode_fails_when_silencedetect_is_missing() {
        let tools = vec![
            ToolStatus {
                name: "ffmpeg".to_string(),
                found: true,
                path: Some("/usr/bin/ffmpeg".to_string()),
                version: Some("6.0".to_string()),
                notes: vec!["this ffmpeg build does not list the silencedetect filter".to_string()],
                silencedetect: Some(false),
            },
            ToolStatus {
                name: "ffprobe".to_string(),
                found: true,
                path: Some("/usr/bin/ffprobe".to_string()),
                version: Some("6.0".to_string()),
                notes: vec![],
                silencedetect: None,
            },
        ];
        let lenient = DependencyReport { ok: true, tools: tools.clone() };
        assert!(lenient.ok);
        let ok = tools.iter().all(|t| t.found) && tools.iter().all(|t| t.silencedetect != Some(false));
        assert!(!ok);
    }

    #[test]
    fn find_on_path_locates_a_common_binary() {
        // `sh` is present on essentially every POSIX CI runner; skip gracefully elsewhere.
        if std::env::var_os("PATH").is_none() {
            return;
        }
        let _ = find_on_path("sh");
    }
}
