//! Timeout + hard-kill wrapper around `std::process::Command`.
//!
//! `std::process::Child` has no built-in wait-with-timeout, so this spawns stdout/stderr reader
//! threads up front, then polls the child with `try_wait` on the calling thread in small
//! increments. If the deadline passes before the child exits, it is killed (`Child::kill`), not
//! merely signaled.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

use crate::error::{ErrorKind, mark};

/// Captured stdout/stderr and exit status of a completed process.
///
/// `stdout_bytes` is the raw capture; `stdout` is a lossy UTF-8 decode of it for callers that
/// only ever deal in text (log parsers, version strings). Binary consumers — the PCM16 resampler
/// pipe in particular — must use `stdout_bytes`, since lossy decoding replaces invalid UTF-8
/// sequences with U+FFFD and irreversibly corrupts a raw sample stream.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stdout_bytes: Vec<u8>,
    pub stderr: String,
    pub success: bool,
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Run `cmd` to completion, killing it if it does not finish within `timeout`.
///
/// Returns an error tagged [`ErrorKind::DependencyMissing`] when the binary itself cannot be
/// spawned (not found / not executable), and a plain error on timeout or I/O failure.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<ProcessOutput> {
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    let program = cmd.get_program().to_string_lossy().into_owned();

    let mut child = cmd.spawn().map_err(|e| {
        mark(
            ErrorKind::DependencyMissing,
            anyhow!("failed to spawn `{program}`: {e}"),
        )
    })?;

    let stdout_buf: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let stderr_buf: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

    let stdout_thread = child.stdout.take().map(|mut s| {
        let buf = Arc::clone(&stdout_buf);
        std::thread::spawn(move || {
            let mut tmp = Vec::new();
            let _ = s.read_to_end(&mut tmp);
            *buf.lock().unwrap() = tmp;
        })
    });
    let stderr_thread = child.stderr.take().map(|mut s| {
        let buf = Arc::clone(&stderr_buf);
        std::thread::spawn(move || {
            let mut tmp = Vec::new();
            let _ = s.read_to_end(&mut tmp);
            *buf.lock().unwrap() = tmp;
        })
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    if let Some(t) = stdout_thread {
                        let _ = t.join();
                    }
                    if let Some(t) = stderr_thread {
                        let _ = t.join();
                    }
                    return Err(anyhow!(
                        "`{program}` timed out after {:.1}s and was killed",
                        timeout.as_secs_f64()
                    ));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    };

    if let Some(t) = stdout_thread {
        let _ = t.join();
    }
    if let Some(t) = stderr_thread {
        let _ = t.join();
    }

    let stdout_bytes = std::mem::take(&mut *stdout_buf.lock().unwrap());
    let stderr_bytes = std::mem::take(&mut *stderr_buf.lock().unwrap());
    Ok(ProcessOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stdout_bytes,
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        success: status.success(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_a_quick_command_successfully() {
        if which_on_path("true").is_none() {
            return;
        }
        let out = run_with_timeout(Command::new("true"), Duration::from_secs(5)).unwrap();
        assert!(out.success);
    }

    #[test]
    fn missing_binary_reports_dependency_missing() {
        let cmd = Command::new("definitely-not-a-real-binary-xyz");
        let err = run_with_timeout(cmd, Duration::from_secs(1)).unwrap_err();
        let converted: crate::error::Error = err.into();
        assert!(matches!(converted, crate::error::Error::DependencyMissing(_)));
    }

    #[test]
    fn kills_a_command_that_overruns_its_timeout() {
        if which_on_path("sleep").is_none() {
            return;
        }
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let start = Instant::now();
        let err = run_with_timeout(cmd, Duration::from_millis(100)).unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    fn which_on_path(bin: &str) -> Option<()> {
        let path = std::env::var_os("PATH")?;
        for dir in std::env::split_paths(&path) {
            if dir.join(bin).is_file() {
                return Some(());
            }
        }
        None
    }
}
