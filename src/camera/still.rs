//! One-shot high-resolution still capture.
//!
//! Runs a dedicated capture command that writes a single JPEG to stdout,
//! bounded by a timeout. Callers treat every failure as "fall back to the
//! live-view cache".

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::errors::{CaptureError, SourceError};
use super::types::{Frame, Resolution};

/// Default bound on the one-shot capture.
pub const DEFAULT_STILL_TIMEOUT: Duration = Duration::from_secs(10);

/// A one-shot still capture command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StillCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl StillCommand {
    /// `rpicam-still` writing a JPEG to stdout after `warmup_ms` of metering.
    pub fn rpicam_still(resolution: Resolution, warmup_ms: u64, timeout: Duration) -> Self {
        Self {
            program: "rpicam-still".to_string(),
            args: vec![
                "--output".to_string(),
                "-".to_string(),
                "--timeout".to_string(),
                warmup_ms.to_string(),
                "--width".to_string(),
                resolution.width.to_string(),
                "--height".to_string(),
                resolution.height.to_string(),
                "--encoding".to_string(),
                "jpg".to_string(),
                "--nopreview".to_string(),
            ],
            timeout,
        }
    }

    /// Run the command and return the image it produced.
    pub fn capture(&self) -> Result<Frame, CaptureError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                CaptureError::CommandFailed(SourceError::from_spawn(&self.program, e).to_string())
            })?;
        let mut child = ReapOnDrop::new(child);

        let stdout_thread = child.inner.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut data = Vec::new();
                let _ = stdout.read_to_end(&mut data);
                data
            })
        });
        let stderr_thread = child.inner.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text);
                text
            })
        });

        let start = Instant::now();
        let status = loop {
            match child.inner.try_wait()? {
                Some(status) => {
                    child.reaped = true;
                    break status;
                }
                None => {
                    if start.elapsed() > self.timeout {
                        return Err(CaptureError::Timeout(self.timeout));
                    }
                    thread::sleep(Duration::from_millis(50));
                }
            }
        };

        let data = stdout_thread
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let stderr = stderr_thread
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let detail = stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(CaptureError::CommandFailed(format!(
                "'{}' exited with {}: {}",
                self.program, status, detail
            )));
        }
        if data.is_empty() {
            return Err(CaptureError::CommandFailed(format!(
                "'{}' produced no image data",
                self.program
            )));
        }

        Ok(Frame::new(data))
    }
}

/// Kills and reaps the child on every early return from `capture()`.
struct ReapOnDrop {
    inner: Child,
    reaped: bool,
}

impl ReapOnDrop {
    fn new(inner: Child) -> Self {
        Self {
            inner,
            reaped: false,
        }
    }
}

impl Drop for ReapOnDrop {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.inner.kill();
            let _ = self.inner.wait();
        }
    }
}
