//! Process-backed camera source.
//!
//! Spawns the capture program (`rpicam-vid` by default), reads its stdout in
//! fixed-size chunks and demuxes the concatenated JPEG stream into frames.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::demux::FrameDemuxer;
use super::errors::SourceError;
use super::source::CameraSource;
use super::types::{CameraKind, Frame, NextFrame, Resolution};

/// Default read size for the capture program's stdout.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default wait for a graceful exit before the child is killed.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Program and arguments used to launch the capture process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl CaptureCommand {
    /// The fixed `rpicam-vid` invocation: MJPEG on stdout, unbounded
    /// duration, inline headers, immediate flush, no local preview.
    pub fn rpicam_vid(resolution: Resolution, framerate: u32) -> Self {
        Self::mjpeg_stdout("rpicam-vid", resolution, framerate)
    }

    /// Same argument set for a compatible program under another name
    /// (e.g. `libcamera-vid` on older images).
    pub fn mjpeg_stdout(program: &str, resolution: Resolution, framerate: u32) -> Self {
        let args = vec![
            "--codec".to_string(),
            "mjpeg".to_string(),
            "--width".to_string(),
            resolution.width.to_string(),
            "--height".to_string(),
            resolution.height.to_string(),
            "--framerate".to_string(),
            framerate.to_string(),
            "--timeout".to_string(),
            "0".to_string(),
            "--output".to_string(),
            "-".to_string(),
            "--inline".to_string(),
            "--flush".to_string(),
            "--nopreview".to_string(),
        ];

        Self {
            program: program.to_string(),
            args,
        }
    }
}

/// Settings for a [`ProcessSource`].
#[derive(Debug, Clone)]
pub struct ProcessSettings {
    pub command: CaptureCommand,
    pub chunk_size: usize,
    pub stop_timeout: Duration,
    /// Demux buffer bound in bytes; zero means unbounded
    pub max_buffer: usize,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            command: CaptureCommand::rpicam_vid(Resolution::LIVE, 15),
            chunk_size: DEFAULT_CHUNK_SIZE,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            max_buffer: super::demux::DEFAULT_MAX_BUFFER,
        }
    }
}

/// Reading side of a running capture process.
struct Reader {
    stdout: ChildStdout,
    demuxer: FrameDemuxer,
    pending: VecDeque<Frame>,
    chunk: Vec<u8>,
}

/// Camera source backed by an external capture program.
///
/// The child handle and the reading side are locked separately so `stop()`
/// can signal the child while `next_frame()` is blocked on a read. Killing
/// the child closes its stdout, which the reader observes as end of stream.
pub struct ProcessSource {
    settings: ProcessSettings,
    child: Mutex<Option<Child>>,
    reader: Mutex<Option<Reader>>,
    stderr_thread: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ProcessSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSource")
            .field("command", &self.settings.command)
            .finish_non_exhaustive()
    }
}

impl ProcessSource {
    pub fn new(settings: ProcessSettings) -> Self {
        Self {
            settings,
            child: Mutex::new(None),
            reader: Mutex::new(None),
            stderr_thread: Mutex::new(None),
        }
    }

    /// Process ID of the running capture program, if any.
    pub fn pid(&self) -> Option<u32> {
        lock(&self.child).as_ref().map(Child::id)
    }

    /// Ask the child to exit, escalating to a kill after the stop timeout.
    ///
    /// The signals go to the child's whole process group, so helpers it
    /// forked (and that still hold the stdout pipe) go with it.
    fn terminate(&self, mut child: Child) {
        let pid = child.id();

        #[cfg(unix)]
        signal_group(pid, libc::SIGTERM);

        #[cfg(not(unix))]
        {
            let _ = child.kill();
        }

        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    log::debug!("Capture program {} exited with {}", pid, status);
                    break;
                }
                Ok(None) => {
                    if start.elapsed() > self.settings.stop_timeout {
                        log::warn!(
                            "Capture program {} ignored SIGTERM for {:?}, killing",
                            pid,
                            self.settings.stop_timeout
                        );
                        let _ = child.kill();
                        let _ = child.wait();
                        break;
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    log::debug!("Failed to wait for capture program {}: {}", pid, e);
                    let _ = child.kill();
                    let _ = child.wait();
                    break;
                }
            }
        }

        // Leftover group members would keep stdout open.
        #[cfg(unix)]
        signal_group(pid, libc::SIGKILL);
    }

    /// Reap the child if it has exited on its own, then kill whatever is
    /// left of its process group so the pipe closes and the reader drains
    /// to end of stream.
    #[cfg(unix)]
    fn reap_if_exited(&self) {
        // Contended means start() or stop() is busy with the child.
        let Ok(mut slot) = self.child.try_lock() else {
            return;
        };
        let Some(child) = slot.as_mut() else {
            return;
        };
        if let Ok(Some(status)) = child.try_wait() {
            let pid = child.id();
            log::info!("Capture program {} exited with {}", pid, status);
            slot.take();
            signal_group(pid, libc::SIGKILL);
        }
    }
}

impl CameraSource for ProcessSource {
    fn kind(&self) -> CameraKind {
        CameraKind::Process
    }

    fn start(&self) -> Result<(), SourceError> {
        let mut child_slot = lock(&self.child);
        if child_slot.is_some() {
            return Err(SourceError::AlreadyStarted);
        }

        let command = &self.settings.command;
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let mut child = cmd
            .spawn()
            .map_err(|e| SourceError::from_spawn(&command.program, e))?;

        log::info!(
            "Started capture program '{}' (pid {})",
            command.program,
            child.id()
        );

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SourceError::Io(std::io::Error::other(
                "capture program has no stdout pipe",
            )));
        };

        let stderr_thread = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                let reader = BufReader::new(stderr);
                for line in reader.lines() {
                    match line {
                        Ok(l) => log::debug!("[capture] {}", l),
                        Err(_) => break,
                    }
                }
            })
        });

        let demuxer = if self.settings.max_buffer == 0 {
            FrameDemuxer::new()
        } else {
            FrameDemuxer::with_max_buffer(self.settings.max_buffer)
        };

        *lock(&self.reader) = Some(Reader {
            stdout,
            demuxer,
            pending: VecDeque::new(),
            chunk: vec![0u8; self.settings.chunk_size.max(1)],
        });
        *lock(&self.stderr_thread) = stderr_thread;
        *child_slot = Some(child);

        Ok(())
    }

    fn next_frame(&self) -> Result<NextFrame, SourceError> {
        let mut guard = lock(&self.reader);
        let Some(reader) = guard.as_mut() else {
            return Ok(NextFrame::EndOfStream);
        };

        loop {
            if let Some(frame) = reader.pending.pop_front() {
                return Ok(NextFrame::Frame(frame));
            }

            #[cfg(unix)]
            if !wait_readable(&reader.stdout, EXIT_CHECK_INTERVAL)? {
                self.reap_if_exited();
                continue;
            }

            let n = match reader.stdout.read(&mut reader.chunk) {
                Ok(0) => return Ok(NextFrame::EndOfStream),
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SourceError::Io(e)),
            };

            let frames = reader.demuxer.feed(&reader.chunk[..n]);
            reader.pending.extend(frames);
        }
    }

    fn stop(&self) {
        let child = lock(&self.child).take();
        if let Some(child) = child {
            self.terminate(child);
        }

        // The child's group is gone, so a blocked read has returned and released this lock.
        lock(&self.reader).take();

        if let Some(handle) = lock(&self.stderr_thread).take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProcessSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// How long a read waits for data before checking whether the child exited.
#[cfg(unix)]
const EXIT_CHECK_INTERVAL: Duration = Duration::from_millis(100);

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    // SAFETY: the group was created for a child we spawned; ESRCH once it is empty is fine.
    unsafe {
        libc::kill(-(pid as libc::pid_t), signal);
    }
}

/// Wait until `stdout` has data or hit EOF; false on timeout.
#[cfg(unix)]
fn wait_readable(stdout: &ChildStdout, timeout: Duration) -> Result<bool, SourceError> {
    use std::os::unix::io::AsRawFd;

    let mut fds = libc::pollfd {
        fd: stdout.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: one valid pollfd for a descriptor owned by `stdout`.
    let rc = unsafe { libc::poll(&mut fds, 1, timeout.as_millis() as libc::c_int) };
    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(SourceError::Io(err));
    }
    Ok(rc > 0)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
