//! Device-backed camera source.
//!
//! Polls a capture device that already delivers JPEG-encoded frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use super::errors::SourceError;
use super::source::CameraSource;
use super::types::{CameraKind, Frame, NextFrame};

/// Default wait between polls when the device has no frame ready.
pub const DEFAULT_POLL_BACKOFF: Duration = Duration::from_millis(30);

/// A capture device that hands out already-encoded frames.
pub trait FrameDevice: Send {
    /// Open the device with the given numeric index.
    fn open(&mut self, index: u32) -> Result<(), SourceError>;

    /// Return a frame if one is available.
    ///
    /// May wait for the driver, but only for a short bounded time: the
    /// source's device lock is held meanwhile and `stop()` needs it.
    fn poll(&mut self) -> Option<Frame>;

    /// Release the device.
    fn close(&mut self);
}

/// Placeholder used when the crate is built without a device backend.
#[derive(Debug, Default)]
pub struct UnsupportedDevice;

impl FrameDevice for UnsupportedDevice {
    fn open(&mut self, _index: u32) -> Result<(), SourceError> {
        Err(SourceError::DeviceUnavailable(
            "this build has no device backend (rebuild with --features v4l2)".to_string(),
        ))
    }

    fn poll(&mut self) -> Option<Frame> {
        None
    }

    fn close(&mut self) {}
}

/// Camera source that polls a [`FrameDevice`].
///
/// Polling retries without limit while running; `stop()` ends the loop and
/// the next `next_frame()` reports end of stream.
pub struct DeviceSource {
    index: u32,
    backoff: Duration,
    device: Mutex<Box<dyn FrameDevice>>,
    running: AtomicBool,
}

impl DeviceSource {
    pub fn new(device: Box<dyn FrameDevice>, index: u32, backoff: Duration) -> Self {
        Self {
            index,
            backoff,
            device: Mutex::new(device),
            running: AtomicBool::new(false),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    fn device(&self) -> MutexGuard<'_, Box<dyn FrameDevice>> {
        self.device
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CameraSource for DeviceSource {
    fn kind(&self) -> CameraKind {
        CameraKind::Device
    }

    fn start(&self) -> Result<(), SourceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SourceError::AlreadyStarted);
        }
        self.device().open(self.index)?;
        self.running.store(true, Ordering::SeqCst);
        log::info!("Opened camera device {}", self.index);
        Ok(())
    }

    fn next_frame(&self) -> Result<NextFrame, SourceError> {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return Ok(NextFrame::EndOfStream);
            }

            let polled = {
                let mut device = self.device();
                // Re-check under the lock so a concurrent stop() wins.
                if !self.running.load(Ordering::SeqCst) {
                    return Ok(NextFrame::EndOfStream);
                }
                device.poll()
            };

            match polled {
                Some(frame) => return Ok(NextFrame::Frame(frame)),
                None => thread::sleep(self.backoff),
            }
        }
    }

    fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.device().close();
            log::info!("Released camera device {}", self.index);
        }
    }
}

impl Drop for DeviceSource {
    fn drop(&mut self) {
        self.stop();
    }
}
