//! Error types for camera sources and still capture.
//!
//! Source errors are raised while starting or reading a camera source.
//! Capture errors are raised while producing a single still image.

use thiserror::Error;

/// Errors that can occur while starting or reading a camera source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The capture program is not installed
    #[error("Capture program '{0}' not found. On Raspberry Pi OS install it with:\n\n    sudo apt install rpicam-apps\n")]
    ProgramNotFound(String),
    /// The capture program exists but could not be launched
    #[error("Failed to launch capture program '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The capture device could not be opened
    #[error("Failed to open camera device {index}: {reason}")]
    DeviceOpen { index: u32, reason: String },
    /// No device backend is available in this build
    #[error("Camera device support is not available: {0}")]
    DeviceUnavailable(String),
    /// `start()` was called on a source that is already running
    #[error("Camera source is already started")]
    AlreadyStarted,
    /// Reading from the source failed
    #[error("I/O error while reading frames: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Map a spawn failure, distinguishing a missing program.
    pub fn from_spawn(program: &str, e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            SourceError::ProgramNotFound(program.to_string())
        } else {
            SourceError::Spawn {
                program: program.to_string(),
                source: e,
            }
        }
    }
}

/// Errors that can occur while capturing a still image.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The one-shot capture command exceeded its time bound
    #[error("Still capture timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// The one-shot capture command failed or produced nothing
    #[error("Still capture command failed: {0}")]
    CommandFailed(String),
    /// Nothing has been cached yet in this session
    #[error("No frame available")]
    NoFrameAvailable,
    /// I/O error while running the capture command
    #[error("I/O error during still capture: {0}")]
    Io(#[from] std::io::Error),
}
