//! The capability every frame source implements.

use super::errors::SourceError;
use super::types::{CameraKind, NextFrame};

/// A producer of encoded frames.
///
/// Methods take `&self` so that `stop()` can be called from the session
/// manager while the reading loop is blocked inside `next_frame()`;
/// stopping must unblock that call, which then reports end of stream.
pub trait CameraSource: Send + Sync {
    /// Which variant this is.
    fn kind(&self) -> CameraKind;

    /// Acquire the underlying process or device.
    fn start(&self) -> Result<(), SourceError>;

    /// Block until the next frame is available or the source has ended.
    fn next_frame(&self) -> Result<NextFrame, SourceError>;

    /// Release the process or device. Safe to call repeatedly and before `start()`.
    fn stop(&self);
}
