//! Camera types and data structures.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One complete encoded still image, as delimited in the source stream.
///
/// Cloning is cheap: the bytes are reference counted and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the encoded bytes.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame").field("len", &self.data.len()).finish()
    }
}

/// Which strategy a session uses to obtain frames.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CameraKind {
    /// Spawn an external encoder and demux its stdout (Pi camera)
    #[default]
    Process,
    /// Poll an already-encoded frame from a capture device (USB camera)
    Device,
}

impl fmt::Display for CameraKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraKind::Process => write!(f, "process"),
            CameraKind::Device => write!(f, "device"),
        }
    }
}

/// Result of asking a source for its next frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextFrame {
    Frame(Frame),
    EndOfStream,
}

/// Information about an available capture device.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    /// Device index for selection
    pub index: u32,
    /// Human-readable device name
    pub name: String,
    /// Device node path
    pub path: String,
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.index, self.name, self.path)
    }
}

/// Capture resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Live view resolution (1280x720, 16:9 without letterboxing)
    pub const LIVE: Resolution = Resolution {
        width: 1280,
        height: 720,
    };

    /// One-shot still resolution (2304x1296)
    pub const STILL: Resolution = Resolution {
        width: 2304,
        height: 1296,
    };
}

impl Default for Resolution {
    fn default() -> Self {
        Self::LIVE
    }
}
