//! Frame acquisition: demuxing, caching and the two camera source variants.
//!
//! - Stream slicing via [`FrameDemuxer`]
//! - Latest-frame storage via [`FrameCache`]
//! - Sources via [`CameraSource`]: [`ProcessSource`] and [`DeviceSource`]
//! - One-shot stills via [`StillCommand`]

mod cache;
mod demux;
mod device;
mod errors;
mod list;
mod process;
mod source;
mod still;
mod types;
#[cfg(feature = "v4l2")]
mod v4l2;

pub use cache::FrameCache;
pub use demux::{FrameDemuxer, DEFAULT_MAX_BUFFER, EOI, SOI};
pub use device::{DeviceSource, FrameDevice, UnsupportedDevice, DEFAULT_POLL_BACKOFF};
pub use errors::{CaptureError, SourceError};
pub use list::list_devices;
pub use process::{
    CaptureCommand, ProcessSettings, ProcessSource, DEFAULT_CHUNK_SIZE, DEFAULT_STOP_TIMEOUT,
};
pub use source::CameraSource;
pub use still::{StillCommand, DEFAULT_STILL_TIMEOUT};
pub use types::{CameraInfo, CameraKind, Frame, NextFrame, Resolution};
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Device;
