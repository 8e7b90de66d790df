//! V4L2 capture device delivering MJPEG frames.
//!
//! Requests the `MJPG` pixel format so every buffer the driver hands back is
//! already a complete JPEG image.

use ouroboros::self_referencing;
use std::time::Duration;

use super::device::FrameDevice;
use super::errors::SourceError;
use super::types::{Frame, Resolution};

/// Longest a single dequeue may block, so `stop()` can take the device lock.
pub const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(200);

#[self_referencing]
struct StreamState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

/// USB/UVC camera opened through V4L2.
pub struct V4l2Device {
    resolution: Resolution,
    framerate: u32,
    state: Option<StreamState>,
}

impl V4l2Device {
    pub fn new(resolution: Resolution, framerate: u32) -> Self {
        Self {
            resolution,
            framerate,
            state: None,
        }
    }
}

impl FrameDevice for V4l2Device {
    fn open(&mut self, index: u32) -> Result<(), SourceError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let open_err = |reason: String| SourceError::DeviceOpen { index, reason };

        let mut device = v4l::Device::new(index as usize).map_err(|e| open_err(e.to_string()))?;
        let mut format = device.format().map_err(|e| open_err(e.to_string()))?;
        format.width = self.resolution.width;
        format.height = self.resolution.height;
        format.fourcc = v4l::FourCC::new(b"MJPG");

        let format = device
            .set_format(&format)
            .map_err(|e| open_err(e.to_string()))?;
        if format.fourcc != v4l::FourCC::new(b"MJPG") {
            return Err(open_err(format!(
                "device does not support MJPEG (got {})",
                format.fourcc
            )));
        }

        if self.framerate > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.framerate);
            if let Err(e) = device.set_params(&params) {
                log::warn!("Failed to set {} fps on camera {}: {}", self.framerate, index, e);
            }
        }

        let mut state = StreamStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
            },
        }
        .try_build()
        .map_err(|e| open_err(e.to_string()))?;
        state.with_stream_mut(|stream| stream.set_timeout(DEQUEUE_TIMEOUT));
        self.state = Some(state);

        log::info!(
            "V4L2 camera {} streaming MJPEG at {}x{}",
            index,
            format.width,
            format.height
        );
        Ok(())
    }

    fn poll(&mut self) -> Option<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut()?;
        let result = state.with_stream_mut(|stream| {
            stream
                .next()
                .map(|(buf, meta)| {
                    let used = (meta.bytesused as usize).min(buf.len());
                    buf[..used].to_vec()
                })
        });

        match result {
            Ok(data) if !data.is_empty() => Some(Frame::new(data)),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => None,
            Err(e) => {
                log::debug!("V4L2 dequeue failed: {}", e);
                None
            }
        }
    }

    fn close(&mut self) {
        self.state = None;
    }
}
