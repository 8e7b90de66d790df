//! Single-slot cache of the latest complete frame.

use std::sync::{Arc, Mutex};

use super::types::Frame;

/// Latest known frame, shared between the reading loop and still capture.
///
/// The lock only guards the slot exchange; frames are reference counted so
/// no copy of the payload happens while it is held.
#[derive(Debug, Clone, Default)]
pub struct FrameCache {
    slot: Arc<Mutex<Option<Frame>>>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached frame.
    pub fn set(&self, frame: Frame) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(frame);
        }
    }

    /// The cached frame, or `None` if nothing was cached this session.
    ///
    /// Never waits for a future frame.
    pub fn get(&self) -> Option<Frame> {
        let slot = self.slot.lock().ok()?;
        slot.clone()
    }

    /// Empty the slot at the start of a new session.
    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}
