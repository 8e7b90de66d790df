//! Motion-JPEG demuxer.
//!
//! Slices an arbitrarily chunked byte stream into complete JPEG frames using
//! only the SOI/EOI markers. Pixel data is never inspected.

use super::types::Frame;

/// JPEG start-of-image marker.
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker.
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Default cap on the unconsumed tail (8 MiB).
pub const DEFAULT_MAX_BUFFER: usize = 8 * 1024 * 1024;

/// Incremental SOI/EOI frame splitter.
///
/// Frames come out in arrival order, byte-identical to the input, and a
/// frame is only emitted once its EOI has arrived.
#[derive(Debug, Default)]
pub struct FrameDemuxer {
    buffer: Vec<u8>,
    /// When the buffer starts with a pending SOI, EOI search resumes here.
    resume_at: usize,
    /// Zero means unbounded.
    max_buffer: usize,
}

impl FrameDemuxer {
    /// Create an unbounded demuxer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a demuxer that resyncs once its tail grows past `max_buffer` bytes.
    pub fn with_max_buffer(max_buffer: usize) -> Self {
        Self {
            max_buffer,
            ..Self::default()
        }
    }

    /// Append `chunk` and return every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut cursor = 0;
        loop {
            let Some(start) = find(&self.buffer, cursor, &SOI) else {
                // No marker yet; keep everything after the last emitted frame.
                self.resume_at = 0;
                break;
            };

            let eoi_from = if start == 0 && self.resume_at > 2 {
                self.resume_at
            } else {
                start + 2
            };
            let Some(end) = find(&self.buffer, eoi_from, &EOI) else {
                // Incomplete frame: drop any preamble, keep from the SOI.
                cursor = start;
                self.resume_at = (self.buffer.len() - start).saturating_sub(1).max(2);
                break;
            };

            frames.push(Frame::new(self.buffer[start..end + 2].to_vec()));
            cursor = end + 2;
            self.resume_at = 0;
        }

        if cursor > 0 {
            self.buffer.drain(..cursor);
        }
        self.enforce_bound();

        frames
    }

    /// Number of unconsumed bytes currently held.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Forget any partial data, as at the start of a new session.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.resume_at = 0;
    }

    fn enforce_bound(&mut self) {
        if self.max_buffer == 0 || self.buffer.len() <= self.max_buffer {
            return;
        }

        let dropped = match rfind(&self.buffer, &SOI).filter(|&i| i > 0) {
            Some(i) => {
                self.buffer.drain(..i);
                i
            }
            None => {
                // A trailing 0xFF may be the first half of the next SOI.
                let keep = usize::from(self.buffer.last() == Some(&SOI[0]));
                let dropped = self.buffer.len() - keep;
                self.buffer.drain(..dropped);
                dropped
            }
        };
        self.resume_at = 0;

        log::warn!(
            "Demux buffer exceeded {} bytes without a complete frame, discarded {} bytes to resync",
            self.max_buffer,
            dropped
        );
    }
}

fn find(haystack: &[u8], from: usize, needle: &[u8; 2]) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(2)
        .position(|w| w == needle)
        .map(|i| i + from)
}

fn rfind(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).rposition(|w| w == needle)
}
