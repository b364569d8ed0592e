//! Outbound FIFO with partial-write tracking.
//!
//! Frames are queued already encoded. The writer peeks at the unsent tail of the
//! front frame, writes what the socket accepts, then advances by the byte count
//! actually written; a frame may take any number of writes to leave.

use std::collections::VecDeque;

use bytes::Bytes;

/// Default ceiling on unsent bytes per session: a few maximum-size frames.
pub const MAX_QUEUED_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct WriteQueue {
    frames: VecDeque<Bytes>,
    /// Bytes of the front frame already written.
    offset: usize,
    queued_bytes: usize,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Bytes) {
        if frame.is_empty() {
            return;
        }
        self.queued_bytes += frame.len();
        self.frames.push_back(frame);
    }

    /// Unsent remainder of the front frame.
    pub fn peek(&self) -> Option<Bytes> {
        self.frames.front().map(|front| front.slice(self.offset..))
    }

    /// Record that `written` bytes of the front frame left the socket.
    /// Returns how many frames that completed.
    pub fn advance(&mut self, mut written: usize) -> usize {
        let mut completed = 0;
        while written > 0 {
            let Some(front) = self.frames.front() else {
                self.offset = 0;
                break;
            };
            let remaining = front.len() - self.offset;
            if written < remaining {
                self.offset += written;
                self.queued_bytes -= written;
                break;
            }
            written -= remaining;
            self.queued_bytes -= remaining;
            self.frames.pop_front();
            self.offset = 0;
            completed += 1;
        }
        completed
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames not yet fully written.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Bytes not yet written across all frames.
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    /// Drop everything still queued, returning the number of frames discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.frames.len();
        self.frames.clear();
        self.offset = 0;
        self.queued_bytes = 0;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_writes_keep_offset_within_frame() {
        let mut queue = WriteQueue::new();
        queue.push(Bytes::from_static(b"abcdef"));
        queue.push(Bytes::from_static(b"gh"));

        assert_eq!(queue.advance(4), 0);
        assert_eq!(queue.peek(), Some(Bytes::from_static(b"ef")));
        assert_eq!(queue.queued_bytes(), 4);

        queue.advance(1);
        assert_eq!(queue.peek(), Some(Bytes::from_static(b"f")));

        assert_eq!(queue.advance(1), 1);
        assert_eq!(queue.peek(), Some(Bytes::from_static(b"gh")));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn advance_may_span_frames() {
        let mut queue = WriteQueue::new();
        queue.push(Bytes::from_static(b"ab"));
        queue.push(Bytes::from_static(b"cd"));
        assert_eq!(queue.advance(3), 1);
        assert_eq!(queue.peek(), Some(Bytes::from_static(b"d")));
        assert_eq!(queue.advance(1), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.queued_bytes(), 0);
    }

    #[test]
    fn clear_resets_offset() {
        let mut queue = WriteQueue::new();
        queue.push(Bytes::from_static(b"abc"));
        queue.advance(2);
        assert_eq!(queue.clear(), 1);
        queue.advance(5);
        queue.push(Bytes::from_static(b"xyz"));
        assert_eq!(queue.peek(), Some(Bytes::from_static(b"xyz")));
    }
}
