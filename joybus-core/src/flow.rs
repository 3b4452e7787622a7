//! Host → playback buffer flow control.
//!
//! The device asks for data instead of the host pushing it: whenever the
//! playback buffer has room and no request is outstanding, the free byte
//! count is announced, and the host answers with at most that many bytes.

use crate::ring_buffer::RingBuffer;

/// Tracks the outstanding data request for one playback buffer.
#[derive(Debug, Default)]
pub struct StreamFlowController {
    pending: bool,
}

impl StreamFlowController {
    #[must_use]
    pub const fn new() -> Self {
        Self { pending: false }
    }

    /// Free space to announce, if a request should be sent now.
    ///
    /// Marks the request outstanding. The count is capped at 255 to fit the
    /// one-byte field.
    pub fn poll<T: Copy, const N: usize>(&mut self, ring: &RingBuffer<T, N>) -> Option<u8> {
        if self.pending {
            return None;
        }
        let free = ring.adds_available();
        if free == 0 {
            return None;
        }
        self.pending = true;
        Some(free.min(u8::MAX as usize) as u8)
    }

    /// Store the host's answer and allow the next request.
    ///
    /// All of `data` is added. Sending more than was granted is a host error
    /// that shows up as the buffer's overflow flag, nothing is dropped here.
    pub fn fill<const N: usize>(&mut self, ring: &RingBuffer<u8, N>, data: &[u8]) {
        ring.add_slice(data);
        self.pending = false;
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Forget the outstanding request.
    pub fn reset(&mut self) {
        self.pending = false;
    }
}
