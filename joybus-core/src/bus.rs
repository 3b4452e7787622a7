//! Byte-level framing on top of the one-wire bit sampler.
//!
//! # Hand-off bit correction
//!
//! Whoever finishes talking on the bus sends a single stop bit before the
//! other side answers. The sampler keeps counting bits straight through that
//! stop bit, so every byte after the console request arrives shifted right by
//! one bit:
//!
//! ```text
//! sample[k]     = stop        | resp[0] >> 1
//! sample[k + 1] = resp[0] << 7 | resp[1] >> 1
//! ```
//!
//! [`BitBus::read_bytes_blocking`] rotates those samples back into place and
//! finishes the last byte from the partial sample reported at the end of the
//! frame.

use crate::line::OneLine;
use crate::port::Port;
use crate::timing::{MicroClock, READ_TIMEOUT_US};

/// Error type for single-byte reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadError {
    /// Nothing was sampled within [`READ_TIMEOUT_US`].
    Timeout,
    /// The frame ended before a full byte arrived.
    EndOfFrame,
}

/// Result of [`BitBus::read_bytes_blocking`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameRead {
    /// Whole bytes received after the ones already consumed, excluding the
    /// trailing partial sample. May exceed the buffer length.
    pub bytes: usize,
    /// Bits sampled since the frame started, as reported by the sampler.
    pub bits: u32,
}

/// Values above this are inverted bit counts, not data.
const MAX_DATA_SAMPLE: u32 = 0xFF;

/// Framed access to the one-wire bus of every port.
pub struct BitBus<L, C> {
    line: L,
    clock: C,
}

impl<L: OneLine, C: MicroClock> BitBus<L, C> {
    pub fn new(line: L, clock: C) -> Self {
        Self { line, clock }
    }

    pub fn line(&self) -> &L {
        &self.line
    }

    pub fn line_mut(&mut self) -> &mut L {
        &mut self.line
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn into_parts(self) -> (L, C) {
        (self.line, self.clock)
    }

    /// Read one byte of the current frame.
    ///
    /// # Errors
    ///
    /// - [`ReadError::Timeout`] if nothing arrives within [`READ_TIMEOUT_US`].
    /// - [`ReadError::EndOfFrame`] if the sampler reports the end of the frame.
    pub fn read_byte_blocking(&mut self, port: Port) -> Result<u8, ReadError> {
        let start = self.clock.now_us();
        while !self.clock.elapsed(start, READ_TIMEOUT_US) {
            if let Some(sample) = self.line.try_read(port) {
                return if sample <= MAX_DATA_SAMPLE {
                    Ok(sample as u8)
                } else {
                    Err(ReadError::EndOfFrame)
                };
            }
        }
        Err(ReadError::Timeout)
    }

    /// Read the rest of a frame whose length is only known once the sampler
    /// reports its end.
    ///
    /// The first `offset` bytes are still part of the console request and are
    /// stored as sampled; every later byte follows the hand-off bit and is
    /// rotated left by one. At most `buf.len()` bytes are stored.
    ///
    /// If the line stays silent for [`READ_TIMEOUT_US`] mid-frame the sampler
    /// is aborted back to idle and the read keeps waiting. The bus always
    /// completes a frame, so there is no overall deadline.
    pub fn read_bytes_blocking(&mut self, port: Port, buf: &mut [u8], offset: usize) -> FrameRead {
        let mut bytes = 0usize;
        let mut last = 0u32;
        let mut last_activity = self.clock.now_us();

        loop {
            let Some(sample) = self.line.try_read(port) else {
                if self.clock.elapsed(last_activity, READ_TIMEOUT_US) {
                    self.line.abort_read(port);
                    last_activity = self.clock.now_us();
                }
                continue;
            };
            last_activity = self.clock.now_us();

            if sample <= MAX_DATA_SAMPLE {
                let mut data = sample;
                if bytes >= offset {
                    data <<= 1;
                }
                store(buf, bytes, offset, data);
                last = data;
                bytes += 1;
            } else {
                // The sample before the bit count is the partial byte after
                // the final stop bit; redo it left-aligned.
                let bits = !sample;
                bytes = bytes.saturating_sub(1);
                last <<= (8 - bits % 8) % 8;
                store(buf, bytes, offset, last);
                return FrameRead { bytes, bits };
            }
        }
    }

    /// Consume and drop the rest of the current frame.
    ///
    /// Same timeout/abort behavior as [`read_bytes_blocking`](Self::read_bytes_blocking).
    pub fn read_discard(&mut self, port: Port) {
        let mut last_activity = self.clock.now_us();
        loop {
            match self.line.try_read(port) {
                Some(sample) if sample > MAX_DATA_SAMPLE => return,
                Some(_) => last_activity = self.clock.now_us(),
                None if self.clock.elapsed(last_activity, READ_TIMEOUT_US) => {
                    self.line.abort_read(port);
                    last_activity = self.clock.now_us();
                }
                None => {}
            }
        }
    }

    /// Busy-wait on the bus clock.
    #[inline]
    pub fn spin_us(&self, us: u32) {
        self.clock.spin_us(us);
    }

    /// Start a reply of exactly `count` bytes on `port`.
    pub fn writer(&mut self, port: Port, count: usize) -> Writer<'_, L> {
        Writer::new(&mut self.line, port, count)
    }
}

/// Store one (possibly rotated) sample. The bit shifted out of the top goes
/// into the previous byte once past the request part.
#[inline]
fn store(buf: &mut [u8], index: usize, offset: usize, data: u32) {
    let count = buf.len();
    if index > offset && index <= count {
        buf[index - 1] |= ((data >> 8) & 1) as u8;
    }
    if index < count {
        buf[index] = data as u8;
    }
}

/// Packs reply bytes into inverted 32-bit FIFO words.
///
/// The reply length is announced to the sampler up front, so a writer must
/// always produce exactly `count` bytes. Bytes not written when the writer is
/// dropped are sent as zeros.
pub struct Writer<'a, L: OneLine> {
    line: &'a mut L,
    port: Port,
    count: usize,
    written: usize,
    data: u32,
}

impl<'a, L: OneLine> Writer<'a, L> {
    fn new(line: &'a mut L, port: Port, count: usize) -> Self {
        line.start_reply(port, (count * 8) as u32);
        Self {
            line,
            port,
            count,
            written: 0,
            data: 0,
        }
    }

    /// Append one byte. Bytes past the announced count are ignored.
    pub fn write(&mut self, value: u8) -> &mut Self {
        if self.written >= self.count {
            return self;
        }

        self.data = (self.data << 8) | u32::from(value);
        self.written += 1;

        if self.written % 4 == 0 {
            self.line.write_blocking(self.port, !self.data);
        } else if self.written == self.count {
            // Left-align the final partial word.
            self.data <<= (4 - self.count % 4) * 8;
            self.line.write_blocking(self.port, !self.data);
        }
        self
    }

    pub fn write_all(&mut self, values: &[u8]) -> &mut Self {
        for &value in values {
            self.write(value);
        }
        self
    }

    /// Fill the rest of the reply with zero bytes.
    pub fn write_zeros(&mut self) -> &mut Self {
        while self.written < self.count {
            self.write(0);
        }
        self
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.count - self.written
    }
}

impl<L: OneLine> Drop for Writer<'_, L> {
    fn drop(&mut self) {
        self.write_zeros();
    }
}
