//! Passive capture of console ↔ controller traffic.
//!
//! Every recognised frame becomes one record in the capture buffer:
//!
//! ```text
//! port, size, request size, command, response bytes…
//! ```
//!
//! `size` and `request size` both count the command byte.

use portable_atomic::{AtomicU8, Ordering};

use crate::bus::{BitBus, ReadError};
use crate::command::Command;
use crate::line::OneLine;
use crate::port::Port;
use crate::ring_buffer::RingBuffer;
use crate::timing::MicroClock;

/// Largest request + response captured from one frame.
pub const FRAME_CAPACITY: usize = 64;

/// Record bytes in front of the response.
pub const RECORD_HEADER_LEN: usize = 4;

/// Outcome of a captured frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Capture {
    /// A record of `bytes` response bytes was queued.
    Recorded { command: u8, bytes: usize },
    /// Unknown command; the response length, and with it the hand-off bit
    /// position, is unknown so the frame was dropped.
    Unsupported(u8),
    NoCommand(ReadError),
}

/// Bus side of the recorder.
pub struct Recorder<'a, const N: usize> {
    capture: &'a RingBuffer<u8, N>,
    last_invalid: &'a AtomicU8,
    record: [u8; RECORD_HEADER_LEN + FRAME_CAPACITY],
}

impl<'a, const N: usize> Recorder<'a, N> {
    /// `last_invalid` receives the last unsupported command, `0` meaning none.
    pub fn new(capture: &'a RingBuffer<u8, N>, last_invalid: &'a AtomicU8) -> Self {
        Self {
            capture,
            last_invalid,
            record: [0; RECORD_HEADER_LEN + FRAME_CAPACITY],
        }
    }

    pub fn handle_frame<L: OneLine, C: MicroClock>(
        &mut self,
        bus: &mut BitBus<L, C>,
        port: Port,
    ) -> Capture {
        let command = match bus.read_byte_blocking(port) {
            Ok(byte) => Command::from_byte(byte),
            Err(err) => return Capture::NoCommand(err),
        };

        let (Some(request), Some(response)) = (command.request_len(), command.response_len())
        else {
            self.last_invalid
                .store(command.to_byte(), Ordering::Relaxed);
            bus.read_discard(port);
            return Capture::Unsupported(command.to_byte());
        };

        let count = (request + response).min(FRAME_CAPACITY);
        let frame = &mut self.record[RECORD_HEADER_LEN..RECORD_HEADER_LEN + count];
        let read = bus.read_bytes_blocking(port, frame, request);
        let bytes = read.bytes.min(count);

        self.record[0] = port.number();
        self.record[1] = (bytes + 1) as u8;
        self.record[2] = (request + 1) as u8;
        self.record[3] = command.to_byte();
        self.capture
            .add_slice(&self.record[..RECORD_HEADER_LEN + bytes]);

        Capture::Recorded {
            command: command.to_byte(),
            bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::mock::{frame_bits, MockLine, StepClock};
    use std::vec::Vec;

    const P1: Port = Port::ALL[1];

    fn drain<const N: usize>(ring: &RingBuffer<u8, N>) -> Vec<u8> {
        (0..ring.gets_available()).map(|_| ring.get()).collect()
    }

    #[test]
    fn test_records_poll_frame() {
        let capture: RingBuffer<u8, 64> = RingBuffer::new(0);
        let last_invalid = AtomicU8::new(0);
        let mut recorder = Recorder::new(&capture, &last_invalid);

        let mut bus = BitBus::new(MockLine::new(), StepClock::new());
        bus.line_mut()
            .feed_bits(P1, &frame_bits(&[0x01], &[0x10, 0x00, 0x05, 0xFB]));

        let outcome = recorder.handle_frame(&mut bus, P1);

        assert_eq!(
            outcome,
            Capture::Recorded {
                command: 0x01,
                bytes: 4
            }
        );
        assert_eq!(drain(&capture), [1, 5, 1, 0x01, 0x10, 0x00, 0x05, 0xFB]);
    }

    #[test]
    fn test_records_identify_frame() {
        let capture: RingBuffer<u8, 64> = RingBuffer::new(0);
        let last_invalid = AtomicU8::new(0);
        let mut recorder = Recorder::new(&capture, &last_invalid);

        let mut bus = BitBus::new(MockLine::new(), StepClock::new());
        bus.line_mut()
            .feed_bits(P1, &frame_bits(&[0x00], &[0x05, 0x00, 0x02]));

        recorder.handle_frame(&mut bus, P1);
        assert_eq!(drain(&capture), [1, 4, 1, 0x00, 0x05, 0x00, 0x02]);
        assert!(!capture.overflowed());
    }

    #[test]
    fn test_unknown_command_is_remembered_and_discarded() {
        let capture: RingBuffer<u8, 64> = RingBuffer::new(0);
        let last_invalid = AtomicU8::new(0);
        let mut recorder = Recorder::new(&capture, &last_invalid);

        let mut bus = BitBus::new(MockLine::new(), StepClock::new());
        bus.line_mut()
            .feed_bits(P1, &frame_bits(&[0x02, 0x80, 0x01], &[0; 33]));

        let outcome = recorder.handle_frame(&mut bus, P1);

        assert_eq!(outcome, Capture::Unsupported(0x02));
        assert_eq!(last_invalid.load(Ordering::Relaxed), 0x02);
        assert_eq!(capture.gets_available(), 0);
        assert_eq!(bus.line().unread(P1), 0);
    }

    #[test]
    fn test_silent_bus() {
        let capture: RingBuffer<u8, 64> = RingBuffer::new(0);
        let last_invalid = AtomicU8::new(0);
        let mut recorder = Recorder::new(&capture, &last_invalid);
        let mut bus = BitBus::new(MockLine::new(), StepClock::new());

        assert_eq!(
            recorder.handle_frame(&mut bus, P1),
            Capture::NoCommand(ReadError::Timeout)
        );
        assert_eq!(capture.gets_available(), 0);
    }
}
