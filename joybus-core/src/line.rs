//! Hardware seam for the one-wire bit-sampling peripheral.

use crate::port::Port;

/// One bit-sampling state machine per port.
///
/// The peripheral samples the line at the bus bit rate and reports:
///
/// - every complete byte as a value `<= 0xFF`,
/// - when the line has been idle after the hand-off bit, the remaining
///   partial byte (always, even if empty) followed by the bit-inverted number
///   of bits sampled since the frame started. Inverted counts are always
///   `> 0xFF` and mark the end of the frame.
///
/// Outbound words are transmitted MSB first and must already be inverted:
/// a `1` drives the line low for the whole data slot.
pub trait OneLine {
    /// Take the next sampled value, if any.
    fn try_read(&mut self, port: Port) -> Option<u32>;

    /// Queue one outbound word, waiting for FIFO space.
    fn write_blocking(&mut self, port: Port, word: u32);

    /// Drop the current frame and return the state machine to idle.
    fn abort_read(&mut self, port: Port);

    /// Switch the state machine to transmit `bits` reply bits followed by the
    /// controller stop bit.
    fn start_reply(&mut self, port: Port, bits: u32);

    /// `true` if the port flagged the start of a new frame.
    fn irq_pending(&self, port: Port) -> bool;

    /// Acknowledge the frame-start flag.
    fn clear_irq(&mut self, port: Port);
}
