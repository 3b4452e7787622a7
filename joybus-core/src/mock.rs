//! Test doubles for the bit sampler and the microsecond clock.

extern crate std;

use core::cell::Cell;
use std::collections::VecDeque;
use std::vec::Vec;

use crate::line::OneLine;
use crate::port::Port;
use crate::timing::MicroClock;
use tas_proto::PORT_COUNT;

/// Clock that advances by one microsecond every time it is read.
pub struct StepClock {
    now: Cell<u32>,
}

impl StepClock {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(now: u32) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    pub fn advance(&self, us: u32) {
        self.now.set(self.now.get().wrapping_add(us));
    }
}

impl MicroClock for StepClock {
    fn now_us(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(1));
        now
    }
}

#[derive(Default)]
struct MockPort {
    rx: VecDeque<u32>,
    after_abort: VecDeque<u32>,
    written: Vec<u32>,
    reply_bits: Option<u32>,
    aborts: usize,
    pending: bool,
    cleared: usize,
}

/// Simulated bit sampler.
///
/// Bit streams are turned into samples the way the PIO program reports them:
/// full bytes, then the partial trailing byte, then the inverted bit count.
#[derive(Default)]
pub struct MockLine {
    ports: [MockPort; PORT_COUNT],
}

impl MockLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw samples.
    pub fn feed(&mut self, port: Port, samples: &[u32]) {
        self.ports[port.index()].rx.extend(samples.iter().copied());
    }

    /// Queue raw samples that only appear once the read has been aborted.
    pub fn feed_after_abort(&mut self, port: Port, samples: &[u32]) {
        self.ports[port.index()]
            .after_abort
            .extend(samples.iter().copied());
    }

    /// Queue a complete sampled frame.
    pub fn feed_bits(&mut self, port: Port, bits: &[bool]) {
        let samples = sample_bits(bits);
        self.feed(port, &samples);
    }

    pub fn feed_bits_after_abort(&mut self, port: Port, bits: &[bool]) {
        let samples = sample_bits(bits);
        self.feed_after_abort(port, &samples);
    }

    /// Console sends `request` and flags the frame start.
    pub fn console_command(&mut self, port: Port, request: &[u8]) {
        self.feed_bits(port, &frame_bits(request, &[]));
        self.raise(port);
    }

    pub fn raise(&mut self, port: Port) {
        self.ports[port.index()].pending = true;
    }

    pub fn written(&self, port: Port) -> &[u32] {
        &self.ports[port.index()].written
    }

    pub fn reply_bits(&self, port: Port) -> Option<u32> {
        self.ports[port.index()].reply_bits
    }

    pub fn aborts(&self, port: Port) -> usize {
        self.ports[port.index()].aborts
    }

    pub fn cleared(&self, port: Port) -> usize {
        self.ports[port.index()].cleared
    }

    pub fn unread(&self, port: Port) -> usize {
        self.ports[port.index()].rx.len()
    }

    pub fn take_written(&mut self, port: Port) -> Vec<u32> {
        let mock = &mut self.ports[port.index()];
        mock.reply_bits = None;
        core::mem::take(&mut mock.written)
    }
}

impl OneLine for MockLine {
    fn try_read(&mut self, port: Port) -> Option<u32> {
        self.ports[port.index()].rx.pop_front()
    }

    fn write_blocking(&mut self, port: Port, word: u32) {
        self.ports[port.index()].written.push(word);
    }

    fn abort_read(&mut self, port: Port) {
        let mock = &mut self.ports[port.index()];
        mock.aborts += 1;
        mock.rx.clear();
        let next = core::mem::take(&mut mock.after_abort);
        mock.rx.extend(next);
    }

    fn start_reply(&mut self, port: Port, bits: u32) {
        // The state machine is restarted with empty FIFOs.
        let mock = &mut self.ports[port.index()];
        mock.rx.clear();
        mock.reply_bits = Some(bits);
    }

    fn irq_pending(&self, port: Port) -> bool {
        self.ports[port.index()].pending
    }

    fn clear_irq(&mut self, port: Port) {
        let mock = &mut self.ports[port.index()];
        mock.pending = false;
        mock.cleared += 1;
    }
}

/// Bits of a frame: request bytes, console stop bit, response bytes and, when
/// there is a response, the controller stop bit.
pub fn frame_bits(request: &[u8], response: &[u8]) -> Vec<bool> {
    fn push_byte(bits: &mut Vec<bool>, byte: u8) {
        for i in (0..8).rev() {
            bits.push(byte & (1 << i) != 0);
        }
    }

    let mut bits = Vec::new();
    for &b in request {
        push_byte(&mut bits, b);
    }
    bits.push(true);
    if !response.is_empty() {
        for &b in response {
            push_byte(&mut bits, b);
        }
        bits.push(true);
    }
    bits
}

/// Convert a bit stream to sampler output.
pub fn sample_bits(bits: &[bool]) -> Vec<u32> {
    let mut samples = Vec::new();
    let mut isr = 0u32;
    let mut shifted = 0;
    for &bit in bits {
        isr = (isr << 1) | u32::from(bit);
        shifted += 1;
        if shifted == 8 {
            samples.push(isr);
            isr = 0;
            shifted = 0;
        }
    }
    samples.push(isr);
    samples.push(!(bits.len() as u32));
    samples
}

/// Reply bytes transmitted on `port`, decoded from the inverted words.
pub fn decode_reply(line: &MockLine, port: Port) -> Vec<u8> {
    let bits = line.reply_bits(port).unwrap_or(0) as usize;
    line.written(port)
        .iter()
        .flat_map(|word| (!word).to_be_bytes())
        .take(bits / 8)
        .collect()
}
