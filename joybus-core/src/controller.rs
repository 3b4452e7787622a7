//! Emulated standard controller.
//!
//! One activation per console frame, run from the bus interrupt:
//!
//! ```text
//! Idle ─┬─ connected ──▶ ReadCommand ─┬─ identify/reset ─▶ RespondIdentify ─┐
//!       │                             ├─ poll ───────────▶ RespondPoll ─────┤
//!       │                             └─ other ──────────▶ Discard ─────────┤
//!       └─ disconnected ────────────────────────────────▶ Discard ─────────┴─▶ Idle
//! ```

use portable_atomic::{AtomicU32, AtomicU8, Ordering};
use tas_proto::{ControllerConfig, PORT_COUNT};

use crate::bus::{BitBus, ReadError};
use crate::command::Command;
use crate::line::OneLine;
use crate::port::Port;
use crate::ring_buffer::RingBuffer;
use crate::timing::{MicroClock, REPLY_DELAY_US};

/// Bytes in one controller input report.
pub const INPUT_LEN: usize = 4;

/// Per-port controller configuration shared between the host task and the
/// bus interrupt.
///
/// Each port is one packed word (`connected << 24 | header`), so a port is
/// always replaced as a whole and the interrupt never sees a half-written
/// header.
pub struct ControllerTable {
    ports: [AtomicU32; PORT_COUNT],
}

impl Default for ControllerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerTable {
    /// All ports disconnected.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ports: [
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
            ],
        }
    }

    const fn pack(config: ControllerConfig) -> u32 {
        ((config.connected as u32) << 24)
            | ((config.header[0] as u32) << 16)
            | ((config.header[1] as u32) << 8)
            | (config.header[2] as u32)
    }

    const fn unpack(raw: u32) -> ControllerConfig {
        let [connected, h0, h1, h2] = raw.to_be_bytes();
        ControllerConfig {
            connected: connected != 0,
            header: [h0, h1, h2],
        }
    }

    pub fn get(&self, port: Port) -> ControllerConfig {
        Self::unpack(self.ports[port.index()].load(Ordering::Acquire))
    }

    pub fn set(&self, port: Port, config: ControllerConfig) {
        self.ports[port.index()].store(Self::pack(config), Ordering::Release);
    }

    /// Replace the configuration of every port.
    pub fn replace_all(&self, configs: &[ControllerConfig; PORT_COUNT]) {
        for (port, config) in Port::ALL.into_iter().zip(configs) {
            self.set(port, *config);
        }
    }

    /// Disconnect every port.
    pub fn clear(&self) {
        self.replace_all(&[ControllerConfig::DISCONNECTED; PORT_COUNT]);
    }
}

/// Poll activity readable from the host task without locks.
///
/// Only the bus interrupt writes, except for [`reset`](Self::reset) which
/// requires the interrupt side to be parked.
pub struct PollTelemetry {
    /// Last polled port, `NO_PORT` before the first poll.
    last_port: AtomicU8,
    events: AtomicU32,
    last_input: AtomicU32,
}

const NO_PORT: u8 = u8::MAX;

impl Default for PollTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl PollTelemetry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_port: AtomicU8::new(NO_PORT),
            events: AtomicU32::new(0),
            last_input: AtomicU32::new(0),
        }
    }

    fn record(&self, port: Port, input: [u8; INPUT_LEN]) {
        self.last_input
            .store(u32::from_be_bytes(input), Ordering::Relaxed);
        self.last_port.store(port.number(), Ordering::Relaxed);
        let events = self.events.load(Ordering::Relaxed);
        self.events.store(events.wrapping_add(1), Ordering::Release);
    }

    pub fn last_port(&self) -> Option<Port> {
        Port::new(self.last_port.load(Ordering::Relaxed))
    }

    /// Number of polls answered since the last reset.
    pub fn events(&self) -> u32 {
        self.events.load(Ordering::Acquire)
    }

    pub fn last_input(&self) -> [u8; INPUT_LEN] {
        self.last_input.load(Ordering::Relaxed).to_be_bytes()
    }

    pub fn reset(&self) {
        self.last_port.store(NO_PORT, Ordering::Relaxed);
        self.last_input.store(0, Ordering::Relaxed);
        self.events.store(0, Ordering::Release);
    }
}

/// Emulator states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Idle,
    ReadCommand,
    RespondIdentify,
    RespondPoll,
    /// Consume the rest of the frame. Carries the unsupported command byte,
    /// `None` for a disconnected port.
    Discard(Option<u8>),
}

/// How a frame was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// Port is disconnected; the frame was consumed without a reply.
    Discarded,
    /// Unsupported command; the rest of the frame was consumed.
    Unsupported(u8),
    Identified,
    /// Input report sent to the console.
    Polled([u8; INPUT_LEN]),
    /// No command byte could be read.
    NoCommand(ReadError),
}

enum Transition {
    Next(Phase),
    Done(Outcome),
}

/// Standard controller answering identify, reset and poll commands from a
/// playback buffer.
pub struct ControllerEmulator<'a, const N: usize> {
    controllers: &'a ControllerTable,
    playback: &'a RingBuffer<u8, N>,
    telemetry: &'a PollTelemetry,
}

impl<'a, const N: usize> ControllerEmulator<'a, N> {
    pub fn new(
        controllers: &'a ControllerTable,
        playback: &'a RingBuffer<u8, N>,
        telemetry: &'a PollTelemetry,
    ) -> Self {
        Self {
            controllers,
            playback,
            telemetry,
        }
    }

    /// Handle one console frame on `port`, starting right after the frame
    /// start was flagged.
    pub fn handle_frame<L: OneLine, C: MicroClock>(
        &mut self,
        bus: &mut BitBus<L, C>,
        port: Port,
    ) -> Outcome {
        let config = self.controllers.get(port);
        let mut phase = Phase::Idle;
        loop {
            match self.step(bus, port, &config, phase) {
                Transition::Next(next) => phase = next,
                Transition::Done(outcome) => return outcome,
            }
        }
    }

    fn step<L: OneLine, C: MicroClock>(
        &mut self,
        bus: &mut BitBus<L, C>,
        port: Port,
        config: &ControllerConfig,
        phase: Phase,
    ) -> Transition {
        match phase {
            Phase::Idle if config.connected => Transition::Next(Phase::ReadCommand),
            // A disconnected port still has to consume the frame to stay in
            // sync with the bus.
            Phase::Idle => Transition::Next(Phase::Discard(None)),
            Phase::ReadCommand => match bus.read_byte_blocking(port) {
                Ok(byte) => Transition::Next(match Command::from_byte(byte) {
                    Command::Identify | Command::Reset => Phase::RespondIdentify,
                    Command::PollInputs => Phase::RespondPoll,
                    Command::Unknown(command) => Phase::Discard(Some(command)),
                }),
                Err(err) => Transition::Done(Outcome::NoCommand(err)),
            },
            Phase::RespondIdentify => {
                bus.spin_us(REPLY_DELAY_US);
                bus.writer(port, config.header.len())
                    .write_all(&config.header);
                Transition::Done(Outcome::Identified)
            }
            Phase::RespondPoll => {
                bus.spin_us(REPLY_DELAY_US);
                // An empty buffer still yields a full report; the underflow
                // flag tells the host side about it.
                let mut input = [0u8; INPUT_LEN];
                for byte in &mut input {
                    *byte = self.playback.get();
                }
                bus.writer(port, INPUT_LEN).write_all(&input);
                self.telemetry.record(port, input);
                Transition::Done(Outcome::Polled(input))
            }
            Phase::Discard(command) => {
                bus.read_discard(port);
                Transition::Done(match command {
                    Some(command) => Outcome::Unsupported(command),
                    None => Outcome::Discarded,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::mock::{decode_reply, MockLine, StepClock};
    use std::vec;

    const P0: Port = Port::ALL[0];
    const P1: Port = Port::ALL[1];

    struct Fixture {
        controllers: ControllerTable,
        playback: RingBuffer<u8, 16>,
        telemetry: PollTelemetry,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                controllers: ControllerTable::new(),
                playback: RingBuffer::new(0),
                telemetry: PollTelemetry::new(),
            }
        }

        fn emulator(&self) -> ControllerEmulator<'_, 16> {
            ControllerEmulator::new(&self.controllers, &self.playback, &self.telemetry)
        }
    }

    fn bus() -> BitBus<MockLine, StepClock> {
        BitBus::new(MockLine::new(), StepClock::new())
    }

    #[test]
    fn test_controller_table_round_trip() {
        let table = ControllerTable::new();
        assert!(!table.get(P0).connected);

        table.set(P1, ControllerConfig::standard());
        assert_eq!(table.get(P1), ControllerConfig::standard());
        assert!(!table.get(P0).connected);
    }

    #[test]
    fn test_controller_table_replace_is_full() {
        let table = ControllerTable::new();
        table.replace_all(&[ControllerConfig::standard(); PORT_COUNT]);

        let mut next = [ControllerConfig::DISCONNECTED; PORT_COUNT];
        next[2] = ControllerConfig {
            connected: true,
            header: [0x05, 0x00, 0x01],
        };
        table.replace_all(&next);

        assert!(!table.get(P0).connected);
        assert!(!table.get(P1).connected);
        assert_eq!(table.get(Port::ALL[2]).header, [0x05, 0x00, 0x01]);
        assert!(!table.get(Port::ALL[3]).connected);
    }

    #[test]
    fn test_disconnected_port_discards() {
        let fx = Fixture::new();
        let mut bus = bus();
        bus.line_mut().console_command(P0, &[0x00]);

        let outcome = fx.emulator().handle_frame(&mut bus, P0);

        assert_eq!(outcome, Outcome::Discarded);
        assert!(bus.line().written(P0).is_empty());
        assert_eq!(bus.line().reply_bits(P0), None);
        assert_eq!(bus.line().unread(P0), 0);
        assert_eq!(bus.line().aborts(P0), 0);
    }

    #[test]
    fn test_reset_replies_with_header() {
        let fx = Fixture::new();
        fx.controllers.set(P0, ControllerConfig::standard());
        let mut bus = bus();
        bus.line_mut().console_command(P0, &[0xFF]);

        let outcome = fx.emulator().handle_frame(&mut bus, P0);

        assert_eq!(outcome, Outcome::Identified);
        assert_eq!(decode_reply(bus.line(), P0), vec![0x05, 0x00, 0x02]);
        // Reply started no earlier than the mandatory delay.
        assert!(bus.clock().now_us() >= REPLY_DELAY_US);
    }

    #[test]
    fn test_identify_uses_port_header() {
        let fx = Fixture::new();
        fx.controllers.set(
            P1,
            ControllerConfig {
                connected: true,
                header: [0x05, 0x00, 0x01],
            },
        );
        let mut bus = bus();
        bus.line_mut().console_command(P1, &[0x00]);

        assert_eq!(fx.emulator().handle_frame(&mut bus, P1), Outcome::Identified);
        assert_eq!(decode_reply(bus.line(), P1), vec![0x05, 0x00, 0x01]);
    }

    #[test]
    fn test_poll_replies_from_playback() {
        let fx = Fixture::new();
        fx.controllers.set(P0, ControllerConfig::standard());
        fx.playback.add_slice(&[0xA1, 0xB2, 0xC3, 0xD4]);
        let mut bus = bus();
        bus.line_mut().console_command(P0, &[0x01]);

        let outcome = fx.emulator().handle_frame(&mut bus, P0);

        assert_eq!(outcome, Outcome::Polled([0xA1, 0xB2, 0xC3, 0xD4]));
        assert_eq!(decode_reply(bus.line(), P0), vec![0xA1, 0xB2, 0xC3, 0xD4]);
        assert_eq!(fx.playback.gets_available(), 0);
        assert!(!fx.playback.underflowed());

        assert_eq!(fx.telemetry.last_port(), Some(P0));
        assert_eq!(fx.telemetry.events(), 1);
        assert_eq!(fx.telemetry.last_input(), [0xA1, 0xB2, 0xC3, 0xD4]);
    }

    #[test]
    fn test_poll_on_empty_buffer_still_replies() {
        let fx = Fixture::new();
        fx.controllers.set(P0, ControllerConfig::standard());
        fx.playback.add_slice(&[1, 2, 3, 4]);
        let mut bus = bus();

        bus.line_mut().console_command(P0, &[0x01]);
        fx.emulator().handle_frame(&mut bus, P0);
        bus.line_mut().take_written(P0);

        bus.line_mut().console_command(P0, &[0x01]);
        let outcome = fx.emulator().handle_frame(&mut bus, P0);

        assert_eq!(outcome, Outcome::Polled([0; 4]));
        assert!(fx.playback.underflowed());
        assert_eq!(decode_reply(bus.line(), P0), vec![0, 0, 0, 0]);
        assert_eq!(fx.telemetry.events(), 2);
    }

    #[test]
    fn test_unknown_command_discards_rest() {
        let fx = Fixture::new();
        fx.controllers.set(P0, ControllerConfig::standard());
        let mut bus = bus();
        bus.line_mut().console_command(P0, &[0x03, 0x80, 0x01]);

        let outcome = fx.emulator().handle_frame(&mut bus, P0);

        assert_eq!(outcome, Outcome::Unsupported(0x03));
        assert!(bus.line().written(P0).is_empty());
        assert_eq!(bus.line().unread(P0), 0);
    }

    #[test]
    fn test_missing_command_returns_to_idle() {
        let fx = Fixture::new();
        fx.controllers.set(P0, ControllerConfig::standard());
        let mut bus = bus();

        let outcome = fx.emulator().handle_frame(&mut bus, P0);

        assert_eq!(outcome, Outcome::NoCommand(ReadError::Timeout));
        assert!(bus.line().written(P0).is_empty());
    }

    #[test]
    fn test_telemetry_reset() {
        let telemetry = PollTelemetry::new();
        assert_eq!(telemetry.last_port(), None);
        telemetry.record(P1, [9, 8, 7, 6]);
        telemetry.reset();
        assert_eq!(telemetry.last_port(), None);
        assert_eq!(telemetry.events(), 0);
        assert_eq!(telemetry.last_input(), [0; 4]);
    }
}
