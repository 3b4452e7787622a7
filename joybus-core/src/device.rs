//! The emulated device: shared state and the bus-side dispatcher.
//!
//! [`DeviceState`] is the single context shared by the host task and the bus
//! interrupt. The host side selects a [`DeviceKind`]; the interrupt side
//! ([`BusDevice`]) reads it once per frame and runs the matching handler.

use portable_atomic::{AtomicU8, Ordering};

use crate::bus::BitBus;
use crate::controller::{ControllerEmulator, ControllerTable, PollTelemetry};
use crate::line::OneLine;
use crate::port::Port;
use crate::recorder::Recorder;
use crate::ring_buffer::RingBuffer;
use crate::router::FrameHandler;
use crate::timing::MicroClock;

/// Playback bytes buffered between host and console (32 polls).
pub const PLAYBACK_CAPACITY: usize = 128;

/// Capture bytes buffered between bus and host.
pub const CAPTURE_CAPACITY: usize = 512;

/// Neutral input: no buttons, centred stick.
pub const PLAYBACK_UNDERFLOW_VALUE: u8 = 0x00;

/// Which device the bus interrupt emulates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DeviceKind {
    /// Nothing selected: frames are consumed and ignored.
    Dummy = 0,
    /// Controller fed from the host data stream.
    Datastream = 1,
    /// Passive capture of bus traffic.
    Recorder = 2,
}

impl DeviceKind {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Datastream,
            2 => Self::Recorder,
            _ => Self::Dummy,
        }
    }
}

/// State shared between the host task and the bus interrupt.
pub struct DeviceState {
    kind: AtomicU8,
    pub controllers: ControllerTable,
    pub playback: RingBuffer<u8, PLAYBACK_CAPACITY>,
    pub capture: RingBuffer<u8, CAPTURE_CAPACITY>,
    pub telemetry: PollTelemetry,
    /// Last console command the recorder could not handle, `0` for none.
    pub last_invalid: AtomicU8,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            kind: AtomicU8::new(DeviceKind::Dummy as u8),
            controllers: ControllerTable::new(),
            playback: RingBuffer::new(PLAYBACK_UNDERFLOW_VALUE),
            capture: RingBuffer::new(0),
            telemetry: PollTelemetry::new(),
            last_invalid: AtomicU8::new(0),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        DeviceKind::from_u8(self.kind.load(Ordering::Acquire))
    }

    /// Switch devices.
    ///
    /// The interrupt side is parked on [`DeviceKind::Dummy`] while buffers,
    /// telemetry and controller configuration are reset, then the new kind is
    /// published. Must be called from a context the bus interrupt preempts,
    /// so no frame is in progress while the reset runs.
    pub fn select(&self, kind: DeviceKind) {
        self.kind.store(DeviceKind::Dummy as u8, Ordering::Release);

        self.playback.clear();
        self.capture.clear();
        self.telemetry.reset();
        self.controllers.clear();
        self.last_invalid.store(0, Ordering::Relaxed);

        self.kind.store(kind as u8, Ordering::Release);
    }
}

/// Interrupt-side dispatcher over the selected device.
pub struct BusDevice<'a> {
    state: &'a DeviceState,
    emulator: ControllerEmulator<'a, PLAYBACK_CAPACITY>,
    recorder: Recorder<'a, CAPTURE_CAPACITY>,
}

impl<'a> BusDevice<'a> {
    pub fn new(state: &'a DeviceState) -> Self {
        Self {
            state,
            emulator: ControllerEmulator::new(
                &state.controllers,
                &state.playback,
                &state.telemetry,
            ),
            recorder: Recorder::new(&state.capture, &state.last_invalid),
        }
    }
}

impl FrameHandler for BusDevice<'_> {
    fn handle_frame<L: OneLine, C: MicroClock>(&mut self, bus: &mut BitBus<L, C>, port: Port) {
        match self.state.kind() {
            DeviceKind::Dummy => bus.read_discard(port),
            DeviceKind::Datastream => {
                self.emulator.handle_frame(bus, port);
            }
            DeviceKind::Recorder => {
                self.recorder.handle_frame(bus, port);
            }
        }
    }
}
