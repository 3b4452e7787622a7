//! Platform-agnostic joybus controller emulation.
//!
//! This crate holds everything between the bit-sampling peripheral and the
//! host byte stream, without any chip-specific dependencies. It runs in
//! `no_std` firmware and on the host for testing.
//!
//! # Overview
//!
//! - [`ring_buffer`]: SPSC buffer with sticky overflow/underflow flags ([`RingBuffer`])
//! - [`line`]: Hardware seam for the bit sampler ([`OneLine`])
//! - [`bus`]: Framed byte reads and replies ([`BitBus`], [`Writer`])
//! - [`router`]: Bus interrupt dispatch ([`PortRouter`], [`FrameHandler`])
//! - [`controller`]: Emulated controller ([`ControllerEmulator`], [`ControllerTable`])
//! - [`recorder`]: Passive bus capture ([`Recorder`])
//! - [`flow`]: Playback data requests ([`StreamFlowController`])
//! - [`device`]: Shared state and device selection ([`DeviceState`], [`BusDevice`])
//! - [`session`]: Host command handling ([`Session`], [`MessageSink`])
//!
//! # Execution contexts
//!
//! Two contexts share a [`DeviceState`]:
//!
//! - the **bus interrupt** runs [`PortRouter::on_interrupt`], which answers the
//!   console within the protocol's timing budget,
//! - the **host task** feeds [`Session`] with parsed host commands and calls
//!   [`Session::update`] between reads.
//!
//! They communicate only through atomics and single-producer single-consumer
//! ring buffers.
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting (for embedded logging)

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod bus;
pub mod command;
pub mod controller;
pub mod device;
pub mod flow;
pub mod line;
pub mod port;
pub mod recorder;
pub mod ring_buffer;
pub mod router;
pub mod session;
pub mod timing;

#[cfg(test)]
mod mock;

pub use bus::{BitBus, FrameRead, ReadError, Writer};
pub use command::Command;
pub use controller::{ControllerEmulator, ControllerTable, Outcome, Phase, PollTelemetry};
pub use device::{
    BusDevice, DeviceKind, DeviceState, CAPTURE_CAPACITY, PLAYBACK_CAPACITY,
    PLAYBACK_UNDERFLOW_VALUE,
};
pub use flow::StreamFlowController;
pub use line::OneLine;
pub use port::Port;
pub use recorder::{Capture, Recorder, FRAME_CAPACITY};
pub use ring_buffer::RingBuffer;
pub use router::{FrameHandler, PortRouter};
pub use session::{MessageSink, Session, SessionError, SinkError, MAX_MESSAGE_LEN};
pub use timing::{MicroClock, READ_TIMEOUT_US, REPLY_DELAY_US};
