//! N64 controller emulation and bus capture for RP2040.
//!
//! The firmware sits between a PC running a tool-assisted movie and up to four
//! N64 controller ports. It either answers console polls with input streamed
//! from the host, or passively records the console's bus traffic.
//!
//! # Overview
//!
//! The firmware runs on a Raspberry Pi Pico (RP2040) and:
//! 1. Samples the four joybus lines with one PIO state machine per port
//! 2. Answers each console frame from the `PIO0_IRQ_1` interrupt
//! 3. Exchanges commands, playback data and captured frames with the host
//!    over USB CDC-ACM
//!
//! # Hardware Configuration
//!
//! | Function | GPIO | Description |
//! |----------|------|-------------|
//! | Port 1   | 6    | Joybus data line, controller port 1 |
//! | Port 2   | 7    | Joybus data line, controller port 2 |
//! | Port 3   | 26   | Joybus data line, controller port 3 |
//! | Port 4   | 27   | Joybus data line, controller port 4 |
//! | LED      | 25   | On-board LED (status, see [`status`]) |
//! | USB      | -    | CDC-ACM host link, VID/PID `0x1209:0x0001` |
//!
//! # Architecture
//!
//! - **Bus interrupt** (`PIO0_IRQ_1`, highest priority): runs a
//!   [`PortRouter`](joybus_core::PortRouter) over [`PioOneLine`] and the
//!   selected device. Console frames are answered inside the interrupt.
//! - **USB Task**: Manages the USB device stack
//! - **Host Task**: Parses host commands, drives the
//!   [`Session`](joybus_core::Session) and flushes the [`Outbox`]
//!
//! The interrupt and the host task share a static
//! [`DeviceState`](joybus_core::DeviceState) and nothing else.
//!
//! # Modules
//!
//! - [`joybus_pio`]: PIO bit sampler ([`PioOneLine`], [`TimerClock`])
//! - [`host_link`]: USB CDC-ACM host link ([`Outbox`])
//! - [`status`]: Status LED ([`StatusLed`])
//!
//! # Features
//!
//! - **`dev-panic`** (default): Use `panic-probe` for development (prints panic info via RTT)
//! - **`prod-panic`**: Use `panic-reset` for production (silent watchdog reset)
//! - **`led-datastream-status`** (default): LED on while a playback data request is outstanding
//! - **`led-bus-activity`**: LED on while a console frame is serviced

#![no_std]

// The LED can only show one thing
#[cfg(all(feature = "led-datastream-status", feature = "led-bus-activity"))]
compile_error!("Cannot enable both `led-datastream-status` and `led-bus-activity` features - they drive the same LED");

pub mod host_link;
pub mod joybus_pio;
pub mod status;

pub use host_link::{configure_usb_cdc, HostClass, Outbox, MAX_PACKET_SIZE, OUTBOX_CAPACITY};
pub use joybus_pio::{enable_frame_irqs, PioOneLine, TimerClock, BUS_SM_HZ};
pub use status::StatusLed;
