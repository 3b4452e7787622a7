//! Host wire protocol for the joybus TAS controller.
//!
//! The host (a PC replaying or recording a movie) talks to the device over a
//! plain byte stream. Every message starts with a one-byte command:
//!
//! - **Host → device**: device selection, playback data, controller
//!   configuration, describe/version queries. Decoded incrementally with
//!   [`HostParser`].
//! - **Device → host**: playback data requests, captured bus frames and
//!   newline-terminated log frames. Encoded with [`DeviceMessage::encode`].
//!
//! # Example
//!
//! ```
//! use tas_proto::{DeviceMessage, HostCommand, HostParser};
//!
//! let mut parser = HostParser::new();
//! let mut cmd = None;
//! for &b in b"\x80N64\x03" {
//!     cmd = parser.push_byte(b).unwrap();
//! }
//! assert!(matches!(cmd, Some(HostCommand::SetDevice { .. })));
//!
//! let mut buf = [0u8; 8];
//! let len = DeviceMessage::DatastreamRequest(128).encode(&mut buf).unwrap();
//! assert_eq!(&buf[..len], &[0xD0, 128]);
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting (for embedded logging)

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod codes;
pub mod message;
pub mod parser;
pub mod types;

pub use codes::labels;
pub use message::{DeviceMessage, EncodeError, LogDetail, MAX_RAW_FRAME};
pub use parser::{
    DataBytes, HostCommand, HostParser, ParseError, CONTROLLER_CONFIG_LEN, MAX_DATA_LEN,
};
pub use types::{ConsoleId, ControllerConfig, DeviceMode, LogLevel, CONSOLE_N64, PORT_COUNT};
