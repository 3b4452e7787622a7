//! Incremental parser for host → device commands.
//!
//! The host channel is a raw byte stream with no framing beyond the leading
//! command byte, so the parser is fed one byte at a time and yields a
//! [`HostCommand`] as soon as the last byte of a command arrives.
//!
//! # Example
//!
//! ```
//! use tas_proto::{HostCommand, HostParser};
//!
//! let mut parser = HostParser::new();
//! let mut out = None;
//! for &b in &[0xD0, 0x02, 0x11, 0x22] {
//!     out = parser.push_byte(b).unwrap();
//! }
//! match out {
//!     Some(HostCommand::DatastreamData(data)) => assert_eq!(&data[..], &[0x11, 0x22]),
//!     _ => panic!("expected data"),
//! }
//! ```

use crate::codes::host;
use crate::types::{ConsoleId, ControllerConfig, DeviceMode, PORT_COUNT};

/// Largest payload a single `DATASTREAM_DATA` command can carry.
pub const MAX_DATA_LEN: usize = u8::MAX as usize;

/// Length of the `CONTROLLER_CONFIG` payload: 4 × (connected, header[3]).
pub const CONTROLLER_CONFIG_LEN: usize = PORT_COUNT * 4;

/// Payload of a `DATASTREAM_DATA` command.
pub type DataBytes = heapless::Vec<u8, MAX_DATA_LEN>;

/// A fully received host command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Nop,
    SetDevice { console: ConsoleId, mode: DeviceMode },
    DatastreamData(DataBytes),
    /// New configuration for every port, in port order.
    ControllerConfig([ControllerConfig; PORT_COUNT]),
    Describe,
    Version,
}

/// Parser error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Leading byte does not name a known command.
    UnknownCommand(u8),
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownCommand(b) => write!(f, "unknown host command 0x{b:02X}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ParserState {
    WaitingForCommand,
    SetDevice { pos: usize },
    DataCount,
    Data { remaining: usize },
    ControllerConfig { pos: usize },
}

/// Host command parser.
pub struct HostParser {
    state: ParserState,
    scratch: [u8; CONTROLLER_CONFIG_LEN],
    data: DataBytes,
}

impl Default for HostParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HostParser {
    /// Create a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ParserState::WaitingForCommand,
            scratch: [0; CONTROLLER_CONFIG_LEN],
            data: heapless::Vec::new(),
        }
    }

    /// Drop any partially received command.
    pub fn reset(&mut self) {
        self.state = ParserState::WaitingForCommand;
        self.data.clear();
    }

    /// `true` while a command has been started but not completed.
    #[must_use]
    pub fn in_command(&self) -> bool {
        self.state != ParserState::WaitingForCommand
    }

    /// Feed a byte to the parser.
    ///
    /// Returns `Ok(Some(command))` when `byte` completes a command.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnknownCommand`] when a command byte is not
    /// recognised. The parser is reset and expects a command byte next.
    pub fn push_byte(&mut self, byte: u8) -> Result<Option<HostCommand>, ParseError> {
        match self.state {
            ParserState::WaitingForCommand => self.start(byte),
            ParserState::SetDevice { pos } => {
                self.scratch[pos] = byte;
                if pos + 1 < 4 {
                    self.state = ParserState::SetDevice { pos: pos + 1 };
                    return Ok(None);
                }
                self.reset();
                let console = [self.scratch[0], self.scratch[1], self.scratch[2]];
                Ok(Some(HostCommand::SetDevice {
                    console,
                    mode: DeviceMode::from_byte(self.scratch[3]),
                }))
            }
            ParserState::DataCount => {
                if byte == 0 {
                    self.reset();
                    return Ok(Some(HostCommand::DatastreamData(DataBytes::new())));
                }
                self.data.clear();
                self.state = ParserState::Data {
                    remaining: byte as usize,
                };
                Ok(None)
            }
            ParserState::Data { remaining } => {
                // Capacity covers any u8 count, so this never rejects.
                let _ = self.data.push(byte);
                if remaining > 1 {
                    self.state = ParserState::Data {
                        remaining: remaining - 1,
                    };
                    return Ok(None);
                }
                let data = core::mem::take(&mut self.data);
                self.reset();
                Ok(Some(HostCommand::DatastreamData(data)))
            }
            ParserState::ControllerConfig { pos } => {
                self.scratch[pos] = byte;
                if pos + 1 < CONTROLLER_CONFIG_LEN {
                    self.state = ParserState::ControllerConfig { pos: pos + 1 };
                    return Ok(None);
                }
                self.reset();
                let mut configs = [ControllerConfig::DISCONNECTED; PORT_COUNT];
                for (config, raw) in configs.iter_mut().zip(self.scratch.chunks_exact(4)) {
                    *config = ControllerConfig::from_wire([raw[0], raw[1], raw[2], raw[3]]);
                }
                Ok(Some(HostCommand::ControllerConfig(configs)))
            }
        }
    }

    fn start(&mut self, byte: u8) -> Result<Option<HostCommand>, ParseError> {
        match byte {
            host::NOP => Ok(Some(HostCommand::Nop)),
            host::DESCRIBE => Ok(Some(HostCommand::Describe)),
            host::VERSION => Ok(Some(HostCommand::Version)),
            host::SET_DEVICE => {
                self.state = ParserState::SetDevice { pos: 0 };
                Ok(None)
            }
            host::DATASTREAM_DATA => {
                self.state = ParserState::DataCount;
                Ok(None)
            }
            host::CONTROLLER_CONFIG => {
                self.state = ParserState::ControllerConfig { pos: 0 };
                Ok(None)
            }
            other => {
                self.reset();
                Err(ParseError::UnknownCommand(other))
            }
        }
    }
}
