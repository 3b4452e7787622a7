//! Protocol-level types: controller configuration, device selection, log levels.

use crate::codes::device;

/// Number of controller ports on the console.
pub const PORT_COUNT: usize = 4;

/// Configuration of one emulated controller port.
///
/// `header` is the 3-byte identity returned for the identify and reset
/// commands. A standard controller without an accessory answers
/// `[0x05, 0x00, 0x02]`.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerConfig {
    pub connected: bool,
    pub header: [u8; 3],
}

impl ControllerConfig {
    /// Header of a standard controller with an empty accessory slot.
    pub const STANDARD_HEADER: [u8; 3] = [0x05, 0x00, 0x02];

    /// A port with nothing plugged in.
    pub const DISCONNECTED: Self = Self {
        connected: false,
        header: [0; 3],
    };

    /// A connected standard controller.
    #[inline]
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            connected: true,
            header: Self::STANDARD_HEADER,
        }
    }

    /// Decode the 4-byte wire form: connectedness byte (0 = disconnected)
    /// followed by the header.
    #[inline]
    #[must_use]
    pub const fn from_wire(raw: [u8; 4]) -> Self {
        Self {
            connected: raw[0] != 0,
            header: [raw[1], raw[2], raw[3]],
        }
    }
}

/// Device mode requested by `SET_DEVICE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceMode {
    Playback,
    Record,
    Realtime,
    /// Playback fed by a continuous host stream (the host sends data on request).
    Datastream,
    Unknown(u8),
}

impl DeviceMode {
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Playback,
            1 => Self::Record,
            2 => Self::Realtime,
            3 => Self::Datastream,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Playback => 0,
            Self::Record => 1,
            Self::Realtime => 2,
            Self::Datastream => 3,
            Self::Unknown(other) => other,
        }
    }
}

/// Three-letter console identifier, e.g. `*b"N64"`.
pub type ConsoleId = [u8; 3];

pub const CONSOLE_N64: ConsoleId = *b"N64";

/// Severity of an operator log frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Command byte that opens a log frame of this level.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Debug => device::DEBUG,
            Self::Info => device::INFO,
            Self::Warn => device::WARN,
            Self::Error => device::ERROR,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            device::DEBUG => Some(Self::Debug),
            device::INFO => Some(Self::Info),
            device::WARN => Some(Self::Warn),
            device::ERROR => Some(Self::Error),
            _ => None,
        }
    }
}
