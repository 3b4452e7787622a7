//! Console commands understood by an emulated controller.

/// First byte of every console frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Identify,
    Reset,
    PollInputs,
    Unknown(u8),
}

impl Command {
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::Identify,
            0xFF => Self::Reset,
            0x01 => Self::PollInputs,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Identify => 0x00,
            Self::Reset => 0xFF,
            Self::PollInputs => 0x01,
            Self::Unknown(other) => other,
        }
    }

    /// Request bytes following the command byte.
    #[must_use]
    pub const fn request_len(self) -> Option<usize> {
        match self {
            Self::Identify | Self::Reset | Self::PollInputs => Some(0),
            Self::Unknown(_) => None,
        }
    }

    /// Bytes the controller answers with.
    #[must_use]
    pub const fn response_len(self) -> Option<usize> {
        match self {
            Self::Identify | Self::Reset => Some(3),
            Self::PollInputs => Some(4),
            Self::Unknown(_) => None,
        }
    }
}
