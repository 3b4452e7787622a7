//! Device → host messages.
//!
//! # Wire format
//!
//! ```text
//! 0xD0 <free>                                  datastream request
//! 0xB0 <port> <size> <request size> <frame>    captured bus frame
//! 0xFC..=0xFF <label>[ <detail>]\n             log frame
//! ```
//!
//! Byte details of a log frame are rendered as uppercase hex so the whole
//! frame stays printable text.

use crate::codes::{device, LOG_TERMINATOR};
use crate::types::LogLevel;

/// Largest frame a `RAW_DATA` message can carry (size is one byte).
pub const MAX_RAW_FRAME: usize = u8::MAX as usize;

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Optional detail appended to a log label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDetail<'a> {
    None,
    Text(&'a str),
    /// Rendered as two hex digits per byte.
    Hex(&'a [u8]),
}

/// A message sent from the device to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMessage<'a> {
    /// Free space in the playback buffer.
    DatastreamRequest(u8),
    /// One captured bus frame. `frame` starts with the console command byte;
    /// its first `request_len` bytes came from the console, the rest from the
    /// controller.
    RawData {
        port: u8,
        request_len: u8,
        frame: &'a [u8],
    },
    Log {
        level: LogLevel,
        label: &'a str,
        detail: LogDetail<'a>,
    },
}

/// Error type for encoding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// The output buffer is too small to hold the encoded message.
    BufferTooSmall,
    /// A raw frame is longer than its one-byte length field allows.
    FrameTooLong,
}

impl core::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::FrameTooLong => write!(f, "frame too long"),
        }
    }
}

/// Bounds-checked cursor over the output buffer.
struct EncodeBuf<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> EncodeBuf<'a> {
    #[inline]
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    fn write(&mut self, byte: u8) -> Result<(), EncodeError> {
        let slot = self.buf.get_mut(self.pos).ok_or(EncodeError::BufferTooSmall)?;
        *slot = byte;
        self.pos += 1;
        Ok(())
    }

    #[inline]
    fn write_slice(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        let end = self.pos + bytes.len();
        let dst = self
            .buf
            .get_mut(self.pos..end)
            .ok_or(EncodeError::BufferTooSmall)?;
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn write_hex(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        for &b in bytes {
            self.write(HEX[(b >> 4) as usize])?;
            self.write(HEX[(b & 0x0F) as usize])?;
        }
        Ok(())
    }

    #[inline]
    fn finish(self) -> usize {
        self.pos
    }
}

impl<'a> DeviceMessage<'a> {
    /// A log frame without detail.
    #[must_use]
    pub const fn log(level: LogLevel, label: &'a str) -> Self {
        Self::Log {
            level,
            label,
            detail: LogDetail::None,
        }
    }

    /// Number of bytes [`encode`](Self::encode) writes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::DatastreamRequest(_) => 2,
            Self::RawData { frame, .. } => 4 + frame.len(),
            Self::Log { label, detail, .. } => {
                let detail_len = match detail {
                    LogDetail::None => 0,
                    LogDetail::Text(text) => 1 + text.len(),
                    LogDetail::Hex(bytes) => 1 + bytes.len() * 2,
                };
                1 + label.len() + detail_len + 1
            }
        }
    }

    /// Encode into `buf`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// - [`EncodeError::BufferTooSmall`] if `buf` cannot hold the message.
    /// - [`EncodeError::FrameTooLong`] if a raw frame exceeds [`MAX_RAW_FRAME`].
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut out = EncodeBuf::new(buf);
        match *self {
            Self::DatastreamRequest(free) => {
                out.write(device::DATASTREAM_REQUEST)?;
                out.write(free)?;
            }
            Self::RawData {
                port,
                request_len,
                frame,
            } => {
                let size = u8::try_from(frame.len()).map_err(|_| EncodeError::FrameTooLong)?;
                out.write(device::RAW_DATA)?;
                out.write(port)?;
                out.write(size)?;
                out.write(request_len)?;
                out.write_slice(frame)?;
            }
            Self::Log {
                level,
                label,
                detail,
            } => {
                out.write(level.code())?;
                out.write_slice(label.as_bytes())?;
                match detail {
                    LogDetail::None => {}
                    LogDetail::Text(text) => {
                        out.write(b' ')?;
                        out.write_slice(text.as_bytes())?;
                    }
                    LogDetail::Hex(bytes) => {
                        out.write(b' ')?;
                        out.write_hex(bytes)?;
                    }
                }
                out.write(LOG_TERMINATOR)?;
            }
        }
        Ok(out.finish())
    }
}
