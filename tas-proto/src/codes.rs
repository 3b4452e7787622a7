//! Command and notification bytes exchanged with the host.
//!
//! Every message on the host channel starts with one of these bytes. The host
//! and the device use separate code spaces, so `0xD0` means "here is data" when
//! the host sends it and "please send data" when the device sends it.

/// Codes sent by the host.
pub mod host {
    /// Ignored filler byte.
    pub const NOP: u8 = 0x00;
    /// Select the emulated device: console id (3 bytes) + mode (1 byte).
    pub const SET_DEVICE: u8 = 0x80;
    /// Playback data: count (1 byte) + `count` data bytes.
    pub const DATASTREAM_DATA: u8 = 0xD0;
    /// Replace the controller configuration of all four ports.
    pub const CONTROLLER_CONFIG: u8 = 0xD1;
    /// Ask the device to describe itself.
    pub const DESCRIBE: u8 = b'd';
    /// Ask the device for its firmware version.
    pub const VERSION: u8 = b'v';
}

/// Codes sent by the device.
pub mod device {
    /// Free space notification: free byte count (1 byte).
    pub const DATASTREAM_REQUEST: u8 = 0xD0;
    /// Captured bus frame: port, size, request size, `size` bytes.
    pub const RAW_DATA: u8 = 0xB0;
    pub const DEBUG: u8 = 0xFC;
    pub const INFO: u8 = 0xFD;
    pub const WARN: u8 = 0xFE;
    pub const ERROR: u8 = 0xFF;
}

/// Terminator of log frames.
pub const LOG_TERMINATOR: u8 = b'\n';

/// Labels used in log frames. The host matches on these, keep them stable.
pub mod labels {
    pub const CONSOLE_N64: &str = "N64";

    pub const DEVICE_TYPE_DATASTREAM: &str = "DATASTREAM";
    pub const DEVICE_TYPE_RECORD: &str = "RECORD";

    pub const DEBUG_PORT_INFO: &str = "PORT_INFO";

    pub const INFO_DEVICE_INIT: &str = "DEVICE_INIT";
    pub const INFO_DESCRIBE: &str = "DESCRIBE";
    pub const INFO_VERSION: &str = "VERSION";

    pub const WARN_NO_DEVICE: &str = "NO_DEVICE";
    pub const WARN_OP_NOT_IMPLEMENTED: &str = "OP_NOT_IMPLEMENTED";
    pub const WARN_UNKNOWN_CONSOLE_CMD: &str = "UNKNOWN_CONSOLE_CMD";
    pub const WARN_UNKNOWN_HOST_CMD: &str = "UNKNOWN_HOST_CMD";

    pub const ERROR_UNKNOWN_DEVICE: &str = "UNKNOWN_DEVICE";
    pub const ERROR_UNKNOWN_MODE: &str = "UNKNOWN_MODE";
    pub const ERROR_DATASTREAM_OVERFLOW: &str = "DATASTREAM_OVERFLOW";
    pub const ERROR_DATASTREAM_UNDERFLOW: &str = "DATASTREAM_UNDERFLOW";
    pub const ERROR_BUFFER_OVERFLOW: &str = "BUFFER_OVERFLOW";
    pub const ERROR_BUFFER_UNDERFLOW: &str = "BUFFER_UNDERFLOW";
}
