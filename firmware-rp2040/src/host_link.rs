//! USB CDC-ACM link to the host.
//!
//! Incoming packets are fed byte by byte to a [`tas_proto::HostParser`].
//! Outgoing messages are queued in an [`Outbox`] while commands are handled
//! and written out afterwards in max-packet chunks.

use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::driver::EndpointError;
use embassy_usb::Builder;
use heapless::Vec;
use joybus_core::{MessageSink, SinkError};

/// Bulk endpoint size.
pub const MAX_PACKET_SIZE: u16 = 64;

/// Bytes queued towards the host between flushes.
pub const OUTBOX_CAPACITY: usize = 2048;

pub type HostClass<'d> = CdcAcmClass<'d, Driver<'d, USB>>;

/// Add the CDC-ACM interface to the USB device.
pub fn configure_usb_cdc<'d>(
    builder: &mut Builder<'d, Driver<'d, USB>>,
    state: &'d mut State<'d>,
) -> HostClass<'d> {
    CdcAcmClass::new(builder, state, MAX_PACKET_SIZE)
}

/// Encoded device → host messages waiting to be written.
#[derive(Default)]
pub struct Outbox {
    buffer: Vec<u8, OUTBOX_CAPACITY>,
}

impl Outbox {
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop everything queued, e.g. after the host went away.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Write all queued bytes to the host.
    ///
    /// A transfer that ends on a full packet is terminated with a
    /// zero-length packet so the host does not wait for more. The outbox is
    /// emptied even if the write fails.
    pub async fn flush(&mut self, class: &mut HostClass<'_>) -> Result<(), EndpointError> {
        let result = write_all(class, &self.buffer).await;
        self.buffer.clear();
        result
    }
}

async fn write_all(class: &mut HostClass<'_>, bytes: &[u8]) -> Result<(), EndpointError> {
    if bytes.is_empty() {
        return Ok(());
    }
    let packet = usize::from(class.max_packet_size());
    for chunk in bytes.chunks(packet) {
        class.write_packet(chunk).await?;
    }
    if bytes.len() % packet == 0 {
        class.write_packet(&[]).await?;
    }
    Ok(())
}

impl MessageSink for Outbox {
    fn write_message(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        // Nothing is queued if the whole message does not fit.
        self.buffer
            .extend_from_slice(bytes)
            .map_err(|_| SinkError::Full)
    }
}
