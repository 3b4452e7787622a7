//! Dispatch of bus interrupts to the port that raised them.

use crate::bus::BitBus;
use crate::line::OneLine;
use crate::port::Port;
use crate::timing::MicroClock;

/// Handles one console frame on a port.
pub trait FrameHandler {
    fn handle_frame<L: OneLine, C: MicroClock>(&mut self, bus: &mut BitBus<L, C>, port: Port);
}

/// Context bound to the bus interrupt at registration time.
pub struct PortRouter<L, C, H> {
    bus: BitBus<L, C>,
    handler: H,
}

impl<L: OneLine, C: MicroClock, H: FrameHandler> PortRouter<L, C, H> {
    pub fn new(bus: BitBus<L, C>, handler: H) -> Self {
        Self { bus, handler }
    }

    /// First port with a pending frame, checked in port order.
    pub fn pending_port(&self) -> Option<Port> {
        Port::ALL
            .into_iter()
            .find(|&port| self.bus.line().irq_pending(port))
    }

    /// Run on every bus interrupt: serve exactly one pending port, then
    /// acknowledge it. Other pending ports re-raise the interrupt.
    pub fn on_interrupt(&mut self) -> Option<Port> {
        let port = self.pending_port()?;
        self.handler.handle_frame(&mut self.bus, port);
        self.bus.line_mut().clear_irq(port);
        Some(port)
    }

    pub fn bus(&self) -> &BitBus<L, C> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut BitBus<L, C> {
        &mut self.bus
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn into_parts(self) -> (BitBus<L, C>, H) {
        (self.bus, self.handler)
    }
}
