//! On-board status LED.
//!
//! What the LED shows is chosen at build time:
//!
//! - **`led-datastream-status`**: on while a playback data request is
//!   waiting for the host's answer. A LED that stays lit means the host has
//!   stopped feeding data.
//! - **`led-bus-activity`**: on while a console frame is being serviced.

use embedded_hal::digital::OutputPin;

/// Status LED on any push-pull output.
pub struct StatusLed<P> {
    pin: P,
    lit: bool,
}

impl<P: OutputPin> StatusLed<P> {
    /// Take the pin and switch the LED off.
    pub fn new(mut pin: P) -> Self {
        let _ = pin.set_low();
        Self { pin, lit: false }
    }

    /// Switch the LED; the pin is only written on change.
    #[inline]
    pub fn set(&mut self, lit: bool) {
        if lit == self.lit {
            return;
        }
        self.lit = lit;
        // GPIO writes on the RP2040 are infallible.
        let _ = if lit {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
    }

    #[inline]
    #[must_use]
    pub fn is_lit(&self) -> bool {
        self.lit
    }
}
