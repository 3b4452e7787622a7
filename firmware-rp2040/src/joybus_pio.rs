//! PIO implementation of the joybus bit sampler.
//!
//! One program is loaded once and run on all four state machines of `PIO0`,
//! one state machine per controller port. Each state machine:
//!
//! - raises its relative IRQ flag on the first falling edge of a frame,
//! - samples every bit 2 µs after its falling edge and autopushes whole bytes,
//! - once the line has stayed high for ~12 µs, pushes the partial byte
//!   followed by the inverted number of bits seen (always `> 0xFF`),
//! - on demand, transmits a reply by toggling the pin direction, so the line
//!   is only ever driven low or released (open drain).
//!
//! # Pins
//!
//! | Port | GPIO |
//! |------|------|
//! | 1    | 6    |
//! | 2    | 7    |
//! | 3    | 26   |
//! | 4    | 27   |

use embassy_rp::clocks::clk_sys_freq;
use embassy_rp::gpio::{Level, Pull};
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio::{
    Common, Config, Direction, IrqFlags, LoadedProgram, Pin, ShiftConfig, ShiftDirection,
    StateMachine,
};
use fixed::traits::ToFixed;
use joybus_core::{MicroClock, OneLine, Port};

/// State machine clock: 16 cycles per 4 µs bus bit.
pub const BUS_SM_HZ: u32 = 4_000_000;

/// Relative IRQ flags `0..=3` raised by state machines `0..=3`.
const FRAME_IRQ_MASK: u32 = 0xF << 8;

/// Bit sampler over the four `PIO0` state machines.
pub struct PioOneLine<'d> {
    sm0: StateMachine<'d, PIO0, 0>,
    sm1: StateMachine<'d, PIO0, 1>,
    sm2: StateMachine<'d, PIO0, 2>,
    sm3: StateMachine<'d, PIO0, 3>,
    irq_flags: IrqFlags<'d, PIO0>,
    reset_bit: u8,
    write_reply: u8,
    _pins: [Pin<'d, PIO0>; 4],
}

/// Run `$body` with `$sm` bound to the state machine serving `$port`.
macro_rules! with_sm {
    ($self:ident, $port:expr, |$sm:ident| $body:expr) => {
        match $port.index() {
            0 => {
                let $sm = &mut $self.sm0;
                $body
            }
            1 => {
                let $sm = &mut $self.sm1;
                $body
            }
            2 => {
                let $sm = &mut $self.sm2;
                $body
            }
            _ => {
                let $sm = &mut $self.sm3;
                $body
            }
        }
    };
}

impl<'d> PioOneLine<'d> {
    /// Load the program and start all four state machines.
    ///
    /// `pins` are the bus pins for ports 1-4, in order.
    pub fn new(
        common: &mut Common<'d, PIO0>,
        sms: (
            StateMachine<'d, PIO0, 0>,
            StateMachine<'d, PIO0, 1>,
            StateMachine<'d, PIO0, 2>,
            StateMachine<'d, PIO0, 3>,
        ),
        irq_flags: IrqFlags<'d, PIO0>,
        mut pins: [Pin<'d, PIO0>; 4],
    ) -> Self {
        let prg = pio::pio_asm!(
            r#"
            public reset_bit:
                set pindirs, 0
                mov isr, null
                mov x, !null            ; x counts bits down from all-ones
                wait 1 pin 0
                wait 0 pin 0
                irq 0 rel               ; frame start
            read_bit:
                nop [7]
                in pins, 1
                jmp x-- bit_counted
            bit_counted:
                wait 1 pin 0
                set y, 15
            idle:
                jmp pin still_high
                jmp read_bit
            still_high:
                jmp y-- idle
                push                    ; partial byte, possibly empty
                mov isr, x
                push                    ; inverted bit count
                jmp reset_bit

            public write_reply:
                out x, 32               ; bits - 1
            write_bit:
                set pindirs, 1 [3]
                out pindirs, 1 [7]
                set pindirs, 0 [2]
                jmp x-- write_bit
                set pindirs, 1 [7]      ; stop bit
                jmp reset_bit
            "#
        );

        let loaded = common.load_program(&prg.program);
        let reset_bit = loaded.origin + prg.public_defines.reset_bit as u8;
        let write_reply = loaded.origin + prg.public_defines.write_reply as u8;

        for pin in pins.iter_mut() {
            pin.set_pull(Pull::Up);
        }

        let (mut sm0, mut sm1, mut sm2, mut sm3) = sms;
        configure(&mut sm0, &loaded, &pins[0]);
        configure(&mut sm1, &loaded, &pins[1]);
        configure(&mut sm2, &loaded, &pins[2]);
        configure(&mut sm3, &loaded, &pins[3]);

        Self {
            sm0,
            sm1,
            sm2,
            sm3,
            irq_flags,
            reset_bit,
            write_reply,
            _pins: pins,
        }
    }
}

fn configure<'a, const SM: usize>(
    sm: &mut StateMachine<'a, PIO0, SM>,
    program: &LoadedProgram<'a, PIO0>,
    pin: &Pin<'a, PIO0>,
) {
    let mut cfg = Config::default();
    cfg.use_program(program, &[]);
    cfg.set_in_pins(&[pin]);
    cfg.set_out_pins(&[pin]);
    cfg.set_set_pins(&[pin]);
    cfg.set_jmp_pin(pin);

    cfg.shift_in = ShiftConfig {
        threshold: 8,
        direction: ShiftDirection::Left,
        auto_fill: true,
    };
    cfg.shift_out = ShiftConfig {
        threshold: 32,
        direction: ShiftDirection::Left,
        auto_fill: true,
    };
    cfg.clock_divider = (clk_sys_freq() as f32 / BUS_SM_HZ as f32).to_fixed();

    sm.set_config(&cfg);
    sm.set_pins(Level::Low, &[pin]);
    sm.set_pin_dirs(Direction::In, &[pin]);
    sm.set_enable(true);
}

impl OneLine for PioOneLine<'_> {
    #[inline]
    fn try_read(&mut self, port: Port) -> Option<u32> {
        with_sm!(self, port, |sm| sm.rx().try_pull())
    }

    fn write_blocking(&mut self, port: Port, word: u32) {
        with_sm!(self, port, |sm| while !sm.tx().try_push(word) {
            core::hint::spin_loop();
        })
    }

    fn abort_read(&mut self, port: Port) {
        let target = self.reset_bit;
        with_sm!(self, port, |sm| {
            sm.clear_fifos();
            // SAFETY: `reset_bit` is an entry point of the program loaded
            // into this state machine.
            unsafe { sm.exec_jmp(target) };
        })
    }

    fn start_reply(&mut self, port: Port, bits: u32) {
        let target = self.write_reply;
        with_sm!(self, port, |sm| {
            sm.restart();
            sm.clear_fifos();
            // SAFETY: `write_reply` is an entry point of the program loaded
            // into this state machine; it pulls the bit count next.
            unsafe { sm.exec_jmp(target) };
            while !sm.tx().try_push(bits.saturating_sub(1)) {
                core::hint::spin_loop();
            }
        })
    }

    #[inline]
    fn irq_pending(&self, port: Port) -> bool {
        self.irq_flags.check(port.index() as u8)
    }

    #[inline]
    fn clear_irq(&mut self, port: Port) {
        self.irq_flags.clear(port.index() as usize);
    }
}

/// Route the frame-start flags of all four state machines to `PIO0_IRQ_1`.
///
/// `PIO0_IRQ_0` stays with the embassy driver.
pub fn enable_frame_irqs() {
    embassy_rp::pac::PIO0
        .irqs(1)
        .inte()
        .modify(|w| w.0 |= FRAME_IRQ_MASK);
}

/// Microsecond clock backed by the embassy time driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimerClock;

impl MicroClock for TimerClock {
    #[inline]
    fn now_us(&self) -> u32 {
        embassy_time::Instant::now().as_micros() as u32
    }
}
