//! Protocol timing constants and the microsecond clock used to enforce them.

/// Longest silence tolerated while a frame is in progress: one on-wire byte
/// (8 bits × 4 µs) plus the hand-off bit and margin.
pub const READ_TIMEOUT_US: u32 = 48;

/// Delay between the end of a console command and the start of the reply.
/// Replies sent sooner are ignored by the console.
pub const REPLY_DELAY_US: u32 = 5;

/// Free-running microsecond counter.
///
/// Deadlines are far below scheduler granularity, so waits spin on the
/// counter instead of yielding.
pub trait MicroClock {
    /// Current time in microseconds. Wraps at `u32::MAX`.
    fn now_us(&self) -> u32;

    /// `true` once `timeout_us` have passed since `start`.
    #[inline]
    fn elapsed(&self, start: u32, timeout_us: u32) -> bool {
        self.now_us().wrapping_sub(start) >= timeout_us
    }

    /// Busy-wait for `us` microseconds.
    #[inline]
    fn spin_us(&self, us: u32) {
        let start = self.now_us();
        while !self.elapsed(start, us) {
            core::hint::spin_loop();
        }
    }
}

impl<C: MicroClock + ?Sized> MicroClock for &C {
    #[inline]
    fn now_us(&self) -> u32 {
        (**self).now_us()
    }
}
