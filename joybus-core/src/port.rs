//! Controller port identifiers.

use tas_proto::PORT_COUNT;

/// One of the four controller ports, `0..4`.
///
/// Each port is bound to one physical pin and one bus state machine at
/// initialization and never reassigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Port(u8);

impl Port {
    /// All ports in interrupt priority order.
    pub const ALL: [Port; PORT_COUNT] = [Port(0), Port(1), Port(2), Port(3)];

    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < PORT_COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Port number as sent to the host.
    #[inline]
    #[must_use]
    pub const fn number(self) -> u8 {
        self.0
    }
}
