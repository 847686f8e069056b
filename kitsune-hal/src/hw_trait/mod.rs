//! Hardware abstraction layer traits.
//!
//! This module defines the core peripheral capability traits (Gpio, Uart,
//! Spi, I2c) that let guests and drivers work with different underlying
//! implementations, whether in-memory virtual devices or tunneled through a
//! remote daemon.
//!
//! All four contracts share one handle state machine: a successful `init`
//! moves a device to Ready and returns its handle; `deinit` moves it back to
//! Uninitialized; any other operation on an uninitialized handle fails with
//! `InvalidHandle` and has no hardware side effect. A failed `init` leaves no
//! observable allocation.
//!
//! The traits are async, but each call completes its operation before the
//! future resolves; there is no callback or cancellation variant. Callers
//! must serialize calls on a single handle.

mod gpio;
mod i2c;
mod spi;
mod uart;

pub use gpio::{Gpio, NullGpio};
pub use i2c::{I2c, NullI2c};
pub use spi::{NullSpi, Spi};
pub use uart::{NullUart, Uart};

use bitflags::bitflags;

bitflags! {
    /// GPIO pin configuration passed to `Gpio::init`.
    ///
    /// A valid mode names at least one direction. The two pulls are mutually
    /// exclusive. Bits outside this set are reserved and rejected with
    /// `InvalidConfig` rather than ignored.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PinMode: u32 {
        const INPUT = 1 << 0;
        const OUTPUT = 1 << 1;
        const PULL_UP = 1 << 2;
        const PULL_DOWN = 1 << 3;
    }
}

impl PinMode {
    /// Whether this mode is a supported pin configuration.
    pub fn is_valid(&self) -> bool {
        let has_direction = self.intersects(PinMode::INPUT | PinMode::OUTPUT);
        let both_pulls = self.contains(PinMode::PULL_UP | PinMode::PULL_DOWN);
        has_direction && !both_pulls
    }
}

bitflags! {
    /// UART transfer modifiers.
    ///
    /// Bits outside this set are reserved and rejected with `InvalidConfig`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UartFlags: u32 {
        /// Transfer what is immediately possible and return, never waiting.
        const NONBLOCK = 1 << 0;
    }
}

/// Digital level of a GPIO pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low = 0,
    High = 1,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        level == Level::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(PinMode::INPUT, true; "input")]
    #[test_case(PinMode::OUTPUT, true; "output")]
    #[test_case(PinMode::INPUT.union(PinMode::OUTPUT), true; "loopback")]
    #[test_case(PinMode::INPUT.union(PinMode::PULL_UP), true; "input pull up")]
    #[test_case(PinMode::empty(), false; "no direction")]
    #[test_case(PinMode::PULL_DOWN, false; "pull without direction")]
    #[test_case(
        PinMode::INPUT.union(PinMode::PULL_UP).union(PinMode::PULL_DOWN),
        false;
        "both pulls"
    )]
    fn pin_mode_validity(mode: PinMode, valid: bool) {
        assert_eq!(mode.is_valid(), valid);
    }

    #[test]
    fn reserved_mode_bits_do_not_parse() {
        assert!(PinMode::from_bits(1 << 4).is_none());
        assert!(UartFlags::from_bits(1 << 1).is_none());
    }

    #[test]
    fn level_bool_round_trip() {
        assert_eq!(Level::from(true), Level::High);
        assert_eq!(Level::from(false), Level::Low);
        assert!(bool::from(Level::High));
        assert!(!bool::from(Level::Low));
    }
}
