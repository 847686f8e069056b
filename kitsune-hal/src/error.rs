//! Common error types for the peripheral capability layer.
//!
//! This module provides the driver error taxonomy using thiserror, together
//! with the fixed status-code mapping used on the dispatch boundary. Status
//! codes are the sole failure channel across that boundary: zero means
//! success, positive values carry handles or transfer counts, and negative
//! values name one of the error classes below.

use thiserror::Error;

/// Driver error taxonomy.
///
/// Every peripheral operation reports failure through exactly one of these
/// classes. The taxonomy is closed: platform drivers map their internal
/// faults onto it rather than extending it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Parameters describe an unsupported or contradictory configuration
    #[error("invalid configuration")]
    InvalidConfig,

    /// No free hardware instance, pin, or channel remains
    #[error("no free hardware instance")]
    ResourceExhausted,

    /// Handle names no currently-initialized device of this class
    #[error("invalid handle")]
    InvalidHandle,

    /// Hardware-level failure during a transfer
    #[error("hardware I/O failure")]
    Io,

    /// I2C target address did not acknowledge
    #[error("target did not acknowledge")]
    NoAck,

    /// A bounded wait elapsed without completion
    #[error("timed out")]
    Timeout,

    /// Operation is declared but not implemented on this platform
    #[error("operation not supported")]
    Unsupported,
}

impl Error {
    /// Lower this error to its wire status code.
    pub fn status(&self) -> i32 {
        match self {
            Error::InvalidConfig => -1,
            Error::ResourceExhausted => -2,
            Error::InvalidHandle => -3,
            Error::Io => -4,
            Error::NoAck => -5,
            Error::Timeout => -6,
            Error::Unsupported => -7,
        }
    }

    /// Recover an error from a wire status code.
    ///
    /// Returns None for zero and positive codes (success) and for negative
    /// codes outside the taxonomy.
    pub fn from_status(status: i32) -> Option<Self> {
        match status {
            -1 => Some(Error::InvalidConfig),
            -2 => Some(Error::ResourceExhausted),
            -3 => Some(Error::InvalidHandle),
            -4 => Some(Error::Io),
            -5 => Some(Error::NoAck),
            -6 => Some(Error::Timeout),
            -7 => Some(Error::Unsupported),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using the driver Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Error::InvalidConfig)]
    #[test_case(Error::ResourceExhausted)]
    #[test_case(Error::InvalidHandle)]
    #[test_case(Error::Io)]
    #[test_case(Error::NoAck)]
    #[test_case(Error::Timeout)]
    #[test_case(Error::Unsupported)]
    fn status_round_trip(err: Error) {
        assert!(err.status() < 0);
        assert_eq!(Error::from_status(err.status()), Some(err));
    }

    #[test]
    fn success_codes_are_not_errors() {
        assert_eq!(Error::from_status(0), None);
        assert_eq!(Error::from_status(1), None);
        assert_eq!(Error::from_status(i32::MAX), None);
    }

    #[test]
    fn unknown_negative_codes_are_not_mapped() {
        assert_eq!(Error::from_status(-8), None);
        assert_eq!(Error::from_status(i32::MIN), None);
    }
}
