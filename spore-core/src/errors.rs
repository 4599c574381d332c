//! Error Types for the Retained-State Store
//!
//! ## Design Philosophy
//!
//! Errors here are returned on a node that may have a few hundred
//! milliseconds of awake time per cycle:
//!
//! 1. **Small Size**: variants carry a few integers or a `&'static str`.
//! 2. **No Heap Allocation**: nothing owned, so the enum is `Copy`.
//! 3. **Not for expected paths**: a header mismatch after power loss and a
//!    full ring buffer are normal operation, reported as booleans or handled
//!    silently, never as errors.
//!
//! ## Error Categories
//!
//! ### Caller mistakes
//! - `ValueOutOfRange`: reading does not fit the 24-bit value field
//! - `SettingTooLarge`: setting does not fit the caller's buffer
//!
//! ### Platform failures
//! - `RegionTooSmall`: retained region cannot hold the state image
//! - `RetainedIo`: retained memory access outside the region
//! - `SettingIo`: settings store could not be read or written

use thiserror_no_std::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors - kept small for embedded use
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Value does not fit the packed field
    #[error("Value {value} outside range [{min}, {max}]")]
    ValueOutOfRange {
        /// The value the caller tried to store
        value: i64,
        /// Smallest storable value
        min: i64,
        /// Largest storable value
        max: i64,
    },

    /// Retained region cannot hold the full state image
    #[error("Retained region too small: need {required} words, have {available}")]
    RegionTooSmall {
        /// Words needed by the state image
        required: usize,
        /// Words the platform provides
        available: usize,
    },

    /// Access outside the retained region
    #[error("Retained memory access at word {offset} (+{len}) out of bounds")]
    RetainedIo {
        /// First word of the access
        offset: usize,
        /// Number of words
        len: usize,
    },

    /// Settings store failed
    #[error("Settings store error: {reason}")]
    SettingIo {
        /// What went wrong
        reason: &'static str,
    },

    /// Setting value does not fit
    #[error("Setting of {len} bytes exceeds limit {max}")]
    SettingTooLarge {
        /// Size of the stored value
        len: usize,
        /// Largest accepted size
        max: usize,
    },
}

#[cfg(feature = "defmt")]
impl defmt::Format for StoreError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::ValueOutOfRange { value, min, max } =>
                defmt::write!(fmt, "Value {} outside [{}, {}]", value, min, max),
            Self::RegionTooSmall { required, available } =>
                defmt::write!(fmt, "Region needs {} words, has {}", required, available),
            Self::RetainedIo { offset, len } =>
                defmt::write!(fmt, "Retained access {}+{} out of bounds", offset, len),
            Self::SettingIo { reason } =>
                defmt::write!(fmt, "Settings: {}", reason),
            Self::SettingTooLarge { len, max } =>
                defmt::write!(fmt, "Setting {} bytes > {}", len, max),
        }
    }
}
