//! Time-Related Constants
//!
//! Sleep intervals and clock calibration for the wake/sleep cycle.

// ===== TIME UNIT CONVERSIONS =====

/// Milliseconds per second.
pub const MS_PER_SECOND: u64 = 1000;

/// Microseconds per millisecond.
pub const US_PER_MS: u64 = 1000;

/// Microseconds per second.
pub const US_PER_SECOND: u64 = 1_000_000;

// ===== SLEEP CYCLE =====

/// Default time spent in deep sleep between wakes (milliseconds).
///
/// 15 s keeps the node responsive while most of its energy goes to sleep current.
pub const DEFAULT_SLEEP_TIME_MS: u32 = 15_000;

/// Largest sleep time the packed sleep params word can hold (about 4.6 hours).
pub const MAX_SLEEP_TIME_MS: u32 = (1 << super::layout::SLEEP_TIME_BITS) - 1;

/// Default correction added to every sleep (milliseconds).
///
/// Covers the time spent writing RTC memory, entering sleep and booting
/// again, none of which the wake-local timer sees.
pub const DEFAULT_SLEEP_CLOCK_ADJ_MS: u16 = 120;

/// Upper bound on the fail counter kept in the sleep clock record.
pub const MAX_WIFI_FAIL_COUNT: u8 = 0x0F;
