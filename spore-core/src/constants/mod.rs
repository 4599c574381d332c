//! Constants for Spore Core
//!
//! Every numeric value that shapes the retained-memory image or the
//! sleep/wake timing lives here, grouped by domain:
//! - **Layout**: word offsets and bit widths of the retained image
//! - **Time**: sleep durations, clock calibration, unit conversions
//! - **Sensors**: value scaling, high-water margin, particle curve
//!
//! ## Usage Guidelines
//!
//! 1. Always use these constants instead of magic numbers
//! 2. Offsets are derived from the size of the preceding field, never typed in
//! 3. Include the unit in the name

/// Retained-memory word layout and packed field widths.
pub mod layout;

/// Sleep timing, calibration defaults and unit conversions.
pub mod time;

/// Sensor value scaling and buffering thresholds.
pub mod sensors;

// Re-export commonly used constants for convenience
pub use layout::{
    HEADER_WORDS, NUM_STORAGE_SLOTS, RETAINED_CAPACITY_WORDS,
    READING_VALUE_MAX, READING_VALUE_MIN, TIMEBASE_MASK, TIMEBASE_SHIFT,
};

pub use time::{
    DEFAULT_SLEEP_CLOCK_ADJ_MS, DEFAULT_SLEEP_TIME_MS, MS_PER_SECOND,
};

pub use sensors::{
    DEFAULT_HIGH_WATER_SLOT, MILLI_PER_UNIT,
};
