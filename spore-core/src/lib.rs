//! Retained-state store for deep-sleeping sensor nodes
//!
//! Keeps sensor readings alive across sleep cycles in the small block of
//! RTC memory that survives deep sleep but not a power loss.
//! Designed for coin-cell nodes that wake, sample, and go back to sleep.
//!
//! Key constraints:
//! - Whole state fits in 128 words (512 bytes) of retained memory
//! - No heap allocation
//! - One word per buffered reading
//!
//! ```no_run
//! use spore_core::{
//!     header, RetainedState, SensorKind, SimulatedRegion, SleepClock, TelemetryRing,
//!     FixedTime, MemorySettings, BUILD_MAGIC, NUM_STORAGE_SLOTS,
//! };
//!
//! let mut region = SimulatedRegion::new();
//! let mut settings = MemorySettings::new();
//! let mut state = RetainedState::<NUM_STORAGE_SLOTS>::new();
//! let clock = SleepClock::new(FixedTime::new(0));
//!
//! // Cold boot or warm wake?
//! let warm = header::load(&mut state, &mut region, &mut settings, BUILD_MAGIC).unwrap();
//!
//! let mut ring = TelemetryRing::new(&mut state, &clock);
//! ring.store(SensorKind::Temperature, 21_500).unwrap();
//!
//! // Persist everything before sleeping for 15 seconds
//! clock.save(&mut state, &mut region, BUILD_MAGIC, 15_000).unwrap();
//! # let _ = warm;
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

// Optional logging, compiled out without the `log` feature
#[cfg(feature = "log")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {{}};
}

#[cfg(feature = "log")]
macro_rules! log_info {
    ($($arg:tt)*) => { log::info!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_info {
    ($($arg:tt)*) => {{}};
}

#[cfg(feature = "log")]
macro_rules! log_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {{}};
}

pub mod buffer;
pub mod clock;
pub mod constants;
pub mod errors;
pub mod header;
pub mod pulse;
pub mod reading;
pub mod retained;
pub mod settings;
pub mod time;
pub mod timebase;

// Public API
pub use buffer::{ReadingSink, RingIter, TelemetryRing};
pub use clock::{SleepClock, SleepClockRecord};
pub use constants::{NUM_STORAGE_SLOTS, RETAINED_CAPACITY_WORDS, TIMEBASE_SHIFT};
pub use errors::{StoreError, StoreResult};
pub use header::{HeaderRecord, BUILD_MAGIC};
pub use pulse::{PulseChannel, PulseQueue, PulseSummary};
pub use reading::{Reading, SensorKind};
pub use retained::{RetainedMemory, RetainedState, SimulatedRegion, SleepParams};
pub use settings::{Calibration, MemorySettings, NodeSettings, SettingsStore};
pub use time::{FixedTime, TimeSource, Timestamp};

#[cfg(feature = "std")]
pub use settings::FileSettings;
#[cfg(feature = "std")]
pub use time::WakeTimer;

/// Retained state sized for the default slot count
pub type NodeState = RetainedState<NUM_STORAGE_SLOTS>;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
