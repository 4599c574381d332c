//! Sensor Scaling and Buffering Thresholds
//!
//! Readings are stored as signed integers in milli-units
//! (milli-°C, milli-%RH, Pa, mV). Particle counts are stored in
//! thousands of particles per cubic foot.

use super::layout::NUM_STORAGE_SLOTS;

/// Milli-units per display unit.
pub const MILLI_PER_UNIT: i32 = 1000;

/// Slots left free below capacity when triggering an upload.
///
/// Leaves room for a few wakes of readings while the upload is retried.
pub const HIGH_WATER_MARGIN: usize = 12;

/// Default ring occupancy that triggers an upload.
pub const DEFAULT_HIGH_WATER_SLOT: usize = NUM_STORAGE_SLOTS - HIGH_WATER_MARGIN;

// ===== PARTICLE SENSOR (PPD42) =====

/// Cubic term of the low-pulse-occupancy to concentration curve.
pub const PPD42_CUBIC: f32 = 1.1;

/// Square term of the concentration curve.
pub const PPD42_SQUARE: f32 = -3.8;

/// Linear term of the concentration curve.
pub const PPD42_LINEAR: f32 = 520.0;

/// Divisor converting particles per 0.01 cf into stored units (thousands per cf).
pub const PPD42_STORE_DIVISOR: f32 = 10.0;

/// Recommended sampling window for the particle sensor (microseconds).
pub const PPD42_SAMPLE_TIME_US: u64 = 30_000_000;
