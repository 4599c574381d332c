//! Timebase rebaser
//!
//! ## Overview
//!
//! Uptime needs 40 bits but a reading value has 24. Every timestamp entry
//! in the ring therefore stores only its distance from one shared base:
//!
//! ```text
//! absolute = (timebase << TIMEBASE_SHIFT) + value      0 <= value <= 2^23-1
//! ```
//!
//! When the oldest entries leave the ring the base may now lie far behind
//! the surviving timestamps, so it is recomputed from the first surviving
//! timestamp and every entry is re-expressed against it.
//!
//! ## Ordering
//!
//! Timestamps enter the ring in non-decreasing order, so the first live
//! timestamp is also the smallest. Rebasing onto it can only shrink the
//! other offsets, which is why a rebase never overflows the value field.

use crate::constants::layout::{READING_VALUE_MAX, TIMEBASE_MASK, TIMEBASE_SHIFT, UPTIME_MASK};
use crate::reading::{Reading, SensorKind};
use crate::retained::RetainedState;
use crate::time::Timestamp;

/// Timebase word holding `absolute`
pub const fn base_bits(absolute: Timestamp) -> u32 {
    ((absolute & UPTIME_MASK) >> TIMEBASE_SHIFT) as u32
}

/// Absolute milliseconds of the current timebase
pub fn absolute_base<const N: usize>(state: &RetainedState<N>) -> Timestamp {
    (state.timebase() as Timestamp) << TIMEBASE_SHIFT
}

/// Offset of `absolute` from the current timebase, if it fits a reading
pub fn encode_offset<const N: usize>(state: &RetainedState<N>, absolute: Timestamp) -> Option<i32> {
    let delta = absolute.checked_sub(absolute_base(state))?;
    (delta <= READING_VALUE_MAX as u64).then_some(delta as i32)
}

/// Absolute milliseconds of a stored offset
pub fn decode<const N: usize>(state: &RetainedState<N>, value: i32) -> Timestamp {
    absolute_base(state).saturating_add_signed(value as i64)
}

/// Age of the timebase at `uptime`, sent with every upload
pub fn time_offset<const N: usize>(state: &RetainedState<N>, uptime: Timestamp) -> i64 {
    uptime as i64 - absolute_base(state) as i64
}

/// Absolute time of the newest live timestamp entry
pub fn newest_timestamp<const N: usize>(state: &RetainedState<N>) -> Option<Timestamp> {
    (0..state.num_readings())
        .rev()
        .map(|i| state.slot(state.slot_index(i)))
        .find(|reading| reading.kind == SensorKind::TimestampOffset)
        .map(|reading| decode(state, reading.value))
}

/// True if any live entry is a timestamp
pub fn has_timestamps<const N: usize>(state: &RetainedState<N>) -> bool {
    (0..state.num_readings())
        .any(|i| state.slot(state.slot_index(i)).kind == SensorKind::TimestampOffset)
}

/// Recompute the timebase from the live entries
///
/// The first live timestamp, masked to the timebase bits, becomes the new
/// base and every timestamp entry is rewritten against it. With no
/// timestamp left, the base follows `fallback` (normally the current
/// uptime) so the next timestamp gets a small offset.
///
/// Returns the new base in absolute milliseconds.
pub fn refactor_timebase<const N: usize>(state: &mut RetainedState<N>, fallback: Timestamp) -> Timestamp {
    let old_base = absolute_base(state);
    let mut new_base: Option<Timestamp> = None;

    for i in 0..state.num_readings() {
        let slot = state.slot_index(i);
        let reading = state.slot(slot);
        if reading.kind != SensorKind::TimestampOffset {
            continue;
        }

        let absolute = old_base.saturating_add_signed(reading.value as i64);
        let base = *new_base.get_or_insert(absolute & TIMEBASE_MASK);
        let value = absolute.saturating_sub(base) as i32;
        state.set_slot(slot, Reading { kind: SensorKind::TimestampOffset, value });
    }

    let base = match new_base {
        Some(base) => base,
        None => fallback & TIMEBASE_MASK & UPTIME_MASK,
    };
    state.set_timebase(base_bits(base));

    log_debug!(
        "timebase {} -> {} ({})",
        old_base,
        base,
        if new_base.is_some() { "first timestamp" } else { "uptime" }
    );
    base
}
