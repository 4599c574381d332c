//! Telemetry Ring Buffer in Retained Memory
//!
//! ## Overview
//!
//! Readings are buffered across many sleep cycles and uploaded in batches.
//! The ring lives inside the retained image: its slots are the reading
//! words and its metadata is two header words, so nothing here owns
//! storage. `TelemetryRing` borrows the state for the duration of a wake.
//!
//! ## Design Rationale
//!
//! ### Why drop the oldest entry when full?
//!
//! The node cannot ask anyone for more memory, and an error at 3 a.m. on a
//! coin cell helps nobody. Overflow silently replaces the oldest reading;
//! the upload high-water slot is the knob that keeps this from happening.
//!
//! ### Why rebase on every removal?
//!
//! Timestamp entries are offsets from one shared base. Removing entries
//! from the front may remove the entry the base was derived from, so every
//! eviction and every acknowledged drain re-derives it (see `timebase`).
//!
//! ## Slot Arithmetic
//!
//! ```text
//! capacity 4, first = 2, count = 3
//! ┌─────┬─────┬─────┬─────┐
//! │  c  │     │  a  │  b  │   oldest → newest: a, b, c
//! └─────┴─────┴─────┴─────┘
//!          ↑     ↑
//!          │     └── first
//!          └── next write: (first + count) % capacity
//! ```
//!
//! ## Usage Example
//!
//! ```rust
//! use spore_core::{FixedTime, RetainedState, SensorKind, SleepClock, TelemetryRing};
//!
//! let mut state = RetainedState::<4>::new();
//! let clock = SleepClock::new(FixedTime::new(0));
//! let mut ring = TelemetryRing::new(&mut state, &clock);
//!
//! for value in [10, 20, 30, 40, 50] {
//!     ring.store(SensorKind::Temperature, value).unwrap();
//! }
//! let values: Vec<i32> = ring.iter().map(|r| r.value).collect();
//! assert_eq!(values, [20, 30, 40, 50]);
//!
//! ring.drain_ack(2);
//! let values: Vec<i32> = ring.iter().map(|r| r.value).collect();
//! assert_eq!(values, [40, 50]);
//! ```

use crate::clock::SleepClock;
use crate::constants::layout::UPTIME_MASK;
use crate::errors::{StoreError, StoreResult};
use crate::reading::{Reading, SensorKind};
use crate::retained::RetainedState;
use crate::time::{TimeSource, Timestamp};
use crate::timebase;

/// Anything sensor code can append readings to
///
/// Sensor collaborators see only this trait, never the ring itself.
pub trait ReadingSink {
    /// Append a reading in milli-units
    fn store(&mut self, kind: SensorKind, value: i64) -> StoreResult<()>;

    /// Append an absolute uptime as a timestamp entry
    fn store_timestamp(&mut self, absolute: Timestamp) -> StoreResult<()>;
}

/// Ring buffer view over the retained state
pub struct TelemetryRing<'a, const N: usize, T: TimeSource> {
    state: &'a mut RetainedState<N>,
    clock: &'a SleepClock<T>,
}

impl<'a, const N: usize, T: TimeSource> TelemetryRing<'a, N, T> {
    /// Borrow `state` for this wake
    pub fn new(state: &'a mut RetainedState<N>, clock: &'a SleepClock<T>) -> Self {
        Self { state, clock }
    }

    /// Number of slots
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Live entries
    pub fn len(&self) -> usize {
        self.state.num_readings()
    }

    /// True if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the next store evicts the oldest entry
    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    /// True once occupancy reaches the configured upload threshold
    pub fn reached_high_water(&self) -> bool {
        self.len() >= self.state.sleep_params().effective_high_water(N)
    }

    /// Current uptime
    pub fn uptime(&self) -> Timestamp {
        self.clock.uptime(self.state)
    }

    /// Underlying retained state
    pub fn state(&self) -> &RetainedState<N> {
        self.state
    }

    /// Mutable access for header and settings-cache updates
    pub fn state_mut(&mut self) -> &mut RetainedState<N> {
        self.state
    }

    /// Clock this ring reads uptime from
    pub fn clock(&self) -> &SleepClock<T> {
        self.clock
    }

    /// The `index`-th oldest entry
    pub fn get(&self, index: usize) -> Option<Reading> {
        (index < self.len()).then(|| self.state.slot(self.state.slot_index(index)))
    }

    /// Live entries, oldest first
    pub fn iter(&self) -> RingIter<'_, N> {
        self.state.readings()
    }

    /// Absolute uptime of a timestamp entry
    pub fn timestamp_of(&self, reading: &Reading) -> Option<Timestamp> {
        (reading.kind == SensorKind::TimestampOffset)
            .then(|| timebase::decode(self.state, reading.value))
    }

    /// Append a reading, evicting the oldest entry when full
    ///
    /// Values outside the 24-bit field are rejected and nothing is written.
    /// `TimestampOffset` values are taken as absolute uptime and go through
    /// [`store_timestamp`](Self::store_timestamp).
    pub fn store(&mut self, kind: SensorKind, value: i64) -> StoreResult<()> {
        if kind == SensorKind::TimestampOffset {
            let absolute = u64::try_from(value).map_err(|_| StoreError::ValueOutOfRange {
                value,
                min: 0,
                max: UPTIME_MASK as i64,
            })?;
            return self.store_timestamp(absolute);
        }

        let reading = Reading::new(kind, value)?;
        if self.is_full() {
            let fallback = self.uptime();
            self.evict_oldest(fallback);
        }
        self.push(reading);
        Ok(())
    }

    /// Append a timestamp entry for `absolute` uptime
    ///
    /// Timestamps must not go backwards. If the offset from the current
    /// timebase does not fit a reading, the oldest entries are dropped until
    /// the rebased timebase is close enough.
    pub fn store_timestamp(&mut self, absolute: Timestamp) -> StoreResult<()> {
        let absolute = absolute & UPTIME_MASK;
        if let Some(newest) = timebase::newest_timestamp(self.state) {
            if absolute < newest {
                return Err(StoreError::ValueOutOfRange {
                    value: absolute as i64,
                    min: newest as i64,
                    max: UPTIME_MASK as i64,
                });
            }
        }

        if self.is_full() {
            self.evict_oldest(absolute);
        }

        loop {
            if let Some(offset) = timebase::encode_offset(self.state, absolute) {
                self.push(Reading { kind: SensorKind::TimestampOffset, value: offset });
                return Ok(());
            }

            if timebase::has_timestamps(self.state) {
                log_warn!("timestamp {} too far from oldest timestamp, dropping oldest entry", absolute);
                self.evict_oldest(absolute);
            } else {
                // Nothing depends on the old base; the new one always fits.
                self.state.set_timebase(timebase::base_bits(absolute));
            }
        }
    }

    /// Remove the `n` oldest entries after the server acknowledged them
    ///
    /// Returns the number actually removed.
    pub fn drain_ack(&mut self, n: usize) -> usize {
        let count = self.len();
        let removed = n.min(count);
        if n >= count {
            self.state.set_num_readings(0);
            self.state.set_first_reading(0);
        } else {
            let first = self.state.first_reading();
            self.state.set_first_reading((first + n) % N);
            self.state.set_num_readings(count - n);
        }

        let uptime = self.uptime();
        timebase::refactor_timebase(self.state, uptime);
        log_debug!("acked {} readings, {} left", removed, self.len());
        removed
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.drain_ack(self.len());
    }

    /// Log the live entries as a table
    pub fn dump(&self) {
        #[cfg(feature = "log")]
        {
            log::info!("{:>4}  {:<12} {:>14}", "slot", "type", "value");
            for index in 0..self.len() {
                let slot = self.state.slot_index(index);
                let reading = self.state.slot(slot);
                match self.timestamp_of(&reading) {
                    Some(absolute) => {
                        log::info!("{:>4}  {:<12} {:>14}", slot, reading.kind.label(), absolute)
                    }
                    None => log::info!(
                        "{:>4}  {:<12} {:>14.3}",
                        slot,
                        reading.kind.label(),
                        reading.value as f32 / 1000.0
                    ),
                }
            }
            log::info!(
                "{} of {} slots used, timebase {}",
                self.len(),
                N,
                timebase::absolute_base(self.state)
            );
        }
    }

    fn push(&mut self, reading: Reading) {
        let count = self.len();
        let slot = self.state.slot_index(count);
        self.state.set_slot(slot, reading);
        self.state.set_num_readings(count + 1);
    }

    fn evict_oldest(&mut self, fallback: Timestamp) {
        let count = self.len();
        if count == 0 {
            return;
        }
        let _dropped = self.state.slot(self.state.first_reading());
        let first = self.state.first_reading();
        self.state.set_first_reading((first + 1) % N);
        self.state.set_num_readings(count - 1);
        log_debug!("ring full, dropped oldest {:?}", _dropped.kind);
        timebase::refactor_timebase(self.state, fallback);
    }
}

impl<const N: usize, T: TimeSource> ReadingSink for TelemetryRing<'_, N, T> {
    fn store(&mut self, kind: SensorKind, value: i64) -> StoreResult<()> {
        TelemetryRing::store(self, kind, value)
    }

    fn store_timestamp(&mut self, absolute: Timestamp) -> StoreResult<()> {
        TelemetryRing::store_timestamp(self, absolute)
    }
}

impl<const N: usize> RetainedState<N> {
    /// Live ring entries, oldest first
    pub fn readings(&self) -> RingIter<'_, N> {
        RingIter {
            state: self,
            index: 0,
            len: self.num_readings(),
        }
    }
}

/// Iterator over live entries, oldest first
///
/// Never touches the ring metadata; call `iter()` again to restart.
#[derive(Clone)]
pub struct RingIter<'a, const N: usize> {
    state: &'a RetainedState<N>,
    index: usize,
    len: usize,
}

impl<const N: usize> Iterator for RingIter<'_, N> {
    type Item = Reading;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.len {
            return None;
        }
        let reading = self.state.slot(self.state.slot_index(self.index));
        self.index += 1;
        Some(reading)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.index;
        (remaining, Some(remaining))
    }
}

impl<const N: usize> ExactSizeIterator for RingIter<'_, N> {}
