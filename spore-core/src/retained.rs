//! Retained memory image
//!
//! ## Overview
//!
//! `RetainedState` is the whole retained region as one flat array of words,
//! owned by the main flow and passed by reference to the components that
//! need it. It is read from the platform on every wake and written back in
//! full before every sleep.
//!
//! ## Why words and not a `#[repr(C)]` struct?
//!
//! The region is written by one firmware build and read by the next wake,
//! possibly after a reflash. Packing fields with explicit shifts keeps the
//! layout independent of compiler bitfield rules, and every field has a
//! fixed offset from `constants::layout`.
//!
//! ## Capacity
//!
//! The slot count is a const generic so tests can use tiny buffers. The
//! image must fit the platform region:
//!
//! ```compile_fail
//! use spore_core::RetainedState;
//! // 11 header words + 200 slots > 128 words
//! let _state = RetainedState::<200>::new();
//! ```

use crate::clock::SleepClockRecord;
use crate::constants::layout::{
    HEADER_WORDS, RETAINED_CAPACITY_WORDS, SLEEP_TIME_BITS, WORD_BATTERY_CALIB,
    WORD_BOOT_COUNT, WORD_CHECK, WORD_FIRST_READING, WORD_HUMIDITY_CALIB,
    WORD_NUM_READINGS, WORD_SLEEP_CLOCK, WORD_SLEEP_PARAMS, WORD_TEMP_CALIB, WORD_TIMEBASE,
};
use crate::constants::sensors::DEFAULT_HIGH_WATER_SLOT;
use crate::constants::time::DEFAULT_SLEEP_TIME_MS;
use crate::errors::{StoreError, StoreResult};
use crate::reading::Reading;

/// Platform access to the retained region
///
/// Offsets and lengths are in 32-bit words.
pub trait RetainedMemory {
    /// Size of the region in words
    fn capacity_words(&self) -> usize;

    /// Copy `words.len()` words starting at `offset` out of the region
    fn read_words(&mut self, offset: usize, words: &mut [u32]) -> StoreResult<()>;

    /// Copy `words` into the region starting at `offset`
    fn write_words(&mut self, offset: usize, words: &[u32]) -> StoreResult<()>;
}

/// In-memory retained region
///
/// Behaves like RTC user memory: survives `SleepClock::save` and a
/// simulated wake, zeroed by `power_loss`.
#[derive(Debug, Clone)]
pub struct SimulatedRegion {
    words: [u32; RETAINED_CAPACITY_WORDS],
    writes: u32,
}

impl SimulatedRegion {
    /// Zeroed region, as after first power-on
    pub const fn new() -> Self {
        Self {
            words: [0; RETAINED_CAPACITY_WORDS],
            writes: 0,
        }
    }

    /// Lose power: every word reads back as zero
    pub fn power_loss(&mut self) {
        self.words = [0; RETAINED_CAPACITY_WORDS];
    }

    /// Raw view of the region
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Overwrite one word, as a stray write or a different firmware would
    pub fn poke(&mut self, offset: usize, value: u32) {
        if let Some(word) = self.words.get_mut(offset) {
            *word = value;
        }
    }

    /// Number of `write_words` calls so far
    pub fn write_count(&self) -> u32 {
        self.writes
    }

    fn check(&self, offset: usize, len: usize) -> StoreResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= RETAINED_CAPACITY_WORDS => Ok(()),
            _ => Err(StoreError::RetainedIo { offset, len }),
        }
    }
}

impl Default for SimulatedRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl RetainedMemory for SimulatedRegion {
    fn capacity_words(&self) -> usize {
        RETAINED_CAPACITY_WORDS
    }

    fn read_words(&mut self, offset: usize, words: &mut [u32]) -> StoreResult<()> {
        self.check(offset, words.len())?;
        words.copy_from_slice(&self.words[offset..offset + words.len()]);
        Ok(())
    }

    fn write_words(&mut self, offset: usize, words: &[u32]) -> StoreResult<()> {
        self.check(offset, words.len())?;
        self.words[offset..offset + words.len()].copy_from_slice(words);
        self.writes = self.writes.wrapping_add(1);
        Ok(())
    }
}

/// Upload threshold and sleep duration, packed in one word
///
/// Bits 0-7 high-water slot, bits 8-31 sleep time in ms.
/// Zero in either field means "use the default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SleepParams {
    /// Ring occupancy that triggers an upload
    pub high_water_slot: u8,
    /// Deep sleep duration in milliseconds (24 bits)
    pub sleep_time_ms: u32,
}

impl SleepParams {
    const SLEEP_TIME_MASK: u32 = (1 << SLEEP_TIME_BITS) - 1;

    /// Pack into a retained word, truncating the sleep time to 24 bits
    pub const fn to_word(self) -> u32 {
        self.high_water_slot as u32 | ((self.sleep_time_ms & Self::SLEEP_TIME_MASK) << 8)
    }

    /// Unpack a retained word
    pub const fn from_word(word: u32) -> Self {
        Self {
            high_water_slot: (word & 0xFF) as u8,
            sleep_time_ms: word >> 8,
        }
    }

    /// Sleep duration, falling back to the default when unset
    pub fn effective_sleep_ms(&self) -> u32 {
        if self.sleep_time_ms == 0 {
            DEFAULT_SLEEP_TIME_MS
        } else {
            self.sleep_time_ms
        }
    }

    /// High-water slot for a ring of `capacity`, falling back to the default
    pub fn effective_high_water(&self, capacity: usize) -> usize {
        let slot = if self.high_water_slot == 0 {
            DEFAULT_HIGH_WATER_SLOT
        } else {
            self.high_water_slot as usize
        };
        slot.min(capacity)
    }
}

/// The entire retained region as a flat word image
///
/// `N` is the number of reading slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetainedState<const N: usize> {
    header: [u32; HEADER_WORDS],
    slots: [u32; N],
}

impl<const N: usize> RetainedState<N> {
    /// Words occupied by the image
    pub const WORDS: usize = HEADER_WORDS + N;

    /// Number of reading slots
    pub const CAPACITY: usize = N;

    const FITS: () = {
        assert!(N > 0, "ring buffer needs at least one slot");
        assert!(
            HEADER_WORDS + N <= RETAINED_CAPACITY_WORDS,
            "retained state exceeds the platform retained memory"
        );
    };

    /// Zeroed image
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::FITS;
        Self {
            header: [0; HEADER_WORDS],
            slots: [0; N],
        }
    }

    /// Replace the image with the contents of the platform region
    pub fn load_from<M: RetainedMemory + ?Sized>(&mut self, mem: &mut M) -> StoreResult<()> {
        Self::check_region(mem)?;
        mem.read_words(0, &mut self.header)?;
        mem.read_words(HEADER_WORDS, &mut self.slots)
    }

    /// Write the whole image to the platform region
    pub fn persist<M: RetainedMemory + ?Sized>(&self, mem: &mut M) -> StoreResult<()> {
        Self::check_region(mem)?;
        mem.write_words(0, &self.header)?;
        mem.write_words(HEADER_WORDS, &self.slots)
    }

    /// Clear every word
    pub fn zero(&mut self) {
        self.header = [0; HEADER_WORDS];
        self.slots = [0; N];
    }

    fn check_region<M: RetainedMemory + ?Sized>(mem: &M) -> StoreResult<()> {
        if mem.capacity_words() < Self::WORDS {
            return Err(StoreError::RegionTooSmall {
                required: Self::WORDS,
                available: mem.capacity_words(),
            });
        }
        Ok(())
    }

    /// Raw header word, `None` past the header
    pub fn word(&self, index: usize) -> Option<u32> {
        self.header.get(index).copied()
    }

    // ----- header -----

    /// Stored header checksum
    pub fn checksum(&self) -> u32 {
        self.header[WORD_CHECK]
    }

    pub(crate) fn set_checksum(&mut self, value: u32) {
        self.header[WORD_CHECK] = value;
    }

    /// Wakes since the last invalidate
    pub fn boot_count(&self) -> u32 {
        self.header[WORD_BOOT_COUNT]
    }

    pub(crate) fn set_boot_count(&mut self, value: u32) {
        self.header[WORD_BOOT_COUNT] = value;
    }

    // ----- sleep clock -----

    /// Decoded sleep clock record
    pub fn sleep_clock(&self) -> SleepClockRecord {
        SleepClockRecord::from_words([
            self.header[WORD_SLEEP_CLOCK],
            self.header[WORD_SLEEP_CLOCK + 1],
        ])
    }

    /// Encode and store the sleep clock record
    pub fn set_sleep_clock(&mut self, record: SleepClockRecord) {
        let [low, high] = record.to_words();
        self.header[WORD_SLEEP_CLOCK] = low;
        self.header[WORD_SLEEP_CLOCK + 1] = high;
    }

    // ----- ring metadata -----

    /// Timebase word (absolute ms >> `TIMEBASE_SHIFT`)
    pub fn timebase(&self) -> u32 {
        self.header[WORD_TIMEBASE]
    }

    pub(crate) fn set_timebase(&mut self, value: u32) {
        self.header[WORD_TIMEBASE] = value;
    }

    /// Live entries in the ring
    ///
    /// Clamped to capacity so a corrupt word can never index past the slots.
    pub fn num_readings(&self) -> usize {
        (self.header[WORD_NUM_READINGS] as usize).min(N)
    }

    pub(crate) fn set_num_readings(&mut self, value: usize) {
        self.header[WORD_NUM_READINGS] = value as u32;
    }

    /// Slot of the oldest entry
    pub fn first_reading(&self) -> usize {
        self.header[WORD_FIRST_READING] as usize % N
    }

    pub(crate) fn set_first_reading(&mut self, value: usize) {
        self.header[WORD_FIRST_READING] = (value % N) as u32;
    }

    /// Physical slot of the `index`-th oldest entry
    pub fn slot_index(&self, index: usize) -> usize {
        (self.first_reading() + index) % N
    }

    /// Reading stored in physical slot `slot`
    pub fn slot(&self, slot: usize) -> Reading {
        Reading::from_word(self.slots[slot % N])
    }

    pub(crate) fn set_slot(&mut self, slot: usize, reading: Reading) {
        self.slots[slot % N] = reading.to_word();
    }

    // ----- cached settings -----

    /// Cached temperature calibration (milli-°C)
    pub fn temperature_calibration(&self) -> i32 {
        self.header[WORD_TEMP_CALIB] as i32
    }

    /// Cached humidity calibration (milli-%RH)
    pub fn humidity_calibration(&self) -> i32 {
        self.header[WORD_HUMIDITY_CALIB] as i32
    }

    /// Cached battery calibration (mV)
    pub fn battery_calibration(&self) -> i32 {
        self.header[WORD_BATTERY_CALIB] as i32
    }

    /// Set the cached temperature calibration
    pub fn set_temperature_calibration(&mut self, milli: i32) {
        self.header[WORD_TEMP_CALIB] = milli as u32;
    }

    /// Set the cached humidity calibration
    pub fn set_humidity_calibration(&mut self, milli: i32) {
        self.header[WORD_HUMIDITY_CALIB] = milli as u32;
    }

    /// Set the cached battery calibration
    pub fn set_battery_calibration(&mut self, milli: i32) {
        self.header[WORD_BATTERY_CALIB] = milli as u32;
    }

    /// Decoded sleep parameters
    pub fn sleep_params(&self) -> SleepParams {
        SleepParams::from_word(self.header[WORD_SLEEP_PARAMS])
    }

    /// Store sleep parameters
    pub fn set_sleep_params(&mut self, params: SleepParams) {
        self.header[WORD_SLEEP_PARAMS] = params.to_word();
    }
}

impl<const N: usize> Default for RetainedState<N> {
    fn default() -> Self {
        Self::new()
    }
}
