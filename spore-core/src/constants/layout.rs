//! Retained Memory Layout
//!
//! The retained region is a flat array of 32-bit words. Each field sits at a
//! fixed offset computed from the sizes of the fields before it:
//!
//! ```text
//! word  field
//! ────  ─────────────────────────────────────────────
//!  0    header checksum (magic - boot_count)
//!  1    boot count
//!  2-3  sleep clock (flags | fail count | calibration | uptime)
//!  4    timebase (absolute ms >> TIMEBASE_SHIFT)
//!  5    ring count
//!  6    ring head index
//!  7    cached temperature calibration (milli-°C)
//!  8    cached humidity calibration (milli-%RH)
//!  9    cached battery calibration (mV)
//! 10    sleep params (high-water slot | sleep time ms)
//! 11..  readings, one word each
//! ```

/// Retained words available on the target (ESP8266 user RTC memory, 512 bytes).
pub const RETAINED_CAPACITY_WORDS: usize = 128;

/// Header checksum word.
pub const WORD_CHECK: usize = 0;

/// Boot counter word.
pub const WORD_BOOT_COUNT: usize = WORD_CHECK + 1;

/// First word of the packed sleep clock record.
pub const WORD_SLEEP_CLOCK: usize = WORD_BOOT_COUNT + 1;

/// Words taken by the sleep clock record (64 bits).
pub const SLEEP_CLOCK_WORDS: usize = 2;

/// Shared timebase word.
pub const WORD_TIMEBASE: usize = WORD_SLEEP_CLOCK + SLEEP_CLOCK_WORDS;

/// Number of occupied ring slots.
pub const WORD_NUM_READINGS: usize = WORD_TIMEBASE + 1;

/// Slot holding the oldest reading.
pub const WORD_FIRST_READING: usize = WORD_NUM_READINGS + 1;

/// Cached temperature calibration offset.
pub const WORD_TEMP_CALIB: usize = WORD_FIRST_READING + 1;

/// Cached humidity calibration offset.
pub const WORD_HUMIDITY_CALIB: usize = WORD_TEMP_CALIB + 1;

/// Cached battery calibration offset.
pub const WORD_BATTERY_CALIB: usize = WORD_HUMIDITY_CALIB + 1;

/// Packed sleep parameters.
pub const WORD_SLEEP_PARAMS: usize = WORD_BATTERY_CALIB + 1;

/// Words before the reading slots begin.
pub const HEADER_WORDS: usize = WORD_SLEEP_PARAMS + 1;

/// Reading slots that fit behind the header in the retained region.
pub const NUM_STORAGE_SLOTS: usize = RETAINED_CAPACITY_WORDS - HEADER_WORDS;

/// Bumped whenever the meaning of any word above changes.
///
/// Folded into the build magic so a node never reinterprets an image
/// written under a different layout.
pub const LAYOUT_VERSION: u32 = 3;

/// Base value for the header magic.
pub const PREINIT_MAGIC: u32 = 0xAA55_9876;

// ===== PACKED FIELD WIDTHS =====

/// Bits of a reading word holding the sensor kind.
pub const READING_KIND_BITS: u32 = 3;

/// Position of the value field within a reading word.
pub const READING_VALUE_SHIFT: u32 = 8;

/// Signed width of a reading value.
pub const READING_VALUE_BITS: u32 = 24;

/// Smallest storable reading value.
pub const READING_VALUE_MIN: i32 = -(1 << (READING_VALUE_BITS - 1));

/// Largest storable reading value.
pub const READING_VALUE_MAX: i32 = (1 << (READING_VALUE_BITS - 1)) - 1;

/// Width of the accumulated uptime field (about 34 years of ms).
pub const UPTIME_BITS: u32 = 40;

/// Mask for the accumulated uptime field.
pub const UPTIME_MASK: u64 = (1 << UPTIME_BITS) - 1;

/// Low bits of an absolute timestamp carried by each offset entry.
///
/// Offsets are never negative, so a fresh timebase leaves `2^23 - 2^16` ms
/// (about 2.3 hours) of headroom before an offset overflows the value field.
pub const TIMEBASE_SHIFT: u32 = 16;

/// Mask selecting the timebase bits of an absolute timestamp.
pub const TIMEBASE_MASK: u64 = !((1u64 << TIMEBASE_SHIFT) - 1);

/// Width of the sleep time field in the sleep params word.
pub const SLEEP_TIME_BITS: u32 = 24;

const _: () = assert!(HEADER_WORDS == 11, "retained header layout changed");
