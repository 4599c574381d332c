//! Particle Pulse Queue: interrupt producer, main-flow summary
//!
//! ## Overview
//!
//! The particle sensor reports dust as low pulses on two pins. Their
//! lengths are measured in an interrupt handler while the main flow waits
//! out the sampling window. The ring buffer must never be touched from
//! interrupt context, so the handler only pushes pulse lengths into this
//! queue; once the window closes the main flow drains it into a plain
//! [`PulseSummary`] and stores two readings.
//!
//! ```text
//! GPIO ISR                          main flow
//!    │ record(ch, µs)                  │
//!    └──→ [ slot | slot | ... ] ──→ summarize(window) ──→ PulseSummary
//!                                                           │
//!                                              store_into(ring)
//! ```
//!
//! ## Algorithm
//!
//! Single-producer single-consumer ring with atomic head and tail. Each
//! slot is itself an `AtomicU32`, which keeps the module free of `unsafe`:
//!
//! ```text
//!  31  30                                0
//! ┌───┬──────────────────────────────────┐
//! │ch │ low duration µs (saturating)     │
//! └───┴──────────────────────────────────┘
//! ```
//!
//! - **Producer**: load head (Relaxed), check full against tail (Acquire),
//!   write the slot, publish head (Release)
//! - **Consumer**: load tail (Relaxed), check empty against head (Acquire),
//!   read the slot, publish tail (Release)
//!
//! ## Counters
//!
//! | Counter    | Meaning                                             |
//! |------------|-----------------------------------------------------|
//! | `overflow` | pulse dropped because the queue was full            |
//! | `missed`   | pulse arrived after the window was closed           |

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use crate::buffer::ReadingSink;
use crate::constants::sensors::{PPD42_CUBIC, PPD42_LINEAR, PPD42_SQUARE, PPD42_STORE_DIVISOR};
use crate::errors::StoreResult;
use crate::reading::SensorKind;

const CHANNEL_BIT: u32 = 1 << 31;
const DURATION_MASK: u32 = CHANNEL_BIT - 1;

/// Particle sensor output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseChannel {
    /// Particles larger than 1.0 µm
    Pm1_0 = 0,
    /// Particles larger than 2.5 µm
    Pm2_5 = 1,
}

impl PulseChannel {
    /// Reading kind the channel is stored as
    pub const fn kind(self) -> SensorKind {
        match self {
            PulseChannel::Pm1_0 => SensorKind::ParticulatePm1_0,
            PulseChannel::Pm2_5 => SensorKind::ParticulatePm2_5,
        }
    }

    const fn encode(self, duration_us: u32) -> u32 {
        let duration = if duration_us > DURATION_MASK { DURATION_MASK } else { duration_us };
        match self {
            PulseChannel::Pm1_0 => duration,
            PulseChannel::Pm2_5 => duration | CHANNEL_BIT,
        }
    }

    const fn decode(word: u32) -> (Self, u32) {
        let channel = if word & CHANNEL_BIT == 0 { PulseChannel::Pm1_0 } else { PulseChannel::Pm2_5 };
        (channel, word & DURATION_MASK)
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: AtomicU32 = AtomicU32::new(0);

/// Lock-free SPSC queue of low-pulse durations
///
/// `N` must be a power of two; one slot stays free to tell full from empty.
pub struct PulseQueue<const N: usize> {
    slots: [AtomicU32; N],
    /// Next write position (producer owned)
    head: AtomicUsize,
    /// Next read position (consumer owned)
    tail: AtomicUsize,
    accepting: AtomicBool,
    overflow: AtomicU32,
    missed: AtomicU32,
}

impl<const N: usize> PulseQueue<N> {
    const POWER_OF_TWO: () = assert!(N.is_power_of_two() && N > 1, "queue size must be a power of 2");

    /// Empty queue, open for recording
    ///
    /// Usable in a `static`.
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::POWER_OF_TWO;
        Self {
            slots: [EMPTY_SLOT; N],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            accepting: AtomicBool::new(true),
            overflow: AtomicU32::new(0),
            missed: AtomicU32::new(0),
        }
    }

    /// Record one low pulse (producer side, interrupt safe)
    ///
    /// Returns false if the pulse was dropped.
    pub fn record(&self, channel: PulseChannel, duration_us: u32) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            self.missed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let head = self.head.load(Ordering::Relaxed);
        let next_head = (head + 1) & (N - 1);
        if next_head == self.tail.load(Ordering::Acquire) {
            self.overflow.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        self.slots[head].store(channel.encode(duration_us), Ordering::Relaxed);
        self.head.store(next_head, Ordering::Release);
        true
    }

    /// Take the oldest pulse (consumer side)
    pub fn pop(&self) -> Option<(PulseChannel, u32)> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        let word = self.slots[tail].load(Ordering::Relaxed);
        self.tail.store((tail + 1) & (N - 1), Ordering::Release);
        Some(PulseChannel::decode(word))
    }

    /// Pulses waiting to be consumed
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) & (N - 1)
    }

    /// True if no pulse is waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a new sampling window
    ///
    /// Discards leftover pulses and clears the counters.
    pub fn open(&self) {
        while self.pop().is_some() {}
        self.overflow.store(0, Ordering::Relaxed);
        self.missed.store(0, Ordering::Relaxed);
        self.accepting.store(true, Ordering::Release);
    }

    /// Close the window and fold everything recorded into a summary
    ///
    /// `sample_time_us` is the length of the window the pulses fell in.
    pub fn summarize(&self, sample_time_us: u64) -> PulseSummary {
        self.accepting.store(false, Ordering::Release);

        let mut summary = PulseSummary {
            sample_time_us,
            ..PulseSummary::default()
        };
        while let Some((channel, duration)) = self.pop() {
            summary.low_time_us[channel as usize] += duration as u64;
            summary.pulses[channel as usize] += 1;
        }
        summary.overflow = self.overflow.load(Ordering::Relaxed);
        summary.missed = self.missed.load(Ordering::Relaxed);

        if summary.overflow > 0 || summary.missed > 0 {
            log_warn!(
                "pulse queue dropped {} (overflow) and {} (missed) pulses",
                summary.overflow,
                summary.missed
            );
        }
        summary
    }
}

impl<const N: usize> Default for PulseQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain result of one sampling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PulseSummary {
    /// Total low time per channel
    pub low_time_us: [u64; 2],
    /// Pulse count per channel
    pub pulses: [u32; 2],
    /// Window length
    pub sample_time_us: u64,
    /// Pulses lost to a full queue
    pub overflow: u32,
    /// Pulses arriving after the window closed
    pub missed: u32,
}

impl PulseSummary {
    /// Percentage of the window the channel was held low
    pub fn low_ratio(&self, channel: PulseChannel) -> f32 {
        if self.sample_time_us == 0 {
            return 0.0;
        }
        self.low_time_us[channel as usize] as f32 * (100.0 / self.sample_time_us as f32)
    }

    /// Particles per 0.01 cubic foot
    ///
    /// Manufacturer curve: `1.1 r³ − 3.8 r² + 520 r`
    pub fn concentration(&self, channel: PulseChannel) -> f32 {
        let ratio = self.low_ratio(channel);
        PPD42_CUBIC * libm::powf(ratio, 3.0) + PPD42_SQUARE * libm::powf(ratio, 2.0) + PPD42_LINEAR * ratio
    }

    /// Stored value: thousands of particles per cubic foot, never negative
    pub fn stored_count(&self, channel: PulseChannel) -> i64 {
        let concentration = self.concentration(channel);
        if concentration > 0.0 {
            (concentration / PPD42_STORE_DIVISOR) as i64
        } else {
            0
        }
    }

    /// Append both channel readings (main flow only)
    pub fn store_into(&self, sink: &mut dyn ReadingSink) -> StoreResult<()> {
        for channel in [PulseChannel::Pm1_0, PulseChannel::Pm2_5] {
            sink.store(channel.kind(), self.stored_count(channel))?;
        }
        Ok(())
    }
}
