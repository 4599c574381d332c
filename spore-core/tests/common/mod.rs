//! Common test utilities for integration tests
//!
//! `SimNode` strings together what a real node does every wake: load the
//! retained region, append readings, save, sleep. The retained region,
//! settings store and wake timer all survive between wakes exactly like
//! the hardware would keep them.

#![allow(dead_code)]

use spore_core::{
    header, FixedTime, MemorySettings, Reading, RetainedState, SimulatedRegion, SleepClock,
    TelemetryRing,
};

/// Slots in the simulated ring
pub const SLOTS: usize = 8;

/// Build magic used by the simulated firmware
pub const MAGIC: u32 = 0x5EED_0001;

/// Simulated sensor node
pub struct SimNode {
    pub region: SimulatedRegion,
    pub settings: MemorySettings,
    pub timer: FixedTime,
    pub state: RetainedState<SLOTS>,
    pub magic: u32,
}

impl SimNode {
    /// Node straight out of the box
    pub fn new() -> Self {
        Self {
            region: SimulatedRegion::new(),
            settings: MemorySettings::new(),
            timer: FixedTime::new(0),
            state: RetainedState::new(),
            magic: MAGIC,
        }
    }

    /// Boot: timer restarts, state comes back from retained memory
    pub fn wake(&mut self) -> bool {
        self.timer.reset();
        self.state = RetainedState::new();
        header::load(&mut self.state, &mut self.region, &mut self.settings, self.magic).unwrap()
    }

    /// Stay awake `awake_ms`, then persist and sleep `sleep_ms`
    pub fn sleep(&mut self, awake_ms: u64, sleep_ms: u64) {
        self.timer.advance(awake_ms);
        let clock = SleepClock::new(&self.timer);
        clock.save(&mut self.state, &mut self.region, self.magic, sleep_ms).unwrap();
    }

    /// Uptime right now
    pub fn uptime(&self) -> u64 {
        SleepClock::new(&self.timer).uptime(&self.state)
    }

    /// Run `f` against the ring for this wake
    pub fn with_ring<R>(
        &mut self,
        f: impl FnOnce(&mut TelemetryRing<'_, SLOTS, &FixedTime>) -> R,
    ) -> R {
        let clock = SleepClock::new(&self.timer);
        let mut ring = TelemetryRing::new(&mut self.state, &clock);
        f(&mut ring)
    }

    /// Live readings, oldest first
    pub fn readings(&self) -> Vec<Reading> {
        self.state.readings().collect()
    }

    /// Live reading values, oldest first
    pub fn values(&self) -> Vec<i32> {
        self.state.readings().map(|r| r.value).collect()
    }
}
