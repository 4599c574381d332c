//! Wake-local time sources
//!
//! The node has no real-time clock. Within one wake it only has a
//! free-running millisecond timer that restarts at zero on every boot;
//! the sleep clock adds that to the uptime carried in retained memory.
//!
//! - `WakeTimer`: host timer backed by `std::time::Instant`
//! - `FixedTime`: manually advanced timer for tests and simulation

use core::cell::Cell;

/// Milliseconds, either since wake or since first power-on
pub type Timestamp = u64;

/// Source of time since the current wake
pub trait TimeSource {
    /// Milliseconds elapsed since this wake began
    fn now(&self) -> Timestamp;
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Wake timer using the host monotonic clock
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct WakeTimer {
    started: std::time::Instant,
}

#[cfg(feature = "std")]
impl WakeTimer {
    /// Start counting from now
    pub fn start() -> Self {
        Self { started: std::time::Instant::now() }
    }
}

#[cfg(feature = "std")]
impl Default for WakeTimer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(feature = "std")]
impl TimeSource for WakeTimer {
    fn now(&self) -> Timestamp {
        self.started.elapsed().as_millis() as Timestamp
    }
}

/// Fixed time source for testing
///
/// Interior mutability lets a test advance time while a `SleepClock`
/// holds a shared reference.
#[derive(Debug, Clone, Default)]
pub struct FixedTime {
    timestamp: Cell<Timestamp>,
}

impl FixedTime {
    /// Timer reading `timestamp`
    pub fn new(timestamp: Timestamp) -> Self {
        Self { timestamp: Cell::new(timestamp) }
    }

    /// Jump to `timestamp`
    pub fn set(&self, timestamp: Timestamp) {
        self.timestamp.set(timestamp);
    }

    /// Move forward by `ms`
    pub fn advance(&self, ms: u64) {
        self.timestamp.set(self.timestamp.get() + ms);
    }

    /// Simulate a reboot: the wake timer starts over
    pub fn reset(&self) {
        self.timestamp.set(0);
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> Timestamp {
        self.timestamp.get()
    }
}
