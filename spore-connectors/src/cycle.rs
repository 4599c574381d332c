//! One wake, start to finish
//!
//! validate → sample → drain → persist → sleep, in that order and nothing
//! else. The caller owns the hardware: it builds the collaborators, calls
//! `WakeCycle::run`, then puts the chip to sleep for the returned duration
//! (unless the report says the node restarted).

use crate::drain::{DrainConfig, DrainReport, DrainSession, NodeContext};
use crate::transport::Connector;
use crate::ConnectorResult;
use spore_core::clock::{self, FLAG_CONFIG_PENDING, FLAG_UPDATE_PENDING};
use spore_core::{header, ReadingSink, RetainedState, SleepClock, StoreResult, TelemetryRing, TimeSource};

/// Sensors sampled once per wake
pub trait SensorSuite {
    /// Append this wake's readings
    fn sample(&mut self, sink: &mut dyn ReadingSink) -> StoreResult<()>;
}

/// What a wake did
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Retained contents survived from the previous wake
    pub warm: bool,
    /// Boot counter after this wake's increment
    pub boot_count: u32,
    /// Ring occupancy after sampling
    pub buffered: usize,
    /// Upload session, if one ran
    pub drain: Option<DrainReport>,
    /// Requested sleep; zero if the node restarted instead
    pub sleep_ms: u64,
}

impl CycleReport {
    /// True if a firmware update restarted the node
    pub fn restarted(&self) -> bool {
        self.drain.as_ref().is_some_and(DrainReport::restarted)
    }
}

/// Drives a wake
#[derive(Debug, Clone)]
pub struct WakeCycle {
    config: DrainConfig,
    magic: u32,
}

impl WakeCycle {
    /// Cycle uploading with `config`, trusting images sealed with `magic`
    pub fn new(config: DrainConfig, magic: u32) -> Self {
        Self { config, magic }
    }

    /// Upload settings
    pub fn config(&self) -> &DrainConfig {
        &self.config
    }

    /// Run one wake against `state`
    ///
    /// Sensor failures are logged and the wake carries on. Retained memory
    /// failures are returned, since nothing sensible can follow them.
    pub fn run<const N: usize, T, C>(
        &self,
        state: &mut RetainedState<N>,
        clock: &SleepClock<T>,
        sensors: &mut dyn SensorSuite,
        connector: &mut C,
        ctx: &mut NodeContext<'_>,
    ) -> ConnectorResult<CycleReport>
    where
        T: TimeSource,
        C: Connector,
    {
        let warm = header::load(state, &mut *ctx.retained, &mut *ctx.settings, self.magic)?;
        let boot_count = state.boot_count();

        let mut ring = TelemetryRing::new(state, clock);
        let now = ring.uptime();
        if let Err(e) = ring.store_timestamp(now) {
            log::warn!("wake timestamp not stored: {e}");
        }
        if let Err(e) = sensors.sample(&mut ring) {
            log::warn!("sensor sampling failed: {e}");
        }
        let buffered = ring.len();

        let flags = ring.state().sleep_clock();
        let pending = flags.has_flag(FLAG_CONFIG_PENDING) || flags.has_flag(FLAG_UPDATE_PENDING);
        let drain = if ring.reached_high_water() || pending {
            log::info!("uploading {buffered} readings (pending work: {pending})");
            let report = DrainSession::new(&self.config).run(connector, &mut ring, ctx);
            if report.connected {
                clock::clear_wifi_failures(ring.state_mut());
            } else {
                let fails = clock::record_wifi_failure(ring.state_mut());
                log::warn!("{fails} consecutive failed uploads");
            }
            Some(report)
        } else {
            None
        };
        drop(ring);

        let mut report = CycleReport {
            warm,
            boot_count,
            buffered,
            drain,
            sleep_ms: 0,
        };
        if report.restarted() {
            return Ok(report);
        }

        report.sleep_ms = u64::from(state.sleep_params().effective_sleep_ms());
        clock.save(state, &mut *ctx.retained, self.magic, report.sleep_ms)?;
        Ok(report)
    }
}
