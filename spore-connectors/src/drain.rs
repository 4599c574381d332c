//! Upload drain session
//!
//! ## Overview
//!
//! One `DrainSession` per wake. It walks the connection through
//!
//! ```text
//! Idle → Connecting → Draining → [ConfigUpdate] → [FirmwareUpdate] → Closed
//! ```
//!
//! and reports what happened in a `DrainReport`. Nothing here returns
//! `Err`: every failure is an ordinary way for a session to end, and the
//! ring only loses entries the server acknowledged.
//!
//! ## Batching
//!
//! Batches are taken from the front of the ring, at most `batch_size`
//! entries each. Every batch carries `time_offset`, the age of the shared
//! timebase, so the server can turn timestamp offsets into wall time. The
//! batch that covers the last remaining entries also carries the current
//! calibration block.
//!
//! ## Pending Work
//!
//! `update` and `config` directives set a flag in the sleep clock record.
//! Flags survive sleep, so a request seen just before a timeout is retried
//! on the next wake that connects. A flag is cleared once its sub-protocol
//! has run to the end.

use crate::config_update::{self, ConfigReport};
use crate::firmware::{self, FirmwareOutcome, FirmwareTarget, Platform};
use crate::message::{self, Measurement, TelemetryMessage};
use crate::reply::Reply;
use crate::transport::{Connector, Transport};
use crate::{ConnectorError, ConnectorResult};
use spore_core::clock::{self, FLAG_CONFIG_PENDING, FLAG_UPDATE_PENDING};
use spore_core::settings::{DEFAULT_REPORT_HOST, DEFAULT_REPORT_PORT};
use spore_core::{
    timebase, Calibration, NodeSettings, RetainedMemory, SettingsStore, TelemetryRing, TimeSource,
    NUM_STORAGE_SLOTS,
};
use std::time::Duration;

/// Default wait for each server reply
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 2_000;

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Firmware build tag sent with every message
pub const FIRMWARE_NAME: &str = concat!("spore-", env!("CARGO_PKG_VERSION"));

/// Where to upload and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainConfig {
    /// Report server host
    pub host: String,
    /// Report server port
    pub port: u16,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Wait for each reply, length line or payload chunk
    pub response_timeout: Duration,
    /// Ring entries per message (at least 1)
    pub batch_size: usize,
    /// Node id
    pub node: String,
    /// Firmware build tag
    pub firmware: String,
}

impl DrainConfig {
    /// Config for `host:port` with default timeouts
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            response_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
            batch_size: NUM_STORAGE_SLOTS,
            node: String::new(),
            firmware: FIRMWARE_NAME.to_string(),
        }
    }

    /// Config from the node's settings
    pub fn from_settings(settings: &NodeSettings) -> Self {
        Self::new(settings.report_host.as_str(), settings.report_port).node(settings.node_name.as_str())
    }

    /// Set connect timeout
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout = Duration::from_millis(ms);
        self
    }

    /// Set reply timeout
    pub fn response_timeout_ms(mut self, ms: u64) -> Self {
        self.response_timeout = Duration::from_millis(ms);
        self
    }

    /// Set entries per message
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set node id
    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }

    /// Set firmware build tag
    pub fn firmware(mut self, firmware: impl Into<String>) -> Self {
        self.firmware = firmware.into();
        self
    }
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_HOST, DEFAULT_REPORT_PORT)
    }
}

/// Collaborators the sub-protocols reach outside the ring
pub struct NodeContext<'x> {
    /// Retained memory, for the wipe before a firmware update
    pub retained: &'x mut dyn RetainedMemory,
    /// Settings store
    pub settings: &'x mut dyn SettingsStore,
    /// Firmware update mechanism
    pub firmware: &'x mut dyn FirmwareTarget,
    /// Restart hook
    pub platform: &'x mut dyn Platform,
}

/// Where a session is, or where it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started
    Idle,
    /// Opening the connection
    Connecting,
    /// Sending batches
    Draining,
    /// Fetching config files
    ConfigUpdate,
    /// Receiving a firmware image
    FirmwareUpdate,
    /// Connection closed
    Closed,
}

/// What a session did
#[derive(Debug, Clone, PartialEq)]
pub struct DrainReport {
    /// Last state reached
    pub final_state: SessionState,
    /// The connection opened
    pub connected: bool,
    /// Batches sent
    pub sent_batches: usize,
    /// Entries acknowledged and deleted
    pub acked: usize,
    /// Config update requested and not yet done
    pub pending_config: bool,
    /// Firmware update requested and not yet done
    pub pending_update: bool,
    /// Server error reason or transport failure
    pub error: Option<String>,
    /// The session ended on a transport timeout
    pub timed_out: bool,
    /// Config sub-protocol result, if it ran to the end
    pub config: Option<ConfigReport>,
    /// Firmware sub-protocol result, if it ran
    pub firmware: Option<FirmwareOutcome>,
}

impl DrainReport {
    fn new() -> Self {
        Self {
            final_state: SessionState::Idle,
            connected: false,
            sent_batches: 0,
            acked: 0,
            pending_config: false,
            pending_update: false,
            error: None,
            timed_out: false,
            config: None,
            firmware: None,
        }
    }

    /// True if the node restarted during the session
    pub fn restarted(&self) -> bool {
        self.firmware.as_ref().is_some_and(FirmwareOutcome::restarted)
    }

    fn fail(&mut self, err: &ConnectorError) {
        self.timed_out = matches!(err, ConnectorError::Timeout);
        self.error = Some(err.to_string());
    }
}

/// One upload session
#[derive(Debug)]
pub struct DrainSession<'c> {
    config: &'c DrainConfig,
    state: SessionState,
}

impl<'c> DrainSession<'c> {
    /// Idle session
    pub fn new(config: &'c DrainConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn enter(&mut self, state: SessionState) {
        log::debug!("drain session: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Connect, drain, run requested sub-protocols, close
    pub fn run<C, const N: usize, T>(
        &mut self,
        connector: &mut C,
        ring: &mut TelemetryRing<'_, N, T>,
        ctx: &mut NodeContext<'_>,
    ) -> DrainReport
    where
        C: Connector,
        T: TimeSource,
    {
        let mut report = DrainReport::new();
        let flags = ring.state().sleep_clock();
        report.pending_config = flags.has_flag(FLAG_CONFIG_PENDING);
        report.pending_update = flags.has_flag(FLAG_UPDATE_PENDING);

        self.enter(SessionState::Connecting);
        let mut transport = match connector.connect(
            &self.config.host,
            self.config.port,
            self.config.connect_timeout,
        ) {
            Ok(transport) => transport,
            Err(e) => {
                log::warn!("upload skipped: {e}");
                report.fail(&e);
                self.enter(SessionState::Closed);
                report.final_state = self.state;
                return report;
            }
        };
        report.connected = true;

        self.enter(SessionState::Draining);
        let calibration = Calibration::load(&mut *ctx.settings).unwrap_or_else(|e| {
            log::warn!("using cached calibration: {e}");
            Calibration::from_cache(ring.state())
        });
        let drained = self.drain(&mut transport, ring, &calibration, &mut report);

        match drained {
            Err(e) => {
                log::warn!("drain aborted: {e}");
                report.fail(&e);
            }
            // The server refused us; requests it made stay flagged for later
            Ok(()) if report.error.is_some() => {}
            Ok(()) => self.updates(&mut transport, ring, ctx, &mut report),
        }

        transport.close();
        self.enter(SessionState::Closed);
        report.final_state = self.state;
        report
    }

    /// Send batches until the ring is empty, the server stops acknowledging,
    /// or it reports an error
    ///
    /// A server error is recorded in `report`; only transport failures come
    /// back as `Err`.
    pub fn drain<X, const N: usize, T>(
        &mut self,
        transport: &mut X,
        ring: &mut TelemetryRing<'_, N, T>,
        calibration: &Calibration,
        report: &mut DrainReport,
    ) -> ConnectorResult<()>
    where
        X: Transport + ?Sized,
        T: TimeSource,
    {
        while !ring.is_empty() {
            let batch_len = ring.len().min(self.config.batch_size);
            let message = self.batch(ring, batch_len, calibration);
            transport.send(&message::encode(&message)?)?;
            report.sent_batches += 1;
            log::debug!(
                "sent batch {} ({} of {} entries)",
                report.sent_batches,
                batch_len,
                ring.len()
            );

            let text = transport.read_reply(self.config.response_timeout)?;
            log::info!("server reply: {}", text.trim_end_matches('\0'));
            let reply = Reply::parse(&text);

            if reply.update.is_some() {
                report.pending_update = true;
                clock::set_flag(ring.state_mut(), FLAG_UPDATE_PENDING, true);
            }
            if reply.config.is_some() {
                report.pending_config = true;
                clock::set_flag(ring.state_mut(), FLAG_CONFIG_PENDING, true);
            }

            let acked = reply.ack_count(batch_len);
            if acked > 0 {
                report.acked += ring.drain_ack(acked);
            }

            if let Some(reason) = reply.error {
                log::warn!("server error: {reason}");
                report.error = Some(reason);
                break;
            }
            if acked == 0 {
                log::warn!("server acknowledged nothing, stopping");
                break;
            }
        }
        Ok(())
    }

    fn batch<const N: usize, T: TimeSource>(
        &self,
        ring: &TelemetryRing<'_, N, T>,
        batch_len: usize,
        calibration: &Calibration,
    ) -> TelemetryMessage {
        let uptime = ring.uptime();
        let time_offset = timebase::time_offset(ring.state(), uptime);
        let mut message = TelemetryMessage::new(&self.config.node, &self.config.firmware, time_offset);
        message.measurements.extend(
            ring.iter()
                .take(batch_len)
                .map(|reading| Measurement::from_reading(reading, calibration)),
        );
        if !message.has_leaf_measurement() {
            message.measurements.push(Measurement::uptime(uptime));
        }
        if batch_len == ring.len() {
            message = message.with_calibrations(calibration);
        }
        message
    }

    fn updates<X, const N: usize, T>(
        &mut self,
        transport: &mut X,
        ring: &mut TelemetryRing<'_, N, T>,
        ctx: &mut NodeContext<'_>,
        report: &mut DrainReport,
    ) where
        X: Transport + ?Sized,
        T: TimeSource,
    {
        if report.pending_config {
            self.enter(SessionState::ConfigUpdate);
            match config_update::run(transport, ring.state_mut(), &mut *ctx.settings, self.config) {
                Ok(config) => {
                    clock::set_flag(ring.state_mut(), FLAG_CONFIG_PENDING, false);
                    report.pending_config = false;
                    report.config = Some(config);
                }
                Err(e) => {
                    log::warn!("config update aborted: {e}");
                    report.fail(&e);
                    return;
                }
            }
        }

        if report.pending_update {
            self.enter(SessionState::FirmwareUpdate);
            // Cleared up front: a failed image restarts the node and the
            // wipe takes the flag with it anyway
            clock::set_flag(ring.state_mut(), FLAG_UPDATE_PENDING, false);
            match firmware::run(transport, ring.state_mut(), ctx, self.config) {
                Ok(outcome) => {
                    report.pending_update = false;
                    report.firmware = Some(outcome);
                }
                Err(e) => {
                    log::warn!("firmware update aborted: {e}");
                    clock::set_flag(ring.state_mut(), FLAG_UPDATE_PENDING, true);
                    report.fail(&e);
                }
            }
        }
    }
}
