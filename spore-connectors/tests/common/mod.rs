//! Common test utilities for connector integration tests
//!
//! - `ScriptedConnector` hands out transports that replay a script of
//!   server output and record everything the node sends
//! - `Node` bundles the retained region, settings, firmware target and
//!   platform a real node would own, and survives across simulated wakes

#![allow(dead_code)]

use serde_json::Value;
use spore_connectors::{
    checksum, Connector, ConnectorError, ConnectorResult, CycleReport, DrainConfig, DrainReport,
    DrainSession, FirmwareTarget, NodeContext, Platform, SensorSuite, Transport, WakeCycle,
};
use spore_core::settings::CONFIG_NAMES;
use spore_core::{
    header, FixedTime, MemorySettings, Reading, ReadingSink, RetainedState, SensorKind,
    SimulatedRegion, SleepClock, StoreResult, TelemetryRing,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

/// Slots in the simulated ring
pub const SLOTS: usize = 8;

/// Build magic used by the simulated firmware
pub const MAGIC: u32 = 0x5EED_0002;

/// One piece of server output
#[derive(Debug, Clone)]
pub enum Incoming {
    /// NUL-terminated reply
    Reply(String),
    /// Newline-terminated line
    Line(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Server goes quiet
    Timeout,
}

/// Both ends of the simulated connection
#[derive(Debug, Default)]
pub struct Wire {
    pub incoming: VecDeque<Incoming>,
    pub sent: Vec<Vec<u8>>,
    pub connects: usize,
    pub closed: bool,
}

/// Connector whose transports share one scripted wire
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    wire: Rc<RefCell<Wire>>,
    refuse: bool,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connect attempt fails
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn reply(&self, text: &str) -> &Self {
        self.push(Incoming::Reply(text.to_string()))
    }

    pub fn line(&self, text: &str) -> &Self {
        self.push(Incoming::Line(text.to_string()))
    }

    pub fn bytes(&self, bytes: &[u8]) -> &Self {
        self.push(Incoming::Bytes(bytes.to_vec()))
    }

    pub fn timeout(&self) -> &Self {
        self.push(Incoming::Timeout)
    }

    pub fn push(&self, incoming: Incoming) -> &Self {
        self.wire.borrow_mut().incoming.push_back(incoming);
        self
    }

    /// Script a transfer answer: length, checksum, body
    pub fn file(&self, body: &[u8]) -> &Self {
        self.file_with_checksum(body, &checksum::sha256_hex(body))
    }

    pub fn file_with_checksum(&self, body: &[u8], sha: &str) -> &Self {
        self.line(&body.len().to_string()).line(sha).bytes(body)
    }

    /// Script answers for the whole config walk; unnamed entries are absent
    pub fn config_walk(&self, files: &[(&str, &[u8])]) -> &Self {
        for name in CONFIG_NAMES {
            match files.iter().find(|(n, _)| *n == name) {
                Some((_, body)) => self.file(body),
                None => self.line(""),
            };
        }
        self
    }

    pub fn connects(&self) -> usize {
        self.wire.borrow().connects
    }

    pub fn closed(&self) -> bool {
        self.wire.borrow().closed
    }

    pub fn unread(&self) -> usize {
        self.wire.borrow().incoming.len()
    }

    /// Every message sent, as JSON
    pub fn sent(&self) -> Vec<Value> {
        self.wire
            .borrow()
            .sent
            .iter()
            .map(|bytes| {
                assert_eq!(bytes.last(), Some(&0), "message not NUL-terminated");
                serde_json::from_slice(&bytes[..bytes.len() - 1]).unwrap()
            })
            .collect()
    }

    /// Telemetry batches sent
    pub fn batches(&self) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|m| m.get("measurements").is_some())
            .collect()
    }

    /// `(command, arg)` pairs sent
    pub fn commands(&self) -> Vec<(String, String)> {
        self.sent()
            .into_iter()
            .filter_map(|m| {
                let command = m.get("command")?.as_str()?.to_string();
                let arg = m.get("arg")?.as_str()?.to_string();
                Some((command, arg))
            })
            .collect()
    }
}

impl Connector for ScriptedConnector {
    type Transport = ScriptedTransport;

    fn connect(&mut self, host: &str, port: u16, _timeout: Duration) -> ConnectorResult<ScriptedTransport> {
        self.wire.borrow_mut().connects += 1;
        if self.refuse {
            return Err(ConnectorError::ConnectFailed {
                host: host.to_string(),
                port,
                reason: "refused".into(),
            });
        }
        self.wire.borrow_mut().closed = false;
        Ok(ScriptedTransport {
            wire: Rc::clone(&self.wire),
        })
    }
}

/// Transport replaying a `Wire`
#[derive(Debug)]
pub struct ScriptedTransport {
    wire: Rc<RefCell<Wire>>,
}

impl ScriptedTransport {
    fn next(&mut self) -> ConnectorResult<Incoming> {
        let mut wire = self.wire.borrow_mut();
        if wire.closed {
            return Err(ConnectorError::Closed);
        }
        match wire.incoming.pop_front() {
            Some(Incoming::Timeout) | None => Err(ConnectorError::Timeout),
            Some(incoming) => Ok(incoming),
        }
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, data: &[u8]) -> ConnectorResult<()> {
        let mut wire = self.wire.borrow_mut();
        if wire.closed {
            return Err(ConnectorError::Closed);
        }
        wire.sent.push(data.to_vec());
        Ok(())
    }

    fn read_reply(&mut self, _timeout: Duration) -> ConnectorResult<String> {
        match self.next()? {
            Incoming::Reply(text) => Ok(text),
            other => Err(ConnectorError::Protocol(format!("expected reply, script has {other:?}"))),
        }
    }

    fn read_line(&mut self, _timeout: Duration) -> ConnectorResult<String> {
        match self.next()? {
            Incoming::Line(text) => Ok(text),
            other => Err(ConnectorError::Protocol(format!("expected line, script has {other:?}"))),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8], _timeout: Duration) -> ConnectorResult<()> {
        match self.next()? {
            Incoming::Bytes(bytes) if bytes.len() >= buf.len() => {
                buf.copy_from_slice(&bytes[..buf.len()]);
                if bytes.len() > buf.len() {
                    let rest = bytes[buf.len()..].to_vec();
                    self.wire.borrow_mut().incoming.push_front(Incoming::Bytes(rest));
                }
                Ok(())
            }
            Incoming::Bytes(_) => Err(ConnectorError::Closed),
            other => Err(ConnectorError::Protocol(format!("expected bytes, script has {other:?}"))),
        }
    }

    fn close(&mut self) {
        self.wire.borrow_mut().closed = true;
    }
}

/// Firmware target that keeps what it was given
#[derive(Debug, Default)]
pub struct RecordingFirmware {
    pub began: Option<(usize, String)>,
    pub image: Vec<u8>,
    pub finished: Option<bool>,
}

impl FirmwareTarget for RecordingFirmware {
    fn begin(&mut self, len: usize, checksum: &str) -> ConnectorResult<()> {
        self.began = Some((len, checksum.to_string()));
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> ConnectorResult<()> {
        self.image.extend_from_slice(chunk);
        Ok(())
    }

    fn finish(&mut self, verified: bool) -> ConnectorResult<()> {
        self.finished = Some(verified);
        Ok(())
    }
}

/// Platform that counts restarts
#[derive(Debug, Default)]
pub struct RecordingPlatform {
    pub restarts: usize,
}

impl Platform for RecordingPlatform {
    fn restart(&mut self) {
        self.restarts += 1;
    }
}

/// Sensors returning the same readings every wake
#[derive(Debug, Clone, Default)]
pub struct FixedSensors(pub Vec<(SensorKind, i64)>);

impl SensorSuite for FixedSensors {
    fn sample(&mut self, sink: &mut dyn ReadingSink) -> StoreResult<()> {
        for &(kind, value) in &self.0 {
            sink.store(kind, value)?;
        }
        Ok(())
    }
}

/// Simulated sensor node
pub struct Node {
    pub region: SimulatedRegion,
    pub settings: MemorySettings,
    pub firmware: RecordingFirmware,
    pub platform: RecordingPlatform,
    pub timer: FixedTime,
    pub state: RetainedState<SLOTS>,
}

impl Node {
    pub fn new() -> Self {
        Self {
            region: SimulatedRegion::new(),
            settings: MemorySettings::new(),
            firmware: RecordingFirmware::default(),
            platform: RecordingPlatform::default(),
            timer: FixedTime::new(0),
            state: RetainedState::new(),
        }
    }

    fn split(&mut self) -> (&mut RetainedState<SLOTS>, &FixedTime, NodeContext<'_>) {
        let Node {
            region,
            settings,
            firmware,
            platform,
            timer,
            state,
        } = self;
        let ctx = NodeContext {
            retained: region,
            settings,
            firmware,
            platform,
        };
        (state, &*timer, ctx)
    }

    /// Boot: timer restarts, state comes back from retained memory
    pub fn wake(&mut self) -> bool {
        self.timer.reset();
        self.state = RetainedState::new();
        header::load(&mut self.state, &mut self.region, &mut self.settings, MAGIC).unwrap()
    }

    /// Persist, sleep 15 s and wake again
    pub fn sleep_and_wake(&mut self) -> bool {
        let clock = SleepClock::new(&self.timer);
        clock.save(&mut self.state, &mut self.region, MAGIC, 15_000).unwrap();
        self.wake()
    }

    /// Append readings for this wake
    pub fn store(&mut self, kind: SensorKind, values: &[i64]) {
        let clock = SleepClock::new(&self.timer);
        let mut ring = TelemetryRing::new(&mut self.state, &clock);
        for &value in values {
            ring.store(kind, value).unwrap();
        }
    }

    /// Run one upload session
    pub fn drain(&mut self, connector: &mut ScriptedConnector, config: &DrainConfig) -> DrainReport {
        let (state, timer, mut ctx) = self.split();
        let clock = SleepClock::new(timer);
        let mut ring = TelemetryRing::new(state, &clock);
        DrainSession::new(config).run(connector, &mut ring, &mut ctx)
    }

    /// Run a whole wake, starting from retained memory
    pub fn cycle(
        &mut self,
        sensors: &mut FixedSensors,
        connector: &mut ScriptedConnector,
        config: &DrainConfig,
    ) -> CycleReport {
        self.timer.reset();
        self.state = RetainedState::new();
        self.timer.advance(50);
        let (state, timer, mut ctx) = self.split();
        let clock = SleepClock::new(timer);
        WakeCycle::new(config.clone(), MAGIC)
            .run(state, &clock, sensors, connector, &mut ctx)
            .unwrap()
    }

    pub fn readings(&self) -> Vec<Reading> {
        self.state.readings().collect()
    }

    pub fn values(&self) -> Vec<i32> {
        self.state.readings().map(|r| r.value).collect()
    }
}

/// Upload config used by the tests
pub fn config() -> DrainConfig {
    DrainConfig::default().node("spores-test").firmware("spore-test")
}
