//! Uplink for Spore Sensor Nodes
//!
//! ## Overview
//!
//! A node buffers readings in retained memory (see `spore-core`) and, every
//! so often, opens a plain TCP connection to its report server and drains
//! the buffer. This crate holds everything on the far side of that
//! decision: the wire messages, the reply parser, the drain session state
//! machine, the config-update and firmware-update sub-protocols, and the
//! wake cycle that ties the whole thing together.
//!
//! ## Session Shape
//!
//! ```text
//! Idle ─► Connecting ─┬─► Draining ─┬─► ConfigUpdate ─┬─► FirmwareUpdate ─► (restart)
//!                     │             │                 │
//!                     └─────────────┴─────────────────┴─► Closed
//! ```
//!
//! - **Connecting**: one attempt per wake. A failure goes straight to
//!   `Closed` and the wake cycle counts it.
//! - **Draining**: batches go out oldest first, each followed by a bounded
//!   wait for a reply. Only acknowledged entries leave the ring, so a timeout
//!   costs a retransmission next time and never a reading.
//! - **ConfigUpdate / FirmwareUpdate**: entered only when the server asked
//!   for them, in this wake or an earlier one (the request is remembered in
//!   the sleep clock flags).
//!
//! ## Wire Format
//!
//! Client messages are JSON objects terminated by a NUL byte. Server replies
//! to telemetry are comma-separated directives, also NUL-terminated:
//!
//! ```text
//! → {"version":1,"node":"spores-42","firmware":"spore-0.1.0","time_offset":1500,
//!    "measurements":[{"type":"temperature","value":21.5},{"type":"timestamp","value":1200}]}\0
//! ← OK,2,config\0
//! ```
//!
//! File and firmware transfers answer a command with a decimal length line,
//! a hex SHA-256 line, then exactly that many raw bytes.
//!
//! ## Error Classes
//!
//! | Class       | Example                     | Effect                                 |
//! |-------------|-----------------------------|----------------------------------------|
//! | Transport   | connect refused, timeout    | session ends, nothing deleted          |
//! | Integrity   | checksum mismatch           | that item discarded, others continue   |
//! | Server      | `error,<reason>`            | no further batches this wake           |
//!
//! Integrity failures are reported in `ConfigReport` and `FirmwareOutcome`
//! rather than as `Err`, because the session carries on after them.
//!
//! ## Example Usage
//!
//! ```no_run
//! use spore_connectors::{DrainConfig, TcpConnector};
//!
//! let config = DrainConfig::new("boxy", 2880)
//!     .response_timeout_ms(2_000)
//!     .batch_size(16)
//!     .node("spores-42");
//! let connector = TcpConnector::new();
//! # let _ = (config, connector);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use spore_core::StoreError;
use thiserror::Error;

pub mod checksum;
pub mod config_update;
pub mod cycle;
pub mod drain;
pub mod firmware;
pub mod message;
pub mod reply;
pub mod transport;

pub use checksum::{sha256_hex, ChecksumStream};
pub use config_update::{ConfigReport, MAX_CONFIG_LEN};
pub use cycle::{CycleReport, SensorSuite, WakeCycle};
pub use drain::{DrainConfig, DrainReport, DrainSession, NodeContext, SessionState};
pub use firmware::{FirmwareOutcome, FirmwareTarget, Platform, MAX_FIRMWARE_LEN};
pub use message::{CalibrationBlock, CommandMessage, Measurement, MeasurementValue, TelemetryMessage};
pub use reply::{Ack, Reply};
pub use transport::{Connector, TcpConnector, TcpTransport, Transport};

/// Version field carried by every client message
pub const PROTOCOL_VERSION: u32 = 1;

/// Errors raised while talking to the report server
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Could not open a connection
    #[error("connect to {host}:{port} failed: {reason}")]
    ConnectFailed {
        /// Host we tried
        host: String,
        /// Port we tried
        port: u16,
        /// Underlying cause
        reason: String,
    },

    /// Nothing arrived before the deadline
    #[error("timed out waiting for the server")]
    Timeout,

    /// The peer stopped accepting bytes part way through a write
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes accepted
        written: usize,
        /// Bytes we meant to send
        expected: usize,
    },

    /// The peer closed the connection
    #[error("connection closed by peer")]
    Closed,

    /// Socket-level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent something we cannot interpret
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Message encoding failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Retained store or settings failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ConnectorError {
    /// True for failures that mean the connection is no longer usable
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectFailed { .. }
                | ConnectorError::Timeout
                | ConnectorError::ShortWrite { .. }
                | ConnectorError::Closed
                | ConnectorError::Io(_)
        )
    }
}

/// Result type for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;
