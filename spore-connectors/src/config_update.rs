//! Config-update sub-protocol
//!
//! For each name in `CONFIG_NAMES` the node asks for a waiting file:
//!
//! ```text
//! → {"command":"get_config","arg":"<name>", ...}\0
//! ← <length>\n          empty line: nothing waiting
//! ← <sha256 hex>\n
//! ← <length raw bytes>
//! → {"command":"delete_config","arg":"<name>", ...}\0   only once applied
//! ```
//!
//! An oversized file or a checksum mismatch discards that one file and moves
//! on; an oversized body is still read off the stream. A length line that is
//! not a number, or any transport failure, stops the walk since the stream
//! position is then unknown.

use crate::checksum;
use crate::drain::DrainConfig;
use crate::message::{self, CommandMessage};
use crate::transport::Transport;
use crate::{ConnectorError, ConnectorResult};
use spore_core::settings::{self, CONFIG_NAMES, MAX_SETTING_LEN};
use spore_core::{RetainedState, SettingsStore};
use std::time::Duration;

/// Largest config file we accept
pub const MAX_CONFIG_LEN: usize = MAX_SETTING_LEN;

/// What happened to each config name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigReport {
    /// Written to the settings store and deleted on the server
    pub applied: Vec<&'static str>,
    /// Nothing waiting
    pub skipped: Vec<&'static str>,
    /// Bad length, checksum mismatch, or the store refused the write
    pub rejected: Vec<&'static str>,
}

impl ConfigReport {
    /// True if every name was looked at and none failed
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.applied.len() + self.skipped.len() == CONFIG_NAMES.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Length {
    /// Empty line: nothing waiting
    Absent,
    Accepted(usize),
    /// A file follows but we will not store it
    Refused(usize),
    Garbled,
}

fn parse_length(line: &str) -> Length {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Length::Absent;
    }
    match trimmed.parse::<usize>() {
        Ok(len) if (1..=MAX_CONFIG_LEN).contains(&len) => Length::Accepted(len),
        Ok(len) => Length::Refused(len),
        Err(_) => Length::Garbled,
    }
}

/// Read and drop a refused body so the next name starts on its length line
fn discard<X: Transport + ?Sized>(transport: &mut X, mut len: usize, timeout: Duration) -> ConnectorResult<()> {
    let mut scratch = [0u8; MAX_CONFIG_LEN];
    while len > 0 {
        let take = len.min(scratch.len());
        transport.read_exact(&mut scratch[..take], timeout)?;
        len -= take;
    }
    Ok(())
}

/// Fetch and apply every waiting config file
///
/// Returns `Err` for transport failures and unreadable length lines; names
/// handled before the failure stay applied.
pub fn run<const N: usize, X: Transport + ?Sized, S: SettingsStore + ?Sized>(
    transport: &mut X,
    state: &mut RetainedState<N>,
    store: &mut S,
    config: &DrainConfig,
) -> ConnectorResult<ConfigReport> {
    let mut report = ConfigReport::default();
    for name in CONFIG_NAMES {
        fetch_one(transport, state, store, config, name, &mut report)?;
    }
    log::info!(
        "config update: {} applied, {} skipped, {} rejected",
        report.applied.len(),
        report.skipped.len(),
        report.rejected.len()
    );
    Ok(report)
}

fn fetch_one<const N: usize, X: Transport + ?Sized, S: SettingsStore + ?Sized>(
    transport: &mut X,
    state: &mut RetainedState<N>,
    store: &mut S,
    config: &DrainConfig,
    name: &'static str,
    report: &mut ConfigReport,
) -> ConnectorResult<()> {
    let timeout = config.response_timeout;
    let command = CommandMessage::new(&config.node, &config.firmware, "get_config", name);
    transport.send(&message::encode(&command)?)?;

    let line = transport.read_line(timeout)?;
    let len = match parse_length(&line) {
        Length::Accepted(len) => len,
        Length::Absent => {
            report.skipped.push(name);
            return Ok(());
        }
        Length::Refused(len) => {
            log::warn!("config {name}: refusing {len} byte file (limit {MAX_CONFIG_LEN})");
            transport.read_line(timeout)?;
            discard(transport, len, timeout)?;
            report.rejected.push(name);
            return Ok(());
        }
        Length::Garbled => {
            return Err(ConnectorError::Protocol(format!(
                "config {name}: bad length line {:?}",
                line.trim()
            )));
        }
    };
    let expected = transport.read_line(timeout)?;

    let mut body = [0u8; MAX_CONFIG_LEN];
    let body = &mut body[..len];
    transport.read_exact(body, timeout)?;

    if !checksum::matches(body, &expected) {
        log::warn!(
            "config {name}: checksum mismatch (expected {}, got {})",
            expected.trim(),
            checksum::sha256_hex(body)
        );
        report.rejected.push(name);
        return Ok(());
    }

    if let Err(e) = store.write(name, body) {
        log::warn!("config {name}: could not store: {e}");
        report.rejected.push(name);
        return Ok(());
    }
    if settings::refresh_cache(state, name, body) {
        log::debug!("config {name}: retained cache refreshed");
    }

    let delete = CommandMessage::new(&config.node, &config.firmware, "delete_config", name);
    transport.send(&message::encode(&delete)?)?;
    log::info!("config {name}: applied {len} bytes");
    report.applied.push(name);
    Ok(())
}
