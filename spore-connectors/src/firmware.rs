//! Firmware-update sub-protocol
//!
//! ```text
//! → {"command":"update","arg":"<firmware name>", ...}\0
//! ← <length>\n
//! ← <sha256 hex>\n
//! ← <length raw bytes>
//! ```
//!
//! A length of zero (no update) or one larger than `MAX_FIRMWARE_LEN` ends
//! the exchange with nothing touched. Past that point the retained state is
//! wiped, since the new build may lay it out differently, and the node
//! restarts whatever happens: the platform's update mechanism may already
//! have staged a boot directive, and that must not survive into a normal
//! wake.

use crate::checksum::{self, ChecksumStream};
use crate::drain::{DrainConfig, NodeContext};
use crate::message::{self, CommandMessage};
use crate::transport::Transport;
use crate::{ConnectorError, ConnectorResult};
use spore_core::{header, RetainedState};

/// Largest image we will accept
pub const MAX_FIRMWARE_LEN: usize = 1 << 20;

/// Bytes read from the server per write to the target
pub const FIRMWARE_CHUNK_LEN: usize = 1024;

/// Platform update mechanism
pub trait FirmwareTarget {
    /// Prepare to receive `len` bytes expected to hash to `checksum`
    fn begin(&mut self, len: usize, checksum: &str) -> ConnectorResult<()>;

    /// Append the next chunk of the image
    fn write(&mut self, chunk: &[u8]) -> ConnectorResult<()>;

    /// Commit the image if `verified`, otherwise discard it
    fn finish(&mut self, verified: bool) -> ConnectorResult<()>;
}

/// Whole-device operations
pub trait Platform {
    /// Reboot the node. On hardware this does not return.
    fn restart(&mut self);
}

/// How an update attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareOutcome {
    /// Declined before anything was touched; no restart
    Rejected {
        /// Why
        reason: String,
    },
    /// Image received, verified and committed; restarted
    Applied {
        /// Image size
        len: usize,
    },
    /// Started but did not verify; restarted
    Failed {
        /// Why
        reason: String,
    },
}

impl FirmwareOutcome {
    /// True if the node was restarted
    pub fn restarted(&self) -> bool {
        !matches!(self, FirmwareOutcome::Rejected { .. })
    }
}

fn parse_length(line: &str) -> Result<usize, String> {
    let trimmed = line.trim();
    let len: usize = trimmed
        .parse()
        .map_err(|_| format!("bad length line {trimmed:?}"))?;
    if len == 0 {
        return Err("no update available".into());
    }
    if len > MAX_FIRMWARE_LEN {
        return Err(format!("image of {len} bytes exceeds {MAX_FIRMWARE_LEN}"));
    }
    Ok(len)
}

/// Request, verify and apply a firmware image
///
/// Transport failures before the image is accepted come back as `Err`.
/// Everything after that is reported through `FirmwareOutcome`.
pub fn run<const N: usize, X: Transport + ?Sized>(
    transport: &mut X,
    state: &mut RetainedState<N>,
    ctx: &mut NodeContext<'_>,
    config: &DrainConfig,
) -> ConnectorResult<FirmwareOutcome> {
    let timeout = config.response_timeout;
    let command = CommandMessage::new(&config.node, &config.firmware, "update", &config.firmware);
    transport.send(&message::encode(&command)?)?;

    let len = match parse_length(&transport.read_line(timeout)?) {
        Ok(len) => len,
        Err(reason) => {
            log::info!("firmware update declined: {reason}");
            return Ok(FirmwareOutcome::Rejected { reason });
        }
    };
    let expected = transport.read_line(timeout)?;
    log::info!("firmware update: {len} bytes, sha256 {}", expected.trim());

    let outcome = match apply(transport, state, ctx, len, expected.trim(), config) {
        Ok(()) => FirmwareOutcome::Applied { len },
        Err(e) => {
            log::warn!("firmware update failed: {e}");
            FirmwareOutcome::Failed { reason: e.to_string() }
        }
    };

    log::info!("restarting after firmware update");
    ctx.platform.restart();
    Ok(outcome)
}

fn apply<const N: usize, X: Transport + ?Sized>(
    transport: &mut X,
    state: &mut RetainedState<N>,
    ctx: &mut NodeContext<'_>,
    len: usize,
    expected: &str,
    config: &DrainConfig,
) -> ConnectorResult<()> {
    ctx.firmware.begin(len, expected)?;
    header::invalidate(state, &mut *ctx.retained, &mut *ctx.settings)?;

    let streamed = stream_image(transport, ctx, len, config);
    let verified = match &streamed {
        Ok(digest) => checksum::hex_eq(digest, expected),
        Err(_) => false,
    };
    ctx.firmware.finish(verified)?;

    let digest = streamed?;
    if !verified {
        return Err(ConnectorError::Protocol(format!(
            "image checksum mismatch (expected {expected}, got {digest})"
        )));
    }
    Ok(())
}

fn stream_image<X: Transport + ?Sized>(
    transport: &mut X,
    ctx: &mut NodeContext<'_>,
    len: usize,
    config: &DrainConfig,
) -> ConnectorResult<String> {
    let mut hasher = ChecksumStream::new();
    let mut chunk = [0u8; FIRMWARE_CHUNK_LEN];
    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(FIRMWARE_CHUNK_LEN);
        transport.read_exact(&mut chunk[..n], config.response_timeout)?;
        hasher.update(&chunk[..n]);
        ctx.firmware.write(&chunk[..n])?;
        remaining -= n;
        if hasher.len() % (64 * FIRMWARE_CHUNK_LEN) == 0 {
            log::debug!("firmware: {} of {len} bytes", hasher.len());
        }
    }
    Ok(hasher.finish())
}
