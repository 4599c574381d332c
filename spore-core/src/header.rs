//! Header check: cold boot or warm wake?
//!
//! ## Overview
//!
//! The first two retained words hold a checksum and a boot counter. The
//! image is trusted only when `checksum + boot_count == magic`, where the
//! magic is derived from the firmware build:
//!
//! ```text
//! BUILD_MAGIC = 0xAA559876 ^ fnv1a(SPORE_BUILD_ID) ^ rotl(LAYOUT_VERSION, 24)
//! ```
//!
//! Power loss zeroes the region and a reflash changes the magic, so both
//! fail the check. A failed check is the normal recovery path, not an
//! error: the state is wiped, long-lived calibrations are re-seeded from
//! the settings store, and the caller continues with an empty ring.

use crate::constants::layout::{LAYOUT_VERSION, PREINIT_MAGIC};
use crate::constants::time::DEFAULT_SLEEP_CLOCK_ADJ_MS;
use crate::errors::StoreResult;
use crate::retained::{RetainedMemory, RetainedState};
use crate::settings::{self, SettingsStore};
use crate::clock;

/// Build identifier baked in by the build script
pub const BUILD_ID: &str = env!("SPORE_BUILD_ID");

/// Magic for the running firmware build
pub const BUILD_MAGIC: u32 = build_magic(BUILD_ID, LAYOUT_VERSION);

/// 32-bit FNV-1a
pub const fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811C_9DC5;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u32;
        hash = hash.wrapping_mul(0x0100_0193);
        i += 1;
    }
    hash
}

/// Magic for a build id and layout version
pub const fn build_magic(build_id: &str, layout_version: u32) -> u32 {
    PREINIT_MAGIC ^ fnv1a(build_id.as_bytes()) ^ layout_version.rotate_left(24)
}

/// Checksum and boot counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderRecord {
    /// `magic - boot_count` when sealed
    pub checksum: u32,
    /// Wakes since the last invalidate
    pub boot_count: u32,
}

impl HeaderRecord {
    /// Header words of `state`
    pub fn of<const N: usize>(state: &RetainedState<N>) -> Self {
        Self {
            checksum: state.checksum(),
            boot_count: state.boot_count(),
        }
    }

    /// Header that validates against `magic`
    pub const fn sealed(boot_count: u32, magic: u32) -> Self {
        Self {
            checksum: magic.wrapping_sub(boot_count),
            boot_count,
        }
    }

    /// True if written by a build with this `magic`
    pub const fn is_valid(&self, magic: u32) -> bool {
        self.checksum.wrapping_add(self.boot_count) == magic
    }
}

/// Make the header valid for `magic` at the current boot count
pub fn seal<const N: usize>(state: &mut RetainedState<N>, magic: u32) {
    let header = HeaderRecord::sealed(state.boot_count(), magic);
    state.set_checksum(header.checksum);
}

/// Read retained memory and validate it
///
/// Returns `true` if the previous contents were kept. Either way the boot
/// counter ends up incremented; after an invalidate it reads 1.
pub fn load<const N: usize, M, S>(
    state: &mut RetainedState<N>,
    mem: &mut M,
    settings: &mut S,
    magic: u32,
) -> StoreResult<bool>
where
    M: RetainedMemory + ?Sized,
    S: SettingsStore + ?Sized,
{
    state.load_from(mem)?;

    let valid = HeaderRecord::of(state).is_valid(magic);
    if !valid {
        log_info!(
            "retained header {:#010x}+{} does not match magic {:#010x}, invalidating",
            state.checksum(),
            state.boot_count(),
            magic
        );
        invalidate(state, mem, settings)?;
    }

    state.set_boot_count(state.boot_count().wrapping_add(1));
    seal(state, magic);

    log_debug!(
        "boot {} with {} buffered readings",
        state.boot_count(),
        state.num_readings()
    );
    Ok(valid)
}

/// Wipe retained memory and re-seed cached settings
///
/// The zeroed image is written out before seeding, so a crash part way
/// through still leaves a region that fails the header check.
pub fn invalidate<const N: usize, M, S>(
    state: &mut RetainedState<N>,
    mem: &mut M,
    settings: &mut S,
) -> StoreResult<()>
where
    M: RetainedMemory + ?Sized,
    S: SettingsStore + ?Sized,
{
    state.zero();
    state.persist(mem)?;

    if let Err(_e) = settings::seed_cache(state, settings) {
        log_warn!("settings unavailable ({}), using default calibration", _e);
        state.zero();
        clock::set_clock_calibration(state, DEFAULT_SLEEP_CLOCK_ADJ_MS);
    }
    Ok(())
}
