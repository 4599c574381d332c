//! In-memory settings for tests and simulation

use heapless::{FnvIndexMap, String, Vec};

use super::{SettingsStore, MAX_SETTING_LEN};
use crate::errors::{StoreError, StoreResult};

/// Longest setting name the map accepts
const MAX_NAME_LEN: usize = 16;

/// Names the map can hold (power of two)
const MAX_ENTRIES: usize = 16;

/// Fixed-capacity settings map
///
/// ```rust
/// use spore_core::{MemorySettings, SettingsStore};
///
/// let mut settings = MemorySettings::new();
/// settings.write("report_host", b"boxy").unwrap();
///
/// let mut buf = [0u8; 16];
/// assert_eq!(settings.read("report_host", &mut buf).unwrap(), Some(4));
/// assert_eq!(settings.read("node_name", &mut buf).unwrap(), None);
/// ```
#[derive(Debug, Default)]
pub struct MemorySettings {
    entries: FnvIndexMap<String<MAX_NAME_LEN>, Vec<u8, MAX_SETTING_LEN>, MAX_ENTRIES>,
    writes: usize,
}

impl MemorySettings {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Stored bytes for `name`
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        let key = Self::key(name).ok()?;
        self.entries.get(&key).map(|value| value.as_slice())
    }

    fn key(name: &str) -> StoreResult<String<MAX_NAME_LEN>> {
        String::try_from(name).map_err(|_| StoreError::SettingIo { reason: "name too long" })
    }
}

impl SettingsStore for MemorySettings {
    fn read(&mut self, name: &str, buf: &mut [u8]) -> StoreResult<Option<usize>> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        if value.len() > buf.len() {
            return Err(StoreError::SettingTooLarge { len: value.len(), max: buf.len() });
        }
        buf[..value.len()].copy_from_slice(value);
        Ok(Some(value.len()))
    }

    fn write(&mut self, name: &str, data: &[u8]) -> StoreResult<()> {
        let value = Vec::from_slice(data)
            .map_err(|_| StoreError::SettingTooLarge { len: data.len(), max: MAX_SETTING_LEN })?;
        self.entries
            .insert(Self::key(name)?, value)
            .map_err(|_| StoreError::SettingIo { reason: "settings map full" })?;
        self.writes += 1;
        Ok(())
    }
}
