//! File-backed settings
//!
//! One file per setting name under a root directory, the host analogue of
//! the node's flash file system.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::SettingsStore;
use crate::errors::{StoreError, StoreResult};

/// Settings stored as files under a directory
///
/// ```rust,no_run
/// use spore_core::{FileSettings, NodeSettings};
///
/// let mut store = FileSettings::new("/var/lib/spore");
/// let settings = NodeSettings::load(&mut store, 0x00c0ffee).unwrap();
/// println!("reporting to {}:{}", settings.report_host, settings.report_port);
/// ```
#[derive(Debug, Clone)]
pub struct FileSettings {
    root: PathBuf,
}

impl FileSettings {
    /// Store rooted at `root`; the directory is created on first write
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    /// Directory holding the setting files
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> StoreResult<PathBuf> {
        let valid = !name.is_empty()
            && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid {
            return Err(StoreError::SettingIo { reason: "invalid setting name" });
        }
        Ok(self.root.join(name))
    }
}

impl SettingsStore for FileSettings {
    fn read(&mut self, name: &str, buf: &mut [u8]) -> StoreResult<Option<usize>> {
        let data = match fs::read(self.path(name)?) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                log::warn!("could not read setting {}: {}", name, e);
                return Err(StoreError::SettingIo { reason: "read failed" });
            }
        };

        if data.len() > buf.len() {
            return Err(StoreError::SettingTooLarge { len: data.len(), max: buf.len() });
        }
        buf[..data.len()].copy_from_slice(&data);
        Ok(Some(data.len()))
    }

    fn write(&mut self, name: &str, data: &[u8]) -> StoreResult<()> {
        let path = self.path(name)?;
        fs::create_dir_all(&self.root)
            .and_then(|_| fs::write(&path, data))
            .map_err(|e| {
                log::warn!("could not write setting {}: {}", name, e);
                StoreError::SettingIo { reason: "write failed" }
            })?;
        log::debug!("{} <- {} bytes", path.display(), data.len());
        Ok(())
    }
}
