use crate::error::{QuireError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a file-backed event store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory holding the two-character shard directories
    pub root: PathBuf,

    /// Maximum number of concurrent readers per aggregate (default: 10)
    ///
    /// A writer holds all of these permits while appending. The bound applies
    /// within this process; readers in other processes sharing the root are
    /// only kept out by writers, not counted against it.
    #[serde(default = "default_max_readers")]
    pub max_readers: usize,

    /// Lock acquisition timeout in milliseconds (default: none)
    ///
    /// When unset, acquisition waits indefinitely. When set, a reader or
    /// writer that cannot get its permits in time fails with `LockTimeout`.
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,

    /// Coordinate with other processes through advisory file locks (default: true)
    ///
    /// Disable only when a single process owns the root directory.
    #[serde(default = "default_true")]
    pub cross_process_locks: bool,

    /// Durability of appends
    #[serde(default)]
    pub sync_mode: SyncMode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` data and metadata after the records and again after the header.
    Full,

    /// `fdatasync` after the records and after the header (default).
    ///
    /// File length changes are still persisted by `fdatasync` on the
    /// platforms we target, so this is enough for the append protocol.
    #[default]
    Data,

    /// Leave flushing to the OS page cache.
    ///
    /// A crash can lose recently committed appends. Use only for tests and
    /// throwaway data.
    None,
}

fn default_max_readers() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_readers: default_max_readers(),
            lock_timeout_ms: None,
            cross_process_locks: true,
            sync_mode: SyncMode::default(),
        }
    }

    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            QuireError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_readers(mut self, max_readers: usize) -> Self {
        self.max_readers = max_readers;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_cross_process_locks(mut self, enabled: bool) -> Self {
        self.cross_process_locks = enabled;
        self
    }

    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_readers == 0 {
            return Err(QuireError::Config("max_readers must be at least 1".into()));
        }
        if self.root.as_os_str().is_empty() {
            return Err(QuireError::Config("root directory must not be empty".into()));
        }
        Ok(())
    }
}
