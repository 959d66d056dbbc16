//! Aggregate id to file path mapping
//!
//! Logs are sharded by the first two characters of the aggregate id so that
//! no single directory has to hold every aggregate:
//!
//! ```text
//! <root>/6f/9619ff-8b86-d011-b42d-00c04fc964ff
//! <root>/6f/9619ff-8b86-d011-b42d-00c04fc964ff.lock
//! ```

use crate::types::AggregateId;
use std::path::{Path, PathBuf};

const SHARD_PREFIX_LEN: usize = 2;
const LOCK_SUFFIX: &str = ".lock";

#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the event log file for an aggregate. Pure; touches nothing on disk.
    pub fn resolve(&self, id: &AggregateId) -> PathBuf {
        let text = id.to_string();
        let (prefix, remainder) = text.split_at(SHARD_PREFIX_LEN);
        self.root.join(prefix).join(remainder)
    }

    /// Path of the advisory lock file that sits next to the log file
    pub fn lock_path(&self, id: &AggregateId) -> PathBuf {
        let mut path = self.resolve(id).into_os_string();
        path.push(LOCK_SUFFIX);
        PathBuf::from(path)
    }
}
