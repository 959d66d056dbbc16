//! Event store trait and types
//!
//! Defines the interface for per-aggregate event storage backends.

use crate::error::Result;
use crate::types::{AggregateId, AppendRequest, StoredEvent, Version};
use std::path::PathBuf;

/// Forward-only, non-restartable stream of an aggregate's events.
///
/// Items are yielded in sequence order. After an error the stream is
/// finished. Backends release any resources (such as read locks) once the
/// stream is exhausted or dropped.
pub trait EventStream: Iterator<Item = Result<StoredEvent>> + Send {}

impl<T: Iterator<Item = Result<StoredEvent>> + Send> EventStream for T {}

/// Per-aggregate event storage backend
///
/// Each aggregate has its own append-only log. Appends are checked against
/// the version the caller observed (optimistic concurrency); reads never
/// mutate the log.
pub trait EventStore: Send + Sync {
    /// Stream every event of an aggregate whose sequence is at least `since`.
    ///
    /// An aggregate that was never written yields an empty stream.
    fn read_all_since(&self, id: &AggregateId, since: Version) -> Result<Box<dyn EventStream>>;

    /// Stream every event of an aggregate
    fn read_all(&self, id: &AggregateId) -> Result<Box<dyn EventStream>> {
        self.read_all_since(id, 0)
    }

    /// Append records to an aggregate's log.
    ///
    /// Fails with `ConcurrencyConflict` if the stored version is newer than
    /// `request.expected_version`; nothing is written in that case. Returns
    /// the new version of the log.
    fn append(&self, request: AppendRequest) -> Result<Version>;

    /// Committed version of an aggregate's log (0 when it does not exist)
    fn current_version(&self, id: &AggregateId) -> Result<Version>;
}

/// Snapshot of one aggregate's log file
#[derive(Debug, Clone)]
pub struct LogStatus {
    /// Path of the log file
    pub path: PathBuf,

    /// Whether the file exists yet
    pub exists: bool,

    /// Committed version from the header
    pub version: Version,

    /// Bytes covered by the header and the committed records
    pub committed_bytes: u64,

    /// Bytes past the committed records, left by an interrupted append
    pub uncommitted_bytes: u64,
}
