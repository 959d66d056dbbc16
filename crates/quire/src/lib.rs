//! Quire: a durable event log for event-sourced aggregates
//!
//! Quire provides:
//! - **One log per aggregate**: an append-only text file, sharded by id prefix
//! - **Optimistic concurrency**: appends carry the version the caller observed
//! - **Bounded readers / exclusive writer**: per aggregate, across processes
//! - **Lazy reads**: events stream from disk and release their lock when done
//!
//! # Quick Start
//!
//! ```no_run
//! use quire::prelude::*;
//! use serde_json::json;
//!
//! # fn main() -> Result<()> {
//! let store = FileEventStore::open(StoreConfig::new("./data/events"))?;
//! let account = AggregateId::new();
//!
//! // First append: the aggregate was loaded at version 0
//! let opened = EventRecord::new("AccountOpened", SchemaVersion::new(1, 0), json!({"owner": "ada"}));
//! let version = store.append(AppendRequest::new(account, 0, vec![opened]))?;
//! assert_eq!(version, 1);
//!
//! // Replay
//! for event in store.read_all(&account)? {
//!     let event = event?;
//!     println!("#{} {}", event.sequence, event.record.event_type);
//! }
//!
//! // A writer that still believes the aggregate is at version 0 is rejected
//! let stale = EventRecord::new("AccountClosed", SchemaVersion::new(1, 0), json!({}));
//! let err = store.append(AppendRequest::new(account, 0, vec![stale])).unwrap_err();
//! assert!(err.is_conflict());
//! # Ok(())
//! # }
//! ```

pub mod prelude;

// Re-export core types
pub use quire_core::{
    config::{StoreConfig, SyncMode},
    error::{QuireError, Result},
    event_store::{EventStore, EventStream, LogStatus},
    lock_manager::{LockManager, ReadGuard, WriteGuard},
    observe,
    path::PathResolver,
    types::{AggregateId, AppendRequest, EventRecord, SchemaVersion, StoredEvent, Timestamp, Version},
};

// Re-export implementations
pub use quire_file_log::{codec, FileEventStore};
