//! Quire Core: Traits and types for the Quire event log
//!
//! This crate defines the core abstractions for a durable, per-aggregate
//! event log:
//! - Types: aggregate ids, event records, tick timestamps, schema versions
//! - Event store trait: optimistic-concurrency appends and streaming reads
//! - Path resolution: aggregate id to sharded file location
//! - Lock manager: bounded readers / exclusive writer per aggregate,
//!   coordinated across processes through advisory file locks

pub mod config;
pub mod error;
pub mod event_store;
pub mod lock_manager;
pub mod observe;
pub mod path;
pub mod types;

pub use config::{StoreConfig, SyncMode};
pub use error::{QuireError, Result};
pub use event_store::{EventStore, EventStream, LogStatus};
pub use lock_manager::{LockManager, ReadGuard, WriteGuard};
pub use path::PathResolver;
pub use types::{
    AggregateId, AppendRequest, EventRecord, SchemaVersion, StoredEvent, Timestamp, Version,
};
