//! File-based event store implementation
//!
//! Stores each aggregate's events in its own text file under a sharded
//! directory tree. The first line holds the committed version; every
//! following line is one record.
//!
//! Features:
//! - Lazy creation: no file or directory exists until the first append
//! - Optimistic concurrency: appends are checked against the caller's version
//! - Crash-safe appends: records are written before the version header
//! - Multiple concurrent readers, single writer, across processes

pub mod codec;
mod store;

pub use store::FileEventStore;
