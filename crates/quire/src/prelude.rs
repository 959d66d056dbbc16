//! Quire Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use quire::prelude::*;
//! ```

// Core types
pub use crate::{
    AggregateId, AppendRequest, EventRecord, QuireError, Result, SchemaVersion, StoredEvent,
    Timestamp, Version,
};

// Configs
pub use crate::{StoreConfig, SyncMode};

// Traits
pub use crate::{EventStore, EventStream};

// Implementations
pub use crate::{FileEventStore, LogStatus};
