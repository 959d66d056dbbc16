pub mod aggregate;
pub mod event;
pub mod schema_version;
pub mod timestamp;

pub use aggregate::AggregateId;
pub use event::{AppendRequest, EventRecord, StoredEvent, Version};
pub use schema_version::SchemaVersion;
pub use timestamp::Timestamp;
