use super::{AggregateId, SchemaVersion, Timestamp};
use crate::error::{QuireError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version of an aggregate's log: the number of committed records.
///
/// A record's sequence version is its 0-based position in the log.
pub type Version = u64;

/// One immutable fact about an aggregate.
///
/// The payload is opaque to the store; callers decide how to interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: Uuid,
    pub timestamp: Timestamp,
    pub event_type: String,
    pub schema_version: SchemaVersion,
    pub payload: serde_json::Value,
}

impl EventRecord {
    /// Create a record with a fresh event id, stamped with the current time
    pub fn new(
        event_type: impl Into<String>,
        schema_version: SchemaVersion,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Timestamp::now(),
            event_type: event_type.into(),
            schema_version,
            payload,
        }
    }

    /// Create a record from any serializable event value
    pub fn from_event<E: Serialize>(
        event_type: impl Into<String>,
        schema_version: SchemaVersion,
        event: &E,
    ) -> Result<Self> {
        let payload = serde_json::to_value(event)?;
        Ok(Self::new(event_type, schema_version, payload))
    }

    pub fn with_event_id(mut self, event_id: Uuid) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A record as read back from an aggregate's log.
///
/// The aggregate id and sequence are implied by the file and line position;
/// they are attached on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub aggregate_id: AggregateId,
    pub sequence: Version,
    pub record: EventRecord,
}

impl StoredEvent {
    /// Deserialize the payload into a caller-side event type
    pub fn payload_as<E: DeserializeOwned>(&self) -> Result<E> {
        serde_json::from_value(self.record.payload.clone()).map_err(|e| {
            QuireError::Serialization(format!(
                "payload of {} #{} ({}): {}",
                self.aggregate_id, self.sequence, self.record.event_type, e
            ))
        })
    }

    pub fn into_record(self) -> EventRecord {
        self.record
    }
}

/// New records for one aggregate, plus the version the caller observed when
/// it loaded the aggregate.
#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub aggregate_id: AggregateId,
    pub expected_version: Version,
    pub records: Vec<EventRecord>,
}

impl AppendRequest {
    pub fn new(aggregate_id: AggregateId, expected_version: Version, records: Vec<EventRecord>) -> Self {
        Self {
            aggregate_id,
            expected_version,
            records,
        }
    }

    /// Version of the log once every record in this request is committed
    pub fn resulting_version(&self) -> Version {
        self.expected_version.saturating_add(self.records.len() as u64)
    }
}
