use crate::types::AggregateId;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuireError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Storage error during {operation} on aggregate {aggregate_id}: {source}")]
    Storage {
        aggregate_id: AggregateId,
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// Another writer advanced the log since the caller loaded it.
    ///
    /// The caller must reload the aggregate and retry with fresh state; the
    /// store never retries on its own.
    #[error(
        "Concurrency conflict on aggregate {aggregate_id}: expected version {expected_version}, found {actual_version}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected_version: u64,
        actual_version: u64,
    },

    #[error(
        "Expected version {expected_version} of aggregate {aggregate_id} is ahead of stored version {stored_version}"
    )]
    VersionAhead {
        aggregate_id: AggregateId,
        expected_version: u64,
        stored_version: u64,
    },

    #[error("Corrupt record in aggregate {aggregate_id} at line {line_number}: {reason}")]
    CorruptRecord {
        aggregate_id: AggregateId,
        line_number: u64,
        reason: String,
    },

    #[error("Lock acquisition on aggregate {aggregate_id} timed out after {timeout_ms}ms")]
    LockTimeout {
        aggregate_id: AggregateId,
        timeout_ms: u64,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid aggregate id: {0}")]
    InvalidAggregateId(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl QuireError {
    /// Wrap an I/O error with the aggregate and operation it happened in.
    pub fn storage(aggregate_id: AggregateId, operation: &'static str, source: io::Error) -> Self {
        Self::Storage {
            aggregate_id,
            operation,
            source,
        }
    }

    pub fn corrupt(aggregate_id: AggregateId, line_number: u64, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            aggregate_id,
            line_number,
            reason: reason.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, QuireError>;

impl From<serde_json::Error> for QuireError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for QuireError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
