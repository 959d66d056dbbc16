//! Read command implementation

use anyhow::{Context, Result};
use quire::prelude::*;
use std::io::Write;

pub fn execute<W: Write>(store: &FileEventStore, id: AggregateId, since: Version, out: &mut W) -> Result<()> {
    tracing::debug!(aggregate_id = %id, since, "reading aggregate");

    let events = store
        .read_all_since(&id, since)
        .with_context(|| format!("Failed to read aggregate {}", id))?;
    for event in events {
        let event = event.with_context(|| format!("Failed to read aggregate {}", id))?;
        serde_json::to_writer(&mut *out, &event).context("Failed to write event")?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}
