//! Append command implementation

use anyhow::{bail, Context, Result};
use quire::prelude::*;
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

/// One line of append input. Event id and timestamp are generated.
#[derive(Debug, Deserialize)]
struct EventInput {
    event_type: String,
    #[serde(default)]
    schema_version: SchemaVersion,
    #[serde(default)]
    payload: serde_json::Value,
}

pub fn execute(
    store: &FileEventStore,
    id: AggregateId,
    expected_version: Version,
    input: Option<PathBuf>,
) -> Result<()> {
    let records = match &input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            parse_events(BufReader::new(file))?
        }
        None => parse_events(io::stdin().lock())?,
    };
    if records.is_empty() {
        bail!("No events to append");
    }

    let count = records.len();
    let version = store
        .append(AppendRequest::new(id, expected_version, records))
        .with_context(|| format!("Failed to append to aggregate {}", id))?;

    tracing::info!(aggregate_id = %id, events = count, version, "appended");
    println!("{}", version);
    Ok(())
}

/// Parse JSON-lines event input, skipping blank lines
fn parse_events<R: BufRead>(reader: R) -> Result<Vec<EventRecord>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        let input: EventInput = serde_json::from_str(&line)
            .with_context(|| format!("Invalid event on input line {}", index + 1))?;
        records.push(EventRecord::new(
            input.event_type,
            input.schema_version,
            input.payload,
        ));
    }
    Ok(records)
}
