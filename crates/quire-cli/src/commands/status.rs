//! Status command implementation

use anyhow::{Context, Result};
use quire::prelude::*;

pub fn execute(store: &FileEventStore, id: AggregateId) -> Result<()> {
    tracing::info!("Checking aggregate status: {}", id);

    let status = store
        .status(&id)
        .with_context(|| format!("Failed to inspect aggregate {}", id))?;

    println!("\nAggregate Status");
    println!("{}", "=".repeat(60));
    println!("Aggregate: {}", id);
    println!("Path: {}", status.path.display());

    if !status.exists {
        println!("\nNo events recorded yet.");
        return Ok(());
    }

    println!("Version: {}", status.version);
    println!("Committed Bytes: {}", status.committed_bytes);

    if status.uncommitted_bytes > 0 {
        println!(
            "\n⚠️  {} byte(s) past the committed records (interrupted append); the next append discards them",
            status.uncommitted_bytes
        );
    }

    Ok(())
}
