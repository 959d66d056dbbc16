use anyhow::{Context, Result};
use quire::AggregateId;

pub mod append;
pub mod read;
pub mod status;

pub fn parse_id(text: &str) -> Result<AggregateId> {
    text.parse::<AggregateId>()
        .with_context(|| format!("Invalid aggregate id {:?}", text))
}
