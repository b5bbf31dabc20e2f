//! Line-oriented inputs: JSONL records for `ingest`, query vectors for `verify`, and
//! inline `--vector` arguments.

use anyhow::{Context, Result};
use hyperball_vector_store::Entry;
use serde::Deserialize;

/// Non-blank lines with their 1-based line numbers.
pub(crate) fn numbered_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

/// `{"id": "...", "vector": [...], "metadata": {...}}`, metadata optional.
pub(crate) fn parse_record(line: &str) -> Result<Entry> {
    serde_json::from_str(line).context("Invalid record; expected {\"id\", \"vector\", \"metadata\"?}")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryLine {
    Bare(Vec<f32>),
    Object { vector: Vec<f32> },
}

/// A query line is either a bare JSON array or an object with a `vector` field.
pub(crate) fn parse_query(line: &str) -> Result<Vec<f32>> {
    let query: QueryLine = serde_json::from_str(line)
        .context("Invalid query; expected a JSON array or {\"vector\": [...]}")?;
    Ok(match query {
        QueryLine::Bare(vector) | QueryLine::Object { vector } => vector,
    })
}

pub(crate) fn parse_vector(raw: &str) -> Result<Vec<f32>> {
    serde_json::from_str(raw.trim()).context("Invalid vector; expected a JSON array of numbers")
}
