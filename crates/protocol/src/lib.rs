use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const OUTPUT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub hint: Option<String>,
}

/// Top-level JSON document printed by every `--json` command.
///
/// The payload is serialized in place rather than through `serde_json::Value`, so
/// `f32` fields keep their shortest representation.
#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct Response<T = serde_json::Value> {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

impl<T> Response<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: ResponseStatus::Ok,
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn error(error: ErrorEnvelope) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: None,
            error: Some(error),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct SearchHitOutput {
    pub rank: usize,
    pub id: String,
    pub distance: f32,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct SearchOutput {
    pub schema_version: u32,
    pub metric: String,
    pub mode: String,
    pub k: usize,
    pub hits: Vec<SearchHitOutput>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct EntryOutput {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct GetOutput {
    pub schema_version: u32,
    pub id: String,
    /// Every entry carrying the id, in insertion order.
    pub entries: Vec<EntryOutput>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct StatsOutput {
    pub schema_version: u32,
    pub dimension: usize,
    pub total_nodes: usize,
    pub total_vectors: usize,
    pub max_leaf_size: usize,
    pub root_radius: f32,
    pub root_child_count: usize,
    pub leaf_count: usize,
    pub depth: usize,
    pub largest_leaf: usize,
    pub degenerate_leaves: usize,
    pub search_mode: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct IngestOutput {
    pub schema_version: u32,
    pub inserted: usize,
    pub rejected: Vec<RejectedRecord>,
    pub total_vectors: usize,
    pub snapshot: String,
    pub encoding: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct RejectedRecord {
    /// 1-based line number in the input file
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct QuantizeOutput {
    pub schema_version: u32,
    pub codes: Vec<i8>,
    pub restored: Vec<f32>,
    pub error: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct VerifyMismatch {
    pub query_line: usize,
    pub brute_force: Vec<String>,
    pub pruned: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct VerifyOutput {
    pub schema_version: u32,
    pub queries: usize,
    pub k: usize,
    pub mismatches: Vec<VerifyMismatch>,
}

impl VerifyOutput {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Pretty-printed JSON, as written to stdout.
pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}

/// JSON Schema for one of the output documents.
pub fn output_schema<T: JsonSchema>() -> Result<serde_json::Value> {
    serde_json::to_value(schemars::schema_for!(T)).map_err(Into::into)
}
