//! Node domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Properties;

/// A typed node carrying an arbitrary nested property bag.
///
/// `id == 0` means "unassigned" — the store allocates an identity on upsert.
/// Once assigned, the id is immutable and never reused.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    /// Query-relevant excerpt of the matched text. Filled by term search
    /// only, never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl Node {
    /// Create an unassigned node with the given label and properties.
    pub fn new(label: impl Into<String>, properties: Properties) -> Self {
        Self {
            label: label.into(),
            properties,
            ..Self::default()
        }
    }
}
