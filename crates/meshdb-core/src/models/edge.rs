//! Edge domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Properties;

/// A directed, weighted edge between exactly one source and one target node.
///
/// Both endpoints must exist when the edge is written; deleting either node
/// cascades to the edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub weight: i64,
    #[serde(default)]
    pub from_id: u64,
    #[serde(default)]
    pub to_id: u64,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    /// Query-relevant excerpt of the matched text. Filled by term search
    /// only, never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl Edge {
    /// Create an unassigned edge between two existing nodes.
    pub fn new(label: impl Into<String>, from_id: u64, to_id: u64, properties: Properties) -> Self {
        Self {
            label: label.into(),
            from_id,
            to_id,
            properties,
            ..Self::default()
        }
    }
}
