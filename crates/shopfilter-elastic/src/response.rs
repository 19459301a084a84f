//! Typed views over Elasticsearch response bodies.
//!
//! Deserialization is tolerant: absent sections (`aggregations`, `suggest`)
//! become `None`/empty so a pure document query and a pure facet query share
//! one response type, and the missing-index case maps to
//! [`SearchResponse::empty`].

use serde::Deserialize;
use serde_json::Value;

/// One document hit; the source stays an opaque JSON object.
#[derive(Debug, Clone, Deserialize)]
pub struct Hit {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TotalHits {
    #[serde(default)]
    pub value: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HitsEnvelope {
    #[serde(default)]
    pub total: TotalHits,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

/// One option offered by a term suggester for a misspelled token.
#[derive(Debug, Clone, Deserialize)]
pub struct SuggestOption {
    pub text: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub freq: u64,
}

/// Suggestions for one token of the suggest text.
#[derive(Debug, Clone, Deserialize)]
pub struct SuggestGroup {
    pub text: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub length: usize,
    #[serde(default)]
    pub options: Vec<SuggestOption>,
}

/// A `stats` aggregation result. `min`/`max` are null on an empty bucket.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsResult {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub avg: Option<f64>,
    #[serde(default)]
    pub sum: Option<f64>,
}

/// One bucket of a `terms` aggregation.
#[derive(Debug, Clone, Deserialize)]
pub struct TermsBucket {
    pub key: String,
    #[serde(default)]
    pub doc_count: u64,
}

/// The raw `aggregations` section, with typed accessors per aggregation
/// shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Aggregations(pub serde_json::Map<String, Value>);

impl Aggregations {
    /// Buckets of a named `terms` aggregation; empty when absent.
    #[must_use]
    pub fn terms_buckets(&self, name: &str) -> Vec<TermsBucket> {
        self.0
            .get(name)
            .and_then(|agg| agg.get("buckets"))
            .and_then(|buckets| {
                serde_json::from_value::<Vec<TermsBucket>>(buckets.clone()).ok()
            })
            .unwrap_or_default()
    }

    /// A named top-level `stats` aggregation.
    #[must_use]
    pub fn stats(&self, name: &str) -> Option<StatsResult> {
        self.0
            .get(name)
            .and_then(|agg| serde_json::from_value(agg.clone()).ok())
    }

    /// A `stats` aggregation nested one level down
    /// (`name → sub_name → stats`).
    #[must_use]
    pub fn nested_stats(&self, name: &str, sub_name: &str) -> Option<StatsResult> {
        self.0
            .get(name)
            .and_then(|agg| agg.get(sub_name))
            .and_then(|inner| serde_json::from_value(inner.clone()).ok())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

/// A `_search` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub took: Option<u64>,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub hits: HitsEnvelope,
    #[serde(default)]
    pub aggregations: Option<Aggregations>,
    #[serde(default)]
    pub suggest: Option<serde_json::Map<String, Value>>,
}

impl SearchResponse {
    /// The substitute for a missing index: zero hits, no aggregations.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.hits.total.value
    }

    /// Suggestion groups under a named suggester, across all tokens.
    #[must_use]
    pub fn suggest_groups(&self, name: &str) -> Vec<SuggestGroup> {
        self.suggest
            .as_ref()
            .and_then(|s| s.get(name))
            .and_then(|groups| serde_json::from_value(groups.clone()).ok())
            .unwrap_or_default()
    }
}

/// Whether a response-shaped error object denotes a missing index.
#[must_use]
pub fn is_index_missing_error(error: &Value) -> bool {
    let error_type = error
        .get("type")
        .or_else(|| error.get("root_cause").and_then(|rc| rc.get(0)).and_then(|c| c.get("type")))
        .and_then(Value::as_str);
    error_type == Some("index_not_found_exception")
}
