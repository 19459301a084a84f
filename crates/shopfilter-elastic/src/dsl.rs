//! A closed sum type over the slice of the Elasticsearch query DSL this
//! service emits.
//!
//! Incoming filters are heterogeneous maps and the outgoing wire format is
//! deeply nested JSON; modeling the middle as enums keeps the compiler
//! honest about which query shapes exist and serializes at the boundary
//! only.

use std::collections::BTreeMap;

use serde::ser::Serializer;
use serde::Serialize;
use serde_json::{json, Value};

/// A document query node.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    MatchAll,
    Term {
        field: String,
        value: Value,
    },
    Terms {
        field: String,
        values: Vec<String>,
    },
    Range {
        field: String,
        gte: Option<f64>,
        lte: Option<f64>,
        gt: Option<f64>,
    },
    MultiMatch {
        query: String,
        fields: Vec<String>,
        match_type: String,
        operator: String,
    },
    Nested {
        path: String,
        query: Box<Query>,
    },
    Bool {
        must: Vec<Query>,
        should: Vec<Query>,
        filter: Vec<Query>,
        minimum_should_match: Option<u32>,
    },
}

impl Query {
    /// A `bool` node with only `must` clauses; an empty list collapses to
    /// `match_all`.
    #[must_use]
    pub fn all_of(must: Vec<Query>) -> Self {
        if must.is_empty() {
            Self::MatchAll
        } else {
            Self::Bool {
                must,
                should: Vec::new(),
                filter: Vec::new(),
                minimum_should_match: None,
            }
        }
    }

    /// A `bool` node with `should` clauses and `minimum_should_match: 1`.
    #[must_use]
    pub fn any_of(should: Vec<Query>) -> Self {
        Self::Bool {
            must: Vec::new(),
            should,
            filter: Vec::new(),
            minimum_should_match: Some(1),
        }
    }

    /// Wire representation of this node.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::MatchAll => json!({ "match_all": {} }),
            Self::Term { field, value } => {
                let mut inner = serde_json::Map::new();
                inner.insert(field.clone(), value.clone());
                json!({ "term": inner })
            }
            Self::Terms { field, values } => {
                let mut inner = serde_json::Map::new();
                inner.insert(field.clone(), json!(values));
                json!({ "terms": inner })
            }
            Self::Range { field, gte, lte, gt } => {
                let mut bounds = serde_json::Map::new();
                if let Some(gte) = gte {
                    bounds.insert("gte".to_string(), json!(gte));
                }
                if let Some(lte) = lte {
                    bounds.insert("lte".to_string(), json!(lte));
                }
                if let Some(gt) = gt {
                    bounds.insert("gt".to_string(), json!(gt));
                }
                let mut inner = serde_json::Map::new();
                inner.insert(field.clone(), Value::Object(bounds));
                json!({ "range": inner })
            }
            Self::MultiMatch {
                query,
                fields,
                match_type,
                operator,
            } => json!({
                "multi_match": {
                    "query": query,
                    "fields": fields,
                    "type": match_type,
                    "operator": operator,
                }
            }),
            Self::Nested { path, query } => json!({
                "nested": { "path": path, "query": query.to_value() }
            }),
            Self::Bool {
                must,
                should,
                filter,
                minimum_should_match,
            } => {
                let mut body = serde_json::Map::new();
                if !must.is_empty() {
                    body.insert(
                        "must".to_string(),
                        Value::Array(must.iter().map(Query::to_value).collect()),
                    );
                }
                if !should.is_empty() {
                    body.insert(
                        "should".to_string(),
                        Value::Array(should.iter().map(Query::to_value).collect()),
                    );
                }
                if !filter.is_empty() {
                    body.insert(
                        "filter".to_string(),
                        Value::Array(filter.iter().map(Query::to_value).collect()),
                    );
                }
                if let Some(msm) = minimum_should_match {
                    body.insert("minimum_should_match".to_string(), json!(msm));
                }
                json!({ "bool": body })
            }
        }
    }
}

impl Serialize for Query {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// An aggregation node.
#[derive(Debug, Clone, PartialEq)]
pub enum Agg {
    Terms {
        field: String,
        size: u32,
        /// Emit an explicit `order: {_count: desc}` clause.
        order_by_count: bool,
    },
    Stats {
        field: String,
    },
    Nested {
        path: String,
        aggs: BTreeMap<String, Agg>,
    },
}

impl Agg {
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Terms {
                field,
                size,
                order_by_count,
            } => {
                let mut body = serde_json::Map::new();
                body.insert("field".to_string(), json!(field));
                body.insert("size".to_string(), json!(size));
                if *order_by_count {
                    body.insert("order".to_string(), json!({ "_count": "desc" }));
                }
                json!({ "terms": body })
            }
            Self::Stats { field } => json!({ "stats": { "field": field } }),
            Self::Nested { path, aggs } => {
                let sub: serde_json::Map<String, Value> = aggs
                    .iter()
                    .map(|(name, agg)| (name.clone(), agg.to_value()))
                    .collect();
                json!({ "nested": { "path": path }, "aggs": sub })
            }
        }
    }
}

impl Serialize for Agg {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// One sort clause. `_score` sorts never carry a `missing` policy; field
/// sorts place missing values last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortClause {
    pub field: String,
    pub ascending: bool,
}

impl SortClause {
    #[must_use]
    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: false,
        }
    }

    #[must_use]
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: true,
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        let order = if self.ascending { "asc" } else { "desc" };
        if self.field == "_score" {
            json!({ "_score": { "order": order } })
        } else {
            let mut inner = serde_json::Map::new();
            inner.insert(
                self.field.clone(),
                json!({ "order": order, "missing": "_last" }),
            );
            Value::Object(inner)
        }
    }
}

/// A complete `_search` request body.
#[derive(Debug, Clone, Default)]
pub struct SearchBody {
    pub query: Option<Query>,
    pub from: Option<u32>,
    pub size: Option<u32>,
    pub sort: Vec<SortClause>,
    pub aggs: BTreeMap<String, Agg>,
    pub suggest: Option<Value>,
}

impl SearchBody {
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut body = serde_json::Map::new();
        if let Some(query) = &self.query {
            body.insert("query".to_string(), query.to_value());
        }
        if let Some(from) = self.from {
            body.insert("from".to_string(), json!(from));
        }
        if let Some(size) = self.size {
            body.insert("size".to_string(), json!(size));
        }
        if !self.sort.is_empty() {
            body.insert(
                "sort".to_string(),
                Value::Array(self.sort.iter().map(SortClause::to_value).collect()),
            );
        }
        if !self.aggs.is_empty() {
            let aggs: serde_json::Map<String, Value> = self
                .aggs
                .iter()
                .map(|(name, agg)| (name.clone(), agg.to_value()))
                .collect();
            body.insert("aggs".to_string(), Value::Object(aggs));
        }
        if let Some(suggest) = &self.suggest {
            body.insert("suggest".to_string(), suggest.clone());
        }
        Value::Object(body)
    }
}

impl Serialize for SearchBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_all_serializes_to_empty_object() {
        assert_eq!(Query::MatchAll.to_value(), json!({ "match_all": {} }));
    }

    #[test]
    fn terms_serializes_field_and_values() {
        let query = Query::Terms {
            field: "vendor.keyword".to_string(),
            values: vec!["Nike".to_string(), "Puma".to_string()],
        };
        assert_eq!(
            query.to_value(),
            json!({ "terms": { "vendor.keyword": ["Nike", "Puma"] } })
        );
    }

    #[test]
    fn range_omits_absent_bounds() {
        let query = Query::Range {
            field: "minPrice".to_string(),
            gte: None,
            lte: Some(49.99),
            gt: None,
        };
        assert_eq!(query.to_value(), json!({ "range": { "minPrice": { "lte": 49.99 } } }));
    }

    #[test]
    fn empty_must_collapses_to_match_all() {
        assert_eq!(Query::all_of(vec![]), Query::MatchAll);
    }

    #[test]
    fn bool_omits_empty_clause_lists() {
        let query = Query::all_of(vec![Query::MatchAll]);
        assert_eq!(
            query.to_value(),
            json!({ "bool": { "must": [{ "match_all": {} }] } })
        );
    }

    #[test]
    fn any_of_sets_minimum_should_match() {
        let query = Query::any_of(vec![Query::MatchAll]);
        assert_eq!(
            query.to_value(),
            json!({ "bool": { "should": [{ "match_all": {} }], "minimum_should_match": 1 } })
        );
    }

    #[test]
    fn nested_wraps_inner_query() {
        let query = Query::Nested {
            path: "variants".to_string(),
            query: Box::new(Query::Terms {
                field: "variants.sku".to_string(),
                values: vec!["SKU-1".to_string()],
            }),
        };
        assert_eq!(
            query.to_value(),
            json!({
                "nested": {
                    "path": "variants",
                    "query": { "terms": { "variants.sku": ["SKU-1"] } }
                }
            })
        );
    }

    #[test]
    fn terms_agg_orders_by_count_when_asked() {
        let agg = Agg::Terms {
            field: "vendor.keyword".to_string(),
            size: 500,
            order_by_count: true,
        };
        assert_eq!(
            agg.to_value(),
            json!({
                "terms": {
                    "field": "vendor.keyword",
                    "size": 500,
                    "order": { "_count": "desc" }
                }
            })
        );
    }

    #[test]
    fn nested_agg_includes_sub_aggregations() {
        let mut sub = BTreeMap::new();
        sub.insert(
            "price".to_string(),
            Agg::Stats {
                field: "variants.price.numeric".to_string(),
            },
        );
        let agg = Agg::Nested {
            path: "variants".to_string(),
            aggs: sub,
        };
        assert_eq!(
            agg.to_value(),
            json!({
                "nested": { "path": "variants" },
                "aggs": { "price": { "stats": { "field": "variants.price.numeric" } } }
            })
        );
    }

    #[test]
    fn field_sort_places_missing_last() {
        assert_eq!(
            SortClause::desc("createdAt").to_value(),
            json!({ "createdAt": { "order": "desc", "missing": "_last" } })
        );
    }

    #[test]
    fn score_sort_has_no_missing_policy() {
        assert_eq!(
            SortClause::desc("_score").to_value(),
            json!({ "_score": { "order": "desc" } })
        );
    }

    #[test]
    fn search_body_assembles_all_sections() {
        let mut body = SearchBody {
            query: Some(Query::MatchAll),
            from: Some(20),
            size: Some(20),
            sort: vec![SortClause::desc("createdAt")],
            ..SearchBody::default()
        };
        body.aggs.insert(
            "priceRange".to_string(),
            Agg::Stats {
                field: "minPrice".to_string(),
            },
        );
        let value = body.to_value();
        assert_eq!(value["from"], json!(20));
        assert_eq!(value["size"], json!(20));
        assert_eq!(value["query"], json!({ "match_all": {} }));
        assert!(value["aggs"]["priceRange"].is_object());
        assert!(value.get("suggest").is_none());
    }
}
