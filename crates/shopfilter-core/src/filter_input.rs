//! The parsed, sanitized request — every downstream stage (config applier,
//! query compiler, cache keying) operates on this shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sort direction for an explicit sort parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// An explicit `field:order` sort request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

impl SortSpec {
    /// Parses `"field:asc"` / `"field:desc"`, rewriting `price` to
    /// `minPrice`. Anything else is rejected.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (field, order) = raw.split_once(':')?;
        let field = field.trim();
        if field.is_empty() {
            return None;
        }
        let order = match order.trim().to_lowercase().as_str() {
            "asc" => SortOrder::Asc,
            "desc" => SortOrder::Desc,
            _ => return None,
        };
        let field = if field == "price" { "minPrice" } else { field };
        Some(Self {
            field: field.to_string(),
            order,
        })
    }
}

/// A validated storefront query, produced by the parser and rewritten by the
/// config applier before compilation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vendors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub product_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variant_option_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variant_skus: Vec<String>,
    /// Option name → selected values. Keys are option *names* once the
    /// applier has resolved handles; straight from the URL before that.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_price_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_price_max: Option<f64>,
    /// Set by configuration, never by the client.
    #[serde(default)]
    pub hide_out_of_stock_items: bool,
    /// Current collection page ID; AND-ed into `collections` by the parser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpid: Option<String>,
    pub page: u32,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub include_filters: bool,
    /// Storefront field projection (dotted paths).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    /// `keep`/`preserveOptionAggregations`: facet whose own clause is
    /// excluded from the aggregation query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_option: Option<String>,
}

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

impl FilterInput {
    /// An empty input with default pagination.
    #[must_use]
    pub fn new() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            ..Self::default()
        }
    }

    /// Offset of the first hit for the current page.
    #[must_use]
    pub fn from_offset(&self) -> u32 {
        (self.page.max(1) - 1) * self.limit
    }

    /// Canonical JSON form used for cache keying: term lists sorted and
    /// deduplicated, map keys in lexicographic order (the default
    /// `serde_json::Map` is ordered), absent fields omitted.
    #[must_use]
    pub fn canonical_json(&self) -> String {
        let mut canon = self.clone();
        for list in [
            &mut canon.vendors,
            &mut canon.product_types,
            &mut canon.tags,
            &mut canon.collections,
            &mut canon.variant_option_keys,
            &mut canon.variant_skus,
            &mut canon.fields,
        ] {
            list.sort();
            list.dedup();
        }
        for values in canon.options.values_mut() {
            values.sort();
            values.dedup();
        }
        serde_json::to_value(&canon)
            .map(|v| v.to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_spec_parses_field_and_order() {
        let sort = SortSpec::parse("createdAt:desc").unwrap();
        assert_eq!(sort.field, "createdAt");
        assert_eq!(sort.order, SortOrder::Desc);
    }

    #[test]
    fn sort_spec_rewrites_price_to_min_price() {
        let sort = SortSpec::parse("price:asc").unwrap();
        assert_eq!(sort.field, "minPrice");
        assert_eq!(sort.order, SortOrder::Asc);
    }

    #[test]
    fn sort_spec_rejects_malformed_values() {
        assert!(SortSpec::parse("price").is_none());
        assert!(SortSpec::parse("price:sideways").is_none());
        assert!(SortSpec::parse(":asc").is_none());
    }

    #[test]
    fn canonical_json_is_order_independent() {
        let mut a = FilterInput::new();
        a.vendors = vec!["Nike".to_string(), "Adidas".to_string()];
        a.options
            .insert("Color".to_string(), vec!["Red".to_string(), "Blue".to_string()]);

        let mut b = FilterInput::new();
        b.vendors = vec!["Adidas".to_string(), "Nike".to_string()];
        b.options
            .insert("Color".to_string(), vec!["Blue".to_string(), "Red".to_string()]);

        assert_eq!(a.canonical_json(), b.canonical_json());
    }

    #[test]
    fn canonical_json_distinguishes_different_inputs() {
        let mut a = FilterInput::new();
        a.vendors = vec!["Nike".to_string()];
        let b = FilterInput::new();
        assert_ne!(a.canonical_json(), b.canonical_json());
    }

    #[test]
    fn from_offset_uses_one_based_pages() {
        let mut input = FilterInput::new();
        input.page = 3;
        input.limit = 20;
        assert_eq!(input.from_offset(), 40);
        input.page = 1;
        assert_eq!(input.from_offset(), 0);
    }
}
