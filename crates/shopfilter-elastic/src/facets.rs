//! Formats raw aggregation results into the public facet shape.
//!
//! Option-pair buckets arrive as flat `"Name::Value"` keys; this module
//! decodes them, drops buckets for facets the configuration no longer
//! exposes, synthesizes price ranges, and orders the final list by each
//! option's configured position.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use shopfilter_core::{FilterConfiguration, StandardFilter};

use crate::compiler::OPTION_PAIR_SEPARATOR;
use crate::response::{Aggregations, StatsResult, TermsBucket};

/// One selectable facet value with its document count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetValue {
    pub value: String,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A price interval; emitted only when both bounds are known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

/// One facet in the storefront's intended UI order.
#[derive(Debug, Clone, Serialize)]
pub struct Facet {
    pub handle: String,
    pub label: String,
    #[serde(rename = "type")]
    pub facet_type: String,
    pub values: Vec<FacetValue>,
    pub position: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_range: Option<PriceRange>,
}

/// The formatted facet section of a response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FacetSet {
    pub facets: Vec<Facet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_range: Option<PriceRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_price_range: Option<PriceRange>,
}

/// Splits `"Name::Value"` buckets into per-name facet values, preserving
/// first-appearance name order. Buckets without the separator are
/// discarded; values within a name sort by count descending.
#[must_use]
pub fn decode_option_pairs(buckets: &[TermsBucket]) -> Vec<(String, Vec<FacetValue>)> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: std::collections::HashMap<String, Vec<FacetValue>> =
        std::collections::HashMap::new();

    for bucket in buckets {
        let Some((name, value)) = bucket.key.split_once(OPTION_PAIR_SEPARATOR) else {
            continue;
        };
        if name.is_empty() || value.is_empty() {
            continue;
        }
        if !grouped.contains_key(name) {
            order.push(name.to_string());
        }
        grouped.entry(name.to_string()).or_default().push(FacetValue {
            value: value.to_string(),
            count: bucket.doc_count,
            label: None,
        });
    }

    order
        .into_iter()
        .filter_map(|name| {
            grouped.remove(&name).map(|mut values| {
                values.sort_by(|a, b| b.count.cmp(&a.count));
                (name, values)
            })
        })
        .collect()
}

/// Drops decoded groups whose name is not among the configured variant
/// keys. An empty key set passes everything through (configuration absent
/// or unusable).
#[must_use]
pub fn filter_by_variant_keys(
    groups: Vec<(String, Vec<FacetValue>)>,
    variant_keys: &HashSet<String>,
) -> Vec<(String, Vec<FacetValue>)> {
    if variant_keys.is_empty() {
        return groups;
    }
    groups
        .into_iter()
        .filter(|(name, _)| variant_keys.contains(&name.to_lowercase()))
        .collect()
}

/// A price range only exists when the stats produced both bounds.
#[must_use]
pub fn price_range_from(stats: Option<StatsResult>) -> Option<PriceRange> {
    let stats = stats?;
    match (stats.min, stats.max) {
        (Some(min), Some(max)) => Some(PriceRange { min, max }),
        _ => None,
    }
}

/// Formats the aggregation section into the public facet list.
///
/// With a configuration, each published option becomes one facet stamped
/// with its position and the list is sorted ascending by it. Without one,
/// aggregations pass through in natural order.
#[must_use]
pub fn format_facets(
    aggregations: Option<&Aggregations>,
    config: Option<&FilterConfiguration>,
) -> FacetSet {
    let Some(aggs) = aggregations else {
        return FacetSet::default();
    };

    let price_range = price_range_from(aggs.stats("priceRange"));
    let variant_price_range = price_range_from(aggs.nested_stats("variantPriceRange", "price"));

    let facets = match config {
        Some(config) => configured_facets(aggs, config, price_range),
        None => unconfigured_facets(aggs, price_range),
    };

    FacetSet {
        facets,
        price_range,
        variant_price_range,
    }
}

fn bucket_values(buckets: Vec<TermsBucket>) -> Vec<FacetValue> {
    buckets
        .into_iter()
        .map(|b| FacetValue {
            value: b.key,
            count: b.doc_count,
            label: None,
        })
        .collect()
}

fn configured_facets(
    aggs: &Aggregations,
    config: &FilterConfiguration,
    price_range: Option<PriceRange>,
) -> Vec<Facet> {
    let variant_keys = config.variant_option_keys();
    let groups = filter_by_variant_keys(
        decode_option_pairs(&aggs.terms_buckets("optionPairs")),
        &variant_keys,
    );

    let mut facets: Vec<Facet> = config
        .published_options()
        .map(|option| {
            let label = option
                .label
                .clone()
                .unwrap_or_else(|| option.resolved_name().to_string());
            match StandardFilter::from_name(&option.option_type) {
                Some(StandardFilter::Vendor) => Facet {
                    handle: option.handle.clone(),
                    label,
                    facet_type: "list".to_string(),
                    values: bucket_values(aggs.terms_buckets("vendors")),
                    position: option.position,
                    price_range: None,
                },
                Some(StandardFilter::ProductType) => Facet {
                    handle: option.handle.clone(),
                    label,
                    facet_type: "list".to_string(),
                    values: bucket_values(aggs.terms_buckets("productTypes")),
                    position: option.position,
                    price_range: None,
                },
                Some(StandardFilter::Tag) => Facet {
                    handle: option.handle.clone(),
                    label,
                    facet_type: "list".to_string(),
                    values: bucket_values(aggs.terms_buckets("tags")),
                    position: option.position,
                    price_range: None,
                },
                Some(StandardFilter::Collection) => Facet {
                    handle: option.handle.clone(),
                    label,
                    facet_type: "list".to_string(),
                    values: bucket_values(aggs.terms_buckets("collections")),
                    position: option.position,
                    price_range: None,
                },
                Some(StandardFilter::Price) => Facet {
                    handle: option.handle.clone(),
                    label,
                    facet_type: "price".to_string(),
                    values: Vec::new(),
                    position: option.position,
                    price_range,
                },
                None => {
                    let target = option.resolved_name().trim().to_lowercase();
                    let values = groups
                        .iter()
                        .find(|(name, _)| name.to_lowercase() == target)
                        .map(|(_, values)| values.clone())
                        .unwrap_or_default();
                    Facet {
                        handle: option.handle.clone(),
                        label,
                        facet_type: "list".to_string(),
                        values,
                        position: option.position,
                        price_range: None,
                    }
                }
            }
        })
        .collect();

    facets.sort_by_key(|f| f.position);
    facets
}

fn unconfigured_facets(aggs: &Aggregations, price_range: Option<PriceRange>) -> Vec<Facet> {
    let mut facets = Vec::new();
    let mut position = 0;
    for key in ["vendors", "productTypes", "tags", "collections"] {
        if !aggs.contains(key) {
            continue;
        }
        facets.push(Facet {
            handle: key.to_string(),
            label: key.to_string(),
            facet_type: "list".to_string(),
            values: bucket_values(aggs.terms_buckets(key)),
            position,
            price_range: None,
        });
        position += 1;
    }
    for (name, values) in decode_option_pairs(&aggs.terms_buckets("optionPairs")) {
        facets.push(Facet {
            handle: name.clone(),
            label: name,
            facet_type: "list".to_string(),
            values,
            position,
            price_range: None,
        });
        position += 1;
    }
    if aggs.contains("priceRange") {
        facets.push(Facet {
            handle: "priceRange".to_string(),
            label: "priceRange".to_string(),
            facet_type: "price".to_string(),
            values: Vec::new(),
            position,
            price_range,
        });
    }
    facets
}

/// Storefront default projection when the request names no fields.
pub const DEFAULT_PRODUCT_FIELDS: &[&str] = &[
    "id",
    "title",
    "handle",
    "vendor",
    "productType",
    "tags",
    "collections",
    "minPrice",
    "maxPrice",
    "createdAt",
    "images",
    "variants",
];

/// Projects a product source document onto dotted field paths. Paths into
/// arrays (`variants.id`, `variants.price`) project each element; multiple
/// paths into the same array merge per element.
#[must_use]
pub fn project_product(source: &Value, fields: &[String]) -> Value {
    let effective: Vec<String> = if fields.is_empty() {
        DEFAULT_PRODUCT_FIELDS.iter().map(|f| (*f).to_string()).collect()
    } else {
        fields.to_vec()
    };

    let mut out = Value::Object(serde_json::Map::new());
    for field in &effective {
        let parts: Vec<&str> = field.split('.').filter(|p| !p.is_empty()).collect();
        if !parts.is_empty() {
            copy_path(source, &mut out, &parts);
        }
    }
    out
}

fn copy_path(source: &Value, dst: &mut Value, parts: &[&str]) {
    let key = parts[0];
    let Some(value) = source.get(key) else {
        return;
    };
    let Some(dst_map) = dst.as_object_mut() else {
        return;
    };

    if parts.len() == 1 {
        dst_map.insert(key.to_string(), value.clone());
        return;
    }

    match value {
        Value::Array(items) => {
            let entry = dst_map.entry(key.to_string()).or_insert_with(|| {
                Value::Array(vec![Value::Object(serde_json::Map::new()); items.len()])
            });
            if let Value::Array(slots) = entry {
                for (item, slot) in items.iter().zip(slots.iter_mut()) {
                    copy_path(item, slot, &parts[1..]);
                }
            }
        }
        Value::Object(_) => {
            let entry = dst_map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            copy_path(value, entry, &parts[1..]);
        }
        _ => {}
    }
}
