//! Compiles a [`FilterInput`] + configuration into Elasticsearch query and
//! aggregation artifacts.
//!
//! Filter clauses are additive: one `must` entry per populated input field,
//! OR within an option's values, AND across options. Price filters carry two
//! semantics — the facet context matches any product whose price band
//! overlaps the requested window, while the search context accepts a product
//! when either price bound falls inside it.

use std::collections::{BTreeMap, HashSet};

use serde_json::json;

use shopfilter_core::{FilterConfiguration, FilterInput, SortOrder, StandardFilter};

use crate::dsl::{Agg, Query, SearchBody, SortClause};

/// Which price-filter semantics to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceMode {
    /// Overlap: `maxPrice >= min AND minPrice <= max`.
    Facets,
    /// Either bound inside the window, `minimum_should_match: 1`.
    Search,
}

/// Separator between option name and value in indexed option pairs.
pub const OPTION_PAIR_SEPARATOR: &str = "::";

const SEARCH_FIELDS: &[&str] = &["title^3", "vendor^2", "productType", "tags"];

/// Fields an explicit `sort` parameter may target; anything else falls back
/// to the default sort.
const SORTABLE_FIELDS: &[&str] = &[
    "title",
    "vendor",
    "productType",
    "createdAt",
    "updatedAt",
    "publishedAt",
    "minPrice",
    "maxPrice",
    "_score",
];

/// Compiles the document query for `input`. Empty input compiles to
/// `match_all`.
#[must_use]
pub fn compile_query(input: &FilterInput, mode: PriceMode) -> Query {
    let mut must = Vec::new();

    if let Some(search) = input.search.as_deref().filter(|s| !s.trim().is_empty()) {
        must.push(Query::MultiMatch {
            query: search.to_string(),
            fields: SEARCH_FIELDS.iter().map(|f| (*f).to_string()).collect(),
            match_type: "best_fields".to_string(),
            operator: "and".to_string(),
        });
    }

    push_terms(&mut must, "vendor.keyword", &input.vendors);
    push_terms(&mut must, "productType.keyword", &input.product_types);
    push_terms(&mut must, "tags.keyword", &input.tags);
    push_terms(&mut must, "collections.keyword", &input.collections);
    push_terms(&mut must, "variantOptionKeys.keyword", &input.variant_option_keys);

    for (name, values) in &input.options {
        if values.is_empty() {
            continue;
        }
        must.push(Query::Terms {
            field: "optionPairs.keyword".to_string(),
            values: values
                .iter()
                .map(|v| format!("{name}{OPTION_PAIR_SEPARATOR}{v}"))
                .collect(),
        });
    }

    if let Some(clause) = price_clause(input.price_min, input.price_max, mode) {
        must.push(clause);
    }

    if input.variant_price_min.is_some() || input.variant_price_max.is_some() {
        must.push(Query::Nested {
            path: "variants".to_string(),
            query: Box::new(Query::Range {
                field: "variants.price.numeric".to_string(),
                gte: input.variant_price_min,
                lte: input.variant_price_max,
                gt: None,
            }),
        });
    }

    if !input.variant_skus.is_empty() {
        must.push(Query::Nested {
            path: "variants".to_string(),
            query: Box::new(Query::Terms {
                field: "variants.sku".to_string(),
                values: input.variant_skus.clone(),
            }),
        });
    }

    if input.hide_out_of_stock_items {
        must.push(in_stock_clause());
    }

    Query::all_of(must)
}

fn push_terms(must: &mut Vec<Query>, field: &str, values: &[String]) {
    if !values.is_empty() {
        must.push(Query::Terms {
            field: field.to_string(),
            values: values.to_vec(),
        });
    }
}

fn price_clause(min: Option<f64>, max: Option<f64>, mode: PriceMode) -> Option<Query> {
    if min.is_none() && max.is_none() {
        return None;
    }
    match mode {
        PriceMode::Facets => {
            let mut parts = Vec::new();
            if let Some(min) = min {
                parts.push(Query::Range {
                    field: "maxPrice".to_string(),
                    gte: Some(min),
                    lte: None,
                    gt: None,
                });
            }
            if let Some(max) = max {
                parts.push(Query::Range {
                    field: "minPrice".to_string(),
                    gte: None,
                    lte: Some(max),
                    gt: None,
                });
            }
            Some(Query::all_of(parts))
        }
        PriceMode::Search => Some(Query::any_of(vec![
            Query::Range {
                field: "minPrice".to_string(),
                gte: min,
                lte: max,
                gt: None,
            },
            Query::Range {
                field: "maxPrice".to_string(),
                gte: min,
                lte: max,
                gt: None,
            },
        ])),
    }
}

/// A variant counts as in stock when it is sellable through any of the
/// availability signals the index carries.
fn in_stock_clause() -> Query {
    Query::Nested {
        path: "variants".to_string(),
        query: Box::new(Query::any_of(vec![
            Query::Term {
                field: "variants.availableForSale".to_string(),
                value: json!(true),
            },
            Query::Range {
                field: "variants.inventoryQuantity".to_string(),
                gte: None,
                lte: None,
                gt: Some(0.0),
            },
            Query::Range {
                field: "variants.sellableOnlineQuantity".to_string(),
                gte: None,
                lte: None,
                gt: Some(0.0),
            },
        ])),
    }
}

/// Sort ladder: an explicit, sortable field wins; otherwise relevance when
/// searching; otherwise newest first. Unknown fields fall back rather than
/// erroring.
#[must_use]
pub fn compile_sort(input: &FilterInput) -> Vec<SortClause> {
    if let Some(sort) = &input.sort {
        if SORTABLE_FIELDS.contains(&sort.field.as_str()) {
            return vec![SortClause {
                field: sort.field.clone(),
                ascending: sort.order == SortOrder::Asc,
            }];
        }
    }
    if input.search.as_deref().is_some_and(|s| !s.trim().is_empty()) {
        return vec![SortClause::desc("_score")];
    }
    vec![SortClause::desc("createdAt")]
}

/// Aggregations the configuration allows, by response key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggKey {
    Vendors,
    ProductTypes,
    Tags,
    Collections,
    OptionPairs,
    PriceRange,
    VariantPriceRange,
}

impl AggKey {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vendors => "vendors",
            Self::ProductTypes => "productTypes",
            Self::Tags => "tags",
            Self::Collections => "collections",
            Self::OptionPairs => "optionPairs",
            Self::PriceRange => "priceRange",
            Self::VariantPriceRange => "variantPriceRange",
        }
    }

    const ALL: [Self; 7] = [
        Self::Vendors,
        Self::ProductTypes,
        Self::Tags,
        Self::Collections,
        Self::OptionPairs,
        Self::PriceRange,
        Self::VariantPriceRange,
    ];
}

/// The aggregation set backed by the configuration's published options.
///
/// Each published option's type maps to one aggregation; variant-backed
/// options map to `optionPairs`. `variantPriceRange` is always included.
/// With no configuration every aggregation is enabled.
#[must_use]
pub fn enabled_aggregations(config: Option<&FilterConfiguration>) -> HashSet<AggKey> {
    let Some(config) = config else {
        return AggKey::ALL.into_iter().collect();
    };
    let mut enabled = HashSet::new();
    for option in config.published_options() {
        let key = match StandardFilter::from_name(&option.option_type) {
            Some(StandardFilter::Vendor) => AggKey::Vendors,
            Some(StandardFilter::ProductType) => AggKey::ProductTypes,
            Some(StandardFilter::Tag) => AggKey::Tags,
            Some(StandardFilter::Collection) => AggKey::Collections,
            Some(StandardFilter::Price) => AggKey::PriceRange,
            None => AggKey::OptionPairs,
        };
        enabled.insert(key);
    }
    enabled.insert(AggKey::VariantPriceRange);
    enabled
}

/// Concrete aggregation bodies for an enabled set.
#[must_use]
pub fn build_aggregations(enabled: &HashSet<AggKey>) -> BTreeMap<String, Agg> {
    let mut aggs = BTreeMap::new();
    for key in enabled {
        let agg = match key {
            AggKey::Vendors => Agg::Terms {
                field: "vendor.keyword".to_string(),
                size: 500,
                order_by_count: true,
            },
            AggKey::ProductTypes => Agg::Terms {
                field: "productType.keyword".to_string(),
                size: 500,
                order_by_count: true,
            },
            AggKey::Tags => Agg::Terms {
                field: "tags.keyword".to_string(),
                size: 1000,
                order_by_count: false,
            },
            AggKey::Collections => Agg::Terms {
                field: "collections.keyword".to_string(),
                size: 1000,
                order_by_count: false,
            },
            AggKey::OptionPairs => Agg::Terms {
                field: "optionPairs.keyword".to_string(),
                size: 2500,
                order_by_count: false,
            },
            AggKey::PriceRange => Agg::Stats {
                field: "minPrice".to_string(),
            },
            AggKey::VariantPriceRange => {
                let mut sub = BTreeMap::new();
                sub.insert(
                    "price".to_string(),
                    Agg::Stats {
                        field: "variants.price.numeric".to_string(),
                    },
                );
                Agg::Nested {
                    path: "variants".to_string(),
                    aggs: sub,
                }
            }
        };
        aggs.insert(key.as_str().to_string(), agg);
    }
    aggs
}

/// A copy of `input` with one option's clause removed — the `keep` mode for
/// facet queries, so the named facet shows the values that would be
/// available after clearing just that facet.
#[must_use]
pub fn without_option(input: &FilterInput, option_name: &str) -> FilterInput {
    let mut copy = input.clone();
    copy.options
        .retain(|name, _| !name.eq_ignore_ascii_case(option_name));
    copy
}

/// The document-search request body for the products/search endpoints.
/// Aggregations ride along only when the request asks for them.
#[must_use]
pub fn product_search_body(input: &FilterInput, config: Option<&FilterConfiguration>) -> SearchBody {
    let aggs = if input.include_filters {
        build_aggregations(&enabled_aggregations(config))
    } else {
        BTreeMap::new()
    };
    SearchBody {
        query: Some(compile_query(input, PriceMode::Search)),
        from: Some(input.from_offset()),
        size: Some(input.limit),
        sort: compile_sort(input),
        aggs,
        suggest: None,
    }
}

/// The pure-facets request body (`size: 0`), honoring `keep` mode.
#[must_use]
pub fn facet_search_body(input: &FilterInput, config: Option<&FilterConfiguration>) -> SearchBody {
    let effective = match input.keep_option.as_deref() {
        Some(keep) => without_option(input, keep),
        None => input.clone(),
    };
    SearchBody {
        query: Some(compile_query(&effective, PriceMode::Facets)),
        from: None,
        size: Some(0),
        sort: Vec::new(),
        aggs: build_aggregations(&enabled_aggregations(config)),
        suggest: None,
    }
}

#[cfg(test)]
mod tests {
    use shopfilter_core::SortSpec;

    use super::*;

    fn input() -> FilterInput {
        FilterInput::new()
    }

    fn must_clauses(query: &Query) -> Vec<Query> {
        match query {
            Query::Bool { must, .. } => must.clone(),
            Query::MatchAll => Vec::new(),
            other => panic!("expected bool or match_all, got {other:?}"),
        }
    }

    #[test]
    fn empty_input_compiles_to_match_all() {
        assert_eq!(compile_query(&input(), PriceMode::Search), Query::MatchAll);
    }

    #[test]
    fn one_must_clause_per_populated_field() {
        let mut f = input();
        f.search = Some("shoes".to_string());
        f.vendors = vec!["Nike".to_string()];
        f.tags = vec!["sale".to_string()];
        f.options
            .insert("Size".to_string(), vec!["M".to_string()]);
        f.variant_skus = vec!["SKU-1".to_string()];
        f.price_min = Some(5.0);
        f.hide_out_of_stock_items = true;

        let clauses = must_clauses(&compile_query(&f, PriceMode::Search));
        // search + vendors + tags + one option + skus + price + stock
        assert_eq!(clauses.len(), 7);
    }

    #[test]
    fn option_values_become_name_value_pairs() {
        let mut f = input();
        f.options.insert(
            "Size".to_string(),
            vec!["M".to_string(), "XL".to_string()],
        );
        let clauses = must_clauses(&compile_query(&f, PriceMode::Search));
        assert_eq!(
            clauses[0],
            Query::Terms {
                field: "optionPairs.keyword".to_string(),
                values: vec!["Size::M".to_string(), "Size::XL".to_string()],
            }
        );
    }

    #[test]
    fn options_are_and_ed_across_names() {
        let mut f = input();
        f.options.insert("Color".to_string(), vec!["Red".to_string()]);
        f.options.insert("Size".to_string(), vec!["M".to_string()]);
        let clauses = must_clauses(&compile_query(&f, PriceMode::Search));
        assert_eq!(clauses.len(), 2);
    }

    #[test]
    fn facet_price_mode_uses_overlap_semantics() {
        let mut f = input();
        f.price_min = Some(10.0);
        f.price_max = Some(50.0);
        let clauses = must_clauses(&compile_query(&f, PriceMode::Facets));
        assert_eq!(
            clauses[0],
            Query::Bool {
                must: vec![
                    Query::Range {
                        field: "maxPrice".to_string(),
                        gte: Some(10.0),
                        lte: None,
                        gt: None,
                    },
                    Query::Range {
                        field: "minPrice".to_string(),
                        gte: None,
                        lte: Some(50.0),
                        gt: None,
                    },
                ],
                should: vec![],
                filter: vec![],
                minimum_should_match: None,
            }
        );
    }

    #[test]
    fn search_price_mode_uses_should_with_minimum_match() {
        let mut f = input();
        f.price_min = Some(10.0);
        f.price_max = Some(50.0);
        let clauses = must_clauses(&compile_query(&f, PriceMode::Search));
        match &clauses[0] {
            Query::Bool {
                should,
                minimum_should_match,
                ..
            } => {
                assert_eq!(should.len(), 2);
                assert_eq!(*minimum_should_match, Some(1));
            }
            other => panic!("expected bool should, got {other:?}"),
        }
    }

    #[test]
    fn inverted_price_window_still_compiles() {
        let mut f = input();
        f.price_min = Some(50.0);
        f.price_max = Some(10.0);
        // Legal: Elasticsearch returns zero hits, never an error.
        let clauses = must_clauses(&compile_query(&f, PriceMode::Search));
        assert_eq!(clauses.len(), 1);
    }

    #[test]
    fn hide_out_of_stock_compiles_to_nested_should_triple() {
        let mut f = input();
        f.hide_out_of_stock_items = true;
        let clauses = must_clauses(&compile_query(&f, PriceMode::Search));
        match &clauses[0] {
            Query::Nested { path, query } => {
                assert_eq!(path, "variants");
                match query.as_ref() {
                    Query::Bool {
                        should,
                        minimum_should_match,
                        ..
                    } => {
                        assert_eq!(should.len(), 3);
                        assert_eq!(*minimum_should_match, Some(1));
                    }
                    other => panic!("expected bool, got {other:?}"),
                }
            }
            other => panic!("expected nested, got {other:?}"),
        }
    }

    #[test]
    fn variant_price_compiles_to_nested_range() {
        let mut f = input();
        f.variant_price_min = Some(5.0);
        let clauses = must_clauses(&compile_query(&f, PriceMode::Search));
        assert_eq!(
            clauses[0],
            Query::Nested {
                path: "variants".to_string(),
                query: Box::new(Query::Range {
                    field: "variants.price.numeric".to_string(),
                    gte: Some(5.0),
                    lte: None,
                    gt: None,
                }),
            }
        );
    }

    #[test]
    fn explicit_sort_wins() {
        let mut f = input();
        f.search = Some("shoes".to_string());
        f.sort = SortSpec::parse("minPrice:asc");
        let sort = compile_sort(&f);
        assert_eq!(sort, vec![SortClause::asc("minPrice")]);
    }

    #[test]
    fn search_defaults_to_score_sort() {
        let mut f = input();
        f.search = Some("shoes".to_string());
        assert_eq!(compile_sort(&f), vec![SortClause::desc("_score")]);
    }

    #[test]
    fn default_sort_is_created_at_desc() {
        assert_eq!(compile_sort(&input()), vec![SortClause::desc("createdAt")]);
    }

    #[test]
    fn unknown_sort_field_falls_back_to_default() {
        let mut f = input();
        f.sort = SortSpec::parse("evil_field:asc");
        assert_eq!(compile_sort(&f), vec![SortClause::desc("createdAt")]);
    }

    #[test]
    fn no_config_enables_all_aggregations() {
        let enabled = enabled_aggregations(None);
        assert_eq!(enabled.len(), 7);
    }

    #[test]
    fn aggregations_are_gated_by_published_options() {
        use shopfilter_core::{
            ConfigSettings, ConfigStatus, DeploymentChannel, FilterOption, OptionSettings,
            TargetScope,
        };
        let mk = |handle: &str, option_type: &str, status: ConfigStatus| FilterOption {
            handle: handle.to_string(),
            position: 0,
            option_type: option_type.to_string(),
            label: None,
            option_settings: OptionSettings::default(),
            target_scope: TargetScope::All,
            allowed_options: Vec::new(),
            status,
        };
        let config = FilterConfiguration {
            id: "c".to_string(),
            version: 1,
            updated_at: None,
            created_at: None,
            status: ConfigStatus::Published,
            deployment_channel: DeploymentChannel::App,
            target_scope: TargetScope::All,
            allowed_collections: Vec::new(),
            settings: ConfigSettings::default(),
            options: vec![
                mk("vnd_1", "vendor", ConfigStatus::Published),
                mk("col_1", "Color", ConfigStatus::Published),
                mk("tag_1", "tags", ConfigStatus::Draft),
            ],
        };
        let enabled = enabled_aggregations(Some(&config));
        assert!(enabled.contains(&AggKey::Vendors));
        assert!(enabled.contains(&AggKey::OptionPairs));
        assert!(enabled.contains(&AggKey::VariantPriceRange));
        assert!(!enabled.contains(&AggKey::Tags));
        assert!(!enabled.contains(&AggKey::ProductTypes));
    }

    #[test]
    fn keep_mode_removes_only_the_named_option_clause() {
        let mut f = input();
        f.options.insert("Color".to_string(), vec!["Red".to_string()]);
        f.options.insert("Size".to_string(), vec!["M".to_string()]);
        f.keep_option = Some("color".to_string());
        let body = facet_search_body(&f, None);
        let clauses = must_clauses(body.query.as_ref().expect("query"));
        assert_eq!(clauses.len(), 1);
        assert!(matches!(
            &clauses[0],
            Query::Terms { field, values }
                if field == "optionPairs.keyword" && values == &vec!["Size::M".to_string()]
        ));
        assert_eq!(body.size, Some(0));
    }

    #[test]
    fn product_body_includes_aggs_only_when_asked() {
        let mut f = input();
        f.include_filters = false;
        assert!(product_search_body(&f, None).aggs.is_empty());
        f.include_filters = true;
        assert!(!product_search_body(&f, None).aggs.is_empty());
    }

    #[test]
    fn product_body_paginates_from_page_and_limit() {
        let mut f = input();
        f.page = 3;
        f.limit = 24;
        let body = product_search_body(&f, None);
        assert_eq!(body.from, Some(48));
        assert_eq!(body.size, Some(24));
    }
}
