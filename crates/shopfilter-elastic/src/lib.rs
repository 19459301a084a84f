pub mod client;
pub mod compiler;
pub mod dsl;
pub mod error;
pub mod facets;
pub mod response;
pub mod suggest;

pub use client::ElasticClient;
pub use compiler::{
    build_aggregations, compile_query, compile_sort, enabled_aggregations, facet_search_body,
    product_search_body, without_option, AggKey, PriceMode, OPTION_PAIR_SEPARATOR,
};
pub use dsl::{Agg, Query, SearchBody, SortClause};
pub use error::ElasticError;
pub use facets::{
    decode_option_pairs, filter_by_variant_keys, format_facets, price_range_from, project_product,
    Facet, FacetSet, FacetValue, PriceRange, DEFAULT_PRODUCT_FIELDS,
};
pub use response::{
    Aggregations, Hit, HitsEnvelope, SearchResponse, StatsResult, SuggestGroup, SuggestOption,
    TermsBucket, TotalHits,
};
pub use suggest::{
    correction_candidates, suggest_section, suggestion_terms, MAX_CANDIDATES, TITLE_SUGGESTER,
};
