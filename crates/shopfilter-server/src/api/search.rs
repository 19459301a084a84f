use axum::extract::{RawQuery, State};
use axum::Json;

use shopfilter_core::parse_query;

use super::{decode_query, require_shop, success, ApiError, ApiSuccess, AppState};
use crate::service::{SearchOptions, SearchPayload};

fn flag(pairs: &[(String, String)], name: &str, default: bool) -> bool {
    pairs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map_or(default, |(_, v)| {
            matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes")
        })
}

/// `GET /storefront/search` — dedicated search with suggestion and
/// correction handling.
pub(super) async fn get_search(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Json<ApiSuccess<SearchPayload>>, ApiError> {
    let pairs = decode_query(raw.as_deref());
    let shop = require_shop(&pairs, &state.config)?;
    let input = parse_query(&pairs);

    let options = SearchOptions {
        suggestions: flag(&pairs, "suggestions", false),
        handle_zero_results: flag(&pairs, "handleZeroResults", true),
        include_facets: flag(&pairs, "includeFacets", false),
    };

    let payload = state.service.search(&shop, input, options).await?;
    Ok(success(payload))
}
