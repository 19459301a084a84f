use axum::extract::{RawQuery, State};
use axum::Json;

use shopfilter_core::parse_query;

use super::{decode_query, require_shop, success, ApiError, ApiSuccess, AppState};
use crate::service::FiltersPayload;

/// `GET /storefront/filters` — facet aggregations plus the applied-filters
/// echo. `keep`/`preserveOptionAggregations` excludes one facet's own
/// clause from the aggregation query.
pub(super) async fn get_filters(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Json<ApiSuccess<FiltersPayload>>, ApiError> {
    let pairs = decode_query(raw.as_deref());
    let shop = require_shop(&pairs, &state.config)?;
    let input = parse_query(&pairs);

    let payload = state.service.filters(&shop, input).await?;
    Ok(success(payload))
}
