use axum::extract::{RawQuery, State};
use axum::Json;

use shopfilter_core::parse_query;

use super::{decode_query, require_shop, success, ApiError, ApiSuccess, AppState};
use crate::service::ProductsPayload;

/// `GET /storefront/products` — products plus optional facet aggregations.
pub(super) async fn get_products(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Json<ApiSuccess<ProductsPayload>>, ApiError> {
    let pairs = decode_query(raw.as_deref());
    let shop = require_shop(&pairs, &state.config)?;
    let input = parse_query(&pairs);

    let payload = state.service.products(&shop, input).await?;
    Ok(success(payload))
}
