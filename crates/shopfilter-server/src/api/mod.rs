mod filters;
mod products;
mod search;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderName, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use shopfilter_core::{normalize_shop_domain, AppConfig, ShopDomain};

use crate::middleware::{enforce_rate_limit, request_id, RateLimitState};
use crate::service::{SearchService, ServiceError};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: SearchService,
}

/// Success envelope: `{"success": true, "data": ...}`.
#[derive(Debug, Serialize)]
pub struct ApiSuccess<T: Serialize> {
    pub success: bool,
    pub data: T,
}

pub(super) fn success<T: Serialize>(data: T) -> Json<ApiSuccess<T>> {
    Json(ApiSuccess {
        success: true,
        data,
    })
}

/// Failures surfaced to the client as `{"success": false, "error": ...}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    UpstreamTimeout,
    Upstream(String),
    Internal,
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::UpstreamTimeout => Self::UpstreamTimeout,
            ServiceError::Upstream(reason) => {
                tracing::error!(error = %reason, "upstream search failed");
                Self::Upstream(reason)
            }
            ServiceError::Internal => Self::Internal,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::UpstreamTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "search backend timed out".to_string(),
            ),
            Self::Upstream(_) => (
                StatusCode::BAD_GATEWAY,
                "search backend unavailable".to_string(),
            ),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };
        (
            status,
            Json(serde_json::json!({ "success": false, "error": message })),
        )
            .into_response()
    }
}

/// Decodes the raw query string into ordered key/value pairs, preserving
/// repeated keys — `serde`-based extractors collapse them.
pub(super) fn decode_query(raw: Option<&str>) -> Vec<(String, String)> {
    raw.map(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    })
    .unwrap_or_default()
}

/// Extracts and validates the mandatory `shop` parameter.
pub(super) fn require_shop(
    pairs: &[(String, String)],
    config: &AppConfig,
) -> Result<ShopDomain, ApiError> {
    let raw = pairs
        .iter()
        .find(|(k, _)| k == "shop")
        .map(|(_, v)| v.as_str())
        .ok_or_else(|| ApiError::BadRequest("missing required parameter: shop".to_string()))?;
    normalize_shop_domain(raw, &config.allowed_shop_domains)
        .map_err(|e| ApiError::BadRequest(format!("invalid shop domain: {e}")))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    elasticsearch: &'static str,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state
        .service
        .elastic()
        .ping(std::time::Duration::from_secs(2))
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            success(HealthData {
                status: "ok",
                elasticsearch: "ok",
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: elasticsearch unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                success(HealthData {
                    status: "degraded",
                    elasticsearch: "unavailable",
                }),
            )
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
}

fn storefront_router(rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/storefront/products", get(products::get_products))
        .route("/storefront/filters", get(filters::get_filters))
        .route("/storefront/search", get(search::get_search))
        .layer(axum::middleware::from_fn_with_state(
            rate_limit,
            enforce_rate_limit,
        ))
}

pub fn build_app(state: AppState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(storefront_router(rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

/// Default per-route bucket: 500 requests per minute per tenant.
#[must_use]
pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(500, std::time::Duration::from_secs(60))
}
