use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation ID for one request, available to handlers as an extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A caller-supplied ID is only trusted when it is short printable ASCII;
/// anything else gets replaced rather than echoed back.
fn acceptable_request_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= 64
        && candidate.bytes().all(|b| b.is_ascii_graphic())
}

/// Stamps every request with a correlation ID.
///
/// Reuses a well-formed inbound `x-request-id`; otherwise mints a fresh
/// UUID in its compact hex form. The ID travels through request extensions
/// and is echoed on the response header so client and server logs line up.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = match req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| acceptable_request_id(v))
    {
        Some(inbound) => inbound.to_string(),
        None => Uuid::new_v4().simple().to_string(),
    };

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

struct WindowCounter {
    window_start: Instant,
    count: u32,
}

/// Fixed-window request counters, bucketed per route and tenant.
///
/// The window resets lazily on the first request after it elapses. Counters
/// for idle buckets are pruned opportunistically so the map does not grow
/// with tenant churn.
#[derive(Clone)]
pub struct RateLimitState {
    buckets: Arc<Mutex<HashMap<String, WindowCounter>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Records a request against `key`; returns `false` when the bucket is
    /// over its limit for the current window.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("rate limit mutex poisoned");

        if buckets.len() > 10_000 {
            let window = self.window;
            buckets.retain(|_, c| now.duration_since(c.window_start) < window);
        }

        let counter = buckets.entry(key.to_string()).or_insert(WindowCounter {
            window_start: now,
            count: 0,
        });
        if now.duration_since(counter.window_start) >= self.window {
            counter.window_start = now;
            counter.count = 0;
        }
        counter.count += 1;
        counter.count <= self.max_requests
    }
}

/// Axum middleware enforcing the per-route, per-tenant rate limit. The
/// bucket key combines the request path with the `shop` query parameter so
/// one noisy tenant cannot starve the rest.
pub async fn enforce_rate_limit(
    State(state): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let shop = req
        .uri()
        .query()
        .and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == "shop")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or_else(|| "unknown".to_string());
    let key = format!("{}:{}", req.uri().path(), shop.to_lowercase());

    if state.check(&key) {
        next.run(req).await
    } else {
        tracing::warn!(key = %key, "rate limit exceeded");
        (
            axum::http::StatusCode::TOO_MANY_REQUESTS,
            axum::Json(serde_json::json!({
                "success": false,
                "error": "Rate limit exceeded. Please slow down and try again shortly."
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_must_be_short_printable_ascii() {
        assert!(acceptable_request_id("req-42"));
        assert!(acceptable_request_id(&"a".repeat(64)));
        assert!(!acceptable_request_id(""));
        assert!(!acceptable_request_id(&"a".repeat(65)));
        assert!(!acceptable_request_id("has space"));
        assert!(!acceptable_request_id("newline\n"));
    }

    #[test]
    fn rate_limit_allows_up_to_max_in_window() {
        let state = RateLimitState::new(3, Duration::from_secs(60));
        assert!(state.check("k"));
        assert!(state.check("k"));
        assert!(state.check("k"));
        assert!(!state.check("k"));
    }

    #[test]
    fn rate_limit_buckets_are_independent() {
        let state = RateLimitState::new(1, Duration::from_secs(60));
        assert!(state.check("a"));
        assert!(state.check("b"));
        assert!(!state.check("a"));
    }

    #[test]
    fn rate_limit_window_resets() {
        let state = RateLimitState::new(1, Duration::from_millis(10));
        assert!(state.check("k"));
        assert!(!state.check("k"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(state.check("k"));
    }
}
