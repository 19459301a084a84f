//! HTTP client for the Elasticsearch cluster.
//!
//! Wraps `reqwest` with basic auth, per-request deadlines, and the one
//! domain-specific rule of this service: a missing index is not an error.
//! Storefronts query before their first indexing run finishes, so a 404 of
//! type `index_not_found_exception` becomes an empty result.

use std::time::Duration;

use serde_json::Value;

use crate::error::ElasticError;
use crate::response::{is_index_missing_error, SearchResponse};

/// Client for the product and filter-configuration indices.
///
/// Holds a shared connection pool; cloning is cheap and all clones reuse it.
#[derive(Clone)]
pub struct ElasticClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl ElasticClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns [`ElasticError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        base_url: &str,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, ElasticError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent("shopfilter/0.1 (storefront-query)")
            .build()?;
        let credentials = match (username, password) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        };
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            credentials,
        })
    }

    fn request(&self, url: &str, body: String, ndjson: bool) -> reqwest::RequestBuilder {
        let content_type = if ndjson {
            "application/x-ndjson"
        } else {
            "application/json"
        };
        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", content_type)
            .body(body);
        if let Some((user, pass)) = &self.credentials {
            builder = builder.basic_auth(user, Some(pass.clone()));
        }
        builder
    }

    /// Runs a `_search` against one index within `deadline`.
    ///
    /// # Errors
    ///
    /// - [`ElasticError::Timeout`] when the deadline elapses.
    /// - [`ElasticError::Status`] for non-success responses other than a
    ///   missing index.
    /// - [`ElasticError::Http`] / [`ElasticError::Deserialize`] for
    ///   transport and decoding failures.
    pub async fn search(
        &self,
        index: &str,
        body: &Value,
        deadline: Duration,
    ) -> Result<SearchResponse, ElasticError> {
        let url = format!("{}/{}/_search", self.base_url, index);
        let request = self.request(&url, body.to_string(), false);
        let response = tokio::time::timeout(deadline, request.send())
            .await
            .map_err(|_| ElasticError::Timeout(deadline))??;

        let status = response.status();
        let text = tokio::time::timeout(deadline, response.text())
            .await
            .map_err(|_| ElasticError::Timeout(deadline))??;

        if !status.is_success() {
            return Self::absorb_missing_index(status.as_u16(), &text, index);
        }

        serde_json::from_str(&text).map_err(|e| ElasticError::Deserialize {
            context: format!("search({index})"),
            source: e,
        })
    }

    /// Runs an `_msearch` batch within `deadline`; one response per entry,
    /// in order. Per-entry missing-index errors become empty responses.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`ElasticClient::search`]; the first per-entry error
    /// that is not a missing index fails the whole batch.
    pub async fn msearch(
        &self,
        entries: &[(String, Value)],
        deadline: Duration,
    ) -> Result<Vec<SearchResponse>, ElasticError> {
        let url = format!("{}/_msearch", self.base_url);
        let mut body = String::new();
        for (index, query) in entries {
            body.push_str(&serde_json::json!({ "index": index }).to_string());
            body.push('\n');
            body.push_str(&query.to_string());
            body.push('\n');
        }

        let request = self.request(&url, body, true);
        let response = tokio::time::timeout(deadline, request.send())
            .await
            .map_err(|_| ElasticError::Timeout(deadline))??;

        let status = response.status();
        let text = tokio::time::timeout(deadline, response.text())
            .await
            .map_err(|_| ElasticError::Timeout(deadline))??;

        if !status.is_success() {
            return Err(ElasticError::Status {
                status: status.as_u16(),
                reason: extract_reason(&text),
            });
        }

        let envelope: MsearchEnvelope =
            serde_json::from_str(&text).map_err(|e| ElasticError::Deserialize {
                context: "msearch".to_string(),
                source: e,
            })?;

        let mut responses = Vec::with_capacity(envelope.responses.len());
        for item in envelope.responses {
            if let Some(error) = item.get("error") {
                if is_index_missing_error(error) {
                    responses.push(SearchResponse::empty());
                    continue;
                }
                return Err(ElasticError::Status {
                    status: item.get("status").and_then(Value::as_u64).map_or(500, |s| {
                        u16::try_from(s).unwrap_or(500)
                    }),
                    reason: error
                        .get("reason")
                        .and_then(Value::as_str)
                        .unwrap_or("msearch entry failed")
                        .to_string(),
                });
            }
            let parsed = serde_json::from_value(item).map_err(|e| ElasticError::Deserialize {
                context: "msearch entry".to_string(),
                source: e,
            })?;
            responses.push(parsed);
        }
        Ok(responses)
    }

    /// Pings the cluster root; used by the health endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ElasticError::Status`] or [`ElasticError::Http`] when the
    /// cluster is unreachable or unhealthy.
    pub async fn ping(&self, deadline: Duration) -> Result<(), ElasticError> {
        let mut builder = self.client.get(&self.base_url);
        if let Some((user, pass)) = &self.credentials {
            builder = builder.basic_auth(user, Some(pass.clone()));
        }
        let response = tokio::time::timeout(deadline, builder.send())
            .await
            .map_err(|_| ElasticError::Timeout(deadline))??;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ElasticError::Status {
                status: response.status().as_u16(),
                reason: "cluster ping failed".to_string(),
            })
        }
    }

    fn absorb_missing_index(
        status: u16,
        body: &str,
        index: &str,
    ) -> Result<SearchResponse, ElasticError> {
        if let Ok(parsed) = serde_json::from_str::<Value>(body) {
            if let Some(error) = parsed.get("error") {
                if is_index_missing_error(error) {
                    tracing::debug!(index, "index missing; substituting empty result");
                    return Ok(SearchResponse::empty());
                }
            }
        }
        Err(ElasticError::Status {
            status,
            reason: extract_reason(body),
        })
    }
}

#[derive(serde::Deserialize)]
struct MsearchEnvelope {
    #[serde(default)]
    responses: Vec<Value>,
}

/// Pulls a loggable reason out of an error body without echoing the whole
/// payload.
fn extract_reason(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("reason"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let client = ElasticClient::new("http://localhost:9200/", None, None).unwrap();
        assert_eq!(client.base_url, "http://localhost:9200");
    }

    #[test]
    fn extract_reason_prefers_error_reason_field() {
        let body = r#"{"error":{"type":"parse_exception","reason":"bad query"}}"#;
        assert_eq!(extract_reason(body), "bad query");
    }

    #[test]
    fn extract_reason_falls_back_to_truncated_body() {
        assert_eq!(extract_reason("plain failure"), "plain failure");
    }
}
