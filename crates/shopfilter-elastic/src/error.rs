use thiserror::Error;

/// Errors returned by the Elasticsearch client.
#[derive(Debug, Error)]
pub enum ElasticError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The cluster answered with a non-success status that is not the
    /// missing-index case (which is absorbed into an empty result).
    #[error("Elasticsearch returned {status}: {reason}")]
    Status { status: u16, reason: String },

    /// The per-request deadline elapsed before the cluster answered.
    #[error("Elasticsearch request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The response body could not be deserialized into the expected shape.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ElasticError {
    /// Whether this error should surface as an upstream timeout (504)
    /// rather than a generic upstream failure (502).
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Http(e) => e.is_timeout(),
            Self::Status { .. } | Self::Deserialize { .. } => false,
        }
    }
}
