use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("cannot reach {url}: {reason}. Check the configured endpoint and network access")]
    Connectivity { url: String, reason: String },

    #[error("search service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("permission denied ({status}): {body}")]
    Permission { status: u16, body: String },

    #[error("not configured: {0}")]
    NotConfigured(&'static str),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("unknown index type: {0}")]
    UnknownIndexType(String),

    #[error("embedding response missing vector")]
    MissingEmbedding,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            let url = e
                .url()
                .map(|u| u.origin().ascii_serialization())
                .unwrap_or_default();
            return Self::Connectivity {
                url,
                reason: e.without_url().to_string(),
            };
        }
        Self::Http(e)
    }
}

impl SearchError {
    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Permission { status, body },
            _ => Self::Api { status, body },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}
