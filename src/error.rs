use thiserror::Error;

/// Failures of a single fetch attempt. The orchestrator absorbs all of them.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("network failure on {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl ExtractError {
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Network failures and non-200 responses may go away on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::UnexpectedStatus { .. })
    }
}
