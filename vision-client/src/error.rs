use thiserror::Error;

use crate::config::Endpoint;

/// A response or a request body that does not satisfy the backend contract.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema mismatch: {0}")]
    Schema(String),

    #[error("class name must not be blank")]
    BlankClassName,

    #[error("threshold {0} is outside 0..=255")]
    ThresholdOutOfRange(i64),
}

/// Failure of a single backend call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: Endpoint,
        status: u16,
        body: String,
    },

    #[error("{endpoint} response rejected: {source}")]
    Contract {
        endpoint: Endpoint,
        #[source]
        source: ContractError,
    },

    #[error("region image is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl ApiError {
    pub(crate) fn contract(endpoint: Endpoint, source: impl Into<ContractError>) -> Self {
        Self::Contract {
            endpoint,
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid backend URL `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}
