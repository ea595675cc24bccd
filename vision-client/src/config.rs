use std::fmt;

use reqwest::Url;

use crate::contract::ProcessId;
use crate::error::{ApiError, ConfigError};

/// Environment variable naming the backend base URL.
pub const BACKEND_URL_VAR: &str = "BACKEND_URL";

/// Used when `BACKEND_URL` is not set.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Backend routes consumed by the workbench.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    SubmitImage,
    Status,
    DetectRegions,
    ClassifyRegion,
    TrainingData,
}

impl Endpoint {
    /// Route relative to the base URL (no leading slash so `Url::join` keeps any base path).
    pub fn path(&self) -> &'static str {
        match self {
            Self::SubmitImage => "process-image/",
            Self::Status => "estado/",
            Self::DetectRegions => "test-image",
            Self::ClassifyRegion => "test-knn-image",
            Self::TrainingData => "grafica-entrenamiento",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    base_url: Url,
}

impl BackendConfig {
    /// Validate and normalise a base URL. Only absolute http(s) URLs are accepted.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };

        let mut url = Url::parse(base_url.trim()).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
        }

        // Url::join replaces the last segment unless the path ends with '/'
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(Self { base_url: url })
    }

    /// Read `BACKEND_URL` at runtime, falling back to [`DEFAULT_BACKEND_URL`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var(BACKEND_URL_VAR).unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());
        Self::new(&url)
    }

    /// Use the `BACKEND_URL` captured at compile time (browser builds have no process environment).
    pub fn from_build_env() -> Result<Self, ConfigError> {
        Self::new(option_env!("BACKEND_URL").unwrap_or(DEFAULT_BACKEND_URL))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint_url(&self, endpoint: Endpoint) -> Result<Url, ApiError> {
        self.base_url
            .join(endpoint.path())
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))
    }

    /// `/estado/{id}` with the id percent-encoded as a single path segment.
    pub fn status_url(&self, id: &ProcessId) -> Result<Url, ApiError> {
        let mut url = self.endpoint_url(Endpoint::Status)?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(format!("{} cannot carry path segments", self.base_url)))?
            .pop_if_empty()
            .push(id.as_str());
        Ok(url)
    }
}
