//! Seam between the collector and whatever serves raw statistics rows

use crate::ingest_core::{ApiError, RawRow};
use async_trait::async_trait;

/// One unit of collection work: a municipality at one survey year
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchTarget {
    pub entity_id: String,
    pub period: i32,
}

impl FetchTarget {
    pub fn new(entity_id: impl Into<String>, period: i32) -> Self {
        Self {
            entity_id: entity_id.into(),
            period,
        }
    }

    /// Cartesian product of entities and periods
    pub fn grid(entity_ids: &[String], periods: &[i32]) -> Vec<FetchTarget> {
        entity_ids
            .iter()
            .flat_map(|id| periods.iter().map(move |p| FetchTarget::new(id.clone(), *p)))
            .collect()
    }
}

#[derive(Debug)]
pub enum FetchError {
    Http(reqwest::Error),
    Status { code: u16, body: String },
    Api(ApiError),
    Config(String),
}

impl FetchError {
    /// Short classification recorded with each collection failure
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Http(e) if e.is_timeout() => "timeout",
            FetchError::Http(_) => "http",
            FetchError::Status { .. } => "status",
            FetchError::Api(ApiError::Status { .. }) => "api_status",
            FetchError::Api(_) => "api_shape",
            FetchError::Config(_) => "config",
        }
    }

    /// Worth retrying: network trouble, throttling and server-side errors
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::Status { code, .. } => *code == 429 || *code >= 500,
            FetchError::Api(_) | FetchError::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(err)
    }
}

impl From<ApiError> for FetchError {
    fn from(err: ApiError) -> Self {
        FetchError::Api(err)
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Http(e) => write!(f, "HTTP error: {}", e),
            FetchError::Status { code, body } => write!(f, "HTTP status {}: {}", code, body),
            FetchError::Api(e) => write!(f, "API error: {}", e),
            FetchError::Config(e) => write!(f, "Config error: {}", e),
        }
    }
}

impl std::error::Error for FetchError {}

/// Anything that can produce layout-tagged raw rows for a target
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch_rows(&self, target: &FetchTarget) -> Result<Vec<RawRow>, FetchError>;

    /// Get source name for logging
    fn source_name(&self) -> &'static str;
}
