//! Metadata provider contract.
//!
//! Every metadata source (TMDb, Douban, Wikipedia, ...) implements
//! [`MetadataProvider`]. The orchestrator only talks to sources through this
//! trait, so adding a source never touches the fallback logic.

pub mod tmdb;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::media::{RequestError, SearchRequest, SearchResult};

/// Metadata data source identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataSource {
    Tmdb,
    Douban,
    Wikipedia,
}

impl MetadataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataSource::Tmdb => "TMDb",
            MetadataSource::Douban => "Douban",
            MetadataSource::Wikipedia => "Wikipedia",
        }
    }
}

impl std::fmt::Display for MetadataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetadataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tmdb" => Ok(MetadataSource::Tmdb),
            "douban" => Ok(MetadataSource::Douban),
            "wikipedia" | "wiki" => Ok(MetadataSource::Wikipedia),
            other => Err(format!("unknown metadata source: {}", other)),
        }
    }
}

/// Current health of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Available,
    Unavailable,
    RateLimited,
}

/// Kind of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed request; retrying is pointless.
    InvalidRequest,
    /// Provider disabled or its dependency is down.
    Unavailable,
    RateLimited,
    Timeout,
    /// Rejected by the circuit breaker, the provider was never called.
    CircuitOpen,
    /// The caller cancelled the search while the provider was running.
    Cancelled,
    /// Any other upstream failure (bad status, undecodable payload).
    ApiError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::Timeout => "timeout",
            ErrorCode::CircuitOpen => "circuit_open",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::ApiError => "api_error",
        }
    }

    /// Whether repeating the same request later could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorCode::InvalidRequest)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed error returned by providers.
#[derive(Error, Debug)]
#[error("{provider} ({metadata_source}) {code}: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub metadata_source: MetadataSource,
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        metadata_source: MetadataSource,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            metadata_source,
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach the underlying error.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn invalid_request(
        provider: impl Into<String>,
        metadata_source: MetadataSource,
        err: RequestError,
    ) -> Self {
        Self::new(provider, metadata_source, ErrorCode::InvalidRequest, err.to_string())
            .with_cause(err)
    }

    pub fn unavailable(provider: impl Into<String>, metadata_source: MetadataSource) -> Self {
        Self::new(
            provider,
            metadata_source,
            ErrorCode::Unavailable,
            "provider is not available",
        )
    }

    pub fn circuit_open(provider: impl Into<String>, metadata_source: MetadataSource) -> Self {
        Self::new(
            provider,
            metadata_source,
            ErrorCode::CircuitOpen,
            "circuit breaker is open",
        )
    }

    pub fn cancelled(provider: impl Into<String>, metadata_source: MetadataSource) -> Self {
        Self::new(
            provider,
            metadata_source,
            ErrorCode::Cancelled,
            "search cancelled by caller",
        )
    }

    pub fn is_circuit_open(&self) -> bool {
        self.code == ErrorCode::CircuitOpen
    }

    pub fn is_rate_limited(&self) -> bool {
        self.code == ErrorCode::RateLimited
    }
}

/// Capability set every metadata source exposes.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Provider name, also the key of its circuit breaker.
    fn name(&self) -> &str;

    fn source(&self) -> MetadataSource;

    /// Search the source.
    ///
    /// Implementations validate `request` themselves and report failures as
    /// [`ProviderError`]. An empty result without error means "no match".
    async fn search(&self, request: &SearchRequest) -> Result<SearchResult, ProviderError>;

    fn is_available(&self) -> bool;

    fn status(&self) -> ProviderStatus {
        if self.is_available() {
            ProviderStatus::Available
        } else {
            ProviderStatus::Unavailable
        }
    }
}

/// Validate a request on behalf of `provider`.
pub fn validate_request<P>(provider: &P, request: &SearchRequest) -> Result<SearchRequest, ProviderError>
where
    P: MetadataProvider + ?Sized,
{
    let mut normalized = request.clone();
    normalized
        .validate()
        .map_err(|e| ProviderError::invalid_request(provider.name(), provider.source(), e))?;
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_kind() {
        let err = ProviderError::new("TMDb", MetadataSource::Tmdb, ErrorCode::RateLimited, "slow down");
        assert_eq!(err.to_string(), "TMDb (TMDb) rate_limited: slow down");
        assert!(err.is_rate_limited());
        assert!(!err.is_circuit_open());
    }

    #[test]
    fn test_invalid_request_keeps_cause() {
        use std::error::Error as _;

        let err = ProviderError::invalid_request("Douban", MetadataSource::Douban, RequestError::EmptyQuery);
        assert_eq!(err.code, ErrorCode::InvalidRequest);
        assert!(!err.code.is_retryable());
        assert!(err.source().is_some());
    }

    #[test]
    fn test_source_parse() {
        assert_eq!("tmdb".parse::<MetadataSource>().unwrap(), MetadataSource::Tmdb);
        assert_eq!("Wiki".parse::<MetadataSource>().unwrap(), MetadataSource::Wikipedia);
        assert!("imdb".parse::<MetadataSource>().is_err());
    }
}
