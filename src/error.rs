//! Error types for the metadata resolver.

use thiserror::Error;

use crate::providers::ProviderError;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the metadata resolver.
#[derive(Error, Debug)]
pub enum Error {
    // Credential errors
    #[error("TMDB API key not configured. Set TMDB_API_KEY environment variable")]
    TmdbApiKeyMissing,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Keyword generation errors
    #[error("AI keyword generation failed: {0}")]
    KeywordGeneration(String),

    // Provider errors
    #[error(transparent)]
    Provider(#[from] ProviderError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

