//! TMDB API preflight check.

use super::CheckResult;
use crate::models::config::Config;
use crate::services::tmdb::TmdbClient;

/// Check if TMDB API is accessible.
pub async fn check(config: &Config) -> CheckResult {
    match config.tmdb_client_config() {
        Ok(client_config) => match TmdbClient::new(client_config).verify_api_key().await {
            Ok(true) => CheckResult::ok("TMDB API", "connected"),
            Ok(false) => CheckResult::fail(
                "TMDB API",
                "invalid API key",
                "Check your TMDB_API_KEY environment variable",
            ),
            Err(_) => CheckResult::fail(
                "TMDB API",
                "connection failed",
                "Check your network connection",
            ),
        },
        Err(_) => CheckResult::fail(
            "TMDB API",
            "API key not configured",
            "Set TMDB_API_KEY or [tmdb].api_key in config.toml",
        ),
    }
}
