//! Configuration model.
//!
//! Loaded from `<config dir>/metadata_resolver/config.toml`. Every section
//! and field is optional; environment variables (`TMDB_API_KEY`,
//! `OLLAMA_HOST`, `OLLAMA_MODEL`, `OLLAMA_TIMEOUT`) override file values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::circuit_breaker::CircuitBreakerConfig;
use crate::core::merger::{MergerConfig, DEFAULT_MINIMAL_MISSING_RATIO};
use crate::core::orchestrator::OrchestratorConfig;
use crate::services::ollama;
use crate::services::tmdb;
use crate::{Error, Result};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fallback chain, circuit breaker and merger settings.
    pub resolver: ResolverConfig,
    /// TMDB configuration.
    pub tmdb: TmdbConfig,
    /// Ollama configuration.
    pub ollama: OllamaConfig,
}

/// Resolution engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Pause between provider attempts in milliseconds.
    pub fallback_delay_ms: u64,
    /// Ceiling for the pause, kept below one second.
    pub max_fallback_delay_ms: u64,
    pub enable_circuit_breaker: bool,
    /// Retry with AI keyword suggestions when every provider misses.
    pub enable_ai_keywords: bool,
    pub circuit_breaker: CircuitBreakerSettings,
    /// Share of missing required fields above which a merge is minimal.
    pub minimal_missing_ratio: f64,
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    /// Open-state cool-down in seconds.
    pub timeout_secs: u64,
    pub half_open_max_calls: u32,
}

/// TMDB configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TmdbConfig {
    /// API key or v4 bearer token.
    pub api_key: Option<String>,
    /// Language for responses.
    pub language: String,
    /// Request timeout in seconds.
    pub timeout: u64,
}

/// Ollama configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Ollama base URL.
    pub host: String,
    /// Model to use.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fallback_delay_ms: 100,
            max_fallback_delay_ms: 900,
            enable_circuit_breaker: true,
            enable_ai_keywords: true,
            circuit_breaker: CircuitBreakerSettings::default(),
            minimal_missing_ratio: DEFAULT_MINIMAL_MISSING_RATIO,
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            success_threshold: defaults.success_threshold,
            timeout_secs: defaults.timeout.as_secs(),
            half_open_max_calls: defaults.half_open_max_calls,
        }
    }
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            language: "zh-TW".to_string(),
            timeout: 10,
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "qwen2.5:7b".to_string(),
            timeout: 60,
        }
    }
}

impl Config {
    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("TMDB_API_KEY") {
            if !key.trim().is_empty() {
                self.tmdb.api_key = Some(key);
            }
        }
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            self.ollama.host = host;
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            self.ollama.model = model;
        }
        if let Some(timeout) = std::env::var("OLLAMA_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.ollama.timeout = timeout;
        }
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let breaker = &self.resolver.circuit_breaker;
        if breaker.failure_threshold == 0 {
            return Err(Error::InvalidConfig(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if breaker.success_threshold == 0 {
            return Err(Error::InvalidConfig(
                "circuit_breaker.success_threshold must be at least 1".to_string(),
            ));
        }
        if breaker.half_open_max_calls == 0 {
            return Err(Error::InvalidConfig(
                "circuit_breaker.half_open_max_calls must be at least 1".to_string(),
            ));
        }
        let ratio = self.resolver.minimal_missing_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(Error::InvalidConfig(format!(
                "minimal_missing_ratio must be between 0 and 1, got {}",
                ratio
            )));
        }
        Ok(())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let resolver = &self.resolver;
        OrchestratorConfig {
            fallback_delay: Duration::from_millis(resolver.fallback_delay_ms),
            max_fallback_delay: Duration::from_millis(resolver.max_fallback_delay_ms),
            enable_circuit_breaker: resolver.enable_circuit_breaker,
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: resolver.circuit_breaker.failure_threshold,
                success_threshold: resolver.circuit_breaker.success_threshold,
                timeout: Duration::from_secs(resolver.circuit_breaker.timeout_secs),
                half_open_max_calls: resolver.circuit_breaker.half_open_max_calls,
            },
        }
    }

    pub fn merger_config(&self) -> MergerConfig {
        MergerConfig {
            minimal_missing_ratio: self.resolver.minimal_missing_ratio,
        }
    }

    /// TMDB client settings; fails when no API key is configured.
    pub fn tmdb_client_config(&self) -> Result<tmdb::TmdbConfig> {
        let api_key = self
            .tmdb
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(Error::TmdbApiKeyMissing)?;

        Ok(tmdb::TmdbConfig::new(api_key, &self.tmdb.language)
            .with_timeout(Duration::from_secs(self.tmdb.timeout)))
    }

    pub fn ollama_client_config(&self) -> ollama::OllamaConfig {
        ollama::OllamaConfig {
            base_url: self.ollama.host.trim_end_matches('/').to_string(),
            model: self.ollama.model.clone(),
            timeout_secs: self.ollama.timeout,
        }
    }
}

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("metadata_resolver")
}

/// Load configuration from the default location, falling back to defaults.
pub fn load_config() -> Config {
    let config_path = config_dir().join("config.toml");

    let mut config = if config_path.exists() {
        match load_config_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    "Ignoring invalid config {}: {}",
                    config_path.display(),
                    e
                );
                Config::default()
            }
        }
    } else {
        Config::default()
    };

    config.apply_env();
    config
}

/// Load configuration from an explicit file, with environment overrides.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let mut config = load_config_file(path)?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}
