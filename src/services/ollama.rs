//! Minimal Ollama client used for keyword generation.
//!
//! Only two endpoints are needed: `/api/tags` to see which models are
//! installed and `/api/generate` for a single non-streaming JSON completion.
//! Settings come from `[ollama]` in the config file (see
//! [`Config::ollama_client_config`](crate::models::config::Config::ollama_client_config)).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Result;

/// Connection settings for one Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Server root without a trailing slash.
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'static str,
    options: SamplingOptions,
}

/// Pinned sampling so the same title always yields the same keywords.
#[derive(Debug, Serialize)]
struct SamplingOptions {
    temperature: f32,
    seed: u32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// HTTP client for an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build Ollama HTTP client with timeout: {}", e);
                reqwest::Client::new()
            });

        Self { config, client }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Names of the models installed on the server.
    pub async fn installed_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.config.base_url);
        let tags: TagsResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Whether the configured model is installed. Errors mean the server
    /// could not be reached.
    pub async fn has_model(&self) -> Result<bool> {
        let installed = self.installed_models().await?;
        Ok(installed.iter().any(|name| model_matches(name, &self.config.model)))
    }

    /// Run one prompt and return the raw JSON text the model produced.
    pub async fn generate_json(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.config.base_url);
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            format: "json",
            options: SamplingOptions::default(),
        };

        let response: GenerateResponse = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.response)
    }
}

/// Ollama lists untagged pulls as `<name>:latest`.
fn model_matches(installed: &str, wanted: &str) -> bool {
    if installed == wanted {
        return true;
    }
    !wanted.contains(':') && installed.strip_suffix(":latest") == Some(wanted)
}
