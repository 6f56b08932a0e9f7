//! Ollama preflight check.

use super::CheckResult;
use crate::models::config::Config;
use crate::services::ollama::OllamaClient;

/// Check that Ollama answers and has the configured model.
pub async fn check(config: &Config) -> CheckResult {
    let client = OllamaClient::new(config.ollama_client_config());

    match client.has_model().await {
        Ok(true) => CheckResult::ok("Ollama", &format!("running (model: {})", client.model())),
        Ok(false) => CheckResult::fail(
            "Ollama",
            &format!("model {} not installed", client.model()),
            &format!("Pull the model: ollama pull {}", client.model()),
        ),
        Err(e) => {
            tracing::debug!("Ollama check failed: {}", e);
            CheckResult::fail(
                "Ollama",
                &format!("not reachable at {}", client.base_url()),
                "Start Ollama: ollama serve, or disable resolver.enable_ai_keywords",
            )
        }
    }
}
