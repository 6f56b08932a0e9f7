//! Search command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::fallback::{FallbackStatus, SourceAttempt};
use crate::core::keywords::AiKeywordGenerator;
use crate::core::merger::{DegradationLevel, Merger, MetadataResult};
use crate::core::orchestrator::{Orchestrator, SearchOptions};
use crate::models::config::Config;
use crate::models::media::{MediaType, SearchRequest, SearchResult};
use crate::providers::tmdb::TmdbProvider;
use crate::providers::MetadataSource;
use crate::services::ollama::OllamaClient;
use crate::services::tmdb::TmdbClient;
use crate::utils::duration::format_short;

/// Parameters of one search invocation.
#[derive(Debug, Clone)]
pub struct SearchCommand {
    pub query: String,
    pub media_type: MediaType,
    pub year: Option<i32>,
    pub language: Option<String>,
    pub page: u32,
    pub source: Option<MetadataSource>,
    pub use_ai: bool,
    pub format: String,
}

impl SearchCommand {
    fn request(&self, config: &Config) -> SearchRequest {
        let mut request = SearchRequest::new(self.query.clone())
            .with_media_type(self.media_type)
            .with_page(self.page)
            .with_language(
                self.language
                    .clone()
                    .unwrap_or_else(|| config.tmdb.language.clone()),
            );
        if let Some(year) = self.year {
            request = request.with_year(year);
        }
        request
    }
}

/// Build the orchestrator with every configured provider.
pub fn build_orchestrator(config: &Config, use_ai: bool) -> Result<Orchestrator> {
    let mut orchestrator = Orchestrator::new(config.orchestrator_config());

    if use_ai && config.resolver.enable_ai_keywords {
        let client = OllamaClient::new(config.ollama_client_config());
        orchestrator = orchestrator.with_keyword_generator(Arc::new(AiKeywordGenerator::new(client)));
    }

    let tmdb_config = config
        .tmdb_client_config()
        .context("TMDb is the only built-in provider and needs an API key")?;
    orchestrator.register_provider(Arc::new(TmdbProvider::new(TmdbClient::new(tmdb_config))));

    Ok(orchestrator)
}

/// Execute search command.
pub async fn execute_search(config: &Config, command: SearchCommand) -> Result<()> {
    let mut request = command.request(config);
    request.validate().context("Invalid search request")?;

    let orchestrator = build_orchestrator(config, command.use_ai)?;
    let token = cancel_on_ctrl_c();
    let json = command.format == "json";

    if let Some(source) = command.source {
        let result = orchestrator
            .search_source(&request, source, &token)
            .await
            .with_context(|| format!("{} search failed", source))?;

        if json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            match result {
                Some(ref result) if result.has_results() => print_results(result, config),
                _ => println!("{} {}", "No results from".yellow(), source),
            }
        }
        return Ok(());
    }

    let mut options = SearchOptions::new().with_cancellation(token);
    if !json {
        println!("{} {}", "Searching".bold(), request.query.cyan());
        options = options.with_progress(print_attempt);
    }

    let (result, status) = orchestrator.search(&request, options).await;

    if json {
        #[derive(Serialize)]
        struct JsonOutput<'a> {
            result: Option<&'a SearchResult>,
            status: &'a FallbackStatus,
            status_string: String,
        }

        let output = JsonOutput {
            result: result.as_ref(),
            status: &status,
            status_string: status.status_string(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_status(&status);
    match result {
        Some(ref result) => print_results(result, config),
        None if status.cancelled => println!("{}", "Search cancelled.".yellow()),
        None => println!(
            "{}",
            "No source has this title. Try a different spelling or search manually.".yellow()
        ),
    }

    Ok(())
}

/// Cancel the returned token when the user presses Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}

fn print_attempt(attempt: &SourceAttempt) {
    if attempt.success {
        println!("  {} {} ({})", "✓".green(), attempt.source, format_short(attempt.duration));
    } else if attempt.skipped {
        println!(
            "  {} {} skipped: {}",
            "⏭".yellow(),
            attempt.source,
            attempt.skip_reason.as_deref().unwrap_or("unknown")
        );
    } else {
        println!(
            "  {} {} ({}): {}",
            "❌".red(),
            attempt.source,
            format_short(attempt.duration),
            attempt.error_message.as_deref().unwrap_or("no results")
        );
    }
}

fn print_status(status: &FallbackStatus) {
    println!();
    println!("{} {}", "Chain:".bold(), status.status_string());

    if let Some(ref error) = status.request_error {
        println!("{} {}", "Invalid request:".red(), error);
    }
    if let Some(ref error) = status.keyword_error {
        println!("{} {}", "AI keywords unavailable:".yellow(), error);
    }
    for attempt in &status.keyword_attempts {
        let mark = if attempt.success { "✓".green() } else { "❌".red() };
        println!("  {} keyword {}", mark, attempt.keyword.cyan());
    }

    println!("{} {}", "Total:".dimmed(), format_short(status.total_duration));
    println!();
}

fn print_results(result: &SearchResult, config: &Config) {
    println!(
        "{} {} of {} from {} (page {}/{})",
        "Results:".bold(),
        result.items.len(),
        result.total_count,
        result.source,
        result.page,
        result.total_pages.max(1)
    );
    println!("{}", "-".repeat(60));

    for item in &result.items {
        let year = item
            .year
            .map(|y| format!(" ({})", y))
            .unwrap_or_default();
        println!(
            "{}{} {}",
            item.display_title().bold(),
            year,
            format!("[{}:{}]", result.source, item.id).dimmed()
        );
        if let Some(ref original) = item.original_title {
            println!("  {}", original.dimmed());
        }
        if !item.genres.is_empty() {
            println!("  {}", item.genres.join(", "));
        }
    }

    if let Some(top) = result.items.first() {
        let merged = Merger::new(config.merger_config())
            .merge(&[MetadataResult::from_item(result.source, top)]);
        if merged.degradation_level != DegradationLevel::Normal {
            println!();
            println!("{} {}", "Top match incomplete:".yellow(), merged.message);
        }
    }
}
