//! Fallback-chain orchestrator.
//!
//! Providers are tried one at a time in registration order until one returns
//! results:
//!
//! 1. **Chain**: skip unavailable providers and providers whose circuit is open,
//!    call the rest through their breaker, stop at the first non-empty result.
//! 2. **Keyword retry**: if the chain is exhausted and a keyword generator is
//!    configured, retry the whole chain with each AI-suggested alternative title.
//!
//! Every step honors the caller's [`CancellationToken`], both inside provider
//! calls and while waiting out the delay between attempts.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::circuit_breaker::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
    StateChangeCallback,
};
use crate::core::fallback::{FallbackStatus, KeywordAttempt, SourceAttempt};
use crate::core::keywords::KeywordGenerator;
use crate::models::media::{SearchRequest, SearchResult};
use crate::providers::{
    validate_request, MetadataProvider, MetadataSource, ProviderError, ProviderStatus,
};
use crate::utils::chinese;

/// Default pause between consecutive provider attempts.
pub const DEFAULT_FALLBACK_DELAY: Duration = Duration::from_millis(100);

/// Default ceiling for the pause between attempts.
pub const DEFAULT_MAX_FALLBACK_DELAY: Duration = Duration::from_millis(900);

/// Pauses are always kept strictly below this.
const FALLBACK_DELAY_LIMIT: Duration = Duration::from_secs(1);

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Pause between consecutive provider attempts.
    pub fallback_delay: Duration,
    /// Ceiling applied to `fallback_delay`; values of 1s or more fall back
    /// to [`DEFAULT_MAX_FALLBACK_DELAY`].
    pub max_fallback_delay: Duration,
    pub enable_circuit_breaker: bool,
    /// Applied to every registered provider's private breaker.
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fallback_delay: DEFAULT_FALLBACK_DELAY,
            max_fallback_delay: DEFAULT_MAX_FALLBACK_DELAY,
            enable_circuit_breaker: true,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// The pause actually used between attempts.
    pub fn effective_fallback_delay(&self) -> Duration {
        let cap = if self.max_fallback_delay < FALLBACK_DELAY_LIMIT {
            self.max_fallback_delay
        } else {
            DEFAULT_MAX_FALLBACK_DELAY
        };
        self.fallback_delay.min(cap)
    }
}

/// Callback invoked synchronously after every recorded attempt.
pub type ProgressCallback = Arc<dyn Fn(&SourceAttempt) + Send + Sync>;

/// Per-call options for [`Orchestrator::search`].
#[derive(Clone, Default)]
pub struct SearchOptions {
    cancellation: CancellationToken,
    on_attempt: Option<ProgressCallback>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Builder: attach a per-attempt progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SourceAttempt) + Send + Sync + 'static,
    {
        self.on_attempt = Some(Arc::new(callback));
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    fn report(&self, attempt: &SourceAttempt) {
        if let Some(ref callback) = self.on_attempt {
            callback(attempt);
        }
    }
}

/// Summary of a registered provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub source: MetadataSource,
    pub status: ProviderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_state: Option<CircuitState>,
}

/// A provider paired with its breaker, cloned out of the registry so no lock
/// is held while searching.
#[derive(Clone)]
struct ChainEntry {
    provider: Arc<dyn MetadataProvider>,
    breaker: Option<Arc<CircuitBreaker>>,
}

#[derive(Default)]
struct Registry {
    providers: Vec<Arc<dyn MetadataProvider>>,
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

/// Runs searches across the registered providers.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: RwLock<Registry>,
    keyword_generator: Option<Arc<dyn KeywordGenerator>>,
    on_state_change: Option<StateChangeCallback>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(Registry::default()),
            keyword_generator: None,
            on_state_change: None,
        }
    }

    /// Enable the keyword retry phase.
    pub fn with_keyword_generator(mut self, generator: Arc<dyn KeywordGenerator>) -> Self {
        self.keyword_generator = Some(generator);
        self
    }

    /// Observe breaker state changes of providers registered afterwards.
    pub fn with_state_change_callback(mut self, callback: StateChangeCallback) -> Self {
        self.on_state_change = Some(callback);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Append a provider to the chain.
    ///
    /// Expected at startup. With circuit breaking enabled the provider gets a
    /// breaker keyed by its name; re-registering a name keeps the existing one.
    pub fn register_provider(&self, provider: Arc<dyn MetadataProvider>) {
        let name = provider.name().to_string();
        let mut registry = self.write_registry();

        if self.config.enable_circuit_breaker {
            if registry.breakers.contains_key(&name) {
                tracing::warn!("Provider {} registered twice, sharing its circuit breaker", name);
            } else {
                let mut breaker = CircuitBreaker::new(&name, self.config.circuit_breaker.clone());
                if let Some(ref callback) = self.on_state_change {
                    breaker = breaker.with_state_change_callback(Arc::clone(callback));
                }
                registry.breakers.insert(name.clone(), Arc::new(breaker));
            }
        }

        registry.providers.push(provider);
        tracing::debug!(
            "Registered provider {} (position {})",
            name,
            registry.providers.len()
        );
    }

    /// Registered providers in chain order.
    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.chain()
            .into_iter()
            .map(|entry| ProviderInfo {
                name: entry.provider.name().to_string(),
                source: entry.provider.source(),
                status: entry.provider.status(),
                circuit_state: entry.breaker.as_ref().map(|b| b.state()),
            })
            .collect()
    }

    /// Search the chain, returning the first non-empty result.
    ///
    /// The status is always populated. The result is `None` when every
    /// provider and keyword retry failed, when the run was cancelled
    /// (`status.cancelled`), or when the request itself is invalid
    /// (`status.request_error`, no provider is called).
    pub async fn search(
        &self,
        request: &SearchRequest,
        options: SearchOptions,
    ) -> (Option<SearchResult>, FallbackStatus) {
        let started = Instant::now();
        let mut status = FallbackStatus::new();

        let mut request = request.clone();
        if let Err(e) = request.validate() {
            tracing::warn!("Rejected search for '{}': {}", request.query, e);
            status.request_error = Some(e.to_string());
            return (None, status);
        }
        let request = &request;

        let result = self.run(request, &options, &mut status).await;

        status.total_duration = started.elapsed();
        match result {
            Some(ref found) => tracing::info!(
                "Resolved '{}' via {} in {}ms: {}",
                request.query,
                found.source,
                status.total_duration.as_millis(),
                status
            ),
            None if status.cancelled => {
                tracing::info!("Search for '{}' cancelled: {}", request.query, status)
            }
            None => tracing::warn!("No metadata found for '{}': {}", request.query, status),
        }

        (result, status)
    }

    /// Query exactly one source, bypassing the fallback chain.
    ///
    /// Returns `Ok(None)` when the source is not registered or not available,
    /// and a `circuit_open` error when its breaker rejects the call. An
    /// invalid request fails with `invalid_request` before the provider or
    /// its breaker is touched.
    pub async fn search_source(
        &self,
        request: &SearchRequest,
        source: MetadataSource,
        cancellation: &CancellationToken,
    ) -> Result<Option<SearchResult>, ProviderError> {
        let Some(entry) = self
            .chain()
            .into_iter()
            .find(|entry| entry.provider.source() == source)
        else {
            tracing::debug!("Source {} is not registered", source);
            return Ok(None);
        };

        let request = &validate_request(entry.provider.as_ref(), request)?;

        if !entry.provider.is_available() {
            tracing::debug!("Source {} is not available", source);
            return Ok(None);
        }

        match call_provider(&entry, request, cancellation).await {
            Some(result) => result.map(Some),
            None => Err(ProviderError::cancelled(entry.provider.name(), source)),
        }
    }

    /// Breaker state of a provider, `None` if it has no breaker.
    pub fn circuit_breaker_state(&self, name: &str) -> Option<CircuitState> {
        self.read_registry().breakers.get(name).map(|b| b.state())
    }

    pub fn circuit_breaker_stats(&self, name: &str) -> Option<CircuitBreakerStats> {
        self.read_registry().breakers.get(name).map(|b| b.stats())
    }

    /// Force a provider's breaker closed. Returns whether it existed.
    pub fn reset_circuit_breaker(&self, name: &str) -> bool {
        let breaker = self.read_registry().breakers.get(name).cloned();
        match breaker {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    async fn run(
        &self,
        request: &SearchRequest,
        options: &SearchOptions,
        status: &mut FallbackStatus,
    ) -> Option<SearchResult> {
        let token = options.cancellation();
        let chain = self.chain();
        let delay = self.config.effective_fallback_delay();

        if chain.is_empty() {
            tracing::warn!("No metadata providers registered");
        }

        let mut called_before = false;
        for entry in &chain {
            if token.is_cancelled() {
                status.cancelled = true;
                return None;
            }

            let name = entry.provider.name();

            if !entry.provider.is_available() {
                let reason = match entry.provider.status() {
                    ProviderStatus::RateLimited => "rate limited",
                    _ => "provider unavailable",
                };
                tracing::debug!("Skipping {}: {}", name, reason);
                record(status, options, SourceAttempt::skipped(name, reason));
                continue;
            }

            if entry.breaker.as_ref().is_some_and(|b| b.is_rejecting()) {
                tracing::debug!("Skipping {}: circuit breaker open", name);
                record(status, options, SourceAttempt::skipped(name, "circuit breaker open"));
                continue;
            }

            if called_before && !sleep_or_cancel(delay, token).await {
                status.cancelled = true;
                return None;
            }
            called_before = true;

            let start = Instant::now();
            let outcome = call_provider(entry, request, token).await;
            let elapsed = start.elapsed();

            match outcome {
                None => {
                    tracing::debug!("{} interrupted by cancellation", name);
                    status.cancelled = true;
                    return None;
                }
                Some(Ok(result)) if result.has_results() => {
                    tracing::debug!("{} returned {} items", name, result.items.len());
                    record(status, options, SourceAttempt::succeeded(name, elapsed));
                    return Some(result);
                }
                Some(Ok(_)) => {
                    tracing::debug!("{} returned no results", name);
                    record(status, options, SourceAttempt::failed(name, None, elapsed));
                }
                Some(Err(e)) if e.is_circuit_open() => {
                    tracing::debug!("Skipping {}: circuit breaker open", name);
                    record(status, options, SourceAttempt::skipped(name, "circuit breaker open"));
                }
                Some(Err(e)) => {
                    tracing::warn!("{} search failed: {}", name, e);
                    record(status, options, SourceAttempt::failed(name, Some(e), elapsed));
                }
            }
        }

        match self.keyword_generator {
            Some(ref generator) => {
                self.retry_with_keywords(generator.as_ref(), request, &chain, token, status)
                    .await
            }
            None => None,
        }
    }

    /// Retry the whole chain with AI-suggested alternative titles.
    ///
    /// No per-provider attempts are recorded here; only one
    /// [`KeywordAttempt`] per term tried.
    async fn retry_with_keywords(
        &self,
        generator: &dyn KeywordGenerator,
        request: &SearchRequest,
        chain: &[ChainEntry],
        token: &CancellationToken,
        status: &mut FallbackStatus,
    ) -> Option<SearchResult> {
        if chain.is_empty() {
            return None;
        }

        let generated = tokio::select! {
            biased;
            _ = token.cancelled() => {
                status.cancelled = true;
                return None;
            }
            generated = generator.generate_keywords(&request.query) => generated,
        };

        let variants = match generated {
            Ok(variants) => variants,
            Err(e) => {
                tracing::warn!("Keyword generation failed for '{}': {}", request.query, e);
                status.keyword_error = Some(e.to_string());
                return None;
            }
        };

        let keywords: Vec<String> = variants
            .prioritized_list()
            .into_iter()
            .filter(|k| !chinese::titles_equivalent(k, &request.query))
            .collect();

        if keywords.is_empty() {
            tracing::debug!("No alternative keywords for '{}'", request.query);
            return None;
        }

        tracing::info!(
            "Retrying '{}' with {} alternative keywords",
            request.query,
            keywords.len()
        );

        let delay = self.config.effective_fallback_delay();
        let mut called_before = false;

        for keyword in keywords {
            let retry = request.with_query(keyword.as_str());
            let mut found = None;

            for entry in chain {
                if token.is_cancelled() {
                    status.cancelled = true;
                    return None;
                }
                if !entry.provider.is_available()
                    || entry.breaker.as_ref().is_some_and(|b| b.is_rejecting())
                {
                    continue;
                }

                if called_before && !sleep_or_cancel(delay, token).await {
                    status.cancelled = true;
                    return None;
                }
                called_before = true;

                match call_provider(entry, &retry, token).await {
                    None => {
                        status.cancelled = true;
                        return None;
                    }
                    Some(Ok(result)) if result.has_results() => {
                        found = Some(result);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("{} failed for keyword '{}': {}", entry.provider.name(), keyword, e)
                    }
                }
            }

            status.keyword_attempts.push(KeywordAttempt {
                keyword: keyword.clone(),
                success: found.is_some(),
            });

            if let Some(result) = found {
                tracing::info!("Keyword '{}' matched via {}", keyword, result.source);
                status.successful_keyword = Some(keyword);
                return Some(result);
            }
        }

        None
    }

    fn chain(&self) -> Vec<ChainEntry> {
        let registry = self.read_registry();
        registry
            .providers
            .iter()
            .map(|provider| ChainEntry {
                provider: Arc::clone(provider),
                breaker: registry.breakers.get(provider.name()).cloned(),
            })
            .collect()
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn record(status: &mut FallbackStatus, options: &SearchOptions, attempt: SourceAttempt) {
    options.report(&attempt);
    status.attempts.push(attempt);
}

/// Call one provider through its breaker. `None` means the token fired first.
///
/// Only retryable errors count against the breaker, so a bad request cannot
/// open the circuit of a healthy provider.
async fn call_provider(
    entry: &ChainEntry,
    request: &SearchRequest,
    token: &CancellationToken,
) -> Option<Result<SearchResult, ProviderError>> {
    let provider = entry.provider.as_ref();

    let call = async {
        match entry.breaker {
            Some(ref breaker) => breaker
                .execute_with(
                    || provider.search(request),
                    |e: &ProviderError| e.code.is_retryable(),
                )
                .await
                .map_err(|e| match e {
                    BreakerError::Open { .. } => {
                        ProviderError::circuit_open(provider.name(), provider.source())
                    }
                    BreakerError::Inner(e) => e,
                }),
            None => provider.search(request).await,
        }
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = call => Some(result),
    }
}

/// Wait `delay`, returning `false` if cancelled first.
async fn sleep_or_cancel(delay: Duration, token: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !token.is_cancelled();
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
