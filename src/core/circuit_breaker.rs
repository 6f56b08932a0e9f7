//! Per-provider circuit breaker.
//!
//! State machine:
//!
//! - **Closed**: calls pass through; `failure_threshold` consecutive failures open the circuit.
//! - **Open**: calls are rejected without running; after `timeout` the next call is admitted
//!   and the breaker moves to half-open first.
//! - **HalfOpen**: at most `half_open_max_calls` probes run at once; one failure re-opens,
//!   `success_threshold` consecutive successes close.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed circuit.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,
    /// Cool-down before an open circuit admits a probe.
    pub timeout: Duration,
    /// Concurrent probes allowed while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Callback invoked with `(name, from, to)` after every state change.
pub type StateChangeCallback = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The call was rejected and never ran.
    Open { name: String },
    /// The call ran and failed.
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Open { .. } => None,
            BreakerError::Inner(e) => Some(e),
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerError::Open { name } => write!(f, "circuit breaker '{}' is open", name),
            BreakerError::Inner(e) => e.fmt(f),
        }
    }
}

impl<E> std::error::Error for BreakerError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BreakerError::Open { .. } => None,
            BreakerError::Inner(e) => Some(e),
        }
    }
}

/// Read-only snapshot of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_state_change: DateTime<Utc>,
    pub half_open_calls: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_ms: u64,
    pub half_open_max_calls: u32,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    total_calls: u64,
    success_count: u64,
    failure_count: u64,
    opened_at: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    last_state_change: DateTime<Utc>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            opened_at: None,
            last_failure_time: None,
            last_state_change: Utc::now(),
        }
    }

    /// Move to `to`, returning the transition if the state actually changed.
    fn transition(&mut self, to: CircuitState) -> Option<(CircuitState, CircuitState)> {
        let from = self.state;
        if from == to {
            return None;
        }

        self.state = to;
        self.last_state_change = Utc::now();
        match to {
            CircuitState::Open => {
                self.opened_at = Some(Instant::now());
                self.consecutive_successes = 0;
            }
            CircuitState::HalfOpen => {
                self.consecutive_successes = 0;
            }
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                self.consecutive_successes = 0;
                self.opened_at = None;
            }
        }

        Some((from, to))
    }
}

/// Releases a half-open probe slot when dropped, including when the
/// guarded call is cancelled.
struct ProbeGuard<'a> {
    counter: &'a AtomicU32,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Failure-isolation state machine for one provider.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    half_open_calls: AtomicU32,
    on_state_change: Option<StateChangeCallback>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::new()),
            half_open_calls: AtomicU32::new(0),
            on_state_change: None,
        }
    }

    /// Register a callback fired asynchronously on every state change.
    pub fn with_state_change_callback(mut self, callback: StateChangeCallback) -> Self {
        self.on_state_change = Some(callback);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. An open breaker whose cool-down has elapsed still
    /// reports `Open` until the next call moves it to half-open.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Whether a call made now would be rejected without running.
    pub fn is_rejecting(&self) -> bool {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => !self.cooldown_elapsed(&inner),
            CircuitState::HalfOpen => {
                self.half_open_calls.load(Ordering::Acquire) >= self.config.half_open_max_calls
            }
        }
    }

    /// Run `f` through the breaker.
    ///
    /// The closure is not invoked at all when the call is rejected. No lock
    /// is held while the returned future runs.
    pub async fn execute<T, E, F, Fut>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with(f, |_| true).await
    }

    /// Like [`execute`](Self::execute), but errors for which `is_failure`
    /// returns `false` are passed through without touching the counters.
    pub async fn execute_with<T, E, F, Fut, P>(
        &self,
        f: F,
        is_failure: P,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        let probe = self.admit()?;

        let result = f().await;
        match result {
            Ok(_) => self.record_success(),
            Err(ref e) => {
                if is_failure(e) {
                    self.record_failure();
                } else {
                    tracing::debug!(breaker = %self.name, "Error not counted as a failure");
                }
            }
        }

        drop(probe);
        result.map_err(BreakerError::Inner)
    }

    /// Force the breaker closed and clear all counters and history.
    ///
    /// Probes already in flight keep their slot until they finish.
    pub fn reset(&self) {
        let change = {
            let mut inner = self.lock();
            let from = inner.state;
            *inner = Inner::new();
            (from != CircuitState::Closed).then_some((from, CircuitState::Closed))
        };

        tracing::info!(breaker = %self.name, "Circuit breaker reset");
        if let Some((from, to)) = change {
            self.notify(from, to);
        }
    }

    /// Snapshot of counters, timestamps and thresholds.
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.lock();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            total_calls: inner.total_calls,
            success_count: inner.success_count,
            failure_count: inner.failure_count,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            last_failure_time: inner.last_failure_time,
            last_state_change: inner.last_state_change,
            half_open_calls: self.half_open_calls.load(Ordering::Acquire),
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            timeout_ms: self.config.timeout.as_millis() as u64,
            half_open_max_calls: self.config.half_open_max_calls,
        }
    }

    fn admit<E>(&self) -> Result<Option<ProbeGuard<'_>>, BreakerError<E>> {
        let (admission, change) = {
            let mut inner = self.lock();
            let mut change = None;

            if inner.state == CircuitState::Open {
                if !self.cooldown_elapsed(&inner) {
                    drop(inner);
                    tracing::debug!(breaker = %self.name, "Call rejected, circuit open");
                    return Err(self.open_error());
                }
                change = inner.transition(CircuitState::HalfOpen);
            }

            let admission = match inner.state {
                CircuitState::HalfOpen => self.try_acquire_probe().map(Some),
                _ => Some(None),
            };
            if admission.is_some() {
                inner.total_calls += 1;
            }
            (admission, change)
        };

        if let Some((from, to)) = change {
            self.notify(from, to);
        }

        match admission {
            Some(probe) => Ok(probe),
            None => {
                tracing::debug!(breaker = %self.name, "Call rejected, half-open probe limit reached");
                Err(self.open_error())
            }
        }
    }

    fn try_acquire_probe(&self) -> Option<ProbeGuard<'_>> {
        let max = self.config.half_open_max_calls;
        self.half_open_calls
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            })
            .ok()
            .map(|_| ProbeGuard {
                counter: &self.half_open_calls,
            })
    }

    fn record_success(&self) {
        let change = {
            let mut inner = self.lock();
            inner.success_count += 1;
            let state = inner.state;
            match state {
                CircuitState::Closed => {
                    inner.consecutive_failures = 0;
                    None
                }
                CircuitState::HalfOpen => {
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes += 1;
                    if inner.consecutive_successes >= self.config.success_threshold {
                        inner.transition(CircuitState::Closed)
                    } else {
                        None
                    }
                }
                // A call admitted before the circuit opened.
                CircuitState::Open => None,
            }
        };

        if let Some((from, to)) = change {
            self.notify(from, to);
        }
    }

    fn record_failure(&self) {
        let change = {
            let mut inner = self.lock();
            inner.failure_count += 1;
            inner.last_failure_time = Some(Utc::now());
            inner.consecutive_failures += 1;
            inner.consecutive_successes = 0;
            let state = inner.state;
            match state {
                CircuitState::Closed
                    if inner.consecutive_failures >= self.config.failure_threshold =>
                {
                    inner.transition(CircuitState::Open)
                }
                CircuitState::HalfOpen => inner.transition(CircuitState::Open),
                _ => None,
            }
        };

        if let Some((from, to)) = change {
            if to == CircuitState::Open {
                tracing::warn!(
                    breaker = %self.name,
                    cooldown_secs = self.config.timeout.as_secs_f32(),
                    "Circuit opened"
                );
            }
            self.notify(from, to);
        }
    }

    fn cooldown_elapsed(&self, inner: &Inner) -> bool {
        inner
            .opened_at
            .map(|at| at.elapsed() >= self.config.timeout)
            .unwrap_or(true)
    }

    fn open_error<E>(&self) -> BreakerError<E> {
        BreakerError::Open {
            name: self.name.clone(),
        }
    }

    /// Log the change and hand it to the callback off the calling task.
    fn notify(&self, from: CircuitState, to: CircuitState) {
        tracing::info!(breaker = %self.name, %from, %to, "Circuit breaker state changed");

        let Some(callback) = self.on_state_change.clone() else {
            return;
        };
        let name = self.name.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || callback(&name, from, to));
            }
            Err(_) => {
                std::thread::spawn(move || callback(&name, from, to));
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failure_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            success_threshold: 2,
            timeout: Duration::from_millis(50),
            half_open_max_calls: 1,
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        breaker.execute(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        breaker.execute(|| async { Ok::<(), &'static str>(()) }).await
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let breaker = CircuitBreaker::new("test", config(3));

        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        succeed(&breaker).await.unwrap();
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_is_rejecting_follows_cooldown() {
        let breaker = CircuitBreaker::new("test", config(1));
        fail(&breaker).await.unwrap_err();

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.is_rejecting());

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(!breaker.is_rejecting());
        // Still reported open until the next call arrives.
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_stats_counts_calls() {
        let breaker = CircuitBreaker::new("test", config(5));
        succeed(&breaker).await.unwrap();
        fail(&breaker).await.unwrap_err();

        let stats = breaker.stats();
        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.failure_count, 1);
        assert!(stats.last_failure_time.is_some());
        assert_eq!(stats.failure_threshold, 5);
        assert_eq!(stats.timeout_ms, 50);
    }

    #[test]
    fn test_breaker_error_display() {
        let err: BreakerError<std::io::Error> = BreakerError::Open {
            name: "TMDb".to_string(),
        };
        assert!(err.is_open());
        assert_eq!(err.to_string(), "circuit breaker 'TMDb' is open");
    }
}
