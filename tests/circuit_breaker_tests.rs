//! Integration tests for the circuit breaker state machine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use metadata_resolver::core::circuit_breaker::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};

fn config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 3,
        success_threshold: 2,
        timeout: Duration::from_millis(50),
        half_open_max_calls: 1,
    }
}

async fn fail(breaker: &CircuitBreaker) -> Result<u32, BreakerError<String>> {
    breaker
        .execute(|| async { Err::<u32, _>("upstream error".to_string()) })
        .await
}

async fn succeed(breaker: &CircuitBreaker) -> Result<u32, BreakerError<String>> {
    breaker.execute(|| async { Ok::<u32, String>(42) }).await
}

async fn open(breaker: &CircuitBreaker) {
    for _ in 0..breaker.config().failure_threshold {
        let _ = fail(breaker).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn test_opens_exactly_at_threshold() {
    let breaker = CircuitBreaker::new("TMDb", config());

    fail(&breaker).await.unwrap_err();
    fail(&breaker).await.unwrap_err();
    assert_eq!(breaker.state(), CircuitState::Closed);

    let err = fail(&breaker).await.unwrap_err();
    assert!(!err.is_open());
    assert_eq!(err.into_inner().as_deref(), Some("upstream error"));
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn test_open_rejects_without_running() {
    let breaker = CircuitBreaker::new("TMDb", config());
    open(&breaker).await;

    let runs = AtomicUsize::new(0);
    let result = breaker
        .execute(|| {
            runs.fetch_add(1, Ordering::SeqCst);
            async { Ok::<u32, String>(1) }
        })
        .await;

    let err = result.unwrap_err();
    assert!(err.is_open());
    assert_eq!(err.to_string(), "circuit breaker 'TMDb' is open");
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(breaker.stats().total_calls, 3);
}

#[tokio::test]
async fn test_half_open_recovers_after_successes() {
    let breaker = CircuitBreaker::new("TMDb", config());
    open(&breaker).await;

    tokio::time::sleep(Duration::from_millis(70)).await;

    assert_eq!(succeed(&breaker).await.unwrap(), 42);
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    succeed(&breaker).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);

    let stats = breaker.stats();
    assert_eq!(stats.consecutive_failures, 0);
    assert_eq!(stats.half_open_calls, 0);
}

#[tokio::test]
async fn test_half_open_failure_reopens() {
    let breaker = CircuitBreaker::new("TMDb", config());
    open(&breaker).await;

    tokio::time::sleep(Duration::from_millis(70)).await;

    succeed(&breaker).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    fail(&breaker).await.unwrap_err();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(breaker.is_rejecting());
    assert!(fail(&breaker).await.unwrap_err().is_open());
}

#[tokio::test]
async fn test_half_open_limits_concurrent_probes() {
    let breaker = Arc::new(CircuitBreaker::new("TMDb", config()));
    open(&breaker).await;

    tokio::time::sleep(Duration::from_millis(70)).await;

    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let probe = {
        let breaker = Arc::clone(&breaker);
        tokio::spawn(async move {
            breaker
                .execute(|| async move {
                    let _ = release_rx.await;
                    Ok::<u32, String>(7)
                })
                .await
        })
    };

    // Let the probe start and take the only slot.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    assert!(breaker.is_rejecting());

    let rejected = succeed(&breaker).await.unwrap_err();
    assert!(rejected.is_open());

    release_tx.send(()).unwrap();
    assert_eq!(probe.await.unwrap().unwrap(), 7);
    assert!(!breaker.is_rejecting());
}

#[tokio::test]
async fn test_cancelled_probe_releases_slot() {
    let breaker = Arc::new(CircuitBreaker::new("TMDb", config()));
    open(&breaker).await;

    tokio::time::sleep(Duration::from_millis(70)).await;

    let probe = {
        let breaker = Arc::clone(&breaker);
        tokio::spawn(async move {
            breaker
                .execute(|| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok::<u32, String>(0)
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(breaker.stats().half_open_calls, 1);

    probe.abort();
    let _ = probe.await;

    assert_eq!(breaker.stats().half_open_calls, 0);
    assert_eq!(succeed(&breaker).await.unwrap(), 42);
}

#[tokio::test]
async fn test_reset_closes_and_clears() {
    let breaker = CircuitBreaker::new("TMDb", config());
    open(&breaker).await;

    breaker.reset();

    let stats = breaker.stats();
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.total_calls, 0);
    assert_eq!(stats.failure_count, 0);
    assert!(stats.last_failure_time.is_none());
    assert_eq!(succeed(&breaker).await.unwrap(), 42);
}

#[tokio::test]
async fn test_stats_reports_config() {
    let breaker = CircuitBreaker::new("Douban", config());
    let stats = breaker.stats();

    assert_eq!(stats.name, "Douban");
    assert_eq!(stats.failure_threshold, 3);
    assert_eq!(stats.success_threshold, 2);
    assert_eq!(stats.timeout_ms, 50);
    assert_eq!(stats.half_open_max_calls, 1);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["state"], "closed");
}

#[tokio::test]
async fn test_state_change_callback_sees_full_cycle() {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let breaker = CircuitBreaker::new("TMDb", config()).with_state_change_callback(Arc::new(
        move |name: &str, from: CircuitState, to: CircuitState| {
            let _ = tx.lock().unwrap().send((name.to_string(), from, to));
        },
    ));

    open(&breaker).await;
    tokio::time::sleep(Duration::from_millis(70)).await;
    succeed(&breaker).await.unwrap();
    succeed(&breaker).await.unwrap();

    let mut changes = Vec::new();
    for _ in 0..3 {
        let (name, from, to) = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("state change delivered");
        assert_eq!(name, "TMDb");
        changes.push((from, to));
    }
    // Delivery runs off the calling task, so order is not guaranteed.
    changes.sort_by_key(|(from, _)| *from as u8);
    assert_eq!(
        changes,
        vec![
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );
}

#[test]
fn test_callback_with_and_without_runtime() {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let breaker = CircuitBreaker::new(
        "TMDb",
        CircuitBreakerConfig {
            failure_threshold: 1,
            ..config()
        },
    )
    .with_state_change_callback(Arc::new(move |_: &str, _: CircuitState, to: CircuitState| {
        let _ = tx.lock().unwrap().send(to);
    }));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    runtime.block_on(async {
        let _ = fail(&breaker).await;
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), CircuitState::Open);
    });
    drop(runtime);

    // No runtime here, delivery falls back to a plain thread.
    breaker.reset();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), CircuitState::Closed);
}

#[tokio::test]
async fn test_uncounted_errors_leave_breaker_closed() {
    let breaker = CircuitBreaker::new("TMDb", config());

    for _ in 0..5 {
        let err = breaker
            .execute_with(
                || async { Err::<u32, _>("bad request".to_string()) },
                |e: &String| !e.starts_with("bad"),
            )
            .await
            .unwrap_err();
        assert!(!err.is_open());
    }

    let stats = breaker.stats();
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.failure_count, 0);
    assert_eq!(stats.consecutive_failures, 0);
    assert_eq!(stats.total_calls, 5);

    // Counted errors still trip it.
    open(&breaker).await;
}

#[tokio::test]
async fn test_uncounted_error_releases_half_open_slot() {
    let breaker = CircuitBreaker::new("TMDb", config());
    open(&breaker).await;

    tokio::time::sleep(Duration::from_millis(70)).await;

    breaker
        .execute_with(|| async { Err::<u32, _>("bad request".to_string()) }, |_| false)
        .await
        .unwrap_err();

    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    assert_eq!(breaker.stats().half_open_calls, 0);
    assert!(!breaker.is_rejecting());
    assert_eq!(succeed(&breaker).await.unwrap(), 42);
}
