//! # Provider Gateway
//!
//! Decorator around the [`ProviderClient`] capability adding bounded retry
//! with exponential backoff and a failure-ratio circuit breaker.
//!
//! ## Circuit States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   CLOSED ──(failure ratio over window ≥ threshold)──► OPEN             │
//! │     ▲                                                   │              │
//! │     │                                          (cooldown elapsed)      │
//! │     │                                                   ▼              │
//! │     └──(probe quota succeeds)── HALF-OPEN ──(any probe fails)─► OPEN   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Open circuits fail fast with [`ProviderError::CircuitOpen`] so sweeps
//! and webhook processing do not pile up behind a dead provider.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use async_trait::async_trait;

use crate::provider::{ChangePage, ProviderClient, ProviderError, ProviderSubscription};

// =============================================================================
// Settings
// =============================================================================

/// Retry configuration for transient provider failures.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Total attempts per call (first try included).
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_interval: Duration,

    /// Backoff multiplier between retries.
    pub multiplier: f64,

    /// Upper bound on the retry delay.
    pub max_interval: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: 3,
            initial_interval: Duration::from_millis(1000),
            multiplier: 2.0,
            max_interval: Duration::from_millis(10_000),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerSettings {
    /// Sliding window of call outcomes evaluated for the failure ratio.
    pub window_size: usize,

    /// Minimum calls in the window before the ratio is evaluated.
    pub min_calls: usize,

    /// Failure ratio at which the circuit opens (0.0..=1.0).
    pub failure_rate_threshold: f64,

    /// How long an open circuit rejects calls before probing.
    pub open_cooldown: Duration,

    /// Consecutive successful probes required to close from half-open.
    pub half_open_probes: usize,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        CircuitBreakerSettings {
            window_size: 10,
            min_calls: 5,
            failure_rate_threshold: 0.5,
            open_cooldown: Duration::from_secs(30),
            half_open_probes: 3,
        }
    }
}

// =============================================================================
// Circuit Breaker
// =============================================================================

/// Externally observable circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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

#[derive(Debug)]
enum BreakerState {
    Closed,
    Open { until: Instant },
    HalfOpen { successes: usize },
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    /// Recent call outcomes; `true` marks a failure.
    window: VecDeque<bool>,
}

/// Failure-ratio circuit breaker shared by all gateway calls.
#[derive(Debug)]
struct CircuitBreaker {
    settings: CircuitBreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    fn new(settings: CircuitBreakerSettings) -> Self {
        CircuitBreaker {
            settings,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                window: VecDeque::new(),
            }),
        }
    }

    /// Whether a call may proceed right now. An elapsed cooldown flips
    /// Open to HalfOpen as a side effect.
    fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen { .. } => true,
            BreakerState::Open { until } => {
                if Instant::now() >= until {
                    debug!("Circuit cooldown elapsed, probing half-open");
                    inner.state = BreakerState::HalfOpen { successes: 0 };
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => {
                Self::push_outcome(&mut inner, self.settings.window_size, false);
            }
            BreakerState::HalfOpen { successes } => {
                let successes = successes + 1;
                if successes >= self.settings.half_open_probes {
                    debug!("Circuit probes succeeded, closing");
                    inner.state = BreakerState::Closed;
                    inner.window.clear();
                } else {
                    inner.state = BreakerState::HalfOpen { successes };
                }
            }
            BreakerState::Open { .. } => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => {
                Self::push_outcome(&mut inner, self.settings.window_size, true);

                let calls = inner.window.len();
                if calls >= self.settings.min_calls {
                    let failures = inner.window.iter().filter(|failed| **failed).count();
                    let rate = failures as f64 / calls as f64;
                    if rate >= self.settings.failure_rate_threshold {
                        warn!(
                            failure_rate = rate,
                            calls, "Provider failure rate over threshold, opening circuit"
                        );
                        inner.state = BreakerState::Open {
                            until: Instant::now() + self.settings.open_cooldown,
                        };
                        inner.window.clear();
                    }
                }
            }
            BreakerState::HalfOpen { .. } => {
                warn!("Probe failed, re-opening circuit");
                inner.state = BreakerState::Open {
                    until: Instant::now() + self.settings.open_cooldown,
                };
            }
            BreakerState::Open { .. } => {}
        }
    }

    fn push_outcome(inner: &mut BreakerInner, window_size: usize, failed: bool) {
        inner.window.push_back(failed);
        while inner.window.len() > window_size {
            inner.window.pop_front();
        }
    }

    fn state(&self) -> CircuitState {
        match self.inner.lock().unwrap().state {
            BreakerState::Closed => CircuitState::Closed,
            BreakerState::Open { .. } => CircuitState::Open,
            BreakerState::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

// =============================================================================
// Provider Gateway
// =============================================================================

/// Retrying, circuit-guarded view of a [`ProviderClient`].
///
/// Implements `ProviderClient` itself, so the rest of the engine does not
/// know whether it is talking to a raw adapter or the guarded one.
#[derive(Clone)]
pub struct ProviderGateway {
    inner: Arc<dyn ProviderClient>,
    retry: RetrySettings,
    breaker: Arc<CircuitBreaker>,
}

impl ProviderGateway {
    /// Wraps a provider client with the given retry and breaker settings.
    pub fn new(
        inner: Arc<dyn ProviderClient>,
        retry: RetrySettings,
        breaker: CircuitBreakerSettings,
    ) -> Self {
        ProviderGateway {
            inner,
            retry,
            breaker: Arc::new(CircuitBreaker::new(breaker)),
        }
    }

    /// Wraps a provider client with default settings.
    pub fn with_defaults(inner: Arc<dyn ProviderClient>) -> Self {
        ProviderGateway::new(
            inner,
            RetrySettings::default(),
            CircuitBreakerSettings::default(),
        )
    }

    /// Current circuit state, for diagnostics.
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Runs one provider operation through the breaker and retry loop.
    async fn call<T, F, Fut>(&self, op: &'static str, mut attempt_fn: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        if !self.breaker.try_acquire() {
            debug!(op, "Circuit open, failing fast");
            return Err(ProviderError::CircuitOpen);
        }

        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.retry.initial_interval)
            .with_multiplier(self.retry.multiplier)
            .with_max_interval(self.retry.max_interval)
            .with_max_elapsed_time(None)
            .build();

        let mut attempt = 1u32;
        loop {
            match attempt_fn().await {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Err(e) => {
                    if e.counts_as_failure() {
                        self.breaker.record_failure();
                    } else {
                        self.breaker.record_success();
                    }

                    if e.is_transient() && attempt < self.retry.max_attempts {
                        let delay = backoff
                            .next_backoff()
                            .unwrap_or(self.retry.max_interval);
                        warn!(
                            op,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Provider call failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl ProviderClient for ProviderGateway {
    async fn create_subscription(
        &self,
        address: &str,
    ) -> Result<ProviderSubscription, ProviderError> {
        self.call("create_subscription", || {
            self.inner.create_subscription(address)
        })
        .await
    }

    async fn renew_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<DateTime<Utc>, ProviderError> {
        self.call("renew_subscription", || {
            self.inner.renew_subscription(subscription_id)
        })
        .await
    }

    async fn delete_subscription(&self, subscription_id: &str) -> Result<(), ProviderError> {
        self.call("delete_subscription", || {
            self.inner.delete_subscription(subscription_id)
        })
        .await
    }

    async fn fetch_initial_page(
        &self,
        address: &str,
        look_back_days: i64,
        page_size: u32,
    ) -> Result<ChangePage, ProviderError> {
        self.call("fetch_initial_page", || {
            self.inner
                .fetch_initial_page(address, look_back_days, page_size)
        })
        .await
    }

    async fn fetch_changes_since(&self, cursor: &str) -> Result<ChangePage, ProviderError> {
        self.call("fetch_changes_since", || {
            self.inner.fetch_changes_since(cursor)
        })
        .await
    }

    async fn fetch_next_page(&self, page_token: &str) -> Result<ChangePage, ProviderError> {
        self.call("fetch_next_page", || self.inner.fetch_next_page(page_token))
            .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProvider;

    fn fast_retry() -> RetrySettings {
        RetrySettings {
            max_attempts: 3,
            initial_interval: Duration::from_millis(1),
            multiplier: 1.0,
            max_interval: Duration::from_millis(2),
        }
    }

    fn tight_breaker() -> CircuitBreakerSettings {
        CircuitBreakerSettings {
            window_size: 4,
            min_calls: 2,
            failure_rate_threshold: 0.5,
            open_cooldown: Duration::from_millis(20),
            half_open_probes: 2,
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let fake = Arc::new(FakeProvider::new());
        fake.queue_delta(Err(ProviderError::Transport("flaky".into())));
        fake.queue_delta(Ok(ChangePage::terminal(vec![], "cursor-2")));

        let gateway = ProviderGateway::new(
            fake.clone(),
            fast_retry(),
            CircuitBreakerSettings::default(),
        );

        let page = gateway.fetch_changes_since("cursor-1").await.unwrap();
        assert_eq!(
            page.continuation,
            crate::provider::Continuation::ResumeCursor("cursor-2".into())
        );
        assert_eq!(fake.calls_for("fetch_changes_since"), 2);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let fake = Arc::new(FakeProvider::new());
        fake.queue_renew(Err(ProviderError::NotFound("sub-1".into())));

        let gateway = ProviderGateway::new(
            fake.clone(),
            fast_retry(),
            CircuitBreakerSettings::default(),
        );

        let err = gateway.renew_subscription("sub-1").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
        assert_eq!(fake.calls_for("renew_subscription"), 1);
        assert_eq!(gateway.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn sustained_failures_open_the_circuit() {
        let fake = Arc::new(FakeProvider::new());
        for _ in 0..6 {
            fake.queue_delta(Err(ProviderError::Transport("down".into())));
        }

        let gateway = ProviderGateway::new(fake.clone(), fast_retry(), tight_breaker());

        let _ = gateway.fetch_changes_since("cursor").await;
        assert_eq!(gateway.circuit_state(), CircuitState::Open);

        // Fail-fast path: the inner client is not called again.
        let calls_before = fake.calls_for("fetch_changes_since");
        let err = gateway.fetch_changes_since("cursor").await.unwrap_err();
        assert!(matches!(err, ProviderError::CircuitOpen));
        assert_eq!(fake.calls_for("fetch_changes_since"), calls_before);
    }

    #[tokio::test]
    async fn circuit_recovers_through_half_open_probes() {
        let fake = Arc::new(FakeProvider::new());
        for _ in 0..3 {
            fake.queue_delta(Err(ProviderError::Transport("down".into())));
        }

        let settings = tight_breaker();
        let gateway = ProviderGateway::new(fake.clone(), fast_retry(), settings.clone());

        let _ = gateway.fetch_changes_since("cursor").await;
        assert_eq!(gateway.circuit_state(), CircuitState::Open);

        tokio::time::sleep(settings.open_cooldown + Duration::from_millis(5)).await;

        // Probes succeed (empty queue defaults to Ok) until the quota
        // closes the circuit again.
        for _ in 0..settings.half_open_probes {
            gateway.fetch_changes_since("cursor").await.unwrap();
        }
        assert_eq!(gateway.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn failed_probe_reopens_the_circuit() {
        let fake = Arc::new(FakeProvider::new());
        for _ in 0..3 {
            fake.queue_delta(Err(ProviderError::Transport("down".into())));
        }

        let settings = tight_breaker();
        let gateway = ProviderGateway::new(
            fake.clone(),
            RetrySettings {
                max_attempts: 1,
                ..fast_retry()
            },
            settings.clone(),
        );

        let _ = gateway.fetch_changes_since("cursor").await;
        let _ = gateway.fetch_changes_since("cursor").await;
        assert_eq!(gateway.circuit_state(), CircuitState::Open);

        tokio::time::sleep(settings.open_cooldown + Duration::from_millis(5)).await;

        fake.queue_delta(Err(ProviderError::Transport("still down".into())));
        let _ = gateway.fetch_changes_since("cursor").await;
        assert_eq!(gateway.circuit_state(), CircuitState::Open);
    }
}
