//! Retry and circuit breaking around a flaky instruction backend.
//!
//! Retryable failures are retried on a capped exponential schedule with
//! jitter, or after the backend's own `Retry-After` hint. Every call that
//! ends in failure counts toward the breaker; once `failure_threshold`
//! consecutive calls fail the breaker opens and calls are refused with
//! [`BackendError::Unavailable`] until the cooldown has passed. The first
//! call after the cooldown is a trial: success closes the breaker, failure
//! reopens it, and other callers are refused while it is in flight. A call
//! whose future is dropped before it finishes, such as one cancelled by a
//! caller's timeout, counts as a failure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tokio::time::Instant;
use tracing::{info, warn};

use vanet_core::backend::{InstructionBackend, InstructionRequest};
use vanet_core::errors::BackendError;
use vanet_settings::BackendSettings;

#[derive(Clone, Debug)]
pub struct ReliableConfig {
    /// Extra attempts after the first, for retryable errors only.
    pub retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Fraction of the delay added or removed at random.
    pub jitter: f64,
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for ReliableConfig {
    fn default() -> Self {
        Self {
            retries: 2,
            backoff_base: Duration::from_millis(200),
            backoff_cap: Duration::from_secs(5),
            jitter: 0.2,
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
        }
    }
}

impl From<&BackendSettings> for ReliableConfig {
    fn from(s: &BackendSettings) -> Self {
        Self {
            retries: s.max_retries,
            backoff_base: Duration::from_millis(s.base_delay_ms),
            failure_threshold: s.circuit_breaker_threshold.max(1),
            cooldown: Duration::from_millis(s.circuit_breaker_cooldown_ms),
            ..Self::default()
        }
    }
}

impl ReliableConfig {
    /// Delay before retry number `retry` (zero-based).
    fn backoff(&self, retry: u32) -> Duration {
        let base = self.backoff_base.as_secs_f64() * 2f64.powi(retry.min(30) as i32);
        let capped = base.min(self.backoff_cap.as_secs_f64());
        let spread = capped * self.jitter.clamp(0.0, 1.0);
        let jittered = if spread > 0.0 {
            capped + rand::thread_rng().gen_range(-spread..=spread)
        } else {
            capped
        };
        Duration::from_secs_f64(jittered).max(Duration::from_millis(1))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Breaker {
    Closed { failures: u32 },
    Open { until: Instant },
    HalfOpen,
}

struct CircuitBreaker {
    state: Mutex<Breaker>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(Breaker::Closed { failures: 0 }),
            threshold: threshold.max(1),
            cooldown,
        }
    }

    fn admit(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            Breaker::Open { until } if Instant::now() < until => false,
            Breaker::Open { .. } => {
                *state = Breaker::HalfOpen;
                true
            }
            Breaker::Closed { .. } => true,
            Breaker::HalfOpen => false,
        }
    }

    /// Returns true when this success closed an open breaker.
    fn succeeded(&self) -> bool {
        let mut state = self.state.lock();
        let was_half_open = matches!(*state, Breaker::HalfOpen);
        *state = Breaker::Closed { failures: 0 };
        was_half_open
    }

    /// Returns true when this failure opened the breaker.
    fn failed(&self) -> bool {
        let mut state = self.state.lock();
        let failures = match *state {
            Breaker::Closed { failures } => failures + 1,
            Breaker::HalfOpen => self.threshold,
            Breaker::Open { .. } => return false,
        };
        if failures >= self.threshold {
            *state = Breaker::Open {
                until: Instant::now() + self.cooldown,
            };
            true
        } else {
            *state = Breaker::Closed { failures };
            false
        }
    }

    fn name(&self) -> &'static str {
        match *self.state.lock() {
            Breaker::Closed { .. } => "closed",
            Breaker::Open { .. } => "open",
            Breaker::HalfOpen => "half_open",
        }
    }
}

/// Records a failure on the breaker unless settled before being dropped.
struct Pending<'a> {
    breaker: Option<&'a CircuitBreaker>,
    backend: &'a str,
    cooldown: Duration,
}

impl Pending<'_> {
    fn settle(mut self) {
        self.breaker = None;
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        let Some(breaker) = self.breaker.take() else {
            return;
        };
        if breaker.failed() {
            warn!(
                backend = self.backend,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "circuit opened after cancelled call"
            );
        }
    }
}

/// An [`InstructionBackend`] that retries and circuit-breaks another one.
pub struct ReliableBackend<B> {
    inner: B,
    config: ReliableConfig,
    breaker: CircuitBreaker,
    retries: AtomicU64,
}

impl<B: InstructionBackend> ReliableBackend<B> {
    pub fn new(inner: B, config: ReliableConfig) -> Self {
        let breaker = CircuitBreaker::new(config.failure_threshold, config.cooldown);
        Self {
            inner,
            config,
            breaker,
            retries: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Retries performed over this wrapper's lifetime.
    pub fn total_retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// `closed`, `open` or `half_open`.
    pub fn circuit_state_name(&self) -> &'static str {
        self.breaker.name()
    }

    async fn attempt_all(&self, request: &InstructionRequest) -> Result<String, BackendError> {
        let mut retry = 0;
        loop {
            let err = match self.inner.generate(request).await {
                Ok(text) => return Ok(text),
                Err(e) => e,
            };
            if !err.is_retryable() || retry >= self.config.retries {
                return Err(err);
            }
            let delay = err
                .suggested_delay()
                .unwrap_or_else(|| self.config.backoff(retry));
            retry += 1;
            self.retries.fetch_add(1, Ordering::Relaxed);
            warn!(
                backend = self.inner.name(),
                retry,
                of = self.config.retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "backend call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl<B: InstructionBackend> InstructionBackend for ReliableBackend<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, request: &InstructionRequest) -> Result<String, BackendError> {
        if !self.breaker.admit() {
            return Err(BackendError::Unavailable);
        }
        let pending = Pending {
            breaker: Some(&self.breaker),
            backend: self.inner.name(),
            cooldown: self.config.cooldown,
        };
        let outcome = self.attempt_all(request).await;
        pending.settle();
        match outcome {
            Ok(text) => {
                if self.breaker.succeeded() {
                    info!(backend = self.inner.name(), "backend recovered, circuit closed");
                }
                Ok(text)
            }
            Err(e) => {
                if self.breaker.failed() {
                    warn!(
                        backend = self.inner.name(),
                        cooldown_ms = self.config.cooldown.as_millis() as u64,
                        "circuit opened"
                    );
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockResponse};
    use vanet_core::cluster::{DeliveryMode, EventCluster};
    use vanet_core::ids::MessageId;
    use vanet_core::message::{EventType, MessageRecord, Priority};

    fn request() -> InstructionRequest {
        let m = MessageRecord::new(
            MessageId::from_raw("m1"),
            "t",
            EventType::SlipperyRoad,
            "KM_35",
            Priority::new(3).unwrap(),
        );
        InstructionRequest::new(
            EventCluster::from_members(&[&m], 55.0, DeliveryMode::Visual).unwrap(),
        )
    }

    fn status_500() -> MockResponse {
        MockResponse::Error(BackendError::ServerError {
            status: 500,
            body: "upstream".into(),
        })
    }

    fn quick(retries: u32) -> ReliableConfig {
        ReliableConfig {
            retries,
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(4),
            ..ReliableConfig::default()
        }
    }

    #[tokio::test]
    async fn passes_through_success() {
        let r = ReliableBackend::new(MockBackend::new(vec![MockResponse::text("Slow down.")]), quick(2));
        assert_eq!(r.generate(&request()).await.unwrap(), "Slow down.");
        assert_eq!(r.total_retries(), 0);
        assert_eq!(r.name(), "mock");
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let mock = MockBackend::new(vec![
            status_500(),
            MockResponse::Error(BackendError::NetworkError("connection reset".into())),
            MockResponse::text("Reduce speed."),
        ]);
        let r = ReliableBackend::new(mock, quick(3));
        assert_eq!(r.generate(&request()).await.unwrap(), "Reduce speed.");
        assert_eq!(r.total_retries(), 2);
    }

    #[tokio::test]
    async fn retries_stop_at_limit() {
        let r = ReliableBackend::new(MockBackend::always(status_500()), quick(3));
        assert!(matches!(
            r.generate(&request()).await,
            Err(BackendError::ServerError { status: 500, .. })
        ));
        assert_eq!(r.total_retries(), 3);
    }

    #[tokio::test]
    async fn auth_and_timeout_errors_fail_fast() {
        for err in [
            BackendError::AuthenticationFailed("bad key".into()),
            BackendError::Timeout(Duration::from_secs(2)),
        ] {
            let mock = MockBackend::new(vec![MockResponse::Error(err), MockResponse::text("late")]);
            let r = ReliableBackend::new(mock, quick(3));
            assert!(r.generate(&request()).await.is_err());
            assert_eq!(r.total_retries(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_hint_overrides_backoff() {
        let mock = MockBackend::new(vec![
            MockResponse::Error(BackendError::RateLimited {
                retry_after: Some(Duration::from_secs(3)),
            }),
            MockResponse::text("ok"),
        ]);
        let r = ReliableBackend::new(mock, quick(1));
        let start = Instant::now();
        assert_eq!(r.generate(&request()).await.unwrap(), "ok");
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opens_then_retries_after_cooldown() {
        let mock = MockBackend::new(vec![
            status_500(),
            status_500(),
            MockResponse::text("Proceed with caution."),
        ]);
        let r = ReliableBackend::new(
            mock,
            ReliableConfig {
                failure_threshold: 2,
                cooldown: Duration::from_secs(10),
                ..quick(0)
            },
        );

        assert!(r.generate(&request()).await.is_err());
        assert_eq!(r.circuit_state_name(), "closed");
        assert!(r.generate(&request()).await.is_err());
        assert_eq!(r.circuit_state_name(), "open");
        assert!(matches!(r.generate(&request()).await, Err(BackendError::Unavailable)));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(r.generate(&request()).await.unwrap(), "Proceed with caution.");
        assert_eq!(r.circuit_state_name(), "closed");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens_immediately() {
        let r = ReliableBackend::new(
            MockBackend::always(status_500()),
            ReliableConfig {
                failure_threshold: 3,
                cooldown: Duration::from_secs(5),
                ..quick(0)
            },
        );
        for _ in 0..3 {
            let _ = r.generate(&request()).await;
        }
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(matches!(
            r.generate(&request()).await,
            Err(BackendError::ServerError { .. })
        ));
        assert_eq!(r.circuit_state_name(), "open");
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_a_single_call() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(5));
        assert!(breaker.failed());
        assert!(!breaker.admit());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(breaker.admit());
        assert_eq!(breaker.name(), "half_open");
        assert!(!breaker.admit());
        assert!(!breaker.admit());

        assert!(breaker.succeeded());
        assert!(breaker.admit());
        assert_eq!(breaker.name(), "closed");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_calls_count_as_failures() {
        let r = ReliableBackend::new(
            MockBackend::always(MockResponse::delayed(
                Duration::from_secs(60),
                MockResponse::text("never"),
            )),
            ReliableConfig {
                failure_threshold: 2,
                cooldown: Duration::from_secs(30),
                ..quick(0)
            },
        );
        let req = request();
        for _ in 0..2 {
            let cut = tokio::time::timeout(Duration::from_millis(500), r.generate(&req)).await;
            assert!(cut.is_err());
        }
        assert_eq!(r.circuit_state_name(), "open");
        assert!(matches!(r.generate(&req).await, Err(BackendError::Unavailable)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_trial_reopens() {
        let r = ReliableBackend::new(
            MockBackend::always(MockResponse::delayed(
                Duration::from_secs(60),
                MockResponse::text("never"),
            )),
            ReliableConfig {
                failure_threshold: 1,
                cooldown: Duration::from_secs(5),
                ..quick(0)
            },
        );
        let req = request();
        let _ = tokio::time::timeout(Duration::from_millis(100), r.generate(&req)).await;
        tokio::time::advance(Duration::from_secs(6)).await;
        let _ = tokio::time::timeout(Duration::from_millis(100), r.generate(&req)).await;
        assert_eq!(r.circuit_state_name(), "open");
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let config = ReliableConfig {
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_millis(500),
            jitter: 0.0,
            ..ReliableConfig::default()
        };
        let ms: Vec<u128> = (0..5).map(|n| config.backoff(n).as_millis()).collect();
        assert_eq!(ms, [100, 200, 400, 500, 500]);
    }

    #[test]
    fn backoff_jitter_stays_in_band() {
        let config = ReliableConfig {
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(5),
            jitter: 0.2,
            ..ReliableConfig::default()
        };
        for _ in 0..50 {
            let ms = config.backoff(8).as_millis();
            assert!((4000..=6000).contains(&ms), "{ms}");
        }
    }

    #[test]
    fn config_from_settings_clamps_threshold() {
        let settings = BackendSettings {
            max_retries: 4,
            base_delay_ms: 50,
            circuit_breaker_threshold: 0,
            circuit_breaker_cooldown_ms: 1000,
            ..Default::default()
        };
        let config = ReliableConfig::from(&settings);
        assert_eq!(config.retries, 4);
        assert_eq!(config.backoff_base, Duration::from_millis(50));
        assert_eq!(config.failure_threshold, 1);
        assert_eq!(config.cooldown, Duration::from_secs(1));
    }
}
