//! Retry policy for remote calls.
//!
//! Semantics:
//! - `max_attempts` counts total attempts (initial try + retries).
//! - Only errors with [`CallError::is_retryable`] are retried; everything else returns at once.
//! - After the n-th failed attempt the policy waits `backoff.delay(n)`, jittered, before the
//!   next one. The sleeper controls how that wait happens (tokio timer in production,
//!   `InstantSleeper`/`RecordingSleeper` in tests).
//! - When the last attempt fails with a retryable error the result is
//!   [`CallError::ServiceUnavailable`] carrying the attempt count and the last cause.
//!
//! Invariants:
//! - Attempts never exceed `max_attempts`.
//! - Backoff and jitter are consulted exactly `attempts - 1` times on exhaustion.
//! - Every attempt emits one [`InvocationEvent::Attempt`].
//!
//! ```rust
//! use analysis_relay::{Backoff, CallError, CallKind, InstantSleeper, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .backoff(Backoff::exponential(Duration::from_millis(1000)))
//!     .with_sleeper(InstantSleeper)
//!     .build()
//!     .unwrap();
//! let result: Result<(), CallError> = policy
//!     .execute(CallKind::HealthCheck, |_attempt| async {
//!         Err(CallError::Transport {
//!             kind: CallKind::HealthCheck,
//!             reason: "connection refused".into(),
//!             timeout: false,
//!             connect: true,
//!         })
//!     })
//!     .await;
//! assert!(matches!(result, Err(CallError::ServiceUnavailable { attempts: 3, .. })));
//! # });
//! ```

use crate::backoff::{Backoff, BackoffError};
use crate::call::CallKind;
use crate::config::RetrySettings;
use crate::error::CallError;
use crate::jitter::Jitter;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::telemetry::{AttemptOutcome, EventSink, InvocationEvent, LogSink};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Retry policy combining backoff, jitter, sleeper and event sink.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    sleeper: Arc<dyn Sleeper>,
    events: Arc<dyn EventSink>,
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(usize),
    #[error(transparent)]
    Backoff(#[from] BackoffError),
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Policy described by transport settings, sleeping on the tokio timer and logging events.
    pub fn from_settings(settings: &RetrySettings) -> Result<Self, BuildError> {
        RetryPolicyBuilder::from_settings(settings)?.build()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn jitter(&self) -> Jitter {
        self.jitter
    }

    /// Run `operation` until it succeeds, fails fatally or attempts run out.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn execute<T, Fut, Op>(&self, kind: CallKind, mut operation: Op) -> Result<T, CallError>
    where
        Fut: Future<Output = Result<T, CallError>>,
        Op: FnMut(usize) -> Fut,
    {
        let started = Instant::now();
        let mut delay_before = Duration::ZERO;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let attempt_started = Instant::now();
            let result = operation(attempt).await;
            let elapsed = attempt_started.elapsed();

            let err = match result {
                Ok(value) => {
                    self.record_attempt(kind, attempt, delay_before, AttemptOutcome::Success, elapsed);
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                self.record_attempt(kind, attempt, delay_before, AttemptOutcome::Fatal, elapsed);
                tracing::error!(kind = kind.name(), attempt, error = %err, "call failed, not retrying");
                return Err(err);
            }
            self.record_attempt(kind, attempt, delay_before, AttemptOutcome::Retryable, elapsed);

            if attempt >= self.max_attempts {
                let total_duration = started.elapsed();
                self.events.record(InvocationEvent::Exhausted { kind, attempts: attempt, total_duration });
                tracing::error!(
                    kind = kind.name(),
                    attempts = attempt,
                    total_ms = total_duration.as_millis() as u64,
                    error = %err,
                    "retries exhausted"
                );
                return Err(CallError::ServiceUnavailable { kind, attempts: attempt, last: Box::new(err) });
            }

            let delay = self.jitter.apply(self.backoff.delay(attempt));
            tracing::warn!(
                kind = kind.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retryable failure, backing off"
            );
            self.events.record(InvocationEvent::Backoff { kind, attempt, delay });
            self.sleeper.sleep(delay).await;
            delay_before = delay;
        }
    }

    fn record_attempt(
        &self,
        kind: CallKind,
        attempt: usize,
        delay_before: Duration,
        outcome: AttemptOutcome,
        elapsed: Duration,
    ) {
        self.events.record(InvocationEvent::Attempt { kind, attempt, delay_before, outcome, elapsed });
    }
}

/// Builder for [`RetryPolicy`].
pub struct RetryPolicyBuilder {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    sleeper: Arc<dyn Sleeper>,
    events: Arc<dyn EventSink>,
}

impl RetryPolicyBuilder {
    /// Three attempts, doubling from one second, no jitter, tokio timer, log sink.
    pub fn new() -> Self {
        let defaults = RetrySettings::default();
        Self {
            max_attempts: defaults.max_attempts,
            backoff: Backoff::exponential(defaults.initial_delay),
            jitter: defaults.jitter,
            sleeper: Arc::new(TokioSleeper),
            events: Arc::new(LogSink),
        }
    }

    /// Builder seeded from transport settings; sleeper and sink can still be swapped.
    pub fn from_settings(settings: &RetrySettings) -> Result<Self, BackoffError> {
        let backoff = Backoff::exponential(settings.initial_delay)
            .with_multiplier(settings.multiplier)?
            .with_max(settings.max_delay)?;
        Ok(Self::new()
            .max_attempts(settings.max_attempts)
            .backoff(backoff)
            .with_jitter(settings.jitter))
    }

    /// Set total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Send invocation events to `sink` instead of the log.
    pub fn with_events<E>(mut self, sink: E) -> Self
    where
        E: EventSink + 'static,
    {
        self.events = Arc::new(sink);
        self
    }

    pub fn build(self) -> Result<RetryPolicy, BuildError> {
        if self.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            jitter: self.jitter,
            sleeper: self.sleeper,
            events: self.events,
        })
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleeper::{InstantSleeper, RecordingSleeper};
    use crate::telemetry::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KIND: CallKind = CallKind::AnalyzeStock;

    fn refused() -> CallError {
        CallError::Transport { kind: KIND, reason: "connection refused".into(), timeout: false, connect: true }
    }

    fn policy(max_attempts: usize, sleeper: impl Sleeper + 'static) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(max_attempts)
            .backoff(Backoff::exponential(Duration::from_millis(1000)).with_max(Duration::from_secs(30)).unwrap())
            .with_sleeper(sleeper)
            .with_events(crate::telemetry::NullSink)
            .build()
            .expect("builder")
    }

    #[tokio::test]
    async fn success_first_attempt() {
        let counter = Arc::new(AtomicUsize::new(0));
        let result = policy(3, InstantSleeper)
            .execute(KIND, |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CallError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "Should only execute once");
    }

    #[tokio::test]
    async fn success_after_retries() {
        let result = policy(5, InstantSleeper)
            .execute(KIND, |attempt| async move {
                if attempt < 3 {
                    Err(refused())
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3, "Should succeed on 3rd attempt");
    }

    #[tokio::test]
    async fn exhaustion_waits_exponential_delays() {
        let sleeper = RecordingSleeper::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let result = policy(3, sleeper.clone())
            .execute(KIND, |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(refused())
                }
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(1000), Duration::from_millis(2000)]);
        match result.unwrap_err() {
            CallError::ServiceUnavailable { kind, attempts, last } => {
                assert_eq!(kind, KIND);
                assert_eq!(attempts, 3);
                assert_eq!(*last, refused());
            }
            e => panic!("Expected ServiceUnavailable, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let sleeper = RecordingSleeper::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let result = policy(5, sleeper.clone())
            .execute(KIND, |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(CallError::unexpected_status(KIND, 500, "boom"))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().status(), Some(500));
        assert_eq!(counter.load(Ordering::SeqCst), 1, "Should not retry fatal errors");
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn pool_exhaustion_is_retried() {
        let result = policy(2, InstantSleeper)
            .execute(KIND, |attempt| async move {
                if attempt == 1 {
                    Err(CallError::PoolExhausted { kind: KIND, waited: Duration::from_secs(30) })
                } else {
                    Ok(())
                }
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn single_attempt_policy_never_sleeps() {
        let sleeper = RecordingSleeper::new();
        let result = policy(1, sleeper.clone()).execute(KIND, |_| async { Err::<(), _>(refused()) }).await;

        assert!(matches!(result, Err(CallError::ServiceUnavailable { attempts: 1, .. })));
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn jittered_delays_stay_within_backoff() {
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy::builder()
            .max_attempts(4)
            .backoff(Backoff::constant(Duration::from_millis(100)))
            .with_jitter(Jitter::Full)
            .with_sleeper(sleeper.clone())
            .build()
            .unwrap();

        let _ = policy.execute(KIND, |_| async { Err::<(), _>(refused()) }).await;

        assert_eq!(sleeper.delays().len(), 3);
        assert!(sleeper.delays().iter().all(|d| *d <= Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn events_trace_every_attempt() {
        let sink = MemorySink::new();
        let policy = RetryPolicy::builder()
            .max_attempts(3)
            .backoff(Backoff::exponential(Duration::from_millis(1000)))
            .with_sleeper(InstantSleeper)
            .with_events(sink.clone())
            .build()
            .unwrap();

        let _ = policy.execute(KIND, |_| async { Err::<(), _>(refused()) }).await;

        let events = sink.events();
        assert_eq!(events.len(), 6, "3 attempts, 2 backoffs, 1 exhaustion: {events:?}");
        assert!(matches!(
            events[0],
            InvocationEvent::Attempt { attempt: 1, delay_before: Duration::ZERO, outcome: AttemptOutcome::Retryable, .. }
        ));
        assert_eq!(
            events[1],
            InvocationEvent::Backoff { kind: KIND, attempt: 1, delay: Duration::from_millis(1000) }
        );
        match &events[4] {
            InvocationEvent::Attempt { attempt, delay_before, .. } => {
                assert_eq!(*attempt, 3);
                assert_eq!(*delay_before, Duration::from_millis(2000));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(events[5], InvocationEvent::Exhausted { attempts: 3, .. }));
    }

    #[test]
    fn builder_rejects_zero_attempts() {
        let err = RetryPolicy::builder().max_attempts(0).build();
        assert!(matches!(err, Err(BuildError::InvalidMaxAttempts(0))));
    }

    #[test]
    fn from_settings_maps_every_field() {
        let settings = RetrySettings {
            max_attempts: 4,
            initial_delay: Duration::from_millis(200),
            multiplier: 3.0,
            max_delay: Duration::from_millis(1000),
            jitter: Jitter::Equal,
        };
        let policy = RetryPolicy::from_settings(&settings).unwrap();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.jitter(), Jitter::Equal);
        assert_eq!(policy.backoff().delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff().delay(2), Duration::from_millis(600));
        assert_eq!(policy.backoff().delay(3), Duration::from_millis(1000));
    }

    #[test]
    fn from_settings_rejects_inconsistent_backoff() {
        let settings = RetrySettings { multiplier: 0.1, ..RetrySettings::default() };
        assert!(matches!(RetryPolicy::from_settings(&settings), Err(BuildError::Backoff(_))));
    }
}
