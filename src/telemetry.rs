//! Structured invocation telemetry.
//!
//! The retry loop emits one [`InvocationEvent`] per attempt, one per backoff wait and one when
//! attempts run out. Events flow into an [`EventSink`]:
//!
//! - [`LogSink`] logs each event through `tracing` (the default).
//! - [`MemorySink`] keeps a bounded in-memory history, evicting the oldest events.
//! - [`NullSink`] discards everything.
//!
//! ```rust
//! use analysis_relay::telemetry::{AttemptOutcome, EventSink, InvocationEvent, MemorySink};
//! use analysis_relay::CallKind;
//! use std::time::Duration;
//!
//! let sink = MemorySink::with_capacity(16);
//! sink.record(InvocationEvent::Attempt {
//!     kind: CallKind::HealthCheck,
//!     attempt: 1,
//!     delay_before: Duration::ZERO,
//!     outcome: AttemptOutcome::Success,
//!     elapsed: Duration::from_millis(3),
//! });
//! assert_eq!(sink.len(), 1);
//! ```

use crate::call::CallKind;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Retryable,
    Fatal,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success => write!(f, "success"),
            AttemptOutcome::Retryable => write!(f, "retryable"),
            AttemptOutcome::Fatal => write!(f, "fatal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationEvent {
    /// One attempt finished. `attempt` is 1-based.
    Attempt {
        kind: CallKind,
        attempt: usize,
        delay_before: Duration,
        outcome: AttemptOutcome,
        elapsed: Duration,
    },
    /// About to wait `delay` after `attempt` failed.
    Backoff { kind: CallKind, attempt: usize, delay: Duration },
    /// Every attempt failed with a retryable error.
    Exhausted { kind: CallKind, attempts: usize, total_duration: Duration },
}

impl InvocationEvent {
    pub fn kind(&self) -> CallKind {
        match self {
            InvocationEvent::Attempt { kind, .. }
            | InvocationEvent::Backoff { kind, .. }
            | InvocationEvent::Exhausted { kind, .. } => *kind,
        }
    }
}

impl fmt::Display for InvocationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationEvent::Attempt { kind, attempt, delay_before, outcome, elapsed } => write!(
                f,
                "{kind} attempt {attempt} {outcome} after {}ms (waited {}ms before)",
                elapsed.as_millis(),
                delay_before.as_millis()
            ),
            InvocationEvent::Backoff { kind, attempt, delay } => {
                write!(f, "{kind} backing off {}ms after attempt {attempt}", delay.as_millis())
            }
            InvocationEvent::Exhausted { kind, attempts, total_duration } => write!(
                f,
                "{kind} exhausted after {attempts} attempts in {}ms",
                total_duration.as_millis()
            ),
        }
    }
}

/// Consumer of invocation events. Must not block.
pub trait EventSink: Send + Sync + fmt::Debug {
    fn record(&self, event: InvocationEvent);
}

/// Discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: InvocationEvent) {}
}

/// Logs events using the `tracing` crate.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, event: InvocationEvent) {
        tracing::info!(event = %event, kind = event.kind().name(), "invocation_event");
    }
}

/// Stores events in memory, evicting the oldest once `capacity` is reached.
///
/// Clones share the same buffer.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<VecDeque<InvocationEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    /// Bounded sink holding at most 10,000 events.
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Snapshot of the stored events, oldest first.
    pub fn events(&self) -> Vec<InvocationEvent> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events dropped to stay within capacity.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<InvocationEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: InvocationEvent) {
        let mut guard = self.lock();
        if guard.len() >= self.capacity {
            guard.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push_back(event);
    }
}
