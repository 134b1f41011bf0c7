//! Optional end-to-end bound on one logical call.
//!
//! Per-attempt read timeouts bound each round trip; a [`Deadline`] bounds the whole call,
//! every attempt and backoff wait included. Dropping the inner future on expiry cancels any
//! in-flight attempt and releases its pool lease.

use crate::call::CallKind;
use crate::error::CallError;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline {
    limit: Option<Duration>,
}

impl Deadline {
    /// No outer bound; worst case is per-attempt timeouts plus backoff.
    pub fn none() -> Self {
        Self { limit: None }
    }

    /// Bound every call by `limit`. A zero limit is treated as unbounded.
    pub fn after(limit: Duration) -> Self {
        Self { limit: Some(limit).filter(|d| !d.is_zero()) }
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    pub async fn run<T, Fut>(&self, kind: CallKind, call: Fut) -> Result<T, CallError>
    where
        Fut: Future<Output = Result<T, CallError>>,
    {
        let Some(deadline) = self.limit else {
            return call.await;
        };
        match tokio::time::timeout(deadline, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(kind = kind.name(), deadline_ms = deadline.as_millis() as u64, "call deadline exceeded");
                Err(CallError::DeadlineExceeded { kind, deadline })
            }
        }
    }
}

impl From<Option<Duration>> for Deadline {
    fn from(limit: Option<Duration>) -> Self {
        limit.map(Deadline::after).unwrap_or_default()
    }
}
