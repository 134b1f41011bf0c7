//! Health and status reporting for the analysis service.
//!
//! Nothing here is cached: every call probes the service again and reads live pool counters.

use crate::error::CallError;
use crate::invoker::ResilientInvoker;
use crate::pool::PoolStats;
use crate::transport::{PooledTransport, WireRequest, WireResponse};
use serde::Serialize;
use std::sync::Arc;
use tower::Service;

/// Retry settings as reported on the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySnapshot {
    pub max_attempts: usize,
    pub delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: &'static str,
}

/// Pool limits as reported on the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub max_total: usize,
    pub default_max_per_route: usize,
    pub time_to_live_secs: u64,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub base_url: String,
    /// Milliseconds.
    pub connect_timeout: u64,
    /// Milliseconds.
    pub read_timeout: u64,
    pub max_retry_attempts: usize,
    pub retry: RetrySnapshot,
    pub pool: PoolSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_usage: Option<PoolStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_deadline_ms: Option<u64>,
    pub healthy: bool,
}

#[derive(Debug, Clone)]
pub struct StatusReporter<S = PooledTransport> {
    invoker: Arc<ResilientInvoker<S>>,
}

impl<S> StatusReporter<S>
where
    S: Service<WireRequest, Response = WireResponse, Error = CallError> + Clone + Send + 'static,
    S::Future: Send,
{
    pub fn new(invoker: Arc<ResilientInvoker<S>>) -> Self {
        Self { invoker }
    }

    /// `true` when `GET /health` answers 2xx. Never fails; any error is logged and reported as
    /// `false`.
    pub async fn health_check(&self) -> bool {
        match self.invoker.probe().await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, status = err.status(), "analysis service health check failed");
                false
            }
        }
    }

    /// Configuration snapshot plus a fresh health probe.
    pub async fn status(&self) -> ServiceStatus {
        let healthy = self.health_check().await;
        let config = self.invoker.config();
        let retry = config.retry();
        let pool = config.pool();
        ServiceStatus {
            base_url: config.base_url().to_string(),
            connect_timeout: millis(config.connect_timeout()),
            read_timeout: millis(config.read_timeout()),
            max_retry_attempts: retry.max_attempts,
            retry: RetrySnapshot {
                max_attempts: retry.max_attempts,
                delay_ms: millis(retry.initial_delay),
                multiplier: retry.multiplier,
                max_delay_ms: millis(retry.max_delay),
                jitter: retry.jitter.as_str(),
            },
            pool: PoolSnapshot {
                max_total: pool.max_total,
                default_max_per_route: pool.max_per_route,
                time_to_live_secs: pool.time_to_live.as_secs(),
                idle_timeout_secs: pool.idle_timeout.as_secs(),
                acquire_timeout_ms: millis(pool.acquire_timeout),
            },
            pool_usage: self.invoker.pool_stats(),
            call_deadline_ms: config.call_deadline().map(millis),
            healthy,
        }
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}
