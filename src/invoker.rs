//! The resilient invoker: one entry point per remote call kind, with pooling, timeouts, retry
//! and error classification applied uniformly.
//!
//! Data flow for one logical call:
//!
//! ```text
//! serialize request ──► retry loop ──► transport (pool lease + HTTP) ──► decode
//!        │ Encode (fatal)     │ backoff between retryable failures   │ UnexpectedStatus / InvalidBody (fatal)
//!        ▼                    ▼                                       ▼
//!     CallError          ServiceUnavailable                       typed response
//! ```
//!
//! The whole retry loop runs inside the optional call deadline.

use crate::call::CallKind;
use crate::config::{ConfigError, ConfigViolation, TransportConfig};
use crate::deadline::Deadline;
use crate::error::CallError;
use crate::model::{
    SentimentAnalysisRequest, SentimentAnalysisResponse, StockAnalysisRequest, StockAnalysisResponse,
};
use crate::pool::{ConnectionPool, PoolStats};
use crate::retry::RetryPolicy;
use crate::transport::{PooledTransport, WireRequest, WireResponse};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tower::{Service, ServiceExt};

#[derive(Debug, Clone)]
pub struct ResilientInvoker<S = PooledTransport> {
    config: Arc<TransportConfig>,
    transport: S,
    retry: RetryPolicy,
    deadline: Deadline,
    pool: Option<Arc<ConnectionPool>>,
}

impl ResilientInvoker<PooledTransport> {
    /// Build the production invoker: a pooled HTTP transport governed by `config`.
    pub fn connect(config: Arc<TransportConfig>) -> Result<Self, ConfigError> {
        let pool = Arc::new(ConnectionPool::new(&config)?);
        let mut invoker = Self::with_transport(config, PooledTransport::new(pool.clone()))?;
        invoker.pool = Some(pool);
        Ok(invoker)
    }
}

impl<S> ResilientInvoker<S>
where
    S: Service<WireRequest, Response = WireResponse, Error = CallError> + Clone + Send + 'static,
    S::Future: Send,
{
    /// Invoker over any transport service; retry and deadline still come from `config`.
    pub fn with_transport(config: Arc<TransportConfig>, transport: S) -> Result<Self, ConfigError> {
        let retry = RetryPolicy::from_settings(config.retry()).map_err(|e| {
            ConfigError::Invalid(vec![ConfigViolation { field: "retry", message: e.to_string() }])
        })?;
        Ok(Self {
            deadline: Deadline::from(config.call_deadline()),
            config,
            transport,
            retry,
            pool: None,
        })
    }

    /// Replace the retry policy derived from configuration.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Live pool counters, when running over the pooled transport.
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(|pool| pool.stats())
    }

    pub async fn analyze_stock(
        &self,
        request: &StockAnalysisRequest,
    ) -> Result<StockAnalysisResponse, CallError> {
        self.invoke(CallKind::AnalyzeStock, request).await
    }

    pub async fn analyze_sentiment(
        &self,
        request: &SentimentAnalysisRequest,
    ) -> Result<SentimentAnalysisResponse, CallError> {
        self.invoke(CallKind::AnalyzeSentiment, request).await
    }

    /// Serialize `request`, send it as `kind` under the retry policy and decode the answer.
    pub async fn invoke<Req, Resp>(&self, kind: CallKind, request: &Req) -> Result<Resp, CallError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_string(request)
            .map_err(|e| CallError::Encode { kind, reason: e.to_string() })?;
        let wire = self.wire_request(kind, Some(body));
        let started = Instant::now();

        let call = self.retry.execute(kind, |_attempt| {
            let transport = self.transport.clone();
            let wire = wire.clone();
            async move {
                let response = transport.oneshot(wire).await?;
                decode(kind, response)
            }
        });
        let result = self.deadline.run(kind, call).await;

        if result.is_ok() {
            tracing::info!(kind = kind.name(), elapsed_ms = started.elapsed().as_millis() as u64, "call succeeded");
        }
        result
    }

    /// One unretried `GET /health`. Any 2xx counts as reachable.
    pub async fn probe(&self) -> Result<(), CallError> {
        let kind = CallKind::HealthCheck;
        let wire = self.wire_request(kind, None);
        let response = self.transport.clone().oneshot(wire).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(CallError::unexpected_status(kind, response.status, &response.body))
        }
    }

    fn wire_request(&self, kind: CallKind, body: Option<String>) -> WireRequest {
        WireRequest {
            kind,
            url: self.config.endpoint(kind.path()),
            route: self.config.route(),
            body,
            read_timeout: self.config.read_timeout(),
        }
    }
}

fn decode<Resp: DeserializeOwned>(kind: CallKind, response: WireResponse) -> Result<Resp, CallError> {
    if !response.is_success() {
        return Err(CallError::unexpected_status(kind, response.status, &response.body));
    }
    if response.body.trim().is_empty() {
        return Err(CallError::InvalidBody { kind, reason: "empty response body".into() });
    }
    serde_json::from_str(&response.body)
        .map_err(|e| CallError::InvalidBody { kind, reason: e.to_string() })
}
