//! One HTTP exchange with the analysis service, as a `tower::Service`.
//!
//! [`PooledTransport`] is the production implementation: it takes a lease from the
//! [`ConnectionPool`], sends the request with the per-attempt read timeout and hands back the
//! raw status and body. It does not interpret either; the invoker does that. Tests substitute
//! any `Service<WireRequest, Response = WireResponse, Error = CallError>`, typically built with
//! `tower::service_fn`.

use crate::call::CallKind;
use crate::error::CallError;
use crate::pool::ConnectionPool;
use futures::future::BoxFuture;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

const APPLICATION_JSON: &str = "application/json";

/// A fully prepared outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub kind: CallKind,
    pub url: String,
    /// Pool route key, `scheme://host:port`.
    pub route: String,
    /// JSON body; `None` for GET.
    pub body: Option<String>,
    /// Upper bound for the whole round trip of this attempt.
    pub read_timeout: Duration,
}

/// Raw answer from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub status: u16,
    pub body: String,
}

impl WireResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct PooledTransport {
    pool: Arc<ConnectionPool>,
}

impl PooledTransport {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }
}

impl Service<WireRequest> for PooledTransport {
    type Response = WireResponse;
    type Error = CallError;
    type Future = BoxFuture<'static, Result<WireResponse, CallError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // capacity is enforced per call by the pool's acquire timeout
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: WireRequest) -> Self::Future {
        let pool = self.pool.clone();
        Box::pin(async move {
            let kind = request.kind;
            let lease = pool
                .acquire(&request.route)
                .await
                .map_err(|e| CallError::PoolExhausted { kind, waited: e.waited })?;

            let mut builder = lease
                .client()
                .request(kind.method(), &request.url)
                .timeout(request.read_timeout)
                .header(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
            if let Some(body) = request.body {
                builder = builder.header(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON)).body(body);
            }

            let response = builder.send().await.map_err(|e| CallError::transport(kind, &e))?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| CallError::transport(kind, &e))?;
            tracing::trace!(kind = kind.name(), status, generation = lease.generation(), "exchange complete");
            Ok(WireResponse { status, body })
        })
    }
}
