//! HTTP front door for the analysis service.
//!
//! Requests are validated here, then forwarded through a shared [`ResilientInvoker`], so every
//! route inherits the pool limits, retry policy and deadline configured for the client. Every
//! answer, success or failure, uses the [`envelope::ApiResponse`] shape.

pub mod envelope;
pub mod error;
pub mod routes;
pub mod validation;

use analysis_relay::{ResilientInvoker, StatusReporter, TransportConfig};
use anyhow::Context;
use axum::Router;
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Address used when `GATEWAY_LISTEN` is unset.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8888";

#[derive(Debug, Clone)]
pub struct AppState {
    pub invoker: Arc<ResilientInvoker>,
    pub reporter: StatusReporter,
    /// Address the gateway serves on, when known.
    pub listen: Option<SocketAddr>,
    pub started: DateTime<Utc>,
}

impl AppState {
    pub fn new(invoker: Arc<ResilientInvoker>) -> Self {
        Self { reporter: StatusReporter::new(invoker.clone()), invoker, listen: None, started: Utc::now() }
    }

    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = Some(listen);
        self
    }

    pub fn connect(config: TransportConfig) -> anyhow::Result<Self> {
        let invoker = ResilientInvoker::connect(Arc::new(config)).context("building analysis client")?;
        Ok(Self::new(Arc::new(invoker)))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::analysis_routes())
        .merge(routes::system_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen: SocketAddr,
    pub transport: TransportConfig,
}

impl GatewayConfig {
    /// `GATEWAY_LISTEN` plus the `ANALYSIS_SERVICE_*` client settings.
    pub fn from_env() -> anyhow::Result<Self> {
        let listen = std::env::var("GATEWAY_LISTEN").unwrap_or_else(|_| DEFAULT_LISTEN.to_string());
        let listen = listen.parse().with_context(|| format!("GATEWAY_LISTEN={listen} is not a socket address"))?;
        let transport = TransportConfig::from_env().context("loading analysis service settings")?;
        Ok(Self { listen, transport })
    }
}

/// Serve until `shutdown` resolves.
pub async fn run<F>(config: GatewayConfig, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let base_url = config.transport.base_url().to_string();
    let state = AppState::connect(config.transport)?.with_listen(config.listen);
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    tracing::info!(listen = %config.listen, upstream = %base_url, "gateway listening");

    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await?;
    tracing::info!("gateway stopped");
    Ok(())
}
