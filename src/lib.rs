#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # analysis-relay
//!
//! Resilient calls to a remote stock/sentiment analysis service.
//!
//! ## Features
//!
//! - **Connection pool** bounded globally and per route, with leases released on drop and
//!   client generations retired after a time-to-live
//! - **Timeouts** for connecting, for each attempt's round trip and optionally for the whole call
//! - **Retry with exponential backoff** and optional jitter, driven by one error classification
//! - **Health and status reporting** that never caches and never fails
//! - **Structured telemetry** for every attempt, backoff and exhaustion
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use analysis_relay::{ResilientInvoker, StatusReporter, StockAnalysisRequest, TransportConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(TransportConfig::from_env()?);
//!     let invoker = Arc::new(ResilientInvoker::connect(config)?);
//!
//!     let analysis = invoker.analyze_stock(&StockAnalysisRequest::quick("600519")).await?;
//!     println!("{} -> {}", analysis.stock_code, analysis.analysis_result.recommendation);
//!
//!     let status = StatusReporter::new(invoker).status().await;
//!     println!("healthy: {}", status.healthy);
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod call;
pub mod config;
pub mod deadline;
pub mod error;
pub mod invoker;
pub mod jitter;
pub mod model;
pub mod pool;
pub mod retry;
pub mod sleeper;
pub mod status;
pub mod telemetry;
pub mod transport;

// Re-exports
pub use backoff::{Backoff, BackoffError, MAX_BACKOFF};
pub use call::CallKind;
pub use config::{ConfigError, ConfigViolation, PoolSettings, RetrySettings, TransportConfig};
pub use deadline::Deadline;
pub use error::CallError;
pub use invoker::ResilientInvoker;
pub use jitter::Jitter;
pub use model::{
    SentimentAnalysisRequest, SentimentAnalysisResponse, StockAnalysisRequest, StockAnalysisResponse,
};
pub use pool::{AcquireTimeout, ConnectionPool, Lease, PoolStats};
pub use retry::{BuildError, RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, RecordingSleeper, Sleeper, TokioSleeper};
pub use status::{ServiceStatus, StatusReporter};
pub use telemetry::{AttemptOutcome, EventSink, InvocationEvent, LogSink, MemorySink, NullSink};
pub use transport::{PooledTransport, WireRequest, WireResponse};
