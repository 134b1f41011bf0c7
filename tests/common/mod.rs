#![allow(dead_code)]

use analysis_relay::{
    CallError, CallKind, PoolSettings, RetrySettings, TransportConfig, WireRequest, WireResponse,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::util::BoxCloneService;

pub type TestTransport = BoxCloneService<WireRequest, WireResponse, CallError>;

/// Route `tracing` output to the test harness; filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Smallest configuration the validator accepts, pointed at `base_url`.
pub fn minimal_config(base_url: &str) -> TransportConfig {
    TransportConfig::builder(base_url)
        .connect_timeout(Duration::from_millis(1000))
        .read_timeout(Duration::from_millis(1000))
        .retry(RetrySettings::default())
        .pool(PoolSettings {
            max_total: 10,
            max_per_route: 5,
            acquire_timeout: Duration::from_millis(500),
            ..PoolSettings::default()
        })
        .build()
        .expect("valid test config")
}

/// Transport answering each call with `script(attempt)`, plus a counter of calls made.
pub fn scripted<F>(script: F) -> (TestTransport, Arc<AtomicUsize>)
where
    F: Fn(usize) -> Result<WireResponse, CallError> + Send + Sync + 'static,
{
    let calls = Arc::new(AtomicUsize::new(0));
    let script = Arc::new(script);
    let counter = calls.clone();
    let service = tower::service_fn(move |_req: WireRequest| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        let answer = script(attempt);
        async move { answer }
    });
    (BoxCloneService::new(service), calls)
}

pub fn refused(kind: CallKind) -> CallError {
    CallError::Transport {
        kind,
        reason: "tcp connect error: Connection refused (os error 111)".into(),
        timeout: false,
        connect: true,
    }
}

pub fn stock_body() -> String {
    serde_json::json!({
        "stockCode": "600519",
        "stockName": "贵州茅台",
        "currentPrice": 1688.5,
        "changePercent": -0.42,
        "analysisResult": {
            "recommendation": "HOLD",
            "confidence": 0.72,
            "summary": "range-bound",
            "keyFactors": ["volume", "macd"]
        },
        "technicalIndicators": {"rsi": 48.1},
        "predictions": [{"date": "2024-06-03", "predictedPrice": 1690.0}],
        "riskAssessment": {"riskLevel": "MEDIUM", "riskFactors": []}
    })
    .to_string()
}

pub fn sentiment_body() -> String {
    serde_json::json!({
        "overallSentiment": "POSITIVE",
        "sentimentScore": 0.64,
        "confidence": 0.9,
        "sentimentDistribution": {"positiveRate": 0.6, "negativeRate": 0.1, "neutralRate": 0.3}
    })
    .to_string()
}

pub mod stub {
    use axum::Router;

    /// Serve `router` on an ephemeral local port; returns its base URL.
    pub async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("stub server");
        });
        format!("http://{addr}")
    }

    /// A local URL nothing listens on.
    pub async fn unreachable() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind probe");
        let addr = listener.local_addr().expect("probe addr");
        drop(listener);
        format!("http://{addr}")
    }
}
