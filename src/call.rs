//! The outbound calls the invoker knows how to make.

use std::fmt;

/// The kind of remote call being made. Every error and telemetry event names one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    AnalyzeStock,
    AnalyzeSentiment,
    HealthCheck,
}

impl CallKind {
    /// Stable name used in logs, errors and events.
    pub fn name(&self) -> &'static str {
        match self {
            CallKind::AnalyzeStock => "analyzeStock",
            CallKind::AnalyzeSentiment => "analyzeSentiment",
            CallKind::HealthCheck => "healthCheck",
        }
    }

    /// Path on the remote service, appended to the configured base URL.
    pub fn path(&self) -> &'static str {
        match self {
            CallKind::AnalyzeStock => "/api/stock/analyze",
            CallKind::AnalyzeSentiment => "/api/sentiment/analyze",
            CallKind::HealthCheck => "/health",
        }
    }

    pub fn method(&self) -> reqwest::Method {
        match self {
            CallKind::AnalyzeStock | CallKind::AnalyzeSentiment => reqwest::Method::POST,
            CallKind::HealthCheck => reqwest::Method::GET,
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
