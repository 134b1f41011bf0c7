//! Error taxonomy for remote calls.
//!
//! Every [`CallError`] names the [`CallKind`] it came from. [`CallError::is_retryable`] is the
//! only place that decides whether a failure is worth another attempt:
//!
//! | variant              | retryable |
//! |----------------------|-----------|
//! | `Transport`          | yes       |
//! | `PoolExhausted`      | yes       |
//! | `UnexpectedStatus`   | no        |
//! | `InvalidBody`        | no        |
//! | `Encode`             | no        |
//! | `ServiceUnavailable` | no (terminal) |
//! | `DeadlineExceeded`   | no (terminal) |

use crate::call::CallKind;
use std::time::Duration;

/// Longest response body excerpt kept inside [`CallError::UnexpectedStatus`].
pub const BODY_EXCERPT_CHARS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// The service answered with a non-2xx status.
    #[error("{kind}: remote service returned HTTP {status}: {body}")]
    UnexpectedStatus { kind: CallKind, status: u16, body: String },

    /// A 2xx answer whose body was empty or did not match the expected shape.
    #[error("{kind}: invalid response body: {reason}")]
    InvalidBody { kind: CallKind, reason: String },

    /// The outbound request could not be serialized. No network I/O happened.
    #[error("{kind}: failed to encode request: {reason}")]
    Encode { kind: CallKind, reason: String },

    /// Connection refused, DNS failure, socket timeout, broken body stream.
    #[error("{kind}: transport failure{}: {reason}", transport_flavor(.timeout, .connect))]
    Transport { kind: CallKind, reason: String, timeout: bool, connect: bool },

    /// No pooled connection became available in time.
    #[error("{kind}: connection pool exhausted after waiting {}ms", .waited.as_millis())]
    PoolExhausted { kind: CallKind, waited: Duration },

    /// Every attempt failed with a retryable error.
    #[error("{kind}: analysis service unavailable after {attempts} attempts: {last}")]
    ServiceUnavailable { kind: CallKind, attempts: usize, last: Box<CallError> },

    /// The end-to-end call deadline fired.
    #[error("{kind}: call deadline of {}ms exceeded", .deadline.as_millis())]
    DeadlineExceeded { kind: CallKind, deadline: Duration },
}

fn transport_flavor(timeout: &bool, connect: &bool) -> &'static str {
    match (*timeout, *connect) {
        (true, true) => " (connect timeout)",
        (true, false) => " (timeout)",
        (false, true) => " (connect)",
        (false, false) => "",
    }
}

impl CallError {
    pub fn kind(&self) -> CallKind {
        match self {
            CallError::UnexpectedStatus { kind, .. }
            | CallError::InvalidBody { kind, .. }
            | CallError::Encode { kind, .. }
            | CallError::Transport { kind, .. }
            | CallError::PoolExhausted { kind, .. }
            | CallError::ServiceUnavailable { kind, .. }
            | CallError::DeadlineExceeded { kind, .. } => *kind,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CallError::Transport { .. } | CallError::PoolExhausted { .. })
    }

    /// HTTP status of an `UnexpectedStatus` answer.
    pub fn status(&self) -> Option<u16> {
        match self {
            CallError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            CallError::Transport { timeout, .. } => *timeout,
            CallError::DeadlineExceeded { .. } => true,
            CallError::ServiceUnavailable { last, .. } => last.is_timeout(),
            _ => false,
        }
    }

    /// Build a [`CallError::Transport`] from a reqwest failure.
    pub(crate) fn transport(kind: CallKind, err: &reqwest::Error) -> Self {
        CallError::Transport {
            kind,
            reason: error_chain(err),
            timeout: err.is_timeout(),
            connect: err.is_connect(),
        }
    }

    pub(crate) fn unexpected_status(kind: CallKind, status: u16, body: &str) -> Self {
        CallError::UnexpectedStatus { kind, status, body: excerpt(body) }
    }
}

/// First [`BODY_EXCERPT_CHARS`] characters of `body`, respecting char boundaries.
pub(crate) fn excerpt(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(BODY_EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> CallError {
        CallError::Transport {
            kind: CallKind::AnalyzeStock,
            reason: "connection refused".into(),
            timeout: false,
            connect: true,
        }
    }

    #[test]
    fn only_transport_and_pool_are_retryable() {
        assert!(transport().is_retryable());
        assert!(CallError::PoolExhausted {
            kind: CallKind::AnalyzeStock,
            waited: Duration::from_secs(1)
        }
        .is_retryable());

        let fatal = [
            CallError::unexpected_status(CallKind::AnalyzeStock, 500, "boom"),
            CallError::InvalidBody { kind: CallKind::AnalyzeStock, reason: "empty".into() },
            CallError::Encode { kind: CallKind::AnalyzeStock, reason: "nan".into() },
            CallError::ServiceUnavailable {
                kind: CallKind::AnalyzeStock,
                attempts: 3,
                last: Box::new(transport()),
            },
            CallError::DeadlineExceeded {
                kind: CallKind::AnalyzeStock,
                deadline: Duration::from_secs(5),
            },
        ];
        for err in fatal {
            assert!(!err.is_retryable(), "{err} must not be retryable");
        }
    }

    #[test]
    fn messages_name_the_call_kind() {
        let err = CallError::ServiceUnavailable {
            kind: CallKind::AnalyzeSentiment,
            attempts: 3,
            last: Box::new(transport()),
        };
        assert_eq!(
            err.to_string(),
            "analyzeSentiment: analysis service unavailable after 3 attempts: \
             analyzeStock: transport failure (connect): connection refused"
        );
        assert_eq!(err.kind(), CallKind::AnalyzeSentiment);
    }

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        let long = "股".repeat(BODY_EXCERPT_CHARS + 10);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), BODY_EXCERPT_CHARS + 1);
        assert!(cut.ends_with('…'));
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn status_is_exposed_for_unexpected_status_only() {
        assert_eq!(CallError::unexpected_status(CallKind::HealthCheck, 503, "").status(), Some(503));
        assert_eq!(transport().status(), None);
    }
}
