use analysis_relay::CallError;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::envelope::ApiResponse;
use crate::validation::Violation;

/// Business result codes carried in every response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u16")]
pub enum ErrorCode {
    Success,
    SystemError,
    ParamError,
    ValidationError,
    StockCodeInvalid,
    StockAnalysisTypeInvalid,
    StockDateRangeInvalid,
    SentimentContentEmpty,
    SentimentContentTooLong,
    SentimentAnalysisTypeInvalid,
    SentimentDateRangeInvalid,
    ServiceUnavailable,
    ServiceTimeout,
    ServiceError,
}

impl ErrorCode {
    pub fn code(self) -> u16 {
        match self {
            ErrorCode::Success => 200,
            ErrorCode::SystemError => 1000,
            ErrorCode::ParamError => 1001,
            ErrorCode::ValidationError => 1002,
            ErrorCode::StockCodeInvalid => 3000,
            ErrorCode::StockAnalysisTypeInvalid => 3001,
            ErrorCode::StockDateRangeInvalid => 3002,
            ErrorCode::SentimentContentEmpty => 3100,
            ErrorCode::SentimentContentTooLong => 3101,
            ErrorCode::SentimentAnalysisTypeInvalid => 3102,
            ErrorCode::SentimentDateRangeInvalid => 3002,
            ErrorCode::ServiceUnavailable => 4000,
            ErrorCode::ServiceTimeout => 4001,
            ErrorCode::ServiceError => 4002,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Success => "success",
            ErrorCode::SystemError => "internal error",
            ErrorCode::ParamError => "bad request parameters",
            ErrorCode::ValidationError => "request validation failed",
            ErrorCode::StockCodeInvalid => "stock code must be 6 digits",
            ErrorCode::StockAnalysisTypeInvalid => "unsupported stock analysis type",
            ErrorCode::StockDateRangeInvalid | ErrorCode::SentimentDateRangeInvalid => {
                "invalid date range"
            }
            ErrorCode::SentimentContentEmpty => "sentiment content must not be empty",
            ErrorCode::SentimentContentTooLong => "sentiment content is too long",
            ErrorCode::SentimentAnalysisTypeInvalid => "unsupported sentiment analysis type",
            ErrorCode::ServiceUnavailable => "analysis service unavailable",
            ErrorCode::ServiceTimeout => "analysis service timed out",
            ErrorCode::ServiceError => "analysis service returned an error",
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> u16 {
        code.code()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed: {} violation(s)", .0.len())]
    Validation(Vec<Violation>),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Call(#[from] CallError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// HTTP status and envelope code for a failed remote call.
pub fn classify_call_error(err: &CallError) -> (StatusCode, ErrorCode) {
    match err {
        CallError::DeadlineExceeded { .. } => (StatusCode::GATEWAY_TIMEOUT, ErrorCode::ServiceTimeout),
        CallError::ServiceUnavailable { last, .. } if last.is_timeout() => {
            (StatusCode::GATEWAY_TIMEOUT, ErrorCode::ServiceTimeout)
        }
        CallError::ServiceUnavailable { .. }
        | CallError::PoolExhausted { .. }
        | CallError::Transport { .. } => (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::ServiceUnavailable),
        CallError::UnexpectedStatus { .. } | CallError::InvalidBody { .. } => {
            (StatusCode::BAD_GATEWAY, ErrorCode::ServiceError)
        }
        CallError::Encode { .. } => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::SystemError),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(violations) => {
                let code = violations.first().map(|v| v.code).unwrap_or(ErrorCode::ValidationError);
                let message = violations
                    .iter()
                    .map(|v| format!("{}: {}", v.field, v.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                (StatusCode::BAD_REQUEST, Json(ApiResponse::failure(code, message, Some(violations))))
                    .into_response()
            }
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<()>::failure(ErrorCode::ParamError, message, None)),
            )
                .into_response(),
            ApiError::Call(err) => {
                let (status, code) = classify_call_error(&err);
                tracing::error!(kind = err.kind().name(), status = status.as_u16(), error = %err, "analysis call failed");
                (status, Json(ApiResponse::<()>::failure(code, format!("{}: {}", code.message(), err), None)))
                    .into_response()
            }
        }
    }
}
