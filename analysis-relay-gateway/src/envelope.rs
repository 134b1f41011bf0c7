use chrono::Utc;
use serde::Serialize;

use crate::error::ErrorCode;

/// Uniform `{code, message, data}` body returned by every gateway route.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: ErrorCode,
    pub message: String,
    pub data: Option<T>,
    pub timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: ErrorCode::Success,
            message: ErrorCode::Success.message().to_string(),
            data: Some(data),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>, data: Option<T>) -> Self {
        Self { code, message: message.into(), data, timestamp: Utc::now().timestamp_millis() }
    }
}
