//! Inbound request checks run before anything reaches the analysis service.

use analysis_relay::{SentimentAnalysisRequest, StockAnalysisRequest};
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::ErrorCode;

/// Longest sentiment content accepted, in characters.
pub const MAX_CONTENT_CHARS: usize = 10_000;

/// Most stock codes accepted by one batch request.
pub const MAX_BATCH_CODES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: &'static str,
    pub code: ErrorCode,
    pub message: String,
}

impl Violation {
    fn new(field: &'static str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self { field, code, message: message.into() }
    }
}

/// Exactly six ASCII digits.
pub fn is_stock_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

pub fn check_stock_code(code: &str) -> Option<Violation> {
    if code.trim().is_empty() {
        return Some(Violation::new("stockCode", ErrorCode::StockCodeInvalid, "must not be blank"));
    }
    (!is_stock_code(code)).then(|| {
        Violation::new("stockCode", ErrorCode::StockCodeInvalid, format!("`{code}` is not a 6-digit code"))
    })
}

fn check_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
    code: ErrorCode,
    out: &mut Vec<Violation>,
) {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            out.push(Violation::new("startDate", code, format!("{start} is after endDate {end}")));
        }
    }
    if let Some(end) = end {
        if end > today {
            out.push(Violation::new("endDate", code, format!("{end} is in the future")));
        }
    }
}

fn finish(violations: Vec<Violation>) -> Result<(), Vec<Violation>> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

pub fn validate_stock(request: &StockAnalysisRequest, today: NaiveDate) -> Result<(), Vec<Violation>> {
    let mut violations = Vec::new();
    violations.extend(check_stock_code(&request.stock_code));
    if request.analysis_type.trim().is_empty() {
        violations.push(Violation::new(
            "analysisType",
            ErrorCode::StockAnalysisTypeInvalid,
            "must not be blank",
        ));
    }
    check_range(
        request.start_date,
        request.end_date,
        today,
        ErrorCode::StockDateRangeInvalid,
        &mut violations,
    );
    finish(violations)
}

pub fn validate_sentiment(
    request: &SentimentAnalysisRequest,
    today: NaiveDate,
) -> Result<(), Vec<Violation>> {
    let mut violations = Vec::new();
    let chars = request.content.chars().count();
    if request.content.trim().is_empty() {
        violations.push(Violation::new("content", ErrorCode::SentimentContentEmpty, "must not be blank"));
    } else if chars > MAX_CONTENT_CHARS {
        violations.push(Violation::new(
            "content",
            ErrorCode::SentimentContentTooLong,
            format!("{chars} characters exceeds the limit of {MAX_CONTENT_CHARS}"),
        ));
    }
    if request.analysis_type.trim().is_empty() {
        violations.push(Violation::new(
            "analysisType",
            ErrorCode::SentimentAnalysisTypeInvalid,
            "must not be blank",
        ));
    }
    check_range(
        request.start_date,
        request.end_date,
        today,
        ErrorCode::SentimentDateRangeInvalid,
        &mut violations,
    );
    finish(violations)
}

/// Batch requests carry between one and [`MAX_BATCH_CODES`] codes.
pub fn validate_batch(codes: &[String]) -> Result<(), Vec<Violation>> {
    if codes.is_empty() {
        return Err(vec![Violation::new("stockCodes", ErrorCode::ParamError, "must not be empty")]);
    }
    if codes.len() > MAX_BATCH_CODES {
        return Err(vec![Violation::new(
            "stockCodes",
            ErrorCode::ParamError,
            format!("{} codes exceeds the batch limit of {MAX_BATCH_CODES}", codes.len()),
        )]);
    }
    Ok(())
}
