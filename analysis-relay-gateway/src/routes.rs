use analysis_relay::{
    SentimentAnalysisRequest, SentimentAnalysisResponse, ServiceStatus, StockAnalysisRequest,
    StockAnalysisResponse,
};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Local, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::envelope::ApiResponse;
use crate::error::{classify_call_error, ApiError, ErrorCode};
use crate::validation::{self, check_stock_code};
use crate::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/analysis/stock", post(analyze_stock))
        .route("/analysis/stock/:stock_code/quick", get(quick_stock))
        .route("/analysis/stock/batch", post(batch_stock))
        .route("/analysis/sentiment", post(analyze_sentiment))
        .route("/analysis/service/status", get(service_status))
        .route("/analysis/service/health", get(service_health))
}

pub fn system_routes() -> Router<AppState> {
    Router::new()
        .route("/system/health", get(system_health))
        .route("/system/version", get(system_version))
        .route("/system/info", get(system_info))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn analyze_stock(
    State(state): State<AppState>,
    body: Result<Json<StockAnalysisRequest>, JsonRejection>,
) -> ApiResult<StockAnalysisResponse> {
    let Json(request) = body?;
    validation::validate_stock(&request, today()).map_err(ApiError::Validation)?;
    tracing::info!(stock_code = %request.stock_code, analysis_type = %request.analysis_type, "stock analysis requested");
    let response = state.invoker.analyze_stock(&request).await?;
    Ok(Json(ApiResponse::success(response)))
}

async fn quick_stock(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<StockAnalysisResponse> {
    let Path(stock_code) = path?;
    if let Some(violation) = check_stock_code(&stock_code) {
        return Err(ApiError::Validation(vec![violation]));
    }
    let response = state.invoker.analyze_stock(&StockAnalysisRequest::quick(stock_code)).await?;
    Ok(Json(ApiResponse::success(response)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub stock_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StockAnalysisResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BatchFailure>,
}

#[derive(Debug, Serialize)]
pub struct BatchFailure {
    pub code: ErrorCode,
    pub message: String,
}

/// Quick analysis for each code, run concurrently. One code failing does not fail the batch.
async fn batch_stock(
    State(state): State<AppState>,
    body: Result<Json<Vec<String>>, JsonRejection>,
) -> ApiResult<Vec<BatchEntry>> {
    let Json(codes) = body?;
    validation::validate_batch(&codes).map_err(ApiError::Validation)?;
    tracing::info!(codes = codes.len(), "batch stock analysis requested");

    let calls = codes.into_iter().map(|stock_code| {
        let invoker = state.invoker.clone();
        async move {
            if let Some(violation) = check_stock_code(&stock_code) {
                let error = BatchFailure { code: violation.code, message: violation.message };
                return BatchEntry { stock_code, result: None, error: Some(error) };
            }
            match invoker.analyze_stock(&StockAnalysisRequest::quick(stock_code.as_str())).await {
                Ok(result) => BatchEntry { stock_code, result: Some(result), error: None },
                Err(err) => {
                    let (_, code) = classify_call_error(&err);
                    tracing::warn!(stock_code = %stock_code, error = %err, "batch entry failed");
                    let error = BatchFailure { code, message: err.to_string() };
                    BatchEntry { stock_code, result: None, error: Some(error) }
                }
            }
        }
    });
    let entries = futures::future::join_all(calls).await;
    Ok(Json(ApiResponse::success(entries)))
}

async fn analyze_sentiment(
    State(state): State<AppState>,
    body: Result<Json<SentimentAnalysisRequest>, JsonRejection>,
) -> ApiResult<SentimentAnalysisResponse> {
    let Json(request) = body?;
    validation::validate_sentiment(&request, today()).map_err(ApiError::Validation)?;
    tracing::info!(
        chars = request.content.chars().count(),
        source = %request.source,
        "sentiment analysis requested"
    );
    let response = state.invoker.analyze_sentiment(&request).await?;
    Ok(Json(ApiResponse::success(response)))
}

async fn service_status(State(state): State<AppState>) -> Json<ApiResponse<ServiceStatus>> {
    Json(ApiResponse::success(state.reporter.status().await))
}

async fn service_health(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<bool>>) {
    if state.reporter.health_check().await {
        (StatusCode::OK, Json(ApiResponse::success(true)))
    } else {
        let code = ErrorCode::ServiceUnavailable;
        (StatusCode::SERVICE_UNAVAILABLE, Json(ApiResponse::failure(code, code.message(), Some(false))))
    }
}

async fn system_health() -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(json!({
        "status": "UP",
        "time": Utc::now().to_rfc3339(),
    })))
}

async fn system_version() -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "client": analysis_relay::config::DEFAULT_USER_AGENT,
    })))
}

async fn system_info(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let now = Utc::now();
    Json(ApiResponse::success(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.listen.map(|addr| addr.port()),
        "upstream": state.invoker.config().base_url(),
        "startedAt": state.started.to_rfc3339(),
        "uptimeSecs": (now - state.started).num_seconds(),
        "time": now.to_rfc3339(),
    })))
}
