//! Request and response shapes exchanged with the analysis service.
//!
//! Field names are camelCase on the wire. Optional fields are omitted when absent on the way
//! out and tolerated when missing on the way in; required response fields are not, so an empty
//! object fails to decode.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Collections may arrive as `null`; treat that the same as absent.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_period() -> String {
    "DAILY".to_string()
}

fn default_source() -> String {
    "ALL".to_string()
}

fn default_sentiment_analysis() -> String {
    "SENTIMENT".to_string()
}

fn default_language() -> String {
    "zh".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAnalysisRequest {
    pub stock_code: String,
    /// `TECHNICAL`, `FUNDAMENTAL` or `TREND`.
    pub analysis_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// `DAILY`, `WEEKLY` or `MONTHLY`.
    #[serde(default = "default_period")]
    pub period: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

impl StockAnalysisRequest {
    pub fn new(stock_code: impl Into<String>, analysis_type: impl Into<String>) -> Self {
        Self {
            stock_code: stock_code.into(),
            analysis_type: analysis_type.into(),
            start_date: None,
            end_date: None,
            period: default_period(),
            params: None,
        }
    }

    /// Technical analysis over daily bars.
    pub fn quick(stock_code: impl Into<String>) -> Self {
        Self::new(stock_code, "TECHNICAL")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentAnalysisRequest {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    /// `WEIBO`, `NEWS`, `FORUM`, `WECHAT` or `ALL`.
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_sentiment_analysis")]
    pub analysis_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

impl SentimentAnalysisRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            keywords: None,
            source: default_source(),
            analysis_type: default_sentiment_analysis(),
            start_date: None,
            end_date: None,
            language: default_language(),
            params: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAnalysisResponse {
    pub stock_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_name: Option<String>,
    pub current_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
    pub analysis_result: AnalysisResult,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub technical_indicators: BTreeMap<String, Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub predictions: Vec<PricePrediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<RiskAssessment>,
    /// Passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// `BUY`, `SELL` or `HOLD`.
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub key_factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePrediction {
    pub date: String,
    pub predicted_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub risk_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub risk_factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentAnalysisResponse {
    /// `POSITIVE`, `NEGATIVE` or `NEUTRAL`.
    pub overall_sentiment: String,
    /// In `[-1, 1]`.
    pub sentiment_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_distribution: Option<SentimentDistribution>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub keyword_sentiments: Vec<KeywordSentiment>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub hot_topics: Vec<HotTopic>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sentiment_trends: Vec<SentimentTrend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<DataStatistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentDistribution {
    pub positive_rate: f64,
    pub negative_rate: f64,
    pub neutral_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordSentiment {
    pub keyword: String,
    pub sentiment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotTopic {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_sentiment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentTrend {
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataStatistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_count: Option<u64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub source_distribution: BTreeMap<String, u64>,
}
