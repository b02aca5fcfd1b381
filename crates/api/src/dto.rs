use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use otelbase_core::error::OtelbaseError;
use otelbase_core::model::log::{LogItem, ServiceAggregation, SeverityAggregation};
use otelbase_core::model::trace::{ServiceMetric, TraceGroup, TraceItem};

/// Shared response envelope: `error.code` mirrors the HTTP status.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: u16,
    pub message: String,
}

pub fn ok<T: Serialize>(data: T) -> Response {
    (
        StatusCode::OK,
        Json(Envelope {
            success: true,
            data: Some(data),
            error: None,
        }),
    )
        .into_response()
}

pub fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(Envelope::<()> {
            success: false,
            data: None,
            error: Some(ErrorInfo {
                code: status.as_u16(),
                message: message.into(),
            }),
        }),
    )
        .into_response()
}

/// Store errors map to an opaque 500; the detail stays in the logs.
pub fn internal(context: &str, err: OtelbaseError) -> Response {
    error!(error = %err, "{context}");
    fail(StatusCode::INTERNAL_SERVER_ERROR, format!("{context} failed"))
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start_time: i64,
    pub end_time: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TracesResponse {
    pub traces: Vec<TraceItem>,
    pub trace_groups: Vec<TraceGroup>,
    pub pagination: Pagination,
    pub time_range: TimeRange,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    pub total_duration: i64,
    pub sort_field: String,
    pub sort_direction: String,
    pub took: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsResponse {
    pub logs: Vec<LogItem>,
    pub services: Vec<ServiceAggregation>,
    pub severities: Vec<SeverityAggregation>,
    pub pagination: Pagination,
    pub time_range: TimeRange,
    pub took: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSummaryResponse {
    pub time_range: TimeRange,
    pub services: Vec<ServiceAggregation>,
    pub severities: Vec<SeverityAggregation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetricsResponse {
    pub services: Vec<ServiceMetric>,
    pub time_range: TimeRange,
    pub total_requests: i64,
    pub total_errors: i64,
    pub avg_latency: f64,
    pub error_percentage: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TraceQueryParams {
    pub start_time: i64,
    pub end_time: i64,
    /// Repeatable parameter.
    pub service_name: Vec<String>,
    pub status: Option<String>,
    pub min_duration: Option<f64>,
    pub max_duration: Option<f64>,
    pub query: Option<String>,
    pub limit: i64,
    pub offset: i64,
    pub root_spans_only: bool,
    pub sort_field: Option<String>,
    pub sort_direction: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogQueryParams {
    pub start_time: i64,
    pub end_time: i64,
    /// Repeatable parameter.
    pub service_name: Vec<String>,
    pub severity: Option<String>,
    pub has_trace: bool,
    pub query: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WindowParams {
    pub start_time: i64,
    pub end_time: i64,
    pub filter: Option<String>,
    pub service_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogsByTraceParams {
    pub start_time: i64,
    pub end_time: i64,
    pub limit: i64,
    pub offset: i64,
}
