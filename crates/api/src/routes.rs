use std::collections::BTreeSet;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use axum_extra::extract::Query;
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, Any, CorsLayer};
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tracing::warn;

use otelbase_core::config::{ApiConfig, Config};
use otelbase_core::filter::{LogFilter, SortDirection, SortField, TraceFilter};
use otelbase_core::model::log::Severity;
use otelbase_core::model::trace::SpanStatus;
use otelbase_core::time::now_millis;
use otelbase_store::service::{LogService, TraceService};

use crate::cache::{cache_middleware, ResponseCache};
use crate::dto::{
    self, LogQueryParams, LogSummaryResponse, LogsByTraceParams, LogsResponse, Pagination,
    ServiceMetricsResponse, TimeRange, TraceQueryParams, TracesResponse, WindowParams,
};

const TRACE_LOGS_WINDOW_MS: i64 = 86_400_000;

#[derive(Clone)]
pub struct AppState {
    pub traces: TraceService,
    pub logs: LogService,
}

pub fn router(state: AppState, cfg: &Config, cache: ResponseCache) -> Router {
    let api = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/traces", get(query_traces))
        .route("/traces/services", get(get_services))
        .route("/traces/{trace_id}", get(get_trace_by_id))
        .route("/logs", get(query_logs))
        .route("/logs/summary", get(log_summary))
        .route("/logs/trace/{trace_id}", get(logs_by_trace))
        .route("/metrics/services", get(service_metrics))
        .with_state(state);

    Router::new()
        .nest(&cfg.api.base_path, api)
        .layer(from_fn_with_state(cache, cache_middleware))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TimeoutLayer::new(cfg.api.write_timeout))
        .layer(RequestBodyTimeoutLayer::new(cfg.api.read_timeout))
        .layer(cors_layer(&cfg.api))
}

async fn root() -> Response {
    dto::ok(json!({
        "service": "otelbase",
        "status": "running",
    }))
}

async fn health() -> Response {
    dto::ok(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn query_traces(
    State(state): State<AppState>,
    Query(params): Query<TraceQueryParams>,
) -> Response {
    let status = match params.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => match raw.parse::<SpanStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                return dto::fail(
                    StatusCode::BAD_REQUEST,
                    format!("invalid status parameter: {raw}"),
                )
            }
        },
        None => None,
    };

    let mut filter = TraceFilter {
        start_time: params.start_time,
        end_time: params.end_time,
        service_names: params.service_name,
        status,
        min_duration: params.min_duration.filter(|d| *d > 0.0),
        max_duration: params.max_duration.filter(|d| *d > 0.0),
        query: params.query,
        root_spans_only: params.root_spans_only,
        limit: params.limit,
        offset: params.offset,
        sort_field: parse_sort_field(params.sort_field.as_deref()),
        sort_direction: parse_sort_direction(params.sort_direction.as_deref()),
    };
    filter.normalize(now_millis());

    let result = match state.traces.query_traces(filter.clone()).await {
        Ok(result) => result,
        Err(e) => return dto::internal("trace query", e),
    };

    let services: BTreeSet<String> = result
        .traces
        .iter()
        .map(|t| t.service_name.clone())
        .collect();
    let total_duration: f64 = result.traces.iter().map(|t| t.duration).sum();

    dto::ok(TracesResponse {
        pagination: Pagination {
            total: result.total,
            limit: filter.limit,
            offset: filter.offset,
        },
        time_range: TimeRange {
            start_time: filter.start_time,
            end_time: filter.end_time,
        },
        services: services.into_iter().collect(),
        total_duration: total_duration as i64,
        sort_field: filter.sort_field.column().to_string(),
        sort_direction: filter.sort_direction.as_sql().to_string(),
        took: result.took,
        traces: result.traces,
        trace_groups: result.trace_groups,
    })
}

async fn get_trace_by_id(
    State(state): State<AppState>,
    Path(trace_id): Path<String>,
) -> Response {
    if trace_id.is_empty() {
        return dto::fail(StatusCode::BAD_REQUEST, "trace id is required");
    }

    match state.traces.get_trace_by_id(&trace_id).await {
        Ok(Some(trace)) => dto::ok(json!({ "trace": trace })),
        Ok(None) => dto::fail(StatusCode::NOT_FOUND, "trace not found"),
        Err(e) => dto::internal("trace lookup", e),
    }
}

async fn get_services(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Response {
    match state
        .traces
        .get_services(params.start_time, params.end_time, params.filter.as_deref())
        .await
    {
        Ok(result) => dto::ok(result),
        Err(e) => dto::internal("service list query", e),
    }
}

async fn query_logs(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Response {
    let severity = match params.severity.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => match raw.parse::<Severity>() {
            Ok(severity) => Some(severity),
            Err(_) => {
                return dto::fail(
                    StatusCode::BAD_REQUEST,
                    format!("invalid severity parameter: {raw}"),
                )
            }
        },
        None => None,
    };

    let mut filter = LogFilter {
        start_time: params.start_time,
        end_time: params.end_time,
        service_names: params.service_name,
        severity,
        trace_id: None,
        has_trace: params.has_trace,
        query: params.query,
        limit: params.limit,
        offset: params.offset,
    };
    filter.normalize(now_millis());

    match state.logs.query_logs(filter.clone()).await {
        Ok(result) => dto::ok(LogsResponse {
            pagination: Pagination {
                total: result.total,
                limit: filter.limit,
                offset: filter.offset,
            },
            time_range: TimeRange {
                start_time: filter.start_time,
                end_time: filter.end_time,
            },
            took: result.took,
            logs: result.logs,
            services: result.services,
            severities: result.severities,
        }),
        Err(e) => dto::internal("log query", e),
    }
}

/// Logs linked to one trace, matched by indexed trace-id equality. The
/// default window here is the trailing day rather than the hour.
async fn logs_by_trace(
    State(state): State<AppState>,
    Path(trace_id): Path<String>,
    Query(params): Query<LogsByTraceParams>,
) -> Response {
    if trace_id.is_empty() {
        return dto::fail(StatusCode::BAD_REQUEST, "trace id is required");
    }

    let now = now_millis();
    let end_time = if params.end_time == 0 { now } else { params.end_time };
    let start_time = if params.start_time == 0 {
        end_time - TRACE_LOGS_WINDOW_MS
    } else {
        params.start_time
    };

    let mut filter = LogFilter {
        start_time,
        end_time,
        trace_id: Some(trace_id),
        has_trace: true,
        limit: params.limit,
        offset: params.offset,
        ..LogFilter::default()
    };
    filter.normalize(now);

    match state.logs.query_logs(filter.clone()).await {
        Ok(result) => dto::ok(LogsResponse {
            pagination: Pagination {
                total: result.total,
                limit: filter.limit,
                offset: filter.offset,
            },
            time_range: TimeRange {
                start_time: filter.start_time,
                end_time: filter.end_time,
            },
            took: result.took,
            logs: result.logs,
            services: result.services,
            severities: result.severities,
        }),
        Err(e) => dto::internal("trace log query", e),
    }
}

async fn log_summary(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Response {
    let now = now_millis();
    let end_time = if params.end_time == 0 { now } else { params.end_time };
    let start_time = if params.start_time == 0 {
        end_time - otelbase_core::filter::DEFAULT_WINDOW_MS
    } else {
        params.start_time
    };

    let services = match state.logs.get_service_aggregation(start_time, end_time).await {
        Ok(services) => services,
        Err(e) => return dto::internal("service aggregation", e),
    };
    let severities = match state
        .logs
        .get_severity_aggregation(start_time, end_time)
        .await
    {
        Ok(severities) => severities,
        Err(e) => return dto::internal("severity aggregation", e),
    };

    dto::ok(LogSummaryResponse {
        time_range: TimeRange {
            start_time,
            end_time,
        },
        services,
        severities,
    })
}

async fn service_metrics(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Response {
    let metrics = match state
        .traces
        .get_service_metrics(
            params.start_time,
            params.end_time,
            params.service_name.as_deref(),
        )
        .await
    {
        Ok(metrics) => metrics,
        Err(e) => return dto::internal("service metrics query", e),
    };

    let total_requests: i64 = metrics.iter().map(|m| m.request_count).sum();
    let total_errors: i64 = metrics.iter().map(|m| m.error_count).sum();
    let weighted_latency: f64 = metrics
        .iter()
        .map(|m| m.request_count as f64 * m.avg_latency)
        .sum();
    let avg_latency = if total_requests > 0 {
        weighted_latency / total_requests as f64
    } else {
        0.0
    };
    let error_percentage = if total_requests > 0 {
        total_errors as f64 / total_requests as f64 * 100.0
    } else {
        0.0
    };

    let now = now_millis();
    let end_time = if params.end_time == 0 { now } else { params.end_time };
    let start_time = if params.start_time == 0 {
        end_time - otelbase_core::filter::DEFAULT_WINDOW_MS
    } else {
        params.start_time
    };

    dto::ok(ServiceMetricsResponse {
        services: metrics,
        time_range: TimeRange {
            start_time,
            end_time,
        },
        total_requests,
        total_errors,
        avg_latency,
        error_percentage,
    })
}

fn parse_sort_field(raw: Option<&str>) -> SortField {
    match raw.filter(|s| !s.is_empty()) {
        Some(raw) => SortField::parse(raw).unwrap_or_else(|| {
            warn!(sort_field = raw, "unsupported sort field, using startTime");
            SortField::StartTime
        }),
        None => SortField::StartTime,
    }
}

fn parse_sort_direction(raw: Option<&str>) -> SortDirection {
    match raw.filter(|s| !s.is_empty()) {
        Some(raw) => SortDirection::parse(raw).unwrap_or_else(|| {
            warn!(sort_direction = raw, "unsupported sort direction, using DESC");
            SortDirection::Desc
        }),
        None => SortDirection::Desc,
    }
}

fn cors_layer(cfg: &ApiConfig) -> CorsLayer {
    let wildcard = cfg.allowed_origins.iter().any(|o| o == "*");
    if wildcard {
        // Credentials cannot be combined with a wildcard origin.
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = cfg
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let mut layer = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(AllowHeaders::mirror_request());
    if cfg.allow_credentials {
        layer = layer.allow_credentials(true);
    }
    layer
}

fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "handler panicked");
    dto::fail(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sort_values_fall_back_to_defaults() {
        assert_eq!(parse_sort_field(Some("nope")), SortField::StartTime);
        assert_eq!(parse_sort_field(Some("duration")), SortField::Duration);
        assert_eq!(parse_sort_field(None), SortField::StartTime);
        assert_eq!(parse_sort_direction(Some("upward")), SortDirection::Desc);
        assert_eq!(parse_sort_direction(Some("asc")), SortDirection::Asc);
    }
}
