use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OtelbaseError;
use crate::model::attr::AttrMap;

/// OTLP span status collapsed to the three stored labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SpanStatus {
    #[default]
    #[serde(rename = "UNSET")]
    Unset,
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Unset => "UNSET",
            SpanStatus::Ok => "OK",
            SpanStatus::Error => "ERROR",
        }
    }
}

impl FromStr for SpanStatus {
    type Err = OtelbaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UNSET" => Ok(Self::Unset),
            "OK" => Ok(Self::Ok),
            "ERROR" => Ok(Self::Error),
            _ => Err(OtelbaseError::InvalidArgument(format!(
                "unknown span status: {s}"
            ))),
        }
    }
}

/// One stored span. `id` is `{trace_id}-{span_id}` and is stable across
/// replays of the same payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceItem {
    pub id: String,
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    pub service_name: String,
    /// Epoch milliseconds.
    pub start_time: i64,
    /// Epoch milliseconds.
    pub end_time: i64,
    /// Fractional milliseconds derived from the nanosecond span bounds.
    pub duration: f64,
    pub status: SpanStatus,
    pub attributes: AttrMap,
}

impl TraceItem {
    pub fn make_id(trace_id: &str, span_id: &str) -> String {
        format!("{trace_id}-{span_id}")
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id.as_deref().unwrap_or("").is_empty()
    }
}

/// A whole trace as served by the detail endpoint: its spans ordered by
/// start time plus the derived time range and service set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub trace_id: String,
    pub spans: Vec<TraceItem>,
    pub start_time: i64,
    pub end_time: i64,
    pub services: Vec<String>,
    pub total: usize,
}

/// Per-trace rollup used by the trace list view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceGroup {
    pub trace_id: String,
    pub start_time: i64,
    pub duration: f64,
    pub span_count: i64,
    pub services: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub name: String,
    pub count: i64,
    pub error_count: i64,
    pub error_rate: f64,
    pub avg_latency: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetric {
    pub name: String,
    pub request_count: i64,
    pub error_count: i64,
    pub avg_latency: f64,
    pub p95_latency: f64,
    pub p99_latency: f64,
    pub error_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_text() {
        for s in [SpanStatus::Unset, SpanStatus::Ok, SpanStatus::Error] {
            assert_eq!(s.as_str().parse::<SpanStatus>().unwrap(), s);
        }
        assert!("WAT".parse::<SpanStatus>().is_err());
    }

    #[test]
    fn id_joins_hex_ids() {
        assert_eq!(TraceItem::make_id("aa01", "bb02"), "aa01-bb02");
    }

    #[test]
    fn root_detection_treats_empty_as_missing() {
        let mut item = sample();
        assert!(item.is_root());
        item.parent_span_id = Some(String::new());
        assert!(item.is_root());
        item.parent_span_id = Some("cc03".into());
        assert!(!item.is_root());
    }

    #[test]
    fn serializes_camel_case_wire_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["traceId"], "aa01");
        assert_eq!(json["serviceName"], "svc-a");
        assert_eq!(json["status"], "OK");
        assert!(json.get("parentSpanId").is_none());
    }

    fn sample() -> TraceItem {
        TraceItem {
            id: TraceItem::make_id("aa01", "bb02"),
            trace_id: "aa01".into(),
            span_id: "bb02".into(),
            parent_span_id: None,
            name: "GET /orders".into(),
            service_name: "svc-a".into(),
            start_time: 1_700_000_000_000,
            end_time: 1_700_000_000_150,
            duration: 150.0,
            status: SpanStatus::Ok,
            attributes: AttrMap::new(),
        }
    }
}
