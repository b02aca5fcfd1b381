use serde::{Deserialize, Serialize};

use crate::model::log::{LogItem, ServiceAggregation, SeverityAggregation};
use crate::model::trace::{ServiceInfo, TraceGroup, TraceItem};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceQueryResult {
    pub traces: Vec<TraceItem>,
    pub trace_groups: Vec<TraceGroup>,
    pub total: i64,
    /// Query wall time in milliseconds.
    pub took: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQueryResult {
    pub logs: Vec<LogItem>,
    pub services: Vec<ServiceAggregation>,
    pub severities: Vec<SeverityAggregation>,
    pub total: i64,
    pub took: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceListResult {
    pub services: Vec<ServiceInfo>,
    pub total: i64,
    pub took: i64,
}
