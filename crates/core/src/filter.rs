use serde::{Deserialize, Serialize};

use crate::model::log::Severity;
use crate::model::trace::SpanStatus;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;
pub const DEFAULT_WINDOW_MS: i64 = 3_600_000;

/// Whitelisted sort columns for trace queries. Unknown client values fall
/// back to `StartTime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortField {
    #[default]
    StartTime,
    EndTime,
    Duration,
    Name,
    ServiceName,
    Status,
}

impl SortField {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "startTime" => Some(Self::StartTime),
            "endTime" => Some(Self::EndTime),
            "duration" => Some(Self::Duration),
            "name" => Some(Self::Name),
            "serviceName" => Some(Self::ServiceName),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::StartTime => "start_time",
            Self::EndTime => "end_time",
            Self::Duration => "duration",
            Self::Name => "name",
            Self::ServiceName => "service_name",
            Self::Status => "status",
        }
    }

    /// The expression that stands in for this column once spans are rolled
    /// up per trace.
    pub fn group_expr(&self) -> &'static str {
        match self {
            Self::StartTime => "MIN(start_time)",
            Self::Duration => "MAX(end_time) - MIN(start_time)",
            _ => "trace_id",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Some(Self::Asc),
            "DESC" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceFilter {
    pub start_time: i64,
    pub end_time: i64,
    pub service_names: Vec<String>,
    pub status: Option<SpanStatus>,
    pub min_duration: Option<f64>,
    pub max_duration: Option<f64>,
    pub query: Option<String>,
    pub root_spans_only: bool,
    pub limit: i64,
    pub offset: i64,
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogFilter {
    pub start_time: i64,
    pub end_time: i64,
    pub service_names: Vec<String>,
    pub severity: Option<Severity>,
    /// Indexed equality match; the by-trace endpoint sets this.
    pub trace_id: Option<String>,
    pub has_trace: bool,
    pub query: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl TraceFilter {
    pub fn normalize(&mut self, now_ms: i64) {
        normalize_window(&mut self.start_time, &mut self.end_time, now_ms);
        self.limit = clamp_limit(self.limit);
        self.offset = self.offset.max(0);
        drop_wildcard(&mut self.query);
    }
}

impl LogFilter {
    pub fn normalize(&mut self, now_ms: i64) {
        normalize_window(&mut self.start_time, &mut self.end_time, now_ms);
        self.limit = clamp_limit(self.limit);
        self.offset = self.offset.max(0);
        drop_wildcard(&mut self.query);
    }
}

pub fn clamp_limit(limit: i64) -> i64 {
    if limit <= 0 {
        DEFAULT_LIMIT
    } else {
        limit.min(MAX_LIMIT)
    }
}

/// Fills an absent time range with the trailing hour.
pub fn normalize_window(start: &mut i64, end: &mut i64, now_ms: i64) {
    if *end == 0 {
        *end = now_ms;
    }
    if *start == 0 {
        *start = *end - DEFAULT_WINDOW_MS;
    }
}

fn drop_wildcard(query: &mut Option<String>) {
    if matches!(query.as_deref(), Some("") | Some("*")) {
        *query = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_clamping_boundaries() {
        assert_eq!(clamp_limit(0), 20);
        assert_eq!(clamp_limit(-1), 20);
        assert_eq!(clamp_limit(1), 1);
        assert_eq!(clamp_limit(100), 100);
        assert_eq!(clamp_limit(1000), 100);
    }

    #[test]
    fn zero_fill_window_defaults_to_trailing_hour() {
        let now = 1_700_000_000_000;
        let mut filter = LogFilter::default();
        filter.normalize(now);
        assert_eq!(filter.end_time, now);
        assert_eq!(filter.start_time, now - DEFAULT_WINDOW_MS);
        assert_eq!(filter.limit, DEFAULT_LIMIT);
        assert_eq!(filter.offset, 0);
    }

    #[test]
    fn explicit_window_is_preserved() {
        let mut filter = TraceFilter {
            start_time: 100,
            end_time: 200,
            offset: -5,
            ..TraceFilter::default()
        };
        filter.normalize(1_700_000_000_000);
        assert_eq!((filter.start_time, filter.end_time), (100, 200));
        assert_eq!(filter.offset, 0);
    }

    #[test]
    fn wildcard_query_is_dropped() {
        let mut filter = LogFilter {
            query: Some("*".into()),
            ..LogFilter::default()
        };
        filter.normalize(1);
        assert_eq!(filter.query, None);
    }

    #[test]
    fn sort_field_whitelist() {
        assert_eq!(SortField::parse("duration"), Some(SortField::Duration));
        assert_eq!(SortField::parse("serviceName"), Some(SortField::ServiceName));
        assert_eq!(SortField::parse("drop table"), None);
        assert_eq!(SortField::StartTime.column(), "start_time");
        assert_eq!(
            SortField::Duration.group_expr(),
            "MAX(end_time) - MIN(start_time)"
        );
    }

    #[test]
    fn sort_direction_parse() {
        assert_eq!(SortDirection::parse("asc"), Some(SortDirection::Asc));
        assert_eq!(SortDirection::parse("DESC"), Some(SortDirection::Desc));
        assert_eq!(SortDirection::parse("sideways"), None);
    }
}
