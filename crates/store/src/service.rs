use otelbase_core::error::Result;
use otelbase_core::filter::{normalize_window, LogFilter, TraceFilter};
use otelbase_core::model::log::{LogItem, ServiceAggregation, SeverityAggregation};
use otelbase_core::model::trace::{ServiceMetric, Trace, TraceItem};
use otelbase_core::query::{LogQueryResult, ServiceListResult, TraceQueryResult};
use otelbase_core::time::now_millis;

use crate::log_repo::LogRepository;
use crate::trace_repo::TraceRepository;

/// Policy layer over the trace repository: defaults and limits only, no
/// extra I/O.
#[derive(Clone)]
pub struct TraceService {
    repo: TraceRepository,
}

impl TraceService {
    pub fn new(repo: TraceRepository) -> Self {
        Self { repo }
    }

    pub async fn save_traces(&self, traces: &[TraceItem]) -> Result<()> {
        self.repo.save_traces(traces).await
    }

    pub async fn get_trace_by_id(&self, trace_id: &str) -> Result<Option<Trace>> {
        self.repo.get_trace_by_id(trace_id).await
    }

    pub async fn query_traces(&self, mut filter: TraceFilter) -> Result<TraceQueryResult> {
        filter.normalize(now_millis());
        self.repo.query_traces(&filter).await
    }

    pub async fn get_services(
        &self,
        start_time: i64,
        end_time: i64,
        name_filter: Option<&str>,
    ) -> Result<ServiceListResult> {
        let (start_time, end_time) = windowed(start_time, end_time);
        self.repo.get_services(start_time, end_time, name_filter).await
    }

    pub async fn get_service_metrics(
        &self,
        start_time: i64,
        end_time: i64,
        service_name: Option<&str>,
    ) -> Result<Vec<ServiceMetric>> {
        let (start_time, end_time) = windowed(start_time, end_time);
        self.repo
            .get_service_metrics(start_time, end_time, service_name)
            .await
    }
}

#[derive(Clone)]
pub struct LogService {
    repo: LogRepository,
}

impl LogService {
    pub fn new(repo: LogRepository) -> Self {
        Self { repo }
    }

    pub async fn save_logs(&self, logs: &[LogItem]) -> Result<()> {
        self.repo.save_logs(logs).await
    }

    pub async fn query_logs(&self, mut filter: LogFilter) -> Result<LogQueryResult> {
        filter.normalize(now_millis());
        self.repo.query_logs(&filter).await
    }

    pub async fn get_service_aggregation(
        &self,
        start_time: i64,
        end_time: i64,
    ) -> Result<Vec<ServiceAggregation>> {
        let (start_time, end_time) = windowed(start_time, end_time);
        self.repo.get_service_aggregation(start_time, end_time).await
    }

    pub async fn get_severity_aggregation(
        &self,
        start_time: i64,
        end_time: i64,
    ) -> Result<Vec<SeverityAggregation>> {
        let (start_time, end_time) = windowed(start_time, end_time);
        self.repo.get_severity_aggregation(start_time, end_time).await
    }
}

fn windowed(mut start: i64, mut end: i64) -> (i64, i64) {
    normalize_window(&mut start, &mut end, now_millis());
    (start, end)
}
