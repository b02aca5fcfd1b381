use std::collections::BTreeSet;
use std::time::Instant;

use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{info, warn};

use otelbase_core::error::{OtelbaseError, Result};
use otelbase_core::filter::TraceFilter;
use otelbase_core::model::attr::{attrs_from_json, attrs_to_json};
use otelbase_core::model::trace::{
    ServiceInfo, ServiceMetric, SpanStatus, Trace, TraceGroup, TraceItem,
};
use otelbase_core::query::{ServiceListResult, TraceQueryResult};

use crate::db::Db;

const UPSERT_TRACE_SQL: &str = r#"
    INSERT INTO traces (
        id, trace_id, span_id, parent_span_id, name, service_name,
        start_time, end_time, duration, status, attributes
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (id) DO UPDATE SET
        name = EXCLUDED.name,
        service_name = EXCLUDED.service_name,
        start_time = EXCLUDED.start_time,
        end_time = EXCLUDED.end_time,
        duration = EXCLUDED.duration,
        status = EXCLUDED.status,
        attributes = EXCLUDED.attributes
"#;

const TRACE_COLUMNS: &str = "id, trace_id, span_id, parent_span_id, name, service_name, \
     start_time, end_time, duration, status, attributes";

const TRACE_GROUP_LIMIT: i64 = 100;
const SERVICE_LIST_LIMIT: i64 = 100;
const SERVICE_METRICS_LIMIT: i64 = 50;

#[derive(Clone)]
pub struct TraceRepository {
    pool: PgPool,
}

impl TraceRepository {
    pub fn new(db: &Db) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Persists a batch in one transaction. Replayed rows land on the same
    /// primary key and update in place; a row whose attribute bag cannot
    /// serialize is skipped with a warning, any other failure aborts the
    /// batch.
    pub async fn save_traces(&self, traces: &[TraceItem]) -> Result<()> {
        if traces.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OtelbaseError::Store(format!("begin transaction failed: {e}")))?;

        for item in traces {
            let attributes = match attrs_to_json(&item.attributes) {
                Ok(v) => v,
                Err(e) => {
                    warn!(id = %item.id, error = %e, "skipping span with unserializable attributes");
                    continue;
                }
            };

            sqlx::query(UPSERT_TRACE_SQL)
                .bind(&item.id)
                .bind(&item.trace_id)
                .bind(&item.span_id)
                .bind(&item.parent_span_id)
                .bind(&item.name)
                .bind(&item.service_name)
                .bind(item.start_time)
                .bind(item.end_time)
                .bind(item.duration)
                .bind(item.status.as_str())
                .bind(attributes)
                .execute(&mut *tx)
                .await
                .map_err(|e| OtelbaseError::Store(format!("insert trace failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| OtelbaseError::Store(format!("commit traces failed: {e}")))?;

        info!(count = traces.len(), "saved trace batch");
        Ok(())
    }

    /// All spans of one trace plus the derived time range and service
    /// set. `None` when the trace id matches nothing.
    pub async fn get_trace_by_id(&self, trace_id: &str) -> Result<Option<Trace>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRACE_COLUMNS} FROM traces WHERE trace_id = $1 ORDER BY start_time ASC"
        ))
        .bind(trace_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OtelbaseError::Store(format!("query trace by id failed: {e}")))?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut spans = Vec::with_capacity(rows.len());
        for row in &rows {
            spans.push(row_to_trace_item(row)?);
        }

        let start_time = spans.iter().map(|s| s.start_time).min().unwrap_or(0);
        let end_time = spans.iter().map(|s| s.end_time).max().unwrap_or(0);
        let services: BTreeSet<String> =
            spans.iter().map(|s| s.service_name.clone()).collect();

        Ok(Some(Trace {
            trace_id: trace_id.to_string(),
            total: spans.len(),
            start_time,
            end_time,
            services: services.into_iter().collect(),
            spans,
        }))
    }

    pub async fn query_traces(&self, filter: &TraceFilter) -> Result<TraceQueryResult> {
        let started = Instant::now();

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {TRACE_COLUMNS} FROM traces WHERE "));
        push_trace_where(&mut qb, filter);
        qb.push(" ORDER BY ")
            .push(filter.sort_field.column())
            .push(" ")
            .push(filter.sort_direction.as_sql())
            .push(" LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OtelbaseError::Store(format!("query traces failed: {e}")))?;

        let mut traces = Vec::with_capacity(rows.len());
        for row in &rows {
            traces.push(row_to_trace_item(row)?);
        }

        let mut group_qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT trace_id, MIN(start_time) AS start_time, \
             (MAX(end_time) - MIN(start_time))::double precision AS duration, \
             COUNT(*) AS span_count, \
             json_agg(DISTINCT service_name) AS services \
             FROM traces WHERE ",
        );
        push_trace_where(&mut group_qb, filter);
        group_qb
            .push(" GROUP BY trace_id ORDER BY ")
            .push(filter.sort_field.group_expr())
            .push(" ")
            .push(filter.sort_direction.as_sql())
            .push(" LIMIT ")
            .push_bind(TRACE_GROUP_LIMIT);

        let group_rows = group_qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OtelbaseError::Store(format!("query trace groups failed: {e}")))?;

        let mut trace_groups = Vec::with_capacity(group_rows.len());
        for row in &group_rows {
            trace_groups.push(row_to_trace_group(row)?);
        }

        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM traces WHERE ");
        push_trace_where(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| OtelbaseError::Store(format!("count traces failed: {e}")))?;

        Ok(TraceQueryResult {
            traces,
            trace_groups,
            total,
            took: started.elapsed().as_millis() as i64,
        })
    }

    /// Service catalog over a time window: request counts, error counts
    /// and rate, average latency.
    pub async fn get_services(
        &self,
        start_time: i64,
        end_time: i64,
        name_filter: Option<&str>,
    ) -> Result<ServiceListResult> {
        let started = Instant::now();

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT service_name AS name, COUNT(*) AS count, \
             COUNT(CASE WHEN status = 'ERROR' THEN 1 END) AS error_count, \
             AVG(duration) AS avg_latency \
             FROM traces WHERE start_time >= ",
        );
        qb.push_bind(start_time)
            .push(" AND start_time <= ")
            .push_bind(end_time)
            .push(" AND service_name IS NOT NULL");
        if let Some(filter) = name_filter.filter(|f| !f.is_empty()) {
            qb.push(" AND service_name ILIKE ")
                .push_bind(format!("%{filter}%"));
        }
        qb.push(" GROUP BY service_name ORDER BY count DESC LIMIT ")
            .push_bind(SERVICE_LIST_LIMIT);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OtelbaseError::Store(format!("query services failed: {e}")))?;

        let mut services = Vec::with_capacity(rows.len());
        for row in &rows {
            let count: i64 = get_col(row, "count")?;
            let error_count: i64 = get_col(row, "error_count")?;
            services.push(ServiceInfo {
                name: get_col(row, "name")?,
                count,
                error_count,
                error_rate: error_rate(error_count, count),
                avg_latency: get_col::<Option<f64>>(row, "avg_latency")?.unwrap_or(0.0),
            });
        }

        Ok(ServiceListResult {
            total: services.len() as i64,
            services,
            took: started.elapsed().as_millis() as i64,
        })
    }

    /// Per-service latency metrics with store-side continuous percentiles.
    pub async fn get_service_metrics(
        &self,
        start_time: i64,
        end_time: i64,
        service_name: Option<&str>,
    ) -> Result<Vec<ServiceMetric>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT service_name AS name, COUNT(*) AS count, \
             COUNT(CASE WHEN status = 'ERROR' THEN 1 END) AS error_count, \
             AVG(duration) AS avg_latency, \
             PERCENTILE_CONT(0.95) WITHIN GROUP (ORDER BY duration) AS p95_latency, \
             PERCENTILE_CONT(0.99) WITHIN GROUP (ORDER BY duration) AS p99_latency \
             FROM traces WHERE start_time >= ",
        );
        qb.push_bind(start_time)
            .push(" AND start_time <= ")
            .push_bind(end_time)
            .push(" AND service_name IS NOT NULL");
        if let Some(service) = service_name.filter(|s| !s.is_empty()) {
            qb.push(" AND service_name ILIKE ")
                .push_bind(format!("%{service}%"));
        }
        qb.push(" GROUP BY service_name ORDER BY count DESC LIMIT ")
            .push_bind(SERVICE_METRICS_LIMIT);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OtelbaseError::Store(format!("query service metrics failed: {e}")))?;

        let mut metrics = Vec::with_capacity(rows.len());
        for row in &rows {
            let request_count: i64 = get_col(row, "count")?;
            let error_count: i64 = get_col(row, "error_count")?;
            metrics.push(ServiceMetric {
                name: get_col(row, "name")?,
                request_count,
                error_count,
                avg_latency: get_col::<Option<f64>>(row, "avg_latency")?.unwrap_or(0.0),
                p95_latency: get_col::<Option<f64>>(row, "p95_latency")?.unwrap_or(0.0),
                p99_latency: get_col::<Option<f64>>(row, "p99_latency")?.unwrap_or(0.0),
                error_rate: error_rate(error_count, request_count),
            });
        }

        Ok(metrics)
    }
}

fn push_trace_where(qb: &mut QueryBuilder<'_, Postgres>, filter: &TraceFilter) {
    qb.push("start_time >= ").push_bind(filter.start_time);
    qb.push(" AND start_time <= ").push_bind(filter.end_time);

    if !filter.service_names.is_empty() {
        qb.push(" AND service_name IN (");
        let mut sep = qb.separated(", ");
        for name in &filter.service_names {
            sep.push_bind(name.clone());
        }
        qb.push(")");
    }

    if filter.root_spans_only {
        qb.push(" AND (parent_span_id IS NULL OR parent_span_id = '')");
    }

    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }

    if let Some(min) = filter.min_duration {
        qb.push(" AND duration >= ").push_bind(min);
    }
    if let Some(max) = filter.max_duration {
        qb.push(" AND duration <= ").push_bind(max);
    }

    if let Some(query) = filter.query.as_deref().filter(|q| !q.is_empty()) {
        let pattern = format!("%{query}%");
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR service_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR trace_id ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn row_to_trace_item(row: &PgRow) -> Result<TraceItem> {
    let status: Option<String> = get_col(row, "status")?;
    Ok(TraceItem {
        id: get_col(row, "id")?,
        trace_id: get_col(row, "trace_id")?,
        span_id: get_col(row, "span_id")?,
        parent_span_id: get_col(row, "parent_span_id")?,
        name: get_col(row, "name")?,
        service_name: get_col(row, "service_name")?,
        start_time: get_col(row, "start_time")?,
        end_time: get_col(row, "end_time")?,
        duration: get_col(row, "duration")?,
        status: status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(SpanStatus::Unset),
        attributes: attrs_from_json(get_col(row, "attributes")?),
    })
}

fn row_to_trace_group(row: &PgRow) -> Result<TraceGroup> {
    let services: Option<serde_json::Value> = get_col(row, "services")?;
    let services = services
        .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
        .unwrap_or_default();

    Ok(TraceGroup {
        trace_id: get_col(row, "trace_id")?,
        start_time: get_col(row, "start_time")?,
        duration: get_col(row, "duration")?,
        span_count: get_col(row, "span_count")?,
        services,
    })
}

fn get_col<'r, T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>>(
    row: &'r PgRow,
    name: &str,
) -> Result<T> {
    row.try_get(name)
        .map_err(|e| OtelbaseError::Store(format!("read column {name} failed: {e}")))
}

fn error_rate(error_count: i64, count: i64) -> f64 {
    if count > 0 {
        error_count as f64 / count as f64 * 100.0
    } else {
        0.0
    }
}
