use std::time::Instant;

use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{info, warn};

use otelbase_core::error::{OtelbaseError, Result};
use otelbase_core::filter::LogFilter;
use otelbase_core::model::attr::{attrs_from_json, attrs_to_json};
use otelbase_core::model::log::{
    LogItem, ServiceAggregation, Severity, SeverityAggregation,
};
use otelbase_core::query::LogQueryResult;

use crate::db::Db;

const UPSERT_LOG_SQL: &str = r#"
    INSERT INTO logs (
        id, timestamp, service_name, message, severity,
        trace_id, span_id, attributes
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (id) DO UPDATE SET
        service_name = EXCLUDED.service_name,
        message = EXCLUDED.message,
        severity = EXCLUDED.severity,
        trace_id = EXCLUDED.trace_id,
        span_id = EXCLUDED.span_id,
        attributes = EXCLUDED.attributes
"#;

const SERVICE_AGG_LIMIT: i64 = 20;

/// Fixed display ranking for severity aggregations, FATAL first.
const SEVERITY_RANK_SQL: &str = r#"
    CASE
        WHEN severity = 'FATAL' THEN 1
        WHEN severity = 'ERROR' THEN 2
        WHEN severity = 'WARN' THEN 3
        WHEN severity = 'INFO' THEN 4
        WHEN severity = 'DEBUG' THEN 5
        WHEN severity = 'TRACE' THEN 6
        ELSE 7
    END
"#;

#[derive(Clone)]
pub struct LogRepository {
    pool: PgPool,
}

impl LogRepository {
    pub fn new(db: &Db) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    pub async fn save_logs(&self, logs: &[LogItem]) -> Result<()> {
        if logs.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OtelbaseError::Store(format!("begin transaction failed: {e}")))?;

        for item in logs {
            let attributes = match attrs_to_json(&item.attributes) {
                Ok(v) => v,
                Err(e) => {
                    warn!(id = %item.id, error = %e, "skipping log with unserializable attributes");
                    continue;
                }
            };

            sqlx::query(UPSERT_LOG_SQL)
                .bind(&item.id)
                .bind(item.timestamp)
                .bind(&item.service_name)
                .bind(&item.message)
                .bind(item.severity.as_str())
                .bind(&item.trace_id)
                .bind(&item.span_id)
                .bind(attributes)
                .execute(&mut *tx)
                .await
                .map_err(|e| OtelbaseError::Store(format!("insert log failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| OtelbaseError::Store(format!("commit logs failed: {e}")))?;

        info!(count = logs.len(), "saved log batch");
        Ok(())
    }

    /// Page of matching logs, newest first, plus the service and severity
    /// aggregations and total count computed under the same WHERE.
    pub async fn query_logs(&self, filter: &LogFilter) -> Result<LogQueryResult> {
        let started = Instant::now();

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, timestamp, service_name, message, severity, \
             trace_id, span_id, attributes FROM logs WHERE ",
        );
        push_log_where(&mut qb, filter);
        qb.push(" ORDER BY timestamp DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OtelbaseError::Store(format!("query logs failed: {e}")))?;

        let mut logs = Vec::with_capacity(rows.len());
        for row in &rows {
            logs.push(row_to_log_item(row)?);
        }

        let mut service_qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT service_name AS name, COUNT(*) AS count FROM logs WHERE ",
        );
        push_log_where(&mut service_qb, filter);
        service_qb
            .push(" GROUP BY service_name ORDER BY count DESC LIMIT ")
            .push_bind(SERVICE_AGG_LIMIT);

        let service_rows = service_qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OtelbaseError::Store(format!("query service aggregation failed: {e}")))?;

        let mut severity_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT severity AS name, COUNT(*) AS count FROM logs WHERE ");
        push_log_where(&mut severity_qb, filter);
        severity_qb
            .push(" GROUP BY severity ORDER BY ")
            .push(SEVERITY_RANK_SQL);

        let severity_rows = severity_qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OtelbaseError::Store(format!("query severity aggregation failed: {e}")))?;

        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM logs WHERE ");
        push_log_where(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| OtelbaseError::Store(format!("count logs failed: {e}")))?;

        Ok(LogQueryResult {
            logs,
            services: map_aggregations(&service_rows, |name, count| ServiceAggregation {
                name,
                count,
            })?,
            severities: map_aggregations(&severity_rows, |name, count| SeverityAggregation {
                name,
                count,
            })?,
            total,
            took: started.elapsed().as_millis() as i64,
        })
    }

    /// Top services by log volume in a window, for the summary endpoint.
    pub async fn get_service_aggregation(
        &self,
        start_time: i64,
        end_time: i64,
    ) -> Result<Vec<ServiceAggregation>> {
        let rows = sqlx::query(
            "SELECT service_name AS name, COUNT(*) AS count FROM logs \
             WHERE timestamp >= $1 AND timestamp <= $2 \
             GROUP BY service_name ORDER BY count DESC LIMIT 20",
        )
        .bind(start_time)
        .bind(end_time)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OtelbaseError::Store(format!("query service aggregation failed: {e}")))?;

        map_aggregations(&rows, |name, count| ServiceAggregation { name, count })
    }

    pub async fn get_severity_aggregation(
        &self,
        start_time: i64,
        end_time: i64,
    ) -> Result<Vec<SeverityAggregation>> {
        let sql = format!(
            "SELECT severity AS name, COUNT(*) AS count FROM logs \
             WHERE timestamp >= $1 AND timestamp <= $2 \
             GROUP BY severity ORDER BY {SEVERITY_RANK_SQL}"
        );
        let rows = sqlx::query(&sql)
            .bind(start_time)
            .bind(end_time)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OtelbaseError::Store(format!("query severity aggregation failed: {e}")))?;

        map_aggregations(&rows, |name, count| SeverityAggregation { name, count })
    }
}

fn push_log_where(qb: &mut QueryBuilder<'_, Postgres>, filter: &LogFilter) {
    qb.push("timestamp >= ").push_bind(filter.start_time);
    qb.push(" AND timestamp <= ").push_bind(filter.end_time);

    if !filter.service_names.is_empty() {
        qb.push(" AND service_name IN (");
        let mut sep = qb.separated(", ");
        for name in &filter.service_names {
            sep.push_bind(name.clone());
        }
        qb.push(")");
    }

    if let Some(severity) = filter.severity {
        qb.push(" AND severity = ").push_bind(severity.as_str());
    }

    if let Some(trace_id) = filter.trace_id.as_deref().filter(|t| !t.is_empty()) {
        qb.push(" AND trace_id = ").push_bind(trace_id.to_string());
    }

    if filter.has_trace {
        qb.push(" AND trace_id IS NOT NULL AND trace_id <> ''");
    }

    if let Some(query) = filter.query.as_deref().filter(|q| !q.is_empty()) {
        let pattern = format!("%{query}%");
        qb.push(" AND (message ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR service_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn row_to_log_item(row: &PgRow) -> Result<LogItem> {
    let severity: String = get_col(row, "severity")?;
    Ok(LogItem {
        id: get_col(row, "id")?,
        timestamp: get_col(row, "timestamp")?,
        service_name: get_col(row, "service_name")?,
        message: get_col(row, "message")?,
        severity: severity.parse().unwrap_or(Severity::Info),
        trace_id: get_col(row, "trace_id")?,
        span_id: get_col(row, "span_id")?,
        attributes: attrs_from_json(get_col(row, "attributes")?),
    })
}

fn map_aggregations<T>(rows: &[PgRow], make: impl Fn(String, i64) -> T) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(make(get_col(row, "name")?, get_col(row, "count")?));
    }
    Ok(out)
}

fn get_col<'r, T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>>(
    row: &'r PgRow,
    name: &str,
) -> Result<T> {
    row.try_get(name)
        .map_err(|e| OtelbaseError::Store(format!("read column {name} failed: {e}")))
}
