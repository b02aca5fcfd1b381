use std::time::{Duration, Instant};

use sqlx::postgres::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use otelbase_core::config::RetentionConfig;
use otelbase_core::error::{OtelbaseError, Result};
use otelbase_core::time::now_millis;

use crate::db::Db;

const METRICS_PROBE_SQL: &str = r#"
    SELECT EXISTS (
        SELECT FROM information_schema.tables
        WHERE table_schema = 'public'
        AND table_name = 'metrics'
    )
"#;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RetentionStats {
    pub logs_deleted: u64,
    pub traces_deleted: u64,
    pub metrics_deleted: u64,
}

/// Periodic transactional cleanup of records older than the retention
/// window.
pub struct RetentionJob {
    pool: PgPool,
    cfg: RetentionConfig,
}

impl RetentionJob {
    pub fn new(db: &Db, cfg: RetentionConfig) -> Self {
        Self {
            pool: db.pool().clone(),
            cfg,
        }
    }

    /// Runs one cleanup immediately, then on every interval tick until
    /// the token is cancelled. Returns `None` when retention is disabled.
    pub fn spawn(self, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.cfg.enabled {
            info!("data retention is disabled");
            return None;
        }

        info!(
            interval_minutes = self.cfg.cleanup_interval_minutes,
            retention_days = self.cfg.retention_days,
            "data retention job started"
        );

        Some(tokio::spawn(async move {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "initial retention cleanup failed");
            }

            let interval = Duration::from_secs(self.cfg.cleanup_interval_minutes * 60);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("retention job stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, "retention cleanup failed");
                        }
                    }
                }
            }
        }))
    }

    /// One cleanup pass: deletes logs and traces older than the cutoff in
    /// a single transaction. The `metrics` table is not part of the
    /// bootstrap schema, so its delete only runs after a probe confirms
    /// the table exists.
    pub async fn run_once(&self) -> Result<RetentionStats> {
        let cutoff = now_millis() - self.cfg.retention_days * 86_400_000;
        let started = Instant::now();

        info!(
            retention_days = self.cfg.retention_days,
            cutoff_ms = cutoff,
            "cleaning up expired telemetry"
        );

        let metrics_table_exists: bool = sqlx::query_scalar(METRICS_PROBE_SQL)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| OtelbaseError::Store(format!("metrics table probe failed: {e}")))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OtelbaseError::Store(format!("begin cleanup transaction failed: {e}")))?;

        let logs_deleted = sqlx::query("DELETE FROM logs WHERE timestamp < $1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await
            .map_err(|e| OtelbaseError::Store(format!("log cleanup failed: {e}")))?
            .rows_affected();

        let traces_deleted = sqlx::query("DELETE FROM traces WHERE start_time < $1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await
            .map_err(|e| OtelbaseError::Store(format!("trace cleanup failed: {e}")))?
            .rows_affected();

        let metrics_deleted = if metrics_table_exists {
            sqlx::query("DELETE FROM metrics WHERE timestamp < $1")
                .bind(cutoff)
                .execute(&mut *tx)
                .await
                .map_err(|e| OtelbaseError::Store(format!("metric cleanup failed: {e}")))?
                .rows_affected()
        } else {
            debug!("metrics table absent, skipping metric cleanup");
            0
        };

        tx.commit()
            .await
            .map_err(|e| OtelbaseError::Store(format!("commit cleanup transaction failed: {e}")))?;

        info!(
            logs_deleted,
            traces_deleted,
            metrics_deleted,
            took_ms = started.elapsed().as_millis() as u64,
            "cleanup finished"
        );

        Ok(RetentionStats {
            logs_deleted,
            traces_deleted,
            metrics_deleted,
        })
    }
}
