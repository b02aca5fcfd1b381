use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use otelbase_core::config::Config;
use otelbase_core::error::{OtelbaseError, Result};

use crate::schema::SCHEMA_SQL;

const SCHEMA_PROBE_SQL: &str = r#"
    SELECT EXISTS (
        SELECT FROM information_schema.tables
        WHERE table_schema = 'public'
        AND table_name = 'traces'
    )
"#;

/// Shared PostgreSQL handle: the connection pool plus schema bootstrap.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.database.max_conns)
            .idle_timeout(Duration::from_secs(30))
            .max_lifetime(Duration::from_secs(5 * 60))
            .acquire_timeout(Duration::from_secs(30))
            .connect(&cfg.database_url())
            .await
            .map_err(|e| OtelbaseError::Store(format!("database connect failed: {e}")))?;

        info!(
            host = %cfg.database.host,
            port = cfg.database.port,
            dbname = %cfg.database.dbname,
            max_conns = cfg.database.max_conns,
            "database connected"
        );

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Probes for the sentinel `traces` table and applies the bootstrap
    /// DDL in one transaction when it is missing. Callers treat any error
    /// here as fatal.
    pub async fn ensure_schema(&self) -> Result<()> {
        let initialized: bool = sqlx::query_scalar(SCHEMA_PROBE_SQL)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| OtelbaseError::Store(format!("schema probe failed: {e}")))?;

        if initialized {
            info!("database schema already initialized");
            return Ok(());
        }

        info!("database schema missing, applying bootstrap DDL");
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OtelbaseError::Store(format!("begin schema transaction failed: {e}")))?;

        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&mut *tx)
            .await
            .map_err(|e| OtelbaseError::Store(format!("schema bootstrap failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| OtelbaseError::Store(format!("commit schema transaction failed: {e}")))?;

        info!("database schema initialized");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("database pool closed");
    }
}
