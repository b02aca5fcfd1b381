use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use otelbase_core::config::Config;
use otelbase_core::error::{OtelbaseError, Result};

/// Binds the query API and serves it until the token is cancelled, then
/// drains in-flight requests.
pub async fn serve(cfg: &Config, router: Router, shutdown: CancellationToken) -> Result<()> {
    let addr = format!("{}:{}", cfg.api.host, cfg.api.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| OtelbaseError::Internal(format!("bind {addr} failed: {e}")))?;

    info!(addr = %addr, base_path = %cfg.api.base_path, "query api listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| OtelbaseError::Internal(format!("query api server failed: {e}")))
}
