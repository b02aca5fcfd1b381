mod telemetry;

use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use otelbase_api::cache::ResponseCache;
use otelbase_api::{routes, server, AppState};
use otelbase_core::config::Config;
use otelbase_ingest::consumer::{IngestPipeline, ServiceSink};
use otelbase_store::log_repo::LogRepository;
use otelbase_store::retention::RetentionJob;
use otelbase_store::service::{LogService, TraceService};
use otelbase_store::trace_repo::TraceRepository;
use otelbase_store::Db;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env().context("load configuration")?;
    telemetry::init_logging(&cfg.logger);
    info!("telemetry backend starting");

    let db = Db::connect(&cfg).await.context("connect to database")?;
    db.ensure_schema()
        .await
        .context("initialize database schema")?;

    let trace_service = TraceService::new(TraceRepository::new(&db));
    let log_service = LogService::new(LogRepository::new(&db));

    let shutdown = CancellationToken::new();

    let retention =
        RetentionJob::new(&db, cfg.retention.clone()).spawn(shutdown.child_token());

    let mut pipeline = IngestPipeline::new(
        cfg.kafka.clone(),
        ServiceSink {
            traces: trace_service.clone(),
            logs: log_service.clone(),
        },
        shutdown.child_token(),
    );
    pipeline.start().await.context("start bus consumer")?;

    let cache = ResponseCache::new(&cfg.cache);
    let app = routes::router(
        AppState {
            traces: trace_service,
            logs: log_service,
        },
        &cfg,
        cache,
    );

    let server_cfg = cfg.clone();
    let server_shutdown = shutdown.child_token();
    let mut server_task =
        tokio::spawn(async move { server::serve(&server_cfg, app, server_shutdown).await });

    info!(port = cfg.api.port, base_path = %cfg.api.base_path, "telemetry backend running");
    if cfg.cache.enabled {
        info!(ttl_secs = cfg.cache.ttl.as_secs(), "api response caching enabled");
    }

    // Block until a shutdown signal arrives or the API server dies on its
    // own.
    let early_exit = tokio::select! {
        res = &mut server_task => Some(res),
        signal = shutdown_signal() => {
            info!(signal, "shutdown signal received, stopping");
            None
        }
    };

    shutdown.cancel();

    let mut run_error = None;
    let teardown = async {
        match early_exit {
            Some(res) => match res {
                Ok(Ok(())) => warn!("query api exited before shutdown"),
                Ok(Err(e)) => {
                    error!(error = %e, "query api failed");
                    run_error = Some(anyhow::Error::from(e));
                }
                Err(e) => {
                    error!(error = %e, "query api task join failed");
                    run_error = Some(e.into());
                }
            },
            None => match server_task.await {
                Ok(Ok(())) => info!("query api stopped"),
                Ok(Err(e)) => error!(error = %e, "query api failed during shutdown"),
                Err(e) => error!(error = %e, "query api task join failed"),
            },
        }

        pipeline.stop().await;

        if let Some(handle) = retention {
            let _ = handle.await;
        }

        db.close().await;
    };

    if tokio::time::timeout(SHUTDOWN_GRACE, teardown).await.is_err() {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "shutdown grace period elapsed, exiting anyway"
        );
    }

    match run_error {
        Some(e) => Err(e),
        None => {
            info!("telemetry backend stopped");
            Ok(())
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "ctrl-c"
}
