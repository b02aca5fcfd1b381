use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

use otelbase_core::config::LoggerConfig;

/// Dev mode gets compact human output; everything else emits JSON lines.
pub fn init_logging(cfg: &LoggerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if cfg.is_dev {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(std::io::stderr().is_terminal())
            .compact()
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init();
    }
}
