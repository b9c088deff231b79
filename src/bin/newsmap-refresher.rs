//! Newsmap refresher - background process that keeps the cluster and
//! projection caches fresh.
//!
//! ```text
//! newsmap-refresher [--config <path>] [--once]
//! ```
//!
//! Runs until SIGTERM or Ctrl+C, which stop the loop at the next cycle
//! boundary. `--once` runs a single cycle and exits.

use anyhow::Context;
use clap::Parser;
use newsmap::{LogFormat, RefreshConfig, RefreshPipeline, RefreshScheduler};
use std::path::Path;
use std::sync::Arc;
use store::{BackendConfig, NewsStore};
use vector::{InMemoryVectorStore, VectorStoreConfig};

#[derive(Parser, Debug)]
#[command(
    name = "newsmap-refresher",
    about = "Keep the news map cluster and projection caches fresh"
)]
struct Args {
    /// Configuration file; `newsmap.{toml,yaml,json}` is tried when omitted
    #[arg(long)]
    config: Option<String>,

    /// Run a single refresh cycle and exit
    #[arg(long)]
    once: bool,
}

fn init_tracing(cfg: &RefreshConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(cfg.log_level.as_str())
        .with_target(false);
    match cfg.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn open_store(cfg: &RefreshConfig) -> anyhow::Result<NewsStore> {
    let Some(path) = cfg.database_path() else {
        tracing::warn!("no database_path configured, using in-memory store");
        return Ok(NewsStore::in_memory());
    };
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    NewsStore::open(&BackendConfig::redb(path)).with_context(|| format!("opening {path}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = RefreshConfig::load(args.config.as_deref())?;
    init_tracing(&cfg);

    let store = Arc::new(open_store(&cfg)?);
    let vectors = Arc::new(InMemoryVectorStore::new(VectorStoreConfig::new(
        cfg.vector_dimensions,
        cfg.vector_ttl(),
    )));
    let pipeline = Arc::new(RefreshPipeline::new(&cfg, store.clone(), store, vectors));
    let scheduler = RefreshScheduler::new(pipeline, cfg.refresh_interval());

    if args.once {
        let report = scheduler.run_once().await?;
        tracing::info!(
            cells_refreshed = report.grid.cells_refreshed,
            cells_failed = report.grid.cells_failed,
            "refresh_once_complete"
        );
        return Ok(());
    }

    let handle = scheduler.spawn();
    shutdown_signal().await;
    handle.stop();
    handle.join().await?;

    tracing::info!("refresher shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, stopping after the current cycle..."),
        _ = terminate => tracing::info!("Received SIGTERM, stopping after the current cycle..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_config_and_once() {
        let args = Args::try_parse_from(["newsmap-refresher", "--config", "cfg.toml", "--once"])
            .unwrap();
        assert_eq!(args.config.as_deref(), Some("cfg.toml"));
        assert!(args.once);

        let args = Args::try_parse_from(["newsmap-refresher"]).unwrap();
        assert!(args.config.is_none());
        assert!(!args.once);
    }

    #[test]
    fn rejects_unknown_flags_and_missing_values() {
        assert!(Args::try_parse_from(["newsmap-refresher", "--bogus"]).is_err());
        assert!(Args::try_parse_from(["newsmap-refresher", "--config"]).is_err());
    }
}
