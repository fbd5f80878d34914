use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use modlog::store::SystemClock;
use modlog::{AuditCache, AuditEvents, Config, HttpFetcher, KvEngine, RetentionSweeper};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("modlog=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting modlog...");

    let config = Config::from_env().context("invalid configuration")?;
    info!("Configuration loaded successfully");
    info!(
        "Retention {:?}, attachment ceiling {} bytes",
        config.audit.retention, config.audit.attachment_max_bytes
    );

    let path = config.database_path();
    let engine = KvEngine::open(&path, Arc::new(SystemClock))
        .with_context(|| format!("failed to open audit store at {}", path.display()))?;
    info!("Audit store opened at {}", path.display());

    let fetcher = HttpFetcher::new(config.audit.attachment_timeout)
        .context("failed to build HTTP client")?;
    let cache = AuditCache::new(Arc::new(engine), Arc::new(fetcher), config.audit.clone());

    let stats = cache.stats().await?;
    info!(
        "Cache holds {} member(s), {} message(s), {} index entries",
        stats.members, stats.messages, stats.index_entries
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = RetentionSweeper::new(cache.clone(), config.sweeper.clone());
    let sweeper = tokio::spawn(sweeper.run(shutdown_rx));

    // No gateway client runs in this binary. The router is held until shutdown.
    let events = AuditEvents::new(cache);
    info!("Audit cache ready");

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("Shutting down...");

    drop(events);
    shutdown_tx.send(true).ok();
    sweeper.await.context("sweeper task panicked")?;

    Ok(())
}
