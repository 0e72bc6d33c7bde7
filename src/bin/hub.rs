use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use synthetic_monitoring::{
    actors::{
        retention::{CLEANUP_INTERVAL, RetentionHandle},
        runner::{RunnerHandle, StoreDirectory},
        scheduler::{SchedulerHandle, SchedulerOptions, TriggerChannel},
    },
    api::{ApiConfig, ApiState, spawn_api_server},
    browser::http::HttpEngine,
    config::{Config, StorageConfig, read_config_file},
    live::LiveEventBus,
    model::Site,
    monitors::{CheckExecutor, ExecutorOptions},
    storage::{MemoryStore, RunStore},
    util::{get_api_token, get_bind_addr},
};
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("synthetic_monitoring", LevelFilter::TRACE),
        ("sentinel_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let (store, retention_days) = open_store(&config.storage).await?;
    seed_sites(store.as_ref(), &config).await?;

    let bus = LiveEventBus::new(config.events.idle_timeout());
    let (triggers, trigger_rx) = TriggerChannel::new(config.runner.queue_capacity);
    let triggers = Arc::new(triggers);

    let state = ApiState::new(store.clone(), bus, triggers.clone());

    let executor = CheckExecutor::new(
        Arc::new(HttpEngine::new()),
        ExecutorOptions::from(&config.browser),
    );
    let runner = RunnerHandle::spawn(
        trigger_rx,
        Arc::new(StoreDirectory::new(store.clone())),
        executor,
        Arc::new(state.ingest.clone()),
        config.runner.max_concurrent_runs,
    );

    let scheduler = SchedulerHandle::spawn(
        store.clone(),
        triggers,
        SchedulerOptions::from(&config.scheduler),
    );

    let retention = retention_days
        .map(|days| RetentionHandle::spawn(store.clone(), days, CLEANUP_INTERVAL));

    let api_config = ApiConfig {
        bind_addr: get_bind_addr(&config.api),
        auth_token: get_api_token(&config.api),
        enable_cors: config.api.enable_cors,
    };
    if api_config.auth_token.is_none() {
        warn!("no API token configured, the API is open");
    }
    spawn_api_server(api_config, state).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("received shutdown signal");

    if let Err(e) = scheduler.shutdown().await {
        error!("failed to stop scheduler: {e:#}");
    }
    match runner.stats().await {
        Ok(stats) => debug!("runner stats at shutdown: {stats:?}"),
        Err(e) => error!("failed to query runner stats: {e:#}"),
    }
    if let Err(e) = runner.shutdown().await {
        error!("failed to stop runner: {e:#}");
    }
    if let Some(retention) = retention
        && let Err(e) = retention.shutdown().await
    {
        error!("failed to stop retention: {e:#}");
    }

    Ok(())
}

/// Open the configured store; returns the retention period when it applies
async fn open_store(config: &StorageConfig) -> anyhow::Result<(Arc<dyn RunStore>, Option<u32>)> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage, runs are lost on restart");
            Ok((Arc::new(MemoryStore::new()), None))
        }

        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite {
            path,
            retention_days,
        } => {
            use synthetic_monitoring::storage::sqlite::SqliteStore;

            info!("using SQLite storage at {}", path.display());
            let store = SqliteStore::new(path)
                .await
                .with_context(|| format!("failed to open database {}", path.display()))?;
            Ok((Arc::new(store), Some(*retention_days)))
        }

        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("SQLite storage requested but the storage-sqlite feature is disabled")
        }
    }
}

/// Write the configured sites into the store
async fn seed_sites(store: &dyn RunStore, config: &Config) -> anyhow::Result<()> {
    for entry in &config.sites {
        let site = Site::from(entry.clone());
        debug!(
            site_id = site.id,
            "registering {} with {} enabled pages",
            site.name,
            site.enabled_pages().count()
        );
        store
            .put_site(site)
            .await
            .with_context(|| format!("failed to register site {}", entry.id))?;
    }

    info!("registered {} sites", config.sites.len());
    Ok(())
}
