use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use inkframe::{
    catalog::{InMemoryCatalog, TargetCatalog},
    config::Config,
    content::{ArtifactStorage, ContentStore},
    database::{
        Database,
        repositories::{RenderJobSeaOrmRepository, RenderedContentSeaOrmRepository},
    },
    events::{BroadcastEventSink, JobEventSink},
    job_scheduling::{QueueManager, WorkerPool},
    observability::init_tracing,
    plugins::{PluginRegistry, register_builtin_plugins},
    rendering::RenderOrchestrator,
};

#[derive(Parser)]
#[command(name = "inkframe")]
#[command(version)]
#[command(about = "Scheduled rendering of bit-depth-correct images for e-ink displays")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Number of render workers (overrides config file)
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json)?;

    info!("Starting inkframe v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }
    if let Some(workers) = cli.workers {
        config.worker_pool.workers = workers;
    }
    config.worker_pool.validate()?;

    info!("Using database: {}", config.database.url);
    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    info!("Database connection established and migrations applied");

    let catalog: Arc<dyn TargetCatalog> = Arc::new(
        InMemoryCatalog::load_from_file(&config.catalog.path)
            .await
            .with_context(|| format!("Failed to load catalog {}", config.catalog.path.display()))?,
    );

    let registry = Arc::new(PluginRegistry::new());
    register_builtin_plugins(&registry);
    info!("Registered plugins: {}", registry.list_plugins().join(", "));

    let events = BroadcastEventSink::new(256);
    let mut event_log = events.subscribe();
    tokio::spawn(async move {
        loop {
            match event_log.recv().await {
                Ok((user_id, event)) => debug!(
                    "Job {} of user {} is now {}: {}",
                    event.job_id, user_id, event.status, event.message
                ),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Event log lagged, skipped {} event(s)", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
    let events: Arc<dyn JobEventSink> = Arc::new(events);

    tokio::fs::create_dir_all(&config.storage.rendered_content_path)
        .await
        .with_context(|| {
            format!(
                "Failed to create rendered content directory {}",
                config.storage.rendered_content_path.display()
            )
        })?;
    let content = ContentStore::new(
        RenderedContentSeaOrmRepository::new(database.connection()),
        ArtifactStorage::new(config.storage.rendered_content_path.clone()),
    );

    let queue = Arc::new(QueueManager::new(
        RenderJobSeaOrmRepository::new(database.connection()),
        catalog.clone(),
        config.queue.clone(),
    ));
    let orchestrator = Arc::new(RenderOrchestrator::new(
        catalog,
        registry,
        content,
        queue.clone(),
        events.clone(),
    ));
    let pool = WorkerPool::new(&config, orchestrator, events);
    queue.attach_submitter(pool.submitter());

    match queue.ensure_scheduled().await {
        Ok(count) => info!("{} target(s) newly scheduled", count),
        Err(e) => warn!("Failed to seed target schedules: {}", e),
    }

    pool.start().await?;
    info!("inkframe is running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    pool.stop().await?;
    info!("inkframe stopped");
    Ok(())
}
