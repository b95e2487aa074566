//! blockwatch Binary Entry Point
//!
//! Runs the block collection service with its HTTP API.
//! Core functionality is provided by the `blockwatch` library crate.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use blockwatch::{
    BlockCollector, CollectionScheduler, RetentionManager, SourceClient, StorageBuilder,
    config::{AppConfig, parse_duration},
    server::{AppState, create_router},
};
use clap::Parser;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// blockwatch - scheduled block collection service
#[derive(Parser, Debug)]
#[command(name = "blockwatch", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "BLOCKWATCH_CONFIG"
    )]
    config: String,

    /// Block source endpoint URL (overrides config file)
    #[arg(long, env = "BLOCKWATCH_SOURCE_URL")]
    source_url: Option<String>,

    /// Database URL or path (overrides config file)
    #[arg(long, env = "BLOCKWATCH_DB_URL")]
    db_url: Option<String>,

    /// Collection interval in seconds (overrides config file)
    #[arg(long, env = "BLOCKWATCH_FETCH_INTERVAL")]
    interval: Option<u64>,

    /// Maximum number of stored blocks (overrides config file)
    #[arg(long, env = "BLOCKWATCH_MAX_STORED_BLOCKS")]
    max_blocks: Option<u32>,

    /// Maximum block age in days, 0 disables (overrides config file)
    #[arg(long, env = "BLOCKWATCH_MAX_STORAGE_DAYS")]
    max_age_days: Option<u32>,

    /// Periodic auto cleanup cadence, e.g. `1h` (overrides config file)
    #[arg(long, env = "BLOCKWATCH_AUTO_CLEANUP_INTERVAL", value_parser = parse_duration)]
    auto_cleanup_interval: Option<Duration>,

    /// Server port (overrides config file)
    #[arg(long, env = "BLOCKWATCH_SERVER_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,blockwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("blockwatch - block collection service");

    let cli = Cli::parse();

    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(url) = cli.source_url {
        config.source.url = url;
    }
    if let Some(url) = cli.db_url {
        config.database.url = url;
    }
    if let Some(secs) = cli.interval {
        config.collector.interval = Duration::from_secs(secs);
    }
    if let Some(max_blocks) = cli.max_blocks {
        config.retention.max_blocks = max_blocks;
    }
    if let Some(days) = cli.max_age_days {
        config.retention.max_age_days = days;
    }
    if let Some(every) = cli.auto_cleanup_interval {
        config.retention.auto_cleanup_interval = Some(every);
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;

    tracing::info!(
        source = %config.source.url,
        database = %config.database.url,
        interval = ?config.collector.interval,
        max_blocks = config.retention.max_blocks,
        max_age_days = config.retention.max_age_days,
        "Configuration loaded"
    );

    // Build storage layer; failure here is fatal
    let handles = StorageBuilder::new(&config.database.url)
        .max_connections(config.database.max_connections)
        .build()
        .await?;
    tracing::info!("Storage initialized");

    let source = SourceClient::new(config.source.clone())?;
    let collector = Arc::new(BlockCollector::new(Arc::new(source), handles.blocks.clone()));
    let scheduler = Arc::new(CollectionScheduler::new(
        collector,
        config.collector.interval,
    ));
    let retention = Arc::new(RetentionManager::new(
        handles.admin.clone(),
        config.retention.policy(),
    ));

    let cleanup_task = config
        .retention
        .auto_cleanup_interval
        .map(|every| Arc::clone(&retention).spawn_periodic(every));

    let app = create_router(AppState {
        blocks: handles.blocks.clone(),
        admin: handles.admin.clone(),
        scheduler: Arc::clone(&scheduler),
        retention,
    });

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Web server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    // Started after the bind so the API answers while the source is probed
    let startup_task = if config.collector.autostart {
        let scheduler = Arc::clone(&scheduler);
        Some(tokio::spawn(async move {
            if let Err(e) = scheduler.start().await {
                tracing::error!("Failed to start collection scheduler: {}", e);
            }
        }))
    } else {
        tracing::info!("Collection scheduler autostart disabled");
        None
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&scheduler), cleanup_task))
        .await?;

    if let Some(task) = startup_task {
        task.abort();
    }

    tracing::info!("Shutting down storage...");
    if let Err(e) = handles.shutdown().await {
        tracing::error!("Failed to shutdown storage: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then stop scheduled work.
///
/// In-flight cycles are not cancelled; only future firings are.
async fn shutdown_signal(scheduler: Arc<CollectionScheduler>, cleanup_task: Option<JoinHandle<()>>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    tracing::info!("Stopping collection scheduler...");
    scheduler.stop();

    if let Some(task) = cleanup_task {
        task.abort();
        tracing::info!("Periodic auto cleanup stopped");
    }
}
