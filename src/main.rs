//! Sentinel Bridge - NVR person detections to risk-scored alerts
//!
//! Main entry point for the bridge process.

use sentinel_bridge::{
    action_executor::ActionExecutor,
    bus::{BusClient, EventQueue},
    config_store::ConfigStore,
    confirmation::ConfirmationController,
    delivery_client::DeliveryClient,
    event_intake::EventIntake,
    event_memory::EventMemory,
    pipeline::Pipeline,
    policy_engine::PolicyEngine,
    publisher::Publisher,
    snapshot_fetcher::{self, SnapshotFetcher},
    vision_client::VisionClient,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Fallback config path when neither the CLI arg nor the env var is set
const DEFAULT_CONFIG_PATH: &str = "/etc/sentinel-bridge/config.json";

/// Grace period for in-flight events after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel_bridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Sentinel Bridge v{}", env!("CARGO_PKG_VERSION"));

    // Config path: CLI arg, then env, then default
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SENTINEL_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    // An invalid document refuses startup; reload failures later keep the
    // previous snapshot
    let config_store = Arc::new(ConfigStore::load(config_path)?);
    let config = config_store.snapshot().await;
    tracing::info!(
        mqtt_host = %config.mqtt_host,
        nvr_api = %config.nvr_api,
        vision_endpoint = %config.vision_endpoint,
        "Configuration loaded"
    );

    // Stores must exist before the first event
    tokio::fs::create_dir_all(config.snapshot_base_dir.join("ai-snapshots")).await?;
    tokio::fs::create_dir_all(config.snapshot_base_dir.join("ai-clips")).await?;
    tokio::fs::create_dir_all(config.staging_dir.join("ai-snapshots")).await?;

    let watcher = Arc::clone(&config_store).spawn_watcher();

    // Initialize components
    let queue = Arc::new(EventQueue::new(config.event_queue_capacity));
    let (bus, bus_task) = BusClient::start(&config, Arc::clone(&queue));

    let fetcher = Arc::new(SnapshotFetcher::new());
    let vision = Arc::new(VisionClient::new());
    let memory = Arc::new(EventMemory::new(
        config.event_history_file.clone(),
        config.event_history_max_lines,
    ));
    let policy = Arc::new(PolicyEngine::new(Arc::clone(&memory)));

    if vision.health_check(&config.vision_endpoint).await {
        tracing::info!(endpoint = %config.vision_endpoint, "Vision endpoint reachable");
    } else {
        tracing::warn!(endpoint = %config.vision_endpoint, "Vision endpoint not reachable at startup");
    }

    let pipeline = Arc::new(Pipeline {
        config_store: Arc::clone(&config_store),
        intake: EventIntake::new(),
        fetcher: Arc::clone(&fetcher),
        vision: Arc::clone(&vision),
        policy,
        confirmation: ConfirmationController::new(fetcher, vision),
        executor: ActionExecutor::new(),
        delivery: DeliveryClient::new(),
        publisher: Publisher::new(bus.clone()),
        memory,
    });

    // Staging sweeper
    let sweeper_store = Arc::clone(&config_store);
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let config = sweeper_store.snapshot().await;
            snapshot_fetcher::sweep_staging(
                &config.staging_dir,
                Duration::from_secs(config.staging_ttl_seconds),
            )
            .await;
        }
    });

    // Worker loop
    let worker = tokio::spawn(Arc::clone(&pipeline).run(Arc::clone(&queue)));
    tracing::info!("Pipeline started, waiting for detections");

    // Graceful shutdown on SIGTERM/SIGINT
    shutdown_signal().await;
    tracing::info!(grace_secs = SHUTDOWN_GRACE.as_secs(), "Shutdown signal received");

    worker.abort();
    tokio::time::sleep(SHUTDOWN_GRACE).await;

    sweeper.abort();
    watcher.abort();
    bus.shutdown().await;
    bus_task.abort();

    tracing::info!("Sentinel Bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
