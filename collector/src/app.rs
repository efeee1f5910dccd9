//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME, APP_NAME_LOWER, ENV_LOG, SHUTDOWN_TIMEOUT_SECS};
use crate::core::shutdown::ShutdownService;
use crate::data::bus::{SystemdBus, UnitBus};
use crate::data::store::{InfluxStore, MetricStore};
use crate::domain::pipeline::DispatchLoop;
use crate::domain::stats::PipelineStats;

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub store: Arc<InfluxStore>,
    pub stats: Arc<PipelineStats>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        match command {
            Some(Commands::Check) => Self::check(&cli_config).await,
            Some(Commands::Run) | None => {
                let app = Self::init(&cli_config).await?;
                app.start().await
            }
        }
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let store = Self::connect_store(&config).await?;

        Ok(Self {
            shutdown: ShutdownService::new(),
            config,
            store: Arc::new(store),
            stats: PipelineStats::new(),
        })
    }

    async fn connect_store(config: &AppConfig) -> Result<InfluxStore> {
        let store = InfluxStore::new(&config.store).context("Failed to create InfluxDB client")?;
        store
            .ping()
            .await
            .with_context(|| format!("InfluxDB is not reachable at {}", config.store.url))?;
        tracing::debug!(url = %config.store.url, "InfluxDB reachable");
        Ok(store)
    }

    /// Verify both external systems, report, and exit
    async fn check(cli: &CliConfig) -> Result<()> {
        let config = AppConfig::load(cli)?;

        Self::connect_store(&config).await?;
        println!("InfluxDB:   ok ({})", config.store.url);

        let mut bus = SystemdBus::connect(config.pipeline.channel_capacity)
            .await
            .context("Failed to connect to the system bus")?;
        bus.subscribe()
            .await
            .context("Failed to subscribe to systemd unit signals")?;
        println!("System bus: ok");

        println!(
            "Destination: database={} retention_policy={} precision={} consistency={}",
            config.destination.database,
            config.destination.retention_policy,
            config.destination.precision,
            config.destination.consistency.as_str(),
        );
        Ok(())
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start(self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        self.shutdown.install_signal_handlers();

        let bus = SystemdBus::connect(self.config.pipeline.channel_capacity)
            .await
            .context("Failed to connect to the system bus")?;

        tracing::info!(
            url = %self.config.store.url,
            database = %self.config.destination.database,
            "{} collecting unit state changes",
            APP_NAME
        );

        let store: Arc<dyn MetricStore> = self.store.clone();
        collect(
            bus,
            store,
            &self.config,
            &self.shutdown,
            self.stats.clone(),
        )
        .await
    }
}

/// Wire a bus to a store and run the dispatch loop until shutdown.
///
/// Returns an error if the bus signal stream ends on its own, after the
/// already queued notifications have been written.
pub async fn collect<B: UnitBus>(
    mut bus: B,
    store: Arc<dyn MetricStore>,
    config: &AppConfig,
    shutdown: &ShutdownService,
    stats: Arc<PipelineStats>,
) -> Result<()> {
    bus.subscribe()
        .await
        .context("Failed to subscribe to systemd unit signals")?;

    let capacity = config.pipeline.channel_capacity;
    let (updates_tx, updates_rx) = mpsc::channel(capacity);
    let (errors_tx, errors_rx) = mpsc::channel(capacity);

    let mut forwarder = bus
        .set_subscriber(updates_tx, errors_tx)
        .context("Failed to start the bus signal forwarder")?;

    let dispatch = DispatchLoop::new(
        store,
        config.destination.clone(),
        config.pipeline.clone(),
        stats,
    );
    shutdown
        .register(dispatch.start(updates_rx, errors_rx, shutdown.subscribe()))
        .await;

    let stream_ended = tokio::select! {
        _ = shutdown.wait() => false,
        _ = &mut forwarder => true,
    };

    forwarder.abort();
    if !shutdown.shutdown().await {
        anyhow::bail!(
            "Dispatch loop did not stop within {}s, unwritten points may be lost",
            SHUTDOWN_TIMEOUT_SECS
        );
    }

    if stream_ended {
        anyhow::bail!("System bus signal stream ended unexpectedly");
    }
    Ok(())
}
