//! Exposure Agent CLI
//!
//! Syncs diagnosis key packages and scores exposure windows.

use anyhow::Context;
use clap::{Parser, Subcommand};
use exposure_agent::{
    appconfig::{AppConfigProvider, FileAppConfigProvider},
    clock::{Clock, SystemClock},
    config::Config,
    download::{
        BasePackageSyncTool, DayPackageSyncTool, HourPackageSyncTool, KeyDownloadTool,
        KeyPackageSyncTool, KeyServer,
    },
    location::LocationCatalog,
    network::StaticNetworkState,
    risk::{DefaultRiskLevels, ExposureWindow},
    storage::{CacheType, FileKeyCache, KeyCacheStore, SyncSettings},
    transparency::{create_shared_log_with_persistence, SharedTransparencyLog},
    VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "exposure-agent")]
#[command(version = VERSION)]
#[command(about = "Diagnosis key sync and exposure risk scoring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one key package sync
    Sync {
        /// Treat the connection as metered (day packages only)
        #[arg(long)]
        metered: bool,

        /// Location to sync (repeatable, overrides the configured locations)
        #[arg(long = "location", short)]
        locations: Vec<String>,
    },

    /// Sync periodically until interrupted
    Run {
        /// Seconds between syncs (defaults to the configured interval)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Score exposure windows from a JSON file
    Score {
        /// JSON array of exposure windows
        path: PathBuf,
    },

    /// Show sync state and activity statistics
    Status,

    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("exposure_agent=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Could not load config, using defaults");
        Config::default()
    });

    match cli.command {
        Commands::Sync { metered, locations } => cmd_sync(config, metered, locations).await,
        Commands::Run { interval } => cmd_run(config, interval).await,
        Commands::Score { path } => cmd_score(config, &path).await,
        Commands::Status => cmd_status(config).await,
        Commands::Config => {
            cmd_config(&config);
            Ok(())
        }
    }
}

/// Everything one sync run needs.
struct Agent {
    sync_tool: KeyPackageSyncTool,
    transparency_log: SharedTransparencyLog,
}

impl Agent {
    async fn build(config: &Config, catalog: LocationCatalog, metered: bool) -> anyhow::Result<Self> {
        config
            .ensure_directories()
            .context("Could not create data directories")?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache: Arc<dyn KeyCacheStore> =
            Arc::new(FileKeyCache::open(&config.cache_path, clock.clone()).await?);
        let downloader = Arc::new(KeyDownloadTool::new(
            key_server(config)?,
            cache.clone(),
            config.retry_policy(),
        ));

        let day_sync = Arc::new(DayPackageSyncTool::new(
            BasePackageSyncTool::new(cache.clone(), downloader.clone()),
            clock.clone(),
        ));
        let hour_sync = Arc::new(HourPackageSyncTool::new(
            BasePackageSyncTool::new(cache.clone(), downloader),
            clock.clone(),
        ));
        let settings = Arc::new(SyncSettings::with_persistence(config.settings_path())?);

        let sync_tool = KeyPackageSyncTool::new(
            catalog,
            cache,
            day_sync,
            hour_sync,
            settings,
            clock,
            Arc::new(StaticNetworkState::metered(metered)),
        );

        Ok(Self {
            sync_tool,
            transparency_log: create_shared_log_with_persistence(config.stats_path()),
        })
    }

    async fn sync_once(&self) -> anyhow::Result<()> {
        let result = self.sync_tool.sync_key_files().await?;
        self.transparency_log
            .record_sync(result.was_day_sync_successful, result.new_keys.len() as u64);
        if let Err(e) = self.transparency_log.save() {
            tracing::warn!(error = %e, "Could not save activity stats");
        }

        println!(
            "Sync finished: {} new packages, day sync {}",
            result.new_keys.len(),
            if result.was_day_sync_successful {
                "successful"
            } else {
                "failed"
            }
        );
        for key in &result.new_keys {
            println!("  {}", key.info.id);
        }
        Ok(())
    }
}

#[cfg(feature = "http")]
fn key_server(config: &Config) -> anyhow::Result<Arc<dyn KeyServer>> {
    use exposure_agent::download::{HttpKeyServer, KeyServerConfig};

    let server = HttpKeyServer::new(KeyServerConfig::new(
        config.server_url.clone(),
        config.request_timeout,
    ))?;
    Ok(Arc::new(server))
}

#[cfg(not(feature = "http"))]
fn key_server(_config: &Config) -> anyhow::Result<Arc<dyn KeyServer>> {
    anyhow::bail!("Built without the `http` feature, no key server available")
}

async fn cmd_sync(config: Config, metered: bool, locations: Vec<String>) -> anyhow::Result<()> {
    let catalog = if locations.is_empty() {
        config.location_catalog()
    } else {
        LocationCatalog::from_config(&locations)
    };
    let agent = Agent::build(&config, catalog, metered || config.metered).await?;
    agent.sync_once().await
}

async fn cmd_run(config: Config, interval: Option<u64>) -> anyhow::Result<()> {
    let interval = interval
        .map(Duration::from_secs)
        .unwrap_or(config.sync_interval);
    let agent = Agent::build(&config, config.location_catalog(), config.metered).await?;

    println!("Exposure Agent v{VERSION}");
    println!("Syncing every {}s, press Ctrl+C to stop", interval.as_secs());
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        // A failed run leaves its records unfinished, so the next one force-syncs.
        if let Err(e) = agent.sync_once().await {
            tracing::error!(error = %e, "Sync failed");
        }

        let mut waited = Duration::ZERO;
        while waited < interval && running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(1)).await;
            waited += Duration::from_secs(1);
        }
    }

    println!();
    println!("{}", agent.transparency_log.summary());
    Ok(())
}

async fn cmd_score(config: Config, path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    let windows: Vec<ExposureWindow> =
        serde_json::from_str(&content).context("Invalid exposure window file")?;

    let provider = FileAppConfigProvider::load(Some(config.risk_parameters_path.clone()))?;
    let params = provider.get_app_config().await?;
    let levels = DefaultRiskLevels::new(Arc::new(SystemClock));

    let evaluation = levels.evaluate(&params, &windows);

    let transparency_log = create_shared_log_with_persistence(config.stats_path());
    transparency_log.record_evaluation(evaluation.evaluated as u64, evaluation.dropped() as u64);
    if let Err(e) = transparency_log.save() {
        tracing::warn!(error = %e, "Could not save activity stats");
    }

    println!("{}", serde_json::to_string_pretty(&evaluation.aggregated)?);
    Ok(())
}

async fn cmd_status(config: Config) -> anyhow::Result<()> {
    println!("Exposure Agent Status");
    println!("=====================");
    println!();

    println!("Configuration:");
    println!("  Server: {}", config.server_url);
    println!("  Locations: {}", config.locations.join(", "));
    println!("  Metered: {}", config.metered);
    println!();

    let settings = SyncSettings::with_persistence(config.settings_path())?;
    let state = settings.state();
    println!("Last downloads:");
    for (name, record) in [
        ("Days", state.last_download_days),
        ("Hours", state.last_download_hours),
    ] {
        match record {
            Some(record) => println!(
                "  {name}: started {}, {}",
                record.started_at.to_rfc3339(),
                match record.finished_at {
                    Some(_) if record.is_successful() => "successful",
                    Some(_) => "failed",
                    None => "unfinished",
                }
            ),
            None => println!("  {name}: never"),
        }
    }
    println!();

    if config.cache_path.exists() {
        let cache = FileKeyCache::open(&config.cache_path, Arc::new(SystemClock)).await?;
        let keys = cache.get_all_cached_keys().await?;
        let days = keys
            .iter()
            .filter(|key| key.info.cache_type == CacheType::LocationDay)
            .count();
        println!("Cached packages:");
        println!("  Day packages: {days}");
        println!("  Hour packages: {}", keys.len() - days);
        println!();
    }

    let transparency_log = create_shared_log_with_persistence(config.stats_path());
    println!("{}", transparency_log.summary());
    Ok(())
}

fn cmd_config(config: &Config) {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
