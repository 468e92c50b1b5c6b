//! MIDI Macros - bind keyboard/mouse macros to MIDI controls
//!
//! Loads the macro library, restores the active set on the execution backend
//! and drops into an interactive REPL.

use anyhow::{Context, Result};
use clap::Parser;
use midi_macros::backend::ConsoleBackend;
use midi_macros::bundle::ExportBundle;
use midi_macros::cli::Repl;
use midi_macros::config::AppConfig;
use midi_macros::coordinator::{Coordinator, EngineEvent};
use midi_macros::paths::AppPaths;
use midi_macros::ports::{self, PortWatcher};
use midi_macros::store::SledStorage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// MIDI Macros - manage which MIDI-triggered macros are live
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the app data dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Directory holding config, macro database and logs
    #[arg(long, env = "MIDI_MACROS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Also write a daily rolling log file in the logs directory
    #[arg(long, env = "LOG_FILE")]
    log_file: bool,

    /// List available MIDI input ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Export macros, categories and active set to a bundle file and exit
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,

    /// Import a bundle file and exit
    #[arg(long, value_name = "FILE")]
    import: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let paths = match &args.data_dir {
        Some(dir) => AppPaths::from_data_dir(dir),
        None => AppPaths::detect(),
    };
    paths.ensure_directories()?;

    let _log_guard = init_logging(&args.log_level, args.log_file.then_some(paths.logs_dir.as_path()))?;

    info!("Starting MIDI Macros v{}...", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {}", paths.base_dir().display());

    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    info!("Configuration file: {}", config_path.display());
    let config = AppConfig::load(&config_path).await?;

    if args.list_ports {
        ports::list_ports_formatted(&config.ports.client_name);
        return Ok(());
    }

    let storage_path = config.storage_path(&paths);
    let storage = Arc::new(
        SledStorage::open(&storage_path)
            .with_context(|| format!("Failed to open macro database: {}", storage_path.display()))?,
    );
    let backend = Arc::new(
        ConsoleBackend::new(config.backend.kind.clone()).rejecting(config.backend.reject.clone()),
    );
    let coordinator = Arc::new(Coordinator::load(storage, backend.clone()).await?);

    coordinator.subscribe(|event| match event {
        EngineEvent::RegistrationFailed { macro_id, reason } => {
            warn!("⚠️  Macro '{}' could not be registered: {}", macro_id, reason)
        }
        EngineEvent::CancelFailed { macro_id, reason } => {
            warn!("⚠️  Macro '{}' could not be cancelled: {}", macro_id, reason)
        }
        other => debug!("Engine event: {:?}", other),
    });

    if let Some(path) = &args.export {
        coordinator.export_bundle().await.save_to_file(path).await?;
        return Ok(());
    }

    let restored = coordinator.restore_registrations().await?;
    if !restored.failed.is_empty() {
        warn!(
            "{} macro(s) dropped from the active set at startup",
            restored.failed.len()
        );
    }

    if let Some(path) = &args.import {
        import_and_exit(&coordinator, path).await?;
        return Ok(());
    }

    let watcher = (config.ports.refresh_interval_ms > 0).then(|| {
        PortWatcher::spawn(
            config.ports.client_name.clone(),
            Duration::from_millis(config.ports.refresh_interval_ms),
        )
    });

    info!("Ready ({} macro(s), {} active)", coordinator.macros().await.len(), coordinator.active_ids().await.len());
    Repl::new(coordinator, backend, watcher, config.ports.client_name.clone())
        .run()
        .await?;

    info!("MIDI Macros shutdown complete");
    Ok(())
}

async fn import_and_exit(coordinator: &Coordinator, path: &Path) -> Result<()> {
    let bundle = ExportBundle::load_from_file(path).await?;
    let report = coordinator.import_bundle(bundle).await?;
    println!(
        "Imported {} macro(s) ({} skipped), {} categories ({} skipped), {} active ({} skipped)",
        report.macros.imported,
        report.macros.skipped,
        report.categories.imported,
        report.categories.skipped,
        report.active.imported,
        report.active.skipped
    );
    Ok(())
}

fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "midi-macros.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}
