//! ats-sync - Synchronization control and audit service
//!
//! Main entry point for the ats-sync CLI.

use anyhow::Context;
use ats_sync::api::{AppState, ControlServer};
use ats_sync::ats::OpenCatsAts;
use ats_sync::config::{validate_settings_result, Settings};
use ats_sync::directory::InMemoryDirectory;
use ats_sync::executor::SyncExecutor;
use ats_sync::store::{ConfigStore, LogQuery, LogStore};
use ats_sync::sync::{SyncConfig, SyncScope};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::sync::mpsc;

/// ats-sync - Control and audit ATS synchronization
#[derive(Parser, Debug)]
#[command(name = "ats-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/ats-sync/config.yaml)
    #[arg(short, long, env = "ATS_SYNC_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run the control API and sync executor
    Serve {
        /// Address to bind (overrides server.bind)
        #[arg(short, long, env = "ATS_SYNC_BIND")]
        bind: Option<String>,
    },

    /// Inspect and toggle sync configs
    #[command(subcommand)]
    Configs(ConfigCommands),

    /// Show recent sync log entries
    Logs {
        /// Number of entries (default: server.default_page_size)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Filter by scope (organization, job)
        #[arg(short, long)]
        scope: Option<String>,

        /// Filter by target id
        #[arg(short, long)]
        target: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// List sync configs
    List {
        /// Filter by scope (organization, job)
        #[arg(short, long)]
        scope: Option<String>,
    },

    /// Enable or disable sync for an organization or job
    Set {
        /// organization or job
        scope: String,

        /// Organization or job id
        target: String,

        /// true to enable, false to disable
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    if let Err(e) = ats_sync::logging::init(level) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(Settings::default_path);

    if let Commands::Init { force } = cli.command {
        return handle_init(&config_path, force);
    }

    let settings = Settings::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    validate_settings_result(&settings)?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.server.bind.clone());
            let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
            runtime.block_on(serve(settings, bind))
        }
        Commands::Configs(cmd) => handle_configs(&settings, cmd),
        Commands::Logs {
            limit,
            scope,
            target,
        } => handle_logs(&settings, limit, scope, target),
    }
}

fn handle_init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    Settings::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    println!("Add organizations and jobs under `directory:` before enabling sync.");
    Ok(())
}

async fn serve(settings: Settings, bind: String) -> anyhow::Result<()> {
    let db = settings.storage.open()?;
    let configs = ConfigStore::new(db.clone());
    let logs = LogStore::new(db, settings.logs.retention);

    let ats = OpenCatsAts::from_settings(&settings.opencats)?;
    let executor = SyncExecutor::with_event_capacity(
        configs.clone(),
        logs.clone(),
        Arc::new(ats),
        settings.retry_config(),
        settings.executor.event_channel_capacity,
    );

    let (events_tx, events_rx) = mpsc::channel(settings.executor.event_queue_capacity);
    let runner = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.run(events_rx).await })
    };

    let directory = InMemoryDirectory::from_settings(&settings.directory);
    let (organizations, jobs) = directory.counts();
    tracing::info!(organizations, jobs, "Directory loaded");

    let server = ControlServer::new(AppState {
        configs,
        logs,
        directory: Arc::new(directory),
        executor: executor.clone(),
        events: events_tx,
        default_page_size: settings.server.default_page_size,
        max_page_size: settings.server.max_page_size,
    });

    tokio::select! {
        result = server.run(&bind) => result?,
        _ = shutdown_signal() => {}
    }

    executor.shutdown();
    let _ = runner.await;
    tracing::info!("ats-sync stopped");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on Unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT, initiating graceful shutdown"),
                }
                return;
            }
            Err(e) => tracing::warn!(error = %e, "Failed to set up SIGTERM handler"),
        }
    }

    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Received SIGINT, initiating graceful shutdown");
    }
}

fn parse_scope(raw: Option<String>) -> anyhow::Result<Option<SyncScope>> {
    Ok(raw.map(|s| s.parse::<SyncScope>()).transpose()?)
}

fn handle_configs(settings: &Settings, cmd: ConfigCommands) -> anyhow::Result<()> {
    let configs = ConfigStore::new(settings.storage.open()?);

    match cmd {
        ConfigCommands::List { scope } => {
            let items = configs.list(parse_scope(scope)?)?;
            if items.is_empty() {
                println!("No sync configs.");
                return Ok(());
            }
            println!(
                "{:<13} {:<24} {:<8} {:<9} {:>7}  LAST SYNCED",
                "SCOPE", "TARGET", "ENABLED", "STATUS", "RETRIES"
            );
            for config in &items {
                print_config(config);
            }
        }
        ConfigCommands::Set {
            scope,
            target,
            enabled,
        } => {
            let scope: SyncScope = scope.parse()?;
            let config = configs.upsert(scope, &target, enabled)?;
            print_config(&config);
        }
    }
    Ok(())
}

fn print_config(config: &SyncConfig) {
    let synced = config
        .last_synced_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:<13} {:<24} {:<8} {:<9} {:>7}  {}",
        config.scope, config.target_id, config.enabled, config.last_status, config.retries, synced
    );
    if let Some(ref error) = config.error {
        println!("{:>15} last error: {}", "", error);
    }
}

fn handle_logs(
    settings: &Settings,
    limit: Option<usize>,
    scope: Option<String>,
    target: Option<String>,
) -> anyhow::Result<()> {
    let logs = LogStore::new(settings.storage.open()?, settings.logs.retention);
    let query = LogQuery {
        limit: limit
            .unwrap_or(settings.server.default_page_size)
            .clamp(1, settings.server.max_page_size),
        scope: parse_scope(scope)?,
        target_id: target,
    };

    for entry in logs.query(&query)? {
        println!(
            "{}  {:<8} {}:{:<20} {:<11} retry={}  {}",
            entry.timestamp.to_rfc3339(),
            entry.status.as_str(),
            entry.scope,
            entry.target_id,
            entry.entity_type,
            entry.retry_count,
            entry.message
        );
    }
    Ok(())
}
