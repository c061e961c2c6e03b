use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use db_sync::config::duration::parse_duration_to_secs;
use db_sync::config::{ConfigStore, ConnectionSpec, EngineKind, PairSpec, SettingsPatch};
use db_sync::daemon;
use db_sync::service::SyncService;

#[derive(Parser)]
#[command(name = "db-sync")]
#[command(about = "Continuous one-way replication for MySQL and PostgreSQL")]
#[command(version)]
struct Cli {
    /// Directory holding the configuration and pidfile
    #[arg(long, default_value = daemon::SERVICE_DIR, env = "DB_SYNC_DIR", global = true)]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the replication daemon in the foreground
    Run,
    /// Stop a running daemon
    Stop,
    /// Show daemon and pair status
    Status,
    /// Manage database connections
    Connection {
        #[command(subcommand)]
        command: ConnectionCommands,
    },
    /// Manage replication pairs
    Pair {
        #[command(subcommand)]
        command: PairCommands,
    },
    /// Show or change daemon settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[derive(Subcommand)]
enum ConnectionCommands {
    /// Register a database connection
    Add {
        name: String,
        #[arg(long, value_enum)]
        engine: EngineKind,
        #[arg(long)]
        host: String,
        #[arg(long)]
        port: u16,
        #[arg(long)]
        user: String,
        #[arg(long, env = "DB_SYNC_PASSWORD")]
        password: String,
        #[arg(long)]
        database: String,
    },
    /// List registered connections
    List,
    /// Remove a connection (must not be referenced by any pair)
    Remove { name: String },
}

#[derive(Subcommand)]
enum PairCommands {
    /// Define a replication pair
    Add {
        name: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
        /// Skip table-schema replication
        #[arg(long)]
        no_schema: bool,
        /// Skip row-data replication
        #[arg(long)]
        no_data: bool,
        /// Skip procedure/function replication
        #[arg(long)]
        no_procedures: bool,
        /// Skip trigger replication
        #[arg(long)]
        no_triggers: bool,
        /// Comma-separated table whitelist
        #[arg(long, value_delimiter = ',')]
        include_tables: Vec<String>,
        /// Comma-separated table blacklist
        #[arg(long, value_delimiter = ',')]
        exclude_tables: Vec<String>,
    },
    /// List replication pairs
    List,
    /// Remove a pair
    Remove { name: String },
    /// Enable a pair
    Enable { name: String },
    /// Disable a pair
    Disable { name: String },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Print the current settings
    Show,
    /// Update settings; only the provided options change
    Set {
        /// Data poll interval, e.g. "5s", "2m"
        #[arg(long)]
        poll_interval: Option<String>,
        /// Schema poll interval, e.g. "60s", "10m"
        #[arg(long)]
        schema_check_interval: Option<String>,
        #[arg(long)]
        log_level: Option<String>,
        #[arg(long)]
        max_retries: Option<u32>,
        /// Delay between connect retries, e.g. "2s"
        #[arg(long)]
        retry_delay: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let store = Arc::new(
        ConfigStore::open(&cli.dir)
            .with_context(|| format!("loading configuration from {}", cli.dir.display()))?,
    );

    // RUST_LOG wins; the persisted log level is the fallback.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(store.settings().log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run => run_daemon(store, &cli.dir).await,
        Commands::Stop => {
            if daemon::stop_daemon(&cli.dir)? {
                println!("Daemon stopped");
            } else {
                println!("Daemon is not running");
            }
            Ok(())
        }
        Commands::Status => {
            let status = daemon::check_status(&cli.dir)?;
            if status.running {
                println!(
                    "Daemon status: RUNNING (PID: {})",
                    status.pid.unwrap_or_default()
                );
            } else {
                println!("Daemon status: NOT RUNNING");
                if status.pid_file_exists {
                    println!("Note: stale PID file present; `db-sync stop` cleans it up");
                }
            }
            for pair in store.list_pairs() {
                let last = pair
                    .last_sync_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "  pair {} [{}] {} -> {} (last sync: {last})",
                    pair.name,
                    if pair.enabled { "enabled" } else { "disabled" },
                    pair.source,
                    pair.target,
                );
            }
            Ok(())
        }
        Commands::Connection { command } => handle_connection(&store, command),
        Commands::Pair { command } => handle_pair(&store, command),
        Commands::Settings { command } => handle_settings(&store, command),
    }
}

async fn run_daemon(store: Arc<ConfigStore>, dir: &std::path::Path) -> anyhow::Result<()> {
    let status = daemon::check_status(dir)?;
    if status.running {
        anyhow::bail!(
            "daemon is already running (PID: {})",
            status.pid.unwrap_or_default()
        );
    }
    if status.pid_file_exists {
        daemon::remove_pid_file(dir)?;
    }
    daemon::write_pid(dir)?;

    let service = Arc::new(SyncService::new(store));
    if let Err(e) = service.start_all().await {
        daemon::remove_pid_file(dir)?;
        return Err(e);
    }

    wait_for_shutdown().await?;
    info!("Shutdown signal received; stopping workers");
    service.stop_all().await;
    daemon::remove_pid_file(dir)?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("waiting for ctrl-c")?,
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    Ok(())
}

fn handle_connection(store: &ConfigStore, command: ConnectionCommands) -> anyhow::Result<()> {
    match command {
        ConnectionCommands::Add {
            name,
            engine,
            host,
            port,
            user,
            password,
            database,
        } => {
            store.add_connection(
                &name,
                ConnectionSpec {
                    engine,
                    host,
                    port,
                    user,
                    password,
                    database,
                },
            )?;
            println!("Added connection: {name}");
        }
        ConnectionCommands::List => {
            for (name, spec) in store.list_connections() {
                println!(
                    "  {name}: {} {}@{}:{}/{}",
                    spec.engine, spec.user, spec.host, spec.port, spec.database
                );
            }
        }
        ConnectionCommands::Remove { name } => {
            store.remove_connection(&name)?;
            println!("Removed connection: {name}");
        }
    }
    Ok(())
}

fn handle_pair(store: &ConfigStore, command: PairCommands) -> anyhow::Result<()> {
    match command {
        PairCommands::Add {
            name,
            source,
            target,
            no_schema,
            no_data,
            no_procedures,
            no_triggers,
            include_tables,
            exclude_tables,
        } => {
            let mut pair = PairSpec::new(&name, source, target);
            pair.sync_schema = !no_schema;
            pair.sync_data = !no_data;
            pair.sync_procedures = !no_procedures;
            pair.sync_triggers = !no_triggers && pair.sync_procedures;
            pair.include_tables = include_tables;
            pair.exclude_tables = exclude_tables;
            store.add_pair(pair)?;
            println!("Added pair: {name}");
        }
        PairCommands::List => {
            for pair in store.list_pairs() {
                println!(
                    "  {} [{}] {} -> {} (schema: {}, data: {}, procedures: {}, triggers: {})",
                    pair.name,
                    if pair.enabled { "enabled" } else { "disabled" },
                    pair.source,
                    pair.target,
                    pair.sync_schema,
                    pair.sync_data,
                    pair.sync_procedures,
                    pair.sync_triggers,
                );
            }
        }
        PairCommands::Remove { name } => {
            store.remove_pair(&name)?;
            println!("Removed pair: {name}");
        }
        PairCommands::Enable { name } => {
            store.set_pair_enabled(&name, true)?;
            println!("Enabled pair: {name}");
        }
        PairCommands::Disable { name } => {
            store.set_pair_enabled(&name, false)?;
            println!("Disabled pair: {name}");
        }
    }
    Ok(())
}

fn handle_settings(store: &ConfigStore, command: SettingsCommands) -> anyhow::Result<()> {
    match command {
        SettingsCommands::Show => {
            let settings = store.settings();
            println!("  poll interval:          {}s", settings.poll_interval_secs);
            println!(
                "  schema check interval:  {}s",
                settings.schema_check_interval_secs
            );
            println!("  log level:              {}", settings.log_level);
            println!("  max retries:            {}", settings.max_retries);
            println!("  retry delay:            {}s", settings.retry_delay_secs);
        }
        SettingsCommands::Set {
            poll_interval,
            schema_check_interval,
            log_level,
            max_retries,
            retry_delay,
        } => {
            let patch = SettingsPatch {
                poll_interval_secs: poll_interval
                    .as_deref()
                    .map(parse_duration_to_secs)
                    .transpose()?,
                schema_check_interval_secs: schema_check_interval
                    .as_deref()
                    .map(parse_duration_to_secs)
                    .transpose()?,
                log_level,
                max_retries,
                retry_delay_secs: retry_delay
                    .as_deref()
                    .map(parse_duration_to_secs)
                    .transpose()?,
            };
            if patch.is_empty() {
                error!("No settings provided; nothing to change");
                return Ok(());
            }
            let updated = store.update_settings(patch)?;
            println!(
                "Settings updated (poll: {}s, schema check: {}s)",
                updated.poll_interval_secs, updated.schema_check_interval_secs
            );
        }
    }
    Ok(())
}
