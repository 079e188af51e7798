use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use whowas::daemon::coordinator;
use whowas_common::config::AppConfig;
use whowas_common::paths;
use whowas_core::records::Category;
use whowas_storage::HistoryStore;
use whowas_storage::sqlite3::SqliteHistoryStore;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the history daemon in the foreground.
    Start,
    /// Signal a running daemon to shut down.
    Stop,
    /// Print store statistics and daemon liveness.
    Status,
    /// Prune superseded duplicate rows from every compactable category.
    Compact,
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

fn ensure_workspace_dir(workspace_dir: &PathBuf) -> Result<()> {
    if !workspace_dir.exists() {
        std::fs::create_dir_all(workspace_dir).context("Failed to create workspace directory")?;
    }
    Ok(())
}

fn start_daemon(config: AppConfig) -> Result<()> {
    let pid_file = paths::pid_file(&config.workspace_dir);

    if let Some(existing_pid) = read_pid_file(&pid_file)? {
        if is_process_running(existing_pid) {
            return Err(anyhow::anyhow!(
                "whowas daemon is already running (PID: {}). Use 'whowas stop' first.",
                existing_pid
            ));
        } else {
            let _ = std::fs::remove_file(&pid_file);
        }
    }

    write_pid_file(&pid_file)?;

    let db_file = paths::history_db(&config.workspace_dir);
    info!("Starting whowas history daemon");
    info!("Data file: {db_file:?}");
    info!("PID file: {pid_file:?}");

    let store: Arc<dyn HistoryStore> = Arc::new(
        SqliteHistoryStore::open(&db_file).context("Failed to initialize the history store")?,
    );

    let result = coordinator::run(store, &config.workspace_dir, &config);

    let _ = std::fs::remove_file(&pid_file);

    info!("whowas daemon stopped gracefully");
    result
}

fn stop_daemon(config: &AppConfig) -> Result<()> {
    let pid_file = paths::pid_file(&config.workspace_dir);

    if let Some(pid) = read_pid_file(&pid_file)? {
        if is_process_running(pid) {
            println!("Stopping whowas daemon (PID: {pid})...");

            #[cfg(unix)]
            {
                unsafe {
                    libc::kill(pid as i32, libc::SIGTERM);
                }
            }

            thread::sleep(Duration::from_millis(500));

            if !is_process_running(pid) {
                println!("whowas daemon stopped successfully");
                let _ = std::fs::remove_file(&pid_file);
            } else {
                println!("whowas daemon did not stop gracefully, you may need to kill it manually");
            }
        } else {
            println!("whowas daemon is not running (stale PID file)");
            let _ = std::fs::remove_file(&pid_file);
        }
    } else {
        println!("whowas daemon is not running");
    }

    Ok(())
}

fn get_status(config: &AppConfig) -> Result<()> {
    let now = chrono::Utc::now().with_timezone(&chrono::Local);
    println!("whowas status - {}", now.format("%Y-%m-%d %H:%M:%S %Z"));

    let pid_file = paths::pid_file(&config.workspace_dir);
    match read_pid_file(&pid_file)? {
        Some(pid) if is_process_running(pid) => println!("Daemon: running (PID: {pid})"),
        Some(_) => println!("Daemon: not running (stale PID file)"),
        None => println!("Daemon: not running"),
    }

    let db_file = paths::history_db(&config.workspace_dir);
    if !db_file.exists() {
        println!("Store: no database at {db_file:?}");
        return Ok(());
    }

    let size_mb = std::fs::metadata(&db_file)
        .map(|m| m.len() as f64 / 1024.0 / 1024.0)
        .unwrap_or(0.0);
    println!("Store: {db_file:?} ({size_mb:.2} MB)");

    let store = SqliteHistoryStore::open(&db_file)?;
    for category in Category::ALL {
        println!("  {}: {} rows", category, store.count_rows(category)?);
    }
    println!("  departures: {} rows", store.departure_count()?);

    if let Some((event, at)) = store.lifecycle_events()?.last() {
        println!("Last lifecycle event: {event} at {at}");
    }

    Ok(())
}

fn compact_store(config: &AppConfig) -> Result<()> {
    let db_file = paths::history_db(&config.workspace_dir);
    if !db_file.exists() {
        println!("No database at {db_file:?}");
        return Ok(());
    }

    let store = SqliteHistoryStore::open(&db_file)?;
    for category in Category::ALL.into_iter().filter(|c| c.compactable()) {
        let pruned = store.compact(category)?;
        println!("{category}: pruned {pruned} superseded rows");
    }
    Ok(())
}

fn read_pid_file(pid_file: &PathBuf) -> Result<Option<u32>> {
    if !pid_file.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(pid_file).context("Failed to read PID file")?;

    let pid = content
        .trim()
        .parse::<u32>()
        .context("Invalid PID in file")?;

    Ok(Some(pid))
}

fn write_pid_file(pid_file: &PathBuf) -> Result<()> {
    let pid = std::process::id();
    std::fs::write(pid_file, pid.to_string()).context("Failed to write PID file")?;
    Ok(())
}

fn is_process_running(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[Pid::from(pid as usize)]),
        false,
        ProcessRefreshKind::nothing(),
    );
    system.process(Pid::from(pid as usize)).is_some()
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = ensure_workspace_dir(&config.workspace_dir) {
        error!("Failed to create workspace directory: {e}");
        process::exit(1);
    }

    let result = match cli.command {
        Commands::Start => start_daemon(config),
        Commands::Stop => stop_daemon(&config),
        Commands::Status => get_status(&config),
        Commands::Compact => compact_store(&config),
    };

    if let Err(e) = result {
        error!("Error: {e:#}");
        process::exit(1);
    }
}
