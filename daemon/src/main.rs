mod config;
mod control;
mod cursors;
mod fullscreen;
mod providers;
mod scheduler;
mod service;
mod store;
mod theme;
#[cfg(windows)]
mod winsvc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{Config, LoggingConfig};
use providers::{IpApiLocator, SunriseSunsetClient};
use scheduler::{Cancellation, Scheduler};
use service::{ControlEvent, LogReporter, ServiceController};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use store::{CursorStore, MemoryStore, ThemeStore};
use theme::ThemeSwitcher;
use tokio::sync::mpsc;

/// Longest wait for an in-flight tick after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (.yaml, .yml or .toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run in the foreground until Ctrl-C (default)
    Run,
    /// Run under the Windows service control manager
    #[cfg(windows)]
    Service,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            setup_logging(&config.logging, true)?;
            run_console(config)
        }
        #[cfg(windows)]
        Commands::Service => {
            setup_logging(&config.logging, false)?;
            winsvc::run(config)
        }
    }
}

/// Drives the same lifecycle as the service host, with Ctrl-C as Stop.
fn run_console(config: Config) -> anyhow::Result<()> {
    log::info!("Starting autotheme-daemon...");
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let mut controller = ServiceController::new(LogReporter);
    let mut daemon = controller.launch(runtime.handle(), |cancel| run_daemon(config, cancel));

    let exited = runtime.block_on(async {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    log::error!("Failed to listen for Ctrl-C: {}", e);
                }
                false
            }
            _ = &mut daemon => true,
        }
    });

    if exited {
        log::warn!("Daemon exited on its own");
    }
    controller.handle_control(ControlEvent::Stop);
    if !exited && runtime.block_on(tokio::time::timeout(SHUTDOWN_GRACE, daemon)).is_err() {
        log::warn!("Daemon did not stop within {:?}", SHUTDOWN_GRACE);
    }
    controller.finish();
    log::info!("autotheme-daemon {}", controller.status());
    Ok(())
}

/// Scheduler plus control server; returns once the scheduler stops.
pub(crate) async fn run_daemon(config: Config, cancel: Cancellation) {
    let scheduler = match build_scheduler(&config) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            log::error!("Failed to initialize scheduler: {:#}", e);
            return;
        }
    };

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let listener = match config.control_addr() {
        Ok(addr) => control::bind(addr).await,
        Err(e) => Err(e),
    };
    match listener {
        Ok(listener) => {
            tokio::spawn(control::serve(listener, cmd_tx, cancel.clone()));
        }
        Err(e) => log::error!("{:#}; manual overrides are unavailable", e),
    }

    scheduler.run(cmd_rx, cancel).await;
}

fn build_scheduler(config: &Config) -> anyhow::Result<Scheduler> {
    let (theme_store, cursor_store) = settings_stores(config.daemon.dry_run);
    let switcher = ThemeSwitcher::new(theme_store, cursor_store, config.daemon.settle_delay());
    Ok(Scheduler::new(
        Box::new(IpApiLocator::new(&config.providers)?),
        Box::new(SunriseSunsetClient::new(&config.providers)?),
        fullscreen::system_detector(),
        switcher,
        scheduler::system_clock(),
        config.daemon.tick_interval(),
    ))
}

fn settings_stores(dry_run: bool) -> (Arc<dyn ThemeStore>, Arc<dyn CursorStore>) {
    #[cfg(windows)]
    {
        if !dry_run {
            let registry = Arc::new(store::RegistryStore::new());
            let theme: Arc<dyn ThemeStore> = registry.clone();
            let cursors: Arc<dyn CursorStore> = registry;
            return (theme, cursors);
        }
    }
    if dry_run {
        log::info!("Dry run: theme and cursor changes are kept in memory");
    } else {
        log::warn!("No registry on this platform; theme and cursor changes are kept in memory");
    }
    let memory = Arc::new(MemoryStore::new());
    let theme: Arc<dyn ThemeStore> = memory.clone();
    let cursors: Arc<dyn CursorStore> = memory;
    (theme, cursors)
}

fn setup_logging(config: &LoggingConfig, console: bool) -> anyhow::Result<()> {
    let log_file = config.log_file();

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d][%H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(config.level_filter())
        .level_for("reqwest", log::LevelFilter::Warn)
        .level_for("hyper", log::LevelFilter::Warn);

    if console {
        dispatch = dispatch.chain(std::io::stdout());
    }

    if let Some(dir) = log_file.parent().filter(|d| !d.as_os_str().is_empty()) {
        let _ = std::fs::create_dir_all(dir);
    }
    match fern::log_file(&log_file) {
        Ok(file) => dispatch = dispatch.chain(file),
        Err(e) if console => eprintln!("Logging to stdout only; cannot open {:?}: {}", log_file, e),
        Err(e) => return Err(e).with_context(|| format!("Failed to open log file {:?}", log_file)),
    }

    dispatch.apply()?;
    Ok(())
}
