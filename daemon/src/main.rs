/// Conductor Daemon - Main entry point
/// Watches every tracked project for task results and reports completions
use clap::Parser;
use conductor_core::logging::init_logging;
use conductor_core::ConductorConfig;
use conductor_daemon::{load_snapshot, HttpCompletionNotifier, WatcherOptions, WatcherSupervisor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "conductor-daemon",
    about = "Watch tracked projects for task results and notify the orchestrator",
    version = env!("CARGO_PKG_VERSION")
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Path to configuration file (TOML)"
    )]
    config: Option<PathBuf>,

    /// Project registry snapshot
    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Path to the project registry snapshot (JSON)"
    )]
    registry: Option<PathBuf>,

    /// Orchestrator base URL
    #[arg(
        short,
        long,
        value_name = "URL",
        help = "Orchestrator base URL (default: http://127.0.0.1:3000)"
    )]
    orchestrator_url: Option<String>,

    /// Log level
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose output")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ConductorConfig::load(args.config.as_deref())?;

    // Apply CLI overrides
    if let Some(path) = args.registry {
        config.registry.path = Some(path);
    }
    if let Some(url) = args.orchestrator_url {
        config.orchestrator.base_url = url;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.verbose {
        config.logging.level = "debug".to_string();
    }

    config.validate()?;
    init_logging(&config.logging)?;

    info!("Starting Conductor Daemon v{}", conductor_daemon::VERSION);
    info!(
        "Completion endpoint: {}",
        config.orchestrator.completion_url()
    );

    let projects = load_snapshot(config.registry.path.as_deref());
    let notifier = Arc::new(HttpCompletionNotifier::from_config(&config.orchestrator)?);

    let mut supervisor =
        WatcherSupervisor::new(notifier, WatcherOptions::from_config(&config.watcher));
    supervisor.start_all(&projects);

    supervisor.run_until_signal().await?;
    info!("Conductor Daemon stopped");
    Ok(())
}
