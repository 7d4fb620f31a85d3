/// Conductor CLI - serve role-scoped tools to agents and inspect the setup
use clap::{Parser, Subcommand};
use conductor_core::logging::init_logging;
use conductor_core::ConductorConfig;
use std::path::{Path, PathBuf};

mod commands;

use commands::tools::OutputFormat;
use commands::{check, reminder, serve, tools};

/// Load configuration from the given path or default location
fn load_config(
    config_path: Option<&Path>,
    log_level: Option<&str>,
) -> anyhow::Result<ConductorConfig> {
    let mut config = ConductorConfig::load(config_path)?;
    if let Some(level) = log_level {
        config.logging.level = level.to_string();
    }
    Ok(config)
}

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Role-scoped tool broker for AI agents", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (defaults to ~/.conductor/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override log level
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve tools to an agent over stdio
    Serve {
        /// Restrict the server to one agent role
        #[arg(short, long)]
        role: Option<String>,
    },

    /// List catalog tools
    Tools {
        /// Only tools bound to this role
        #[arg(short, long)]
        role: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Print the system-prompt tool reminder for a role
    Reminder {
        #[arg(short, long)]
        role: String,
    },

    /// Validate configuration, role bindings and the project registry
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref(), args.log_level.as_deref())?;
    init_logging(&config.logging)?;

    match args.command {
        Commands::Serve { role } => {
            serve::execute(&config, role.as_deref()).await?;
        }

        Commands::Tools { role, format } => {
            tools::execute(&config, role.as_deref(), format)?;
        }

        Commands::Reminder { role } => {
            reminder::execute(&config, &role)?;
        }

        Commands::Check => {
            check::execute(&config, args.config.as_deref())?;
        }
    }

    Ok(())
}
