//! readlist CLI
//!
//! Diagnostic front end for the readlist models: replays scripted operations
//! against a model built on in-memory collaborators.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use readlist_core::config::DEFAULT_LOG_FILTER;
use readlist_core::Config;

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "readlist")]
#[command(about = "readlist - replay reading list model operations")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON script of model operations
    Replay {
        /// Path to the script
        script: PathBuf,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (account_storage_enabled, log_filter)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    let config_path = cli.config.clone().unwrap_or_else(Config::config_file_path);
    let config = Config::load_from_path(&config_path).context("Failed to load configuration")?;
    init_logging(&config);
    debug!("Using config file {:?}", config_path);

    match cli.command {
        Commands::Replay { script } => commands::replay::run(&script, &config, &output),
        Commands::Config { command } => handle_config_command(command, &config, &config_path, &output),
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config: &Config,
    config_path: &Path,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config, config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(&key, &value, config_path, output)
        }
    }
}

/// Log to stderr so stdout stays clean for --json output
fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_new(config.log_filter()).unwrap_or_else(|e| {
        eprintln!(
            "Warning: invalid log filter {:?} ({}), using {:?}",
            config.log_filter(),
            e,
            DEFAULT_LOG_FILTER
        );
        EnvFilter::new(DEFAULT_LOG_FILTER)
    });

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
