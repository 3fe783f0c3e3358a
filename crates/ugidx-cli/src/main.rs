//! # ugidx CLI
//!
//! Command-line interface for the ugidx incremental content indexer.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ugidx_config::logging::{init_logging, LogLevel};
use ugidx_config::{log_cli_debug, Config};

mod commands;
mod report;

use commands::{CheckArgs, IndexArgs};

/// ugidx - per-directory content fingerprints for fast file search
#[derive(Parser)]
#[command(name = "ugidx")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Print one line per updated directory
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Print nothing but errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update index files below a directory
    Index(IndexArgs),

    /// Report stale or missing index files without writing (exit 1 if any)
    Check(CheckArgs),

    /// Remove every index file below a directory
    Delete {
        /// Directory to clean
        #[arg(value_name = "DIR", default_value = ".")]
        directory: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file locations
    Path,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        LogLevel::Error
    } else if cli.verbose {
        LogLevel::Info
    } else {
        LogLevel::Warn
    };
    init_logging(level);

    let output = report::Output {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Index(args) => {
            let config = commands::load_config(|config| args.apply(config))?;
            commands::run_index(&config, &args.walk.directory, output)
        }
        Commands::Check(args) => {
            let config = commands::load_config(|config| args.apply(config))?;
            let clean = commands::run_check(&config, &args.walk.directory, output)?;
            if !clean {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Delete { directory } => commands::run_delete(&directory, output),
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = Config::load().context("Failed to load configuration")?;
                print!("{}", config.to_toml());
                Ok(())
            }
            ConfigCommands::Path => {
                let global = ugidx_config::path::global_config_path();
                let project = ugidx_config::path::project_config_path();
                log_cli_debug!("Config paths", global = ?global, project = %project.display());
                match global {
                    Some(path) => println!("Global:  {}", path.display()),
                    None => println!("Global:  (no home directory)"),
                }
                println!("Project: {}", project.display());
                Ok(())
            }
        },
    }
}
