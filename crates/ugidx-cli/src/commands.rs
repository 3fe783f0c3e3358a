//! Index, check and delete subcommands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use ugidx_config::path::normalize_or_original;
use ugidx_config::{log_cli_info, Config};
use ugidx_indexer::{delete_indexes, Indexer, RunMode};

use crate::report::{self, Output};

/// Options shared by `index` and `check`
#[derive(Args, Debug, Clone)]
pub struct WalkArgs {
    /// Root of the tree to walk
    #[arg(value_name = "DIR", default_value = ".")]
    pub directory: PathBuf,

    /// Fingerprint accuracy: 0 (small tables, more false positives) to 9
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=9))]
    pub accuracy: Option<u8>,

    /// Include hidden files and directories
    #[arg(short = 'H', long)]
    pub hidden: bool,

    /// Follow symbolic links to files
    #[arg(short = 'L', long)]
    pub dereference_files: bool,

    /// Index the decompressed content of gzip and zip files
    #[arg(short = 'z', long)]
    pub decompress: bool,

    /// Maximum decompression nesting depth
    #[arg(long, value_name = "DEPTH", value_parser = clap::value_parser!(u8).range(1..=99))]
    pub zmax: Option<u8>,

    /// Record binary files without a fingerprint
    #[arg(short = 'I', long)]
    pub ignore_binary: bool,

    /// Comma-separated names of gitignore-style rule files
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    pub ignore_files: Option<Vec<String>>,
}

impl WalkArgs {
    /// Layer these flags over the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(accuracy) = self.accuracy {
            config.index.accuracy = accuracy;
        }
        if self.hidden {
            config.walk.hidden = true;
        }
        if self.dereference_files {
            config.walk.dereference_files = true;
        }
        if self.decompress {
            config.decompress.enabled = true;
        }
        if let Some(depth) = self.zmax {
            config.decompress.max_depth = depth;
        }
        if self.ignore_binary {
            config.index.skip_binary = true;
        }
        if let Some(files) = &self.ignore_files {
            config.walk.ignore_files = files.clone();
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    #[command(flatten)]
    pub walk: WalkArgs,

    /// Rebuild every index, ignoring modification times
    #[arg(short, long)]
    pub force: bool,
}

impl IndexArgs {
    pub fn apply(&self, config: &mut Config) {
        self.walk.apply(config);
        if self.force {
            config.index.force = true;
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    #[command(flatten)]
    pub walk: WalkArgs,
}

impl CheckArgs {
    pub fn apply(&self, config: &mut Config) {
        self.walk.apply(config);
    }
}

/// Load layered configuration, apply command-line flags and validate.
pub fn load_config<F>(flags: F) -> Result<Config>
where
    F: FnOnce(&mut Config),
{
    let mut config = Config::load().context("Failed to load configuration")?;
    flags(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

pub fn run_index(config: &Config, directory: &Path, output: Output) -> Result<()> {
    let root = normalize_or_original(directory);
    log_cli_info!("Indexing", root = %root.display(), accuracy = config.index.accuracy);

    let mut indexer = Indexer::new(config)?;
    let stats = indexer
        .run(&root, RunMode::Index)
        .with_context(|| format!("Failed to index {}", directory.display()))?;
    report::print_index(directory, &stats, output);
    stats.ensure_written()?;
    Ok(())
}

/// Returns whether every index is fresh and no warnings occurred
pub fn run_check(config: &Config, directory: &Path, output: Output) -> Result<bool> {
    let root = normalize_or_original(directory);
    log_cli_info!("Checking", root = %root.display());

    let mut indexer = Indexer::new(config)?;
    let stats = indexer
        .run(&root, RunMode::Check)
        .with_context(|| format!("Failed to check {}", directory.display()))?;
    report::print_check(directory, &stats, output);
    Ok(stats.is_clean())
}

pub fn run_delete(directory: &Path, output: Output) -> Result<()> {
    let root = normalize_or_original(directory);
    let stats = delete_indexes(&root)
        .with_context(|| format!("Failed to delete indexes under {}", directory.display()))?;
    report::print_delete(directory, &stats, output);
    Ok(())
}
