//! Human-readable run summaries.

use std::path::Path;

use ugidx_indexer::{DeleteStats, IndexStats};

#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub verbose: bool,
    pub quiet: bool,
}

pub fn print_index(root: &Path, stats: &IndexStats, output: Output) {
    if output.quiet {
        return;
    }
    let mark = if stats.warnings == 0 { "✅" } else { "⚠️ " };
    println!(
        "{} Indexed {}: {} directories scanned, {} updated",
        mark,
        root.display(),
        stats.dirs_scanned,
        stats.dirs_indexed
    );
    print_counts(stats, output);
}

pub fn print_check(root: &Path, stats: &IndexStats, output: Output) {
    if output.quiet {
        return;
    }
    if stats.is_clean() {
        println!(
            "✅ {}: all {} directories up to date",
            root.display(),
            stats.dirs_scanned
        );
    } else {
        println!(
            "⚠️  {}: {} of {} directories stale or missing",
            root.display(),
            stats.dirs_stale,
            stats.dirs_scanned
        );
    }
    print_counts(stats, output);
}

pub fn print_delete(root: &Path, stats: &DeleteStats, output: Output) {
    if output.quiet {
        return;
    }
    println!("🗑  Removed {} index files under {}", stats.removed, root.display());
    if stats.warnings > 0 {
        println!("   warnings:  {}", stats.warnings);
    }
}

fn print_counts(stats: &IndexStats, output: Output) {
    println!(
        "   files:     {} (added {}, modified {}, deleted {}, unchanged {})",
        format_number(stats.files as u64),
        stats.added,
        stats.modified,
        stats.deleted,
        stats.unchanged
    );
    if stats.binary_skipped > 0 || output.verbose {
        println!("   binary:    {} without fingerprint", stats.binary_skipped);
    }
    if stats.ignored > 0 || output.verbose {
        println!("   ignored:   {}", stats.ignored);
    }
    if stats.content_bytes > 0 || output.verbose {
        println!("   read:      {}", format_bytes(stats.content_bytes));
    }
    println!("   index:     {}", format_bytes(stats.index_bytes));
    if let Some(noise) = stats.average_noise() {
        println!(
            "   noise:     {:.1}% average over {} fingerprints",
            noise * 100.0,
            stats.fingerprinted
        );
    }
    if stats.future_mtimes > 0 {
        println!(
            "   future:    {} files dated ahead of the clock, reindexed every run",
            stats.future_mtimes
        );
    }
    if stats.warnings > 0 {
        println!("   warnings:  {}", stats.warnings);
    }
}

/// Format bytes in human-readable form
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Format number with comma separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
