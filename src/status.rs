//! Store and index health overview.
//!
//! Summarizes how many records are tracked, how many of them are valid,
//! and whether the index is built. Used by `fvault status` and
//! `GET /status`.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::index::{index_stats, IndexStats};
use crate::tracker::FileTracker;

#[derive(Debug, Clone, Serialize)]
pub struct VaultStatus {
    pub db_path: PathBuf,
    pub db_size_bytes: u64,
    pub tracked_total: i64,
    pub tracked_valid: i64,
    pub tracked_invalid: i64,
    pub index_path: PathBuf,
    pub index: IndexStats,
    pub embedding_provider: String,
}

pub async fn collect_status(config: &Config, tracker: &FileTracker) -> Result<VaultStatus> {
    let tracked_total = tracker.count(false).await?;
    let tracked_valid = tracker.count(true).await?;
    let db_size_bytes = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(VaultStatus {
        db_path: config.db.path.clone(),
        db_size_bytes,
        tracked_total,
        tracked_valid,
        tracked_invalid: tracked_total - tracked_valid,
        index_path: config.index.path.clone(),
        index: index_stats(&config.index.path),
        embedding_provider: config.embedding.provider.clone(),
    })
}

/// Run `fvault status`.
pub async fn run_status(config: &Config) -> Result<()> {
    let tracker = FileTracker::open(config).await?;
    let s = collect_status(config, &tracker).await?;

    println!("filevault status");
    println!("================");
    println!();
    println!("  Database:    {}", s.db_path.display());
    println!("  Size:        {}", format_bytes(s.db_size_bytes));
    println!();
    println!("  Tracked:     {}", s.tracked_total);
    println!("  Valid:       {}", s.tracked_valid);
    println!("  Invalid:     {}", s.tracked_invalid);
    println!();
    println!("  Index:       {}", s.index_path.display());
    match &s.index.descriptor {
        Some(d) if s.index.ready => {
            println!("  Ready:       yes");
            println!("  Entries:     {}", d.entry_count);
            println!("  Model:       {} ({} dims)", d.model, d.dims);
            println!("  Built:       {}", d.built_at.format("%Y-%m-%d %H:%M"));
        }
        _ => println!("  Ready:       no (run `fvault index <dir>`)"),
    }
    println!(
        "  Size:        {} in {} file(s)",
        format_bytes(s.index.size_bytes),
        s.index.file_count
    );
    println!("  Embedder:    {}", s.embedding_provider);
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
