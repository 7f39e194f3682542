//! Directory discovery.
//!
//! Walks a scan root and returns candidate files whose name maps to one
//! of the configured content kinds and that no exclude glob matches.
//! Paths come back absolute and sorted lexicographically. Entries the
//! walker cannot read are reported alongside, not raised.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use filevault_core::models::ContentKind;

use crate::config::ScanConfig;
use crate::tracker::absolutize;

/// A file found under a scan root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub kind: ContentKind,
}

/// Something the walker could not read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub candidates: Vec<Candidate>,
    pub failures: Vec<ScanFailure>,
}

/// Enumerate candidates under `root`.
///
/// Fails before doing any work if `root` is missing or not a directory.
pub fn discover(root: &Path, recursive: bool, scan: &ScanConfig) -> Result<Discovery> {
    let root = absolutize(root)?;
    if !root.exists() {
        bail!("Scan root does not exist: {}", root.display());
    }
    if !root.is_dir() {
        bail!("Scan root is not a directory: {}", root.display());
    }

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(scan.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut walker = WalkDir::new(&root)
        .follow_links(scan.follow_symlinks)
        .sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut out = Discovery::default();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                out.failures.push(ScanFailure {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(&root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        // Apply exclude patterns
        if exclude_set.is_match(&rel_str) {
            continue;
        }

        let Some(kind) = ContentKind::from_path(path) else {
            continue;
        };
        if !scan.kinds.contains(&kind) {
            continue;
        }

        out.candidates.push(Candidate {
            path: path.to_path_buf(),
            kind,
        });
    }

    // Sort for deterministic ordering
    out.candidates.sort_by(|a, b| a.path.cmp(&b.path));

    tracing::debug!(
        root = %root.display(),
        candidates = out.candidates.len(),
        failures = out.failures.len(),
        "discovery finished"
    );
    Ok(out)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
