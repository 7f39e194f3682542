//! Record listing and deletion, for `fvault files`, `fvault delete`
//! and their HTTP counterparts.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use filevault_core::identity::ContentIdentity;
use filevault_core::models::{ListQuery, TrackedFileRecord};

use crate::config::Config;
use crate::error::VaultError;
use crate::tracker::FileTracker;

pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Parameters for [`list_files`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilesQuery {
    /// Include invalid records.
    pub all: bool,
    /// Case-insensitive substring of the current location.
    pub query: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilesPage {
    /// Records matching the filters before paging.
    pub total: i64,
    pub files: Vec<TrackedFileRecord>,
}

pub async fn list_files(tracker: &FileTracker, q: &FilesQuery) -> Result<FilesPage> {
    let limit = q.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(0);
    let offset = q.offset.unwrap_or(0).max(0);

    match q.query.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(needle) => {
            let mut found = tracker.search_by_name(needle, i64::MAX).await?;
            if !q.all {
                found.retain(|r| r.is_valid);
            }
            let total = found.len() as i64;
            let files = found
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
            Ok(FilesPage { total, files })
        }
        None => {
            let valid_only = !q.all;
            let total = tracker.count(valid_only).await?;
            let query = ListQuery {
                valid_only,
                ..ListQuery::default()
            }
            .page(limit, offset);
            let files = tracker.list(&query).await?;
            Ok(FilesPage { total, files })
        }
    }
}

/// Which record a delete addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    Identity(ContentIdentity),
    Path(PathBuf),
}

/// Delete the addressed record. Nothing to delete is [`VaultError::NotFound`].
pub async fn delete_record(tracker: &FileTracker, target: &DeleteTarget) -> Result<()> {
    let deleted = match target {
        DeleteTarget::Identity(id) => tracker.delete(id).await?,
        DeleteTarget::Path(path) => tracker.delete_by_location(path).await?,
    };
    if !deleted {
        let what = match target {
            DeleteTarget::Identity(id) => format!("no record with identity {}", id),
            DeleteTarget::Path(path) => format!("no record at {}", path.display()),
        };
        return Err(VaultError::NotFound(what).into());
    }
    tracing::info!(record = ?target, "record deleted");
    Ok(())
}

/// Run `fvault files`.
pub async fn run_files(config: &Config, q: &FilesQuery) -> Result<()> {
    let tracker = FileTracker::open(config).await?;
    let page = list_files(&tracker, q).await?;

    if page.files.is_empty() {
        println!("No files.");
        return Ok(());
    }

    println!(
        "{:<12} {:<9} {:>10}  {:<16}  LOCATION",
        "IDENTITY", "KIND", "SIZE", "ADMITTED"
    );
    for r in &page.files {
        println!(
            "{:<12} {:<9} {:>10}  {:<16}  {}{}",
            r.content_identity.short(),
            r.content_kind.as_str(),
            r.size_bytes,
            r.admitted_at.format("%Y-%m-%d %H:%M"),
            r.current_location.display(),
            if r.is_valid { "" } else { "  [invalid]" }
        );
    }
    let offset = q.offset.unwrap_or(0).max(0);
    println!();
    println!(
        "Showing {}-{} of {}",
        offset + 1,
        offset + page.files.len() as i64,
        page.total
    );
    Ok(())
}

/// Run `fvault delete`.
pub async fn run_delete(config: &Config, target: &DeleteTarget) -> Result<()> {
    let tracker = FileTracker::open(config).await?;
    delete_record(&tracker, target).await?;
    match target {
        DeleteTarget::Identity(id) => println!("Deleted record {}", id),
        DeleteTarget::Path(path) => println!("Deleted record at {}", path.display()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use filevault_core::store::memory::InMemoryRecordStore;
    use std::sync::Arc;

    async fn seeded() -> (tempfile::TempDir, FileTracker, Vec<TrackedFileRecord>) {
        let tmp = tempfile::tempdir().unwrap();
        let tracker = FileTracker::new(Arc::new(InMemoryRecordStore::new()));
        let mut records = Vec::new();
        for name in ["alpha.md", "beta.txt", "alphabet.md"] {
            let path = tmp.path().join(name);
            std::fs::write(&path, name).unwrap();
            records.push(tracker.upsert(&path, None).await.unwrap());
        }
        tracker.invalidate(&records[2].content_identity).await.unwrap();
        (tmp, tracker, records)
    }

    #[tokio::test]
    async fn lists_valid_by_default() {
        let (_tmp, tracker, _) = seeded().await;
        let page = list_files(&tracker, &FilesQuery::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert!(page.files.iter().all(|r| r.is_valid));

        let all = FilesQuery {
            all: true,
            ..FilesQuery::default()
        };
        assert_eq!(list_files(&tracker, &all).await.unwrap().total, 3);
    }

    #[tokio::test]
    async fn query_filters_and_pages() {
        let (_tmp, tracker, _) = seeded().await;
        let q = FilesQuery {
            all: true,
            query: Some("ALPHA".to_string()),
            limit: Some(1),
            offset: Some(1),
        };
        let page = list_files(&tracker, &q).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.files.len(), 1);

        let valid_only = FilesQuery {
            query: Some("alpha".to_string()),
            ..FilesQuery::default()
        };
        let page = list_files(&tracker, &valid_only).await.unwrap();
        assert_eq!(page.total, 1);
        assert!(page.files[0].current_location.ends_with("alpha.md"));
    }

    #[tokio::test]
    async fn delete_by_identity_and_path() {
        let (tmp, tracker, records) = seeded().await;
        delete_record(&tracker, &DeleteTarget::Identity(records[0].content_identity.clone()))
            .await
            .unwrap();
        delete_record(&tracker, &DeleteTarget::Path(tmp.path().join("beta.txt")))
            .await
            .unwrap();
        assert_eq!(tracker.count(false).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn deleting_unknown_record_is_not_found() {
        let (tmp, tracker, _) = seeded().await;
        let err = delete_record(&tracker, &DeleteTarget::Path(tmp.path().join("nope.md")))
            .await
            .unwrap_err();
        assert_eq!(err.downcast_ref::<VaultError>().unwrap().code(), "not_found");
    }
}
