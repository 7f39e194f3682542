//! Filesystem-aware front of the record store.
//!
//! [`FileTracker`] wraps any [`RecordStore`] and adds the parts that need
//! the disk: path normalization, existence checks, stat'ing sizes, and
//! hashing content when the caller has not already done so.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;

use filevault_core::identity::ContentIdentity;
use filevault_core::models::{ContentKind, FileObservation, ListQuery, TrackedFileRecord};
use filevault_core::store::RecordStore;

use crate::config::Config;
use crate::error::VaultError;
use crate::hashing::hash_file;
use crate::sqlite_store::SqliteRecordStore;
use crate::{db, migrate};

/// Make `path` absolute against the working directory without touching
/// symlinks.
pub fn absolutize(path: &Path) -> Result<PathBuf, VaultError> {
    std::path::absolute(path).map_err(|e| VaultError::io(path, e))
}

#[derive(Clone)]
pub struct FileTracker {
    store: Arc<dyn RecordStore>,
}

impl FileTracker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Connect to the configured SQLite database, creating the schema if
    /// it does not exist yet.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(Arc::new(SqliteRecordStore::new(pool))))
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// Record that the content at `location` is present.
    ///
    /// Hashes the file unless `identity` is supplied. Fails with
    /// [`VaultError::NotFound`] if nothing exists at `location` and with
    /// [`VaultError::Unsupported`] if its name maps to no content kind.
    pub async fn upsert(
        &self,
        location: &Path,
        identity: Option<ContentIdentity>,
    ) -> Result<TrackedFileRecord> {
        let location = absolutize(location)?;
        let size_bytes = file_size(&location)?;
        let content_kind = ContentKind::from_path(&location).ok_or_else(|| {
            VaultError::Unsupported(format!("no content kind for {}", location.display()))
        })?;
        let content_identity = match identity {
            Some(id) => id,
            None => hash_file(&location)?,
        };

        let obs = FileObservation {
            content_identity,
            location,
            content_kind,
            size_bytes,
        };
        let record = self.store.upsert(&obs, Utc::now()).await?;
        tracing::debug!(
            identity = %record.content_identity.short(),
            location = %record.current_location.display(),
            "upserted"
        );
        Ok(record)
    }

    pub async fn get_by_identity(
        &self,
        identity: &ContentIdentity,
    ) -> Result<Option<TrackedFileRecord>> {
        self.store.get_by_identity(identity).await
    }

    pub async fn get_by_location(&self, location: &Path) -> Result<Option<TrackedFileRecord>> {
        let location = absolutize(location)?;
        self.store.get_by_location(&location).await
    }

    pub async fn search_by_name(&self, substring: &str, limit: i64) -> Result<Vec<TrackedFileRecord>> {
        self.store.search_by_name(substring, limit).await
    }

    /// Confirm `identity` at `new_location`. The stored size is refreshed
    /// when the file can be stat'ed. Returns `false` for unknown identities.
    pub async fn set_location(&self, identity: &ContentIdentity, new_location: &Path) -> Result<bool> {
        let new_location = absolutize(new_location)?;
        let size = std::fs::metadata(&new_location).ok().map(|m| m.len());
        self.store
            .set_location(identity, &new_location, size, Utc::now())
            .await
    }

    pub async fn invalidate(&self, identity: &ContentIdentity) -> Result<bool> {
        self.store.invalidate(identity).await
    }

    pub async fn delete(&self, identity: &ContentIdentity) -> Result<bool> {
        self.store.delete(identity).await
    }

    /// Delete whichever record currently claims `location`.
    pub async fn delete_by_location(&self, location: &Path) -> Result<bool> {
        match self.get_by_location(location).await? {
            Some(record) => self.store.delete(&record.content_identity).await,
            None => Ok(false),
        }
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Vec<TrackedFileRecord>> {
        self.store.list(query).await
    }

    pub async fn count(&self, valid_only: bool) -> Result<i64> {
        self.store.count(valid_only).await
    }
}

fn file_size(location: &Path) -> Result<u64, VaultError> {
    match std::fs::metadata(location) {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Err(VaultError::NotFound(format!(
            "not a regular file: {}",
            location.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(VaultError::NotFound(
            location.display().to_string(),
        )),
        Err(e) => Err(VaultError::io(location, e)),
    }
}
