//! Storage abstraction for tracked-file records.
//!
//! The [`RecordStore`] trait is the durable identity → location table the
//! reconciler, admission pipeline, and resolver all work through. Backends
//! are pluggable: SQLite in the application crate, an in-memory map here.
//!
//! Implementations must be `Send + Sync` to work with async runtimes, and
//! every mutating method must be atomic on its own. Nothing spans more
//! than one call; concurrent writers to the same identity race and the
//! last commit wins.

pub mod memory;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::identity::ContentIdentity;
use crate::models::{FileObservation, ListQuery, TrackedFileRecord};

/// Abstract record store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](RecordStore::upsert) | Insert a record or refresh an existing one |
/// | [`get_by_identity`](RecordStore::get_by_identity) | Lookup by content identity |
/// | [`get_by_location`](RecordStore::get_by_location) | Lookup by exact current location |
/// | [`search_by_name`](RecordStore::search_by_name) | Newest-first substring match on location |
/// | [`set_location`](RecordStore::set_location) | Confirm a (possibly new) location |
/// | [`invalidate`](RecordStore::invalidate) | Mark a record's location as missing |
/// | [`delete`](RecordStore::delete) | Remove a record permanently |
/// | [`list`](RecordStore::list) | Newest-first listing with pagination |
/// | [`count`](RecordStore::count) | Count records |
///
/// Whenever a write confirms an identity at a location that another valid
/// record still claims, that other record is invalidated in the same
/// transaction: one location holds one content.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record, or update `current_location`, `size_bytes` and
    /// `last_confirmed_at` of an existing one and mark it valid.
    ///
    /// `original_location`, `content_kind` and `admitted_at` of an existing
    /// record are never changed.
    async fn upsert(&self, obs: &FileObservation, now: DateTime<Utc>) -> Result<TrackedFileRecord>;

    async fn get_by_identity(&self, identity: &ContentIdentity) -> Result<Option<TrackedFileRecord>>;

    /// Exact match on `current_location`. A valid record is preferred over
    /// invalid ones that still carry the same stale location.
    async fn get_by_location(&self, location: &Path) -> Result<Option<TrackedFileRecord>>;

    async fn search_by_name(&self, substring: &str, limit: i64) -> Result<Vec<TrackedFileRecord>>;

    /// Confirm `identity` at `location`. `size_bytes` replaces the stored
    /// size when given. Returns `false` if the identity is unknown.
    async fn set_location(
        &self,
        identity: &ContentIdentity,
        location: &Path,
        size_bytes: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Returns `false` if the identity is unknown.
    async fn invalidate(&self, identity: &ContentIdentity) -> Result<bool>;

    /// Returns `false` if the identity is unknown.
    async fn delete(&self, identity: &ContentIdentity) -> Result<bool>;

    /// Newest-first by `admitted_at`, ties broken by identity.
    async fn list(&self, query: &ListQuery) -> Result<Vec<TrackedFileRecord>>;

    async fn count(&self, valid_only: bool) -> Result<i64>;
}
