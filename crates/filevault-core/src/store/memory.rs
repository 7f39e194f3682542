//! In-memory [`RecordStore`] implementation for testing and embedding.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Every method takes the lock
//! once, so each call is atomic just like a single SQLite transaction.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::identity::ContentIdentity;
use crate::models::{FileObservation, ListQuery, TrackedFileRecord};

use super::RecordStore;

/// In-memory record store.
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<ContentIdentity, TrackedFileRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<ContentIdentity, TrackedFileRecord>>> {
        self.records
            .read()
            .map_err(|_| anyhow!("record store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<ContentIdentity, TrackedFileRecord>>> {
        self.records
            .write()
            .map_err(|_| anyhow!("record store lock poisoned"))
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(a: &TrackedFileRecord, b: &TrackedFileRecord) -> std::cmp::Ordering {
    b.admitted_at
        .cmp(&a.admitted_at)
        .then_with(|| a.content_identity.cmp(&b.content_identity))
}

/// Invalidate every valid record other than `keep` that claims `location`.
fn release_location(
    records: &mut HashMap<ContentIdentity, TrackedFileRecord>,
    location: &Path,
    keep: &ContentIdentity,
) {
    for rec in records.values_mut() {
        if rec.is_valid && rec.current_location == location && &rec.content_identity != keep {
            rec.is_valid = false;
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn upsert(&self, obs: &FileObservation, now: DateTime<Utc>) -> Result<TrackedFileRecord> {
        let mut records = self.write()?;
        release_location(&mut records, &obs.location, &obs.content_identity);

        let record = records
            .entry(obs.content_identity.clone())
            .and_modify(|rec| {
                rec.current_location = obs.location.clone();
                rec.size_bytes = obs.size_bytes;
                rec.last_confirmed_at = now;
                rec.is_valid = true;
            })
            .or_insert_with(|| obs.clone().into_record(now));
        Ok(record.clone())
    }

    async fn get_by_identity(&self, identity: &ContentIdentity) -> Result<Option<TrackedFileRecord>> {
        Ok(self.read()?.get(identity).cloned())
    }

    async fn get_by_location(&self, location: &Path) -> Result<Option<TrackedFileRecord>> {
        let records = self.read()?;
        let mut matches: Vec<&TrackedFileRecord> = records
            .values()
            .filter(|r| r.current_location == location)
            .collect();
        matches.sort_by(|a, b| {
            b.is_valid
                .cmp(&a.is_valid)
                .then_with(|| b.last_confirmed_at.cmp(&a.last_confirmed_at))
        });
        Ok(matches.first().map(|r| (*r).clone()))
    }

    async fn search_by_name(&self, substring: &str, limit: i64) -> Result<Vec<TrackedFileRecord>> {
        let needle = substring.to_ascii_lowercase();
        let records = self.read()?;
        let mut found: Vec<TrackedFileRecord> = records
            .values()
            .filter(|r| {
                r.current_location
                    .to_string_lossy()
                    .to_ascii_lowercase()
                    .contains(&needle)
            })
            .cloned()
            .collect();
        found.sort_by(newest_first);
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn set_location(
        &self,
        identity: &ContentIdentity,
        location: &Path,
        size_bytes: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut records = self.write()?;
        if !records.contains_key(identity) {
            return Ok(false);
        }
        release_location(&mut records, location, identity);
        if let Some(rec) = records.get_mut(identity) {
            rec.current_location = location.to_path_buf();
            if let Some(size) = size_bytes {
                rec.size_bytes = size;
            }
            rec.last_confirmed_at = now;
            rec.is_valid = true;
        }
        Ok(true)
    }

    async fn invalidate(&self, identity: &ContentIdentity) -> Result<bool> {
        let mut records = self.write()?;
        Ok(match records.get_mut(identity) {
            Some(rec) => {
                rec.is_valid = false;
                true
            }
            None => false,
        })
    }

    async fn delete(&self, identity: &ContentIdentity) -> Result<bool> {
        Ok(self.write()?.remove(identity).is_some())
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<TrackedFileRecord>> {
        let records = self.read()?;
        let mut all: Vec<TrackedFileRecord> = records
            .values()
            .filter(|r| !query.valid_only || r.is_valid)
            .cloned()
            .collect();
        all.sort_by(newest_first);

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let iter = all.into_iter().skip(offset);
        Ok(match query.limit {
            Some(limit) => iter.take(limit.max(0) as usize).collect(),
            None => iter.collect(),
        })
    }

    async fn count(&self, valid_only: bool) -> Result<i64> {
        let records = self.read()?;
        Ok(records.values().filter(|r| !valid_only || r.is_valid).count() as i64)
    }
}
