//! Query-time resolution of index hits to current file locations.
//!
//! Every hit carries the content identity it was indexed under. The
//! resolver looks that identity up in the record store and reports where
//! the content lives *now*; when the store cannot answer (unknown
//! identity, or the lookup itself failed) it falls back to the location
//! snapshot taken at index time.
//!
//! Resolution never fails and never reorders hits.

use std::path::PathBuf;

use serde::Serialize;

use crate::identity::ContentIdentity;
use crate::index::QueryHit;
use crate::models::ContentKind;
use crate::store::RecordStore;

/// Where a resolved location came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Read from the record store.
    Tracked,
    /// Copied from the hit's index-time snapshot.
    Snapshot,
}

/// A query hit with its location resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedHit {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub content_identity: ContentIdentity,
    pub content_kind: ContentKind,
    pub location_snapshot: PathBuf,
    pub current_location: PathBuf,
    /// Validity of the tracked record; `None` when resolved from the snapshot.
    pub is_valid: Option<bool>,
    pub resolution: Resolution,
}

impl ResolvedHit {
    fn from_snapshot(hit: QueryHit) -> Self {
        let meta = hit.metadata;
        Self {
            id: hit.id,
            text: hit.text,
            score: hit.score,
            current_location: meta.location_snapshot.clone(),
            location_snapshot: meta.location_snapshot,
            content_identity: meta.content_identity,
            content_kind: meta.content_kind,
            is_valid: None,
            resolution: Resolution::Snapshot,
        }
    }
}

/// Resolve `hits` against `store`, preserving order.
pub async fn resolve<S: RecordStore + ?Sized>(store: &S, hits: Vec<QueryHit>) -> Vec<ResolvedHit> {
    let mut out = Vec::with_capacity(hits.len());
    for hit in hits {
        let identity = hit.metadata.content_identity.clone();
        let resolved = match store.get_by_identity(&identity).await {
            Ok(Some(record)) => {
                let mut r = ResolvedHit::from_snapshot(hit);
                r.current_location = record.current_location;
                r.is_valid = Some(record.is_valid);
                r.resolution = Resolution::Tracked;
                r
            }
            Ok(None) => {
                tracing::debug!(identity = %identity.short(), "hit not tracked, using snapshot");
                ResolvedHit::from_snapshot(hit)
            }
            Err(e) => {
                tracing::warn!(identity = %identity.short(), error = %e, "record lookup failed, using snapshot");
                ResolvedHit::from_snapshot(hit)
            }
        };
        out.push(resolved);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::DocumentMetadata;
    use crate::models::{FileObservation, ListQuery, TrackedFileRecord};
    use crate::store::memory::InMemoryRecordStore;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::BTreeMap;
    use std::path::Path;

    fn hit(content: &[u8], snapshot: &str, score: f32) -> QueryHit {
        QueryHit {
            id: format!("e{}", score),
            text: String::from_utf8_lossy(content).into_owned(),
            score,
            metadata: DocumentMetadata {
                content_identity: ContentIdentity::from_bytes(content),
                content_kind: ContentKind::Text,
                size_bytes: content.len() as u64,
                location_snapshot: PathBuf::from(snapshot),
                extra: BTreeMap::new(),
            },
        }
    }

    fn obs(content: &[u8], location: &str) -> FileObservation {
        FileObservation {
            content_identity: ContentIdentity::from_bytes(content),
            location: PathBuf::from(location),
            content_kind: ContentKind::Text,
            size_bytes: content.len() as u64,
        }
    }

    #[tokio::test]
    async fn tracked_hit_uses_current_location() {
        let store = InMemoryRecordStore::new();
        let now = Utc::now();
        store.upsert(&obs(b"alpha", "/old/a.txt"), now).await.unwrap();
        store.upsert(&obs(b"alpha", "/new/a.txt"), now).await.unwrap();

        let out = resolve(&store, vec![hit(b"alpha", "/old/a.txt", 0.9)]).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].current_location, PathBuf::from("/new/a.txt"));
        assert_eq!(out[0].location_snapshot, PathBuf::from("/old/a.txt"));
        assert_eq!(out[0].resolution, Resolution::Tracked);
        assert_eq!(out[0].is_valid, Some(true));
    }

    #[tokio::test]
    async fn untracked_hit_falls_back_and_order_is_kept() {
        let store = InMemoryRecordStore::new();
        store.upsert(&obs(b"beta", "/b.txt"), Utc::now()).await.unwrap();

        let out = resolve(
            &store,
            vec![hit(b"gone", "/gone.txt", 0.8), hit(b"beta", "/b.txt", 0.5)],
        )
        .await;
        assert_eq!(out[0].current_location, PathBuf::from("/gone.txt"));
        assert_eq!(out[0].resolution, Resolution::Snapshot);
        assert_eq!(out[0].is_valid, None);
        assert_eq!(out[1].resolution, Resolution::Tracked);
        assert_eq!(out[1].score, 0.5);
    }

    #[tokio::test]
    async fn invalid_record_still_resolves_with_flag() {
        let store = InMemoryRecordStore::new();
        let rec = store.upsert(&obs(b"gamma", "/g.txt"), Utc::now()).await.unwrap();
        store.invalidate(&rec.content_identity).await.unwrap();

        let out = resolve(&store, vec![hit(b"gamma", "/g.txt", 1.0)]).await;
        assert_eq!(out[0].is_valid, Some(false));
        assert_eq!(out[0].resolution, Resolution::Tracked);
    }

    struct FailingStore;

    #[async_trait]
    impl RecordStore for FailingStore {
        async fn upsert(&self, _: &FileObservation, _: DateTime<Utc>) -> Result<TrackedFileRecord> {
            Err(anyhow!("down"))
        }
        async fn get_by_identity(&self, _: &ContentIdentity) -> Result<Option<TrackedFileRecord>> {
            Err(anyhow!("down"))
        }
        async fn get_by_location(&self, _: &Path) -> Result<Option<TrackedFileRecord>> {
            Err(anyhow!("down"))
        }
        async fn search_by_name(&self, _: &str, _: i64) -> Result<Vec<TrackedFileRecord>> {
            Err(anyhow!("down"))
        }
        async fn set_location(
            &self,
            _: &ContentIdentity,
            _: &Path,
            _: Option<u64>,
            _: DateTime<Utc>,
        ) -> Result<bool> {
            Err(anyhow!("down"))
        }
        async fn invalidate(&self, _: &ContentIdentity) -> Result<bool> {
            Err(anyhow!("down"))
        }
        async fn delete(&self, _: &ContentIdentity) -> Result<bool> {
            Err(anyhow!("down"))
        }
        async fn list(&self, _: &ListQuery) -> Result<Vec<TrackedFileRecord>> {
            Err(anyhow!("down"))
        }
        async fn count(&self, _: bool) -> Result<i64> {
            Err(anyhow!("down"))
        }
    }

    #[tokio::test]
    async fn store_failure_falls_back_to_snapshot() {
        let out = resolve(&FailingStore, vec![hit(b"delta", "/d.txt", 0.3)]).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].current_location, PathBuf::from("/d.txt"));
        assert_eq!(out[0].resolution, Resolution::Snapshot);
    }

    #[tokio::test]
    async fn empty_input_is_empty_output() {
        let store = InMemoryRecordStore::new();
        assert!(resolve(&store, Vec::new()).await.is_empty());
    }
}
