//! Query execution: index lookup followed by location resolution.
//!
//! Shared by `fvault search` and `POST /search`. The index must be ready;
//! an unbuilt index surfaces as [`VaultError::IndexUnavailable`].

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde::Serialize;

use filevault_core::index::IndexQuery;
use filevault_core::resolve::{resolve, ResolvedHit, Resolution};

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::index::FlatIndex;
use crate::tracker::FileTracker;

/// Resolved hits for one query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub top_k: usize,
    pub hits: Vec<ResolvedHit>,
    /// Wall-clock time for query plus resolution.
    pub latency_ms: f64,
}

/// Open the index at `index_path` for querying.
pub fn open_index(index_path: &Path, embedder: Arc<dyn Embedder>) -> Result<FlatIndex> {
    FlatIndex::open(index_path, embedder)
}

/// Query `index` and resolve every hit against the tracker.
pub async fn search(
    tracker: &FileTracker,
    index: &dyn IndexQuery,
    query: &str,
    top_k: usize,
) -> Result<SearchResponse> {
    let started = Instant::now();
    let hits = if query.trim().is_empty() || top_k == 0 {
        Vec::new()
    } else {
        let raw = index.query(query, top_k).await?;
        resolve(tracker.store(), raw).await
    };
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    tracing::debug!(query, hits = hits.len(), latency_ms, "search finished");
    Ok(SearchResponse {
        query: query.to_string(),
        top_k,
        hits,
        latency_ms,
    })
}

/// Run `fvault search`.
pub async fn run_search(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let top_k = top_k.unwrap_or(config.index.default_top_k);
    let embedder = create_embedder(&config.embedding)?;
    let index = open_index(&config.index.path, embedder)?;
    let tracker = FileTracker::open(config).await?;

    let response = search(&tracker, &index, query, top_k).await?;
    if response.hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in response.hits.iter().enumerate() {
        let marker = match (hit.resolution, hit.is_valid) {
            (Resolution::Tracked, Some(true)) => "",
            (Resolution::Tracked, _) => " [invalid]",
            (Resolution::Snapshot, _) => " [untracked]",
        };
        println!(
            "{}. [{:.3}] {}{}",
            i + 1,
            hit.score,
            hit.current_location.display(),
            marker
        );
        println!("    identity: {}  kind: {}", hit.content_identity.short(), hit.content_kind);
        println!("    {}", snippet(&hit.text, 160));
        println!();
    }
    println!(
        "{} result(s) in {:.1} ms",
        response.hits.len(),
        response.latency_ms
    );
    Ok(())
}

/// First `max_chars` characters of `text` on one line.
fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::index::FlatIndexBuilder;
    use crate::progress::NoProgress;
    use filevault_core::index::IndexDocument;
    use filevault_core::metadata::DocumentMetadata;
    use filevault_core::store::memory::InMemoryRecordStore;

    async fn tracked_index(tmp: &Path) -> (FileTracker, FlatIndex, std::path::PathBuf) {
        let tracker = FileTracker::new(Arc::new(InMemoryRecordStore::new()));
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(128));
        let mut builder = FlatIndexBuilder::new(embedder.clone(), 16);

        let path = tmp.join("bread.md");
        let text = "sourdough bread baking with a long cold proof";
        std::fs::write(&path, text).unwrap();
        let record = tracker.upsert(&path, None).await.unwrap();
        builder.add(IndexDocument {
            text: text.to_string(),
            metadata: DocumentMetadata::from_record(&record),
        });

        let index_path = tmp.join("index.json");
        builder.finalize(&index_path, &NoProgress).await.unwrap();
        let index = open_index(&index_path, embedder).unwrap();
        (tracker, index, path)
    }

    #[tokio::test]
    async fn resolves_hits_to_current_location() {
        let tmp = tempfile::tempdir().unwrap();
        let (tracker, index, path) = tracked_index(tmp.path()).await;

        let moved = tmp.path().join("moved.md");
        std::fs::rename(&path, &moved).unwrap();
        let id = tracker.get_by_location(&path).await.unwrap().unwrap().content_identity;
        tracker.set_location(&id, &moved).await.unwrap();

        let response = search(&tracker, &index, "bread baking", 3).await.unwrap();
        assert_eq!(response.hits.len(), 1);
        let hit = &response.hits[0];
        assert_eq!(hit.resolution, Resolution::Tracked);
        assert_eq!(hit.current_location, moved);
        assert!(hit.location_snapshot.ends_with("bread.md"));
        assert!(response.latency_ms >= 0.0);
    }

    #[tokio::test]
    async fn deleted_record_falls_back_to_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let (tracker, index, path) = tracked_index(tmp.path()).await;
        assert!(tracker.delete_by_location(&path).await.unwrap());

        let response = search(&tracker, &index, "sourdough", 3).await.unwrap();
        let hit = &response.hits[0];
        assert_eq!(hit.resolution, Resolution::Snapshot);
        assert_eq!(hit.is_valid, None);
        assert_eq!(hit.current_location, hit.location_snapshot);
    }

    #[tokio::test]
    async fn blank_query_returns_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let (tracker, index, _) = tracked_index(tmp.path()).await;
        let response = search(&tracker, &index, "   ", 3).await.unwrap();
        assert!(response.hits.is_empty());
    }

    #[test]
    fn unbuilt_index_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let err = open_index(&tmp.path().join("none.json"), Arc::new(HashingEmbedder::new(8)))
            .unwrap_err();
        let vault = err.downcast_ref::<crate::error::VaultError>().unwrap();
        assert_eq!(vault.code(), "index_unavailable");
    }

    #[test]
    fn snippet_flattens_and_truncates() {
        assert_eq!(snippet("a\n b\tc", 10), "a b c");
        assert_eq!(snippet("abcdefghij", 4), "abcd...");
    }
}
