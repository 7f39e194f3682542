//! Flat vector index engine.
//!
//! A brute-force cosine index persisted as one JSON artifact. Building is
//! two-step: [`FlatIndexBuilder::add`] collects documents,
//! [`FlatIndexBuilder::finalize`] embeds them and writes the artifact.
//! Querying loads the artifact once ([`FlatIndex::open`]) and scores every
//! entry per query.
//!
//! Readiness is the presence of the descriptor `<index path>.meta.json`,
//! written only after the artifact itself is complete.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use filevault_core::identity::ContentIdentity;
use filevault_core::index::{IndexDocument, IndexQuery, QueryHit};
use filevault_core::metadata::DocumentMetadata;

use crate::embedding::{cosine_similarity, embed_batched, embed_query, Embedder};
use crate::error::VaultError;
use crate::progress::ProgressReporter;

pub const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    id: String,
    text: String,
    vector: Vec<f32>,
    metadata: DocumentMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexArtifact {
    format_version: u32,
    model: String,
    dims: usize,
    entries: Vec<IndexEntry>,
}

/// Summary written next to a finished index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub format_version: u32,
    pub model: String,
    pub dims: usize,
    pub entry_count: usize,
    pub built_at: DateTime<Utc>,
}

/// `<index path>.meta.json`
pub fn descriptor_path(index_path: &Path) -> PathBuf {
    let mut s: OsString = index_path.as_os_str().to_owned();
    s.push(".meta.json");
    PathBuf::from(s)
}

/// Whether a finished index exists at `index_path`.
pub fn is_ready(index_path: &Path) -> bool {
    index_path.is_file() && descriptor_path(index_path).is_file()
}

pub fn read_descriptor(index_path: &Path) -> Result<IndexDescriptor> {
    let path = descriptor_path(index_path);
    let file = File::open(&path).map_err(|e| VaultError::io(&path, e))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid index descriptor: {}", path.display()))
}

fn read_artifact(index_path: &Path) -> Result<IndexArtifact> {
    let file = File::open(index_path).map_err(|e| VaultError::io(index_path, e))?;
    let artifact: IndexArtifact = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid index artifact: {}", index_path.display()))?;
    if artifact.format_version != INDEX_FORMAT_VERSION {
        bail!(
            "Index format version {} is not supported (expected {}); rebuild the index",
            artifact.format_version,
            INDEX_FORMAT_VERSION
        );
    }
    Ok(artifact)
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| VaultError::io(parent, e))?;
        }
    }
    let mut tmp: OsString = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let file = File::create(&tmp).map_err(|e| VaultError::io(&tmp, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush().map_err(|e| VaultError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| VaultError::io(path, e))?;
    Ok(())
}

/// Collects documents and writes a [`FlatIndex`] artifact.
pub struct FlatIndexBuilder {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    existing: Vec<IndexEntry>,
    pending: Vec<IndexDocument>,
}

impl FlatIndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size,
            existing: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Start from the entries of the ready index at `index_path`, if any.
    ///
    /// Entries embedded with a different model are queued for
    /// re-embedding instead of being kept as-is.
    pub fn with_existing(
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
        index_path: &Path,
    ) -> Result<Self> {
        let mut builder = Self::new(embedder, batch_size);
        if !is_ready(index_path) {
            return Ok(builder);
        }

        let artifact = read_artifact(index_path)?;
        if artifact.model == builder.embedder.model_name()
            && artifact.dims == builder.embedder.dims()
        {
            builder.existing = artifact.entries;
        } else {
            tracing::warn!(
                built_with = %artifact.model,
                configured = builder.embedder.model_name(),
                entries = artifact.entries.len(),
                "embedding model changed, re-embedding existing entries"
            );
            builder.pending = artifact
                .entries
                .into_iter()
                .map(|e| IndexDocument {
                    text: e.text,
                    metadata: e.metadata,
                })
                .collect();
        }
        Ok(builder)
    }

    pub fn add(&mut self, doc: IndexDocument) {
        self.pending.push(doc);
    }

    /// Number of documents the finished index will hold.
    pub fn len(&self) -> usize {
        let pending: std::collections::HashSet<&ContentIdentity> = self
            .pending
            .iter()
            .map(|d| &d.metadata.content_identity)
            .collect();
        let kept = self
            .existing
            .iter()
            .filter(|e| !pending.contains(&e.metadata.content_identity))
            .count();
        kept + pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embed pending documents and write the artifact and descriptor.
    ///
    /// One entry per content identity: a document added again replaces the
    /// earlier entry.
    pub async fn finalize(
        self,
        index_path: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<IndexDescriptor> {
        let texts: Vec<String> = self.pending.iter().map(|d| d.text.clone()).collect();
        let vectors = embed_batched(self.embedder.as_ref(), &texts, self.batch_size, progress).await?;

        let mut entries = self.existing;
        for (doc, vector) in self.pending.into_iter().zip(vectors) {
            let id = doc.metadata.content_identity.to_string();
            entries.retain(|e| e.id != id);
            entries.push(IndexEntry {
                id,
                text: doc.text,
                vector,
                metadata: doc.metadata,
            });
        }

        let descriptor = IndexDescriptor {
            format_version: INDEX_FORMAT_VERSION,
            model: self.embedder.model_name().to_string(),
            dims: self.embedder.dims(),
            entry_count: entries.len(),
            built_at: Utc::now(),
        };
        let artifact = IndexArtifact {
            format_version: INDEX_FORMAT_VERSION,
            model: descriptor.model.clone(),
            dims: descriptor.dims,
            entries,
        };

        // Artifact first: the descriptor marks the index ready.
        write_json_atomic(index_path, &artifact)?;
        write_json_atomic(&descriptor_path(index_path), &descriptor)?;

        tracing::info!(
            path = %index_path.display(),
            entries = descriptor.entry_count,
            model = %descriptor.model,
            "index written"
        );
        Ok(descriptor)
    }
}

/// A loaded index, ready for queries.
pub struct FlatIndex {
    entries: Vec<IndexEntry>,
    descriptor: IndexDescriptor,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for FlatIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatIndex")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl FlatIndex {
    /// Load the index at `index_path`.
    ///
    /// Fails with [`VaultError::IndexUnavailable`] if it has not been
    /// built, and refuses an index built with a different model.
    pub fn open(index_path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if !is_ready(index_path) {
            return Err(VaultError::IndexUnavailable {
                path: index_path.to_path_buf(),
            }
            .into());
        }
        let descriptor = read_descriptor(index_path)?;
        let artifact = read_artifact(index_path)?;
        if artifact.model != embedder.model_name() || artifact.dims != embedder.dims() {
            bail!(
                "Index was built with {} ({} dims) but {} ({} dims) is configured; rebuild with `fvault index`",
                artifact.model,
                artifact.dims,
                embedder.model_name(),
                embedder.dims()
            );
        }
        tracing::debug!(path = %index_path.display(), entries = artifact.entries.len(), "index loaded");
        Ok(Self {
            entries: artifact.entries,
            descriptor,
            embedder,
        })
    }

    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }
}

#[async_trait]
impl IndexQuery for FlatIndex {
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<QueryHit>> {
        let query = embed_query(self.embedder.as_ref(), text).await?;

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(&query, &e.vector), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, e)| QueryHit {
                id: e.id.clone(),
                text: e.text.clone(),
                score,
                metadata: e.metadata.clone(),
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// On-disk footprint of an index, for status output.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub ready: bool,
    pub size_bytes: u64,
    pub file_count: usize,
    pub descriptor: Option<IndexDescriptor>,
}

pub fn index_stats(index_path: &Path) -> IndexStats {
    let mut size_bytes = 0;
    let mut file_count = 0;
    for path in [index_path.to_path_buf(), descriptor_path(index_path)] {
        if let Ok(meta) = std::fs::metadata(&path) {
            if meta.is_file() {
                size_bytes += meta.len();
                file_count += 1;
            }
        }
    }
    let ready = is_ready(index_path);
    IndexStats {
        ready,
        size_bytes,
        file_count,
        descriptor: if ready {
            read_descriptor(index_path).ok()
        } else {
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::progress::NoProgress;
    use filevault_core::models::ContentKind;
    use std::collections::BTreeMap;

    fn doc(text: &str, location: &str) -> IndexDocument {
        IndexDocument {
            text: text.to_string(),
            metadata: DocumentMetadata {
                content_identity: ContentIdentity::from_bytes(text.as_bytes()),
                content_kind: ContentKind::Text,
                size_bytes: text.len() as u64,
                location_snapshot: PathBuf::from(location),
                extra: BTreeMap::new(),
            },
        }
    }

    fn hashing(dims: usize) -> Arc<dyn Embedder> {
        Arc::new(HashingEmbedder::new(dims))
    }

    #[test]
    fn descriptor_path_appends_suffix() {
        assert_eq!(
            descriptor_path(Path::new("/data/index.json")),
            PathBuf::from("/data/index.json.meta.json")
        );
    }

    #[tokio::test]
    async fn build_then_query_ranks_by_similarity() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("idx/index.json");
        assert!(!is_ready(&path));

        let mut builder = FlatIndexBuilder::new(hashing(128), 8);
        builder.add(doc("rust ownership and borrowing explained", "/a.txt"));
        builder.add(doc("sourdough bread baking at home", "/b.txt"));
        builder.add(doc("async rust with tokio runtime", "/c.txt"));
        let descriptor = builder.finalize(&path, &NoProgress).await.unwrap();
        assert_eq!(descriptor.entry_count, 3);
        assert!(is_ready(&path));

        let index = FlatIndex::open(&path, hashing(128)).unwrap();
        let hits = index.query("bread baking", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].metadata.location_snapshot, PathBuf::from("/b.txt"));
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn open_unbuilt_index_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let err = FlatIndex::open(&tmp.path().join("index.json"), hashing(8)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VaultError>(),
            Some(VaultError::IndexUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn artifact_without_descriptor_is_not_ready() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(!is_ready(&path));
    }

    #[tokio::test]
    async fn rebuild_keeps_existing_and_replaces_same_identity() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.json");

        let mut first = FlatIndexBuilder::new(hashing(64), 8);
        first.add(doc("first document body", "/old/one.txt"));
        first.finalize(&path, &NoProgress).await.unwrap();

        let mut second = FlatIndexBuilder::with_existing(hashing(64), 8, &path).unwrap();
        assert_eq!(second.len(), 1);
        second.add(doc("second document body", "/two.txt"));
        second.add(doc("first document body", "/new/one.txt"));
        assert_eq!(second.len(), 2);
        let descriptor = second.finalize(&path, &NoProgress).await.unwrap();
        assert_eq!(descriptor.entry_count, 2);

        let index = FlatIndex::open(&path, hashing(64)).unwrap();
        assert_eq!(index.len(), 2);
        let hits = index.query("first document body", 1).await.unwrap();
        assert_eq!(hits[0].metadata.location_snapshot, PathBuf::from("/new/one.txt"));
    }

    #[tokio::test]
    async fn model_change_reembeds_existing_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.json");
        let mut b = FlatIndexBuilder::new(hashing(32), 8);
        b.add(doc("kept across model change", "/k.txt"));
        b.finalize(&path, &NoProgress).await.unwrap();

        assert!(FlatIndex::open(&path, hashing(64)).is_err());

        let rebuilt = FlatIndexBuilder::with_existing(hashing(64), 8, &path).unwrap();
        let descriptor = rebuilt.finalize(&path, &NoProgress).await.unwrap();
        assert_eq!(descriptor.dims, 64);
        assert_eq!(descriptor.entry_count, 1);
        assert_eq!(FlatIndex::open(&path, hashing(64)).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stats_report_both_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.json");
        let before = index_stats(&path);
        assert!(!before.ready);
        assert_eq!(before.file_count, 0);

        let mut b = FlatIndexBuilder::new(hashing(8), 8);
        b.add(doc("stat me", "/s.txt"));
        b.finalize(&path, &NoProgress).await.unwrap();

        let after = index_stats(&path);
        assert!(after.ready);
        assert_eq!(after.file_count, 2);
        assert!(after.size_bytes > 0);
        assert_eq!(after.descriptor.unwrap().entry_count, 1);
    }
}
