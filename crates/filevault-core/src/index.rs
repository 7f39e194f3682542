//! Seam between the tracker and a vector index engine.
//!
//! The engine is a collaborator: at build time it receives
//! [`IndexDocument`]s, at query time it hands back ranked [`QueryHit`]s
//! whose metadata round-trips unchanged. Nothing here knows how vectors
//! are stored.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::metadata::DocumentMetadata;

/// A `(text, metadata)` pair handed to an index builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// One ranked result from an index engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    /// Engine-assigned entry id.
    pub id: String,
    pub text: String,
    /// Higher is better.
    pub score: f32,
    pub metadata: DocumentMetadata,
}

/// A loaded, queryable index.
#[async_trait]
pub trait IndexQuery: Send + Sync {
    /// Return at most `top_k` hits for `text`, best first.
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<QueryHit>>;

    /// Number of entries the index holds.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
