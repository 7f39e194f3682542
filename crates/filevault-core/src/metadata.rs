//! Typed metadata carried by every index entry.
//!
//! The index engine treats metadata as an opaque bag that round-trips
//! with each hit. The known keys are modeled as fields so resolution can
//! read the content identity directly; anything else an engine wants to
//! attach lives in [`DocumentMetadata::extra`] and is flattened into the
//! same JSON object on the wire.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::identity::ContentIdentity;
use crate::models::{ContentKind, TrackedFileRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub content_identity: ContentIdentity,
    pub content_kind: ContentKind,
    pub size_bytes: u64,
    /// Where the file lived when it was indexed. Used only when the store
    /// no longer knows the identity.
    pub location_snapshot: PathBuf,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DocumentMetadata {
    /// Snapshot a record's current state.
    pub fn from_record(record: &TrackedFileRecord) -> Self {
        Self {
            content_identity: record.content_identity.clone(),
            content_kind: record.content_kind,
            size_bytes: record.size_bytes,
            location_snapshot: record.current_location.clone(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}
