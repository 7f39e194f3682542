//! Core data models for tracked files.
//!
//! These types describe what the record store persists and what the
//! reconciler and admission pipeline hand to it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::ContentIdentity;

/// Normalized type tag derived from a file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    /// Structured message record (e.g. an exported email as JSON).
    Json,
    Markdown,
    Text,
    Html,
}

impl ContentKind {
    /// Every kind, in tag order.
    pub const ALL: [ContentKind; 8] = [
        ContentKind::Pdf,
        ContentKind::Docx,
        ContentKind::Pptx,
        ContentKind::Xlsx,
        ContentKind::Json,
        ContentKind::Markdown,
        ContentKind::Text,
        ContentKind::Html,
    ];

    /// The tag stored in the record table.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Pdf => "pdf",
            ContentKind::Docx => "docx",
            ContentKind::Pptx => "pptx",
            ContentKind::Xlsx => "xlsx",
            ContentKind::Json => "json",
            ContentKind::Markdown => "markdown",
            ContentKind::Text => "text",
            ContentKind::Html => "html",
        }
    }

    /// Map a file extension (case-insensitive, without the dot) to a kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(ContentKind::Pdf),
            "docx" => Some(ContentKind::Docx),
            "pptx" => Some(ContentKind::Pptx),
            "xlsx" => Some(ContentKind::Xlsx),
            "json" => Some(ContentKind::Json),
            "md" | "markdown" => Some(ContentKind::Markdown),
            "txt" | "text" => Some(ContentKind::Text),
            "html" | "htm" => Some(ContentKind::Html),
            _ => None,
        }
    }

    /// Kind implied by a path's file name, if any.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .or_else(|| ContentKind::from_extension(s))
            .ok_or_else(|| format!("unknown content kind: '{}'", s))
    }
}

/// One tracked file, keyed by the identity of its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedFileRecord {
    pub content_identity: ContentIdentity,
    pub current_location: PathBuf,
    pub original_location: PathBuf,
    pub content_kind: ContentKind,
    pub size_bytes: u64,
    pub admitted_at: DateTime<Utc>,
    pub last_confirmed_at: DateTime<Utc>,
    pub is_valid: bool,
}

/// A file seen on disk, ready to be written to the store.
///
/// Produced after the file has been stat'ed and hashed; the store never
/// touches the filesystem itself.
#[derive(Debug, Clone, PartialEq)]
pub struct FileObservation {
    pub content_identity: ContentIdentity,
    pub location: PathBuf,
    pub content_kind: ContentKind,
    pub size_bytes: u64,
}

impl FileObservation {
    /// Build the record a first admission of this observation creates.
    pub fn into_record(self, now: DateTime<Utc>) -> TrackedFileRecord {
        TrackedFileRecord {
            content_identity: self.content_identity,
            current_location: self.location.clone(),
            original_location: self.location,
            content_kind: self.content_kind,
            size_bytes: self.size_bytes,
            admitted_at: now,
            last_confirmed_at: now,
            is_valid: true,
        }
    }
}

/// Listing parameters for [`RecordStore::list`](crate::store::RecordStore::list).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub valid_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn valid() -> Self {
        Self {
            valid_only: true,
            ..Self::default()
        }
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_extension_is_case_insensitive() {
        assert_eq!(ContentKind::from_extension("PDF"), Some(ContentKind::Pdf));
        assert_eq!(ContentKind::from_extension("Md"), Some(ContentKind::Markdown));
        assert_eq!(ContentKind::from_extension("htm"), Some(ContentKind::Html));
        assert_eq!(ContentKind::from_extension("exe"), None);
    }

    #[test]
    fn kind_from_path() {
        assert_eq!(
            ContentKind::from_path(Path::new("/a/b/Report.DOCX")),
            Some(ContentKind::Docx)
        );
        assert_eq!(ContentKind::from_path(Path::new("/a/b/Makefile")), None);
    }

    #[test]
    fn kind_tag_round_trips_through_from_str() {
        for kind in ContentKind::ALL {
            assert_eq!(kind.as_str().parse::<ContentKind>().unwrap(), kind);
        }
        assert_eq!("md".parse::<ContentKind>().unwrap(), ContentKind::Markdown);
        assert!("bogus".parse::<ContentKind>().is_err());
    }

    #[test]
    fn observation_into_record_sets_both_locations() {
        let now = Utc::now();
        let rec = FileObservation {
            content_identity: ContentIdentity::from_bytes(b"doc"),
            location: PathBuf::from("/docs/a.md"),
            content_kind: ContentKind::Markdown,
            size_bytes: 3,
        }
        .into_record(now);
        assert_eq!(rec.current_location, rec.original_location);
        assert_eq!(rec.admitted_at, rec.last_confirmed_at);
        assert!(rec.is_valid);
    }
}
