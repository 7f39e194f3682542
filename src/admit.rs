//! Admission: turning files into index-ready documents.
//!
//! [`Admitter::admit`] decides whether one file enters the corpus. It
//! never touches the index itself; callers collect the returned
//! documents and hand them to a [`FlatIndexBuilder`] in one batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use filevault_core::identity::ContentIdentity;
use filevault_core::index::IndexDocument;
use filevault_core::metadata::DocumentMetadata;
use filevault_core::models::{ContentKind, TrackedFileRecord};

use crate::config::{Config, ScanConfig};
use crate::embedding::create_embedder;
use crate::extract::{Extractor, StrategyExtractor};
use crate::hashing::hash_file_async;
use crate::index::{self, FlatIndexBuilder};
use crate::progress::{ProgressEvent, ProgressMode, ProgressReporter};
use crate::scan::{self, ScanFailure};
use crate::tracker::{absolutize, FileTracker};

/// A file accepted into the corpus, ready for the index builder.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmittedDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
    pub record: TrackedFileRecord,
}

impl AdmittedDocument {
    pub fn into_index_document(self) -> IndexDocument {
        IndexDocument {
            text: self.text,
            metadata: self.metadata,
        }
    }
}

/// Why a file was or was not admitted.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionOutcome {
    Admitted(Box<AdmittedDocument>),
    /// A valid record for this content already exists.
    AlreadyTracked(ContentIdentity),
    /// The file name maps to no content kind.
    Unsupported,
    ExtractionFailed,
    /// Extracted text (trimmed, in characters) was below the floor.
    TooShort { chars: usize },
}

/// Counts from admitting a whole directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdmissionReport {
    pub admitted: usize,
    pub already_tracked: usize,
    pub extraction_failed: usize,
    pub too_short: usize,
    pub failures: Vec<ScanFailure>,
}

#[derive(Clone)]
pub struct Admitter {
    tracker: FileTracker,
    extractor: Arc<dyn Extractor>,
}

impl Admitter {
    pub fn new(tracker: FileTracker, extractor: Arc<dyn Extractor>) -> Self {
        Self { tracker, extractor }
    }

    /// Admitter using the built-in extraction strategies.
    pub fn with_default_extractor(tracker: FileTracker) -> Self {
        Self::new(tracker, Arc::new(StrategyExtractor))
    }

    /// Admit `location`, or return `None` if it does not qualify.
    pub async fn admit(
        &self,
        location: &Path,
        min_text_length: usize,
    ) -> Result<Option<AdmittedDocument>> {
        Ok(match self.admit_detailed(location, min_text_length).await? {
            AdmissionOutcome::Admitted(doc) => Some(*doc),
            _ => None,
        })
    }

    pub async fn admit_detailed(
        &self,
        location: &Path,
        min_text_length: usize,
    ) -> Result<AdmissionOutcome> {
        let location = absolutize(location)?;
        let Some(kind) = ContentKind::from_path(&location) else {
            return Ok(AdmissionOutcome::Unsupported);
        };
        let identity = hash_file_async(&location).await?;

        if let Some(record) = self.tracker.get_by_identity(&identity).await? {
            if record.is_valid {
                return Ok(AdmissionOutcome::AlreadyTracked(identity));
            }
        }

        let Some(text) = self.extract(location.clone(), kind).await? else {
            return Ok(AdmissionOutcome::ExtractionFailed);
        };
        let text = text.trim().to_string();
        let chars = text.chars().count();
        if chars < min_text_length {
            tracing::debug!(path = %location.display(), chars, min_text_length, "text too short");
            return Ok(AdmissionOutcome::TooShort { chars });
        }

        let record = self.tracker.upsert(&location, Some(identity)).await?;
        tracing::info!(
            identity = %record.content_identity.short(),
            path = %location.display(),
            kind = %kind,
            "admitted"
        );
        Ok(AdmissionOutcome::Admitted(Box::new(AdmittedDocument {
            text,
            metadata: DocumentMetadata::from_record(&record),
            record,
        })))
    }

    async fn extract(&self, location: PathBuf, kind: ContentKind) -> Result<Option<String>> {
        let extractor = Arc::clone(&self.extractor);
        Ok(tokio::task::spawn_blocking(move || extractor.extract(&location, kind)).await?)
    }

    /// Admit every candidate under `dir`. Per-file errors are collected in
    /// the report; a missing `dir` fails the call.
    pub async fn admit_directory(
        &self,
        dir: &Path,
        recursive: bool,
        min_text_length: usize,
        scan_config: &ScanConfig,
        progress: &dyn ProgressReporter,
    ) -> Result<(Vec<AdmittedDocument>, AdmissionReport)> {
        let discovery = scan::discover(dir, recursive, scan_config)?;
        let mut report = AdmissionReport {
            failures: discovery.failures,
            ..AdmissionReport::default()
        };
        let mut docs = Vec::new();

        let total = discovery.candidates.len() as u64;
        for (i, candidate) in discovery.candidates.iter().enumerate() {
            match self.admit_detailed(&candidate.path, min_text_length).await {
                Ok(AdmissionOutcome::Admitted(doc)) => {
                    report.admitted += 1;
                    docs.push(*doc);
                }
                Ok(AdmissionOutcome::AlreadyTracked(_)) => report.already_tracked += 1,
                Ok(AdmissionOutcome::ExtractionFailed) => report.extraction_failed += 1,
                Ok(AdmissionOutcome::TooShort { .. }) => report.too_short += 1,
                Ok(AdmissionOutcome::Unsupported) => {}
                Err(e) => {
                    tracing::warn!(path = %candidate.path.display(), error = %e, "admission failed");
                    report.failures.push(ScanFailure {
                        path: candidate.path.clone(),
                        reason: format!("{:#}", e),
                    });
                }
            }
            progress.report(ProgressEvent::Admitting {
                n: i as u64 + 1,
                total,
            });
        }
        Ok((docs, report))
    }
}

/// Run `fvault index <dir>`: admit new files and fold them into the index.
pub async fn run_index(
    config: &Config,
    dir: &Path,
    recursive: bool,
    min_length: Option<usize>,
    mode: ProgressMode,
) -> Result<()> {
    let min_text_length = min_length.unwrap_or(config.admission.min_text_length);
    let tracker = FileTracker::open(config).await?;
    let admitter = Admitter::with_default_extractor(tracker);
    let progress = mode.reporter();

    let (docs, report) = admitter
        .admit_directory(dir, recursive, min_text_length, &config.scan, progress.as_ref())
        .await?;

    println!("index {}", dir.display());
    println!("  admitted:          {}", report.admitted);
    println!("  already tracked:   {}", report.already_tracked);
    println!("  extraction failed: {}", report.extraction_failed);
    println!("  too short (<{}):   {}", min_text_length, report.too_short);
    for f in &report.failures {
        println!("  failed: {}: {}", f.path.display(), f.reason);
    }

    let index_path = &config.index.path;
    if docs.is_empty() && index::is_ready(index_path) {
        println!("  index unchanged: {}", index_path.display());
        return Ok(());
    }

    let embedder = create_embedder(&config.embedding)?;
    let mut builder =
        FlatIndexBuilder::with_existing(embedder, config.embedding.batch_size, index_path)?;
    for doc in docs {
        builder.add(doc.into_index_document());
    }
    let descriptor = builder.finalize(index_path, progress.as_ref()).await?;
    println!(
        "  index written: {} ({} entries, model {})",
        index_path.display(),
        descriptor.entry_count,
        descriptor.model
    );
    Ok(())
}
