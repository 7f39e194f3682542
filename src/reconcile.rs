//! Reconciliation of stored records against the filesystem.
//!
//! A pass runs in two phases:
//!
//! 1. **Confirmation** over every stored record, valid or not and
//!    regardless of the scan root: a record whose location still exists
//!    is re-confirmed; one whose location is gone is invalidated.
//! 2. **Discovery** under the scan root: each supported file is hashed.
//!    Unknown identities become new candidates; known identities found
//!    somewhere else are moved.
//!
//! Candidates are visited in lexicographic path order. When the same
//! identity appears at several paths, the lexicographically last one is
//! authoritative. Reconciliation never deletes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use chrono::Utc;
use serde::Serialize;

use filevault_core::identity::ContentIdentity;
use filevault_core::models::{ContentKind, ListQuery};

use crate::config::{Config, ScanConfig};
use crate::hashing::hash_file_async;
use crate::progress::{ProgressEvent, ProgressMode, ProgressReporter};
use crate::scan::{self, ScanFailure};
use crate::tracker::{absolutize, FileTracker};

/// A discovered file whose identity the store has never seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCandidate {
    pub path: PathBuf,
    pub kind: ContentKind,
    pub content_identity: ContentIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovedFile {
    pub content_identity: ContentIdentity,
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Records whose stored location still exists.
    pub confirmed_valid: usize,
    /// Records whose stored location is gone.
    pub confirmed_invalid: usize,
    pub new_candidates: Vec<NewCandidate>,
    pub moved: Vec<MovedFile>,
    pub failures: Vec<ScanFailure>,
}

pub struct Reconciler {
    tracker: FileTracker,
    scan: ScanConfig,
}

impl Reconciler {
    pub fn new(tracker: FileTracker, scan: ScanConfig) -> Self {
        Self { tracker, scan }
    }

    pub async fn reconcile(
        &self,
        scan_root: &Path,
        recursive: bool,
        progress: &dyn ProgressReporter,
    ) -> Result<ReconcileReport> {
        let root = absolutize(scan_root)?;
        if !root.is_dir() {
            bail!(
                "Scan root does not exist or is not a directory: {}",
                root.display()
            );
        }

        let mut report = ReconcileReport::default();
        self.confirm_all(&mut report, progress).await?;
        self.discover(&root, recursive, &mut report, progress).await?;

        tracing::info!(
            root = %root.display(),
            confirmed_valid = report.confirmed_valid,
            confirmed_invalid = report.confirmed_invalid,
            new = report.new_candidates.len(),
            moved = report.moved.len(),
            failures = report.failures.len(),
            "reconciliation finished"
        );
        Ok(report)
    }

    async fn confirm_all(
        &self,
        report: &mut ReconcileReport,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        let store = self.tracker.store();
        let records = store.list(&ListQuery::all()).await?;
        let total = records.len() as u64;

        for (i, record) in records.iter().enumerate() {
            let location = &record.current_location;
            let present = tokio::fs::metadata(location).await.ok().filter(|m| m.is_file());

            // An invalid record's stale location may since have been
            // claimed by other content; leave it to discovery.
            let claimed_by_other = !record.is_valid
                && present.is_some()
                && store
                    .get_by_location(location)
                    .await?
                    .is_some_and(|r| r.is_valid && r.content_identity != record.content_identity);

            match present {
                Some(meta) if !claimed_by_other => {
                    store
                        .set_location(&record.content_identity, location, Some(meta.len()), Utc::now())
                        .await?;
                    report.confirmed_valid += 1;
                }
                _ => {
                    if record.is_valid {
                        tracing::debug!(
                            identity = %record.content_identity.short(),
                            location = %location.display(),
                            "location missing, invalidating"
                        );
                    }
                    store.invalidate(&record.content_identity).await?;
                    report.confirmed_invalid += 1;
                }
            }
            progress.report(ProgressEvent::Confirming {
                n: i as u64 + 1,
                total,
            });
        }
        Ok(())
    }

    async fn discover(
        &self,
        root: &Path,
        recursive: bool,
        report: &mut ReconcileReport,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        progress.report(ProgressEvent::Discovering {
            root: root.display().to_string(),
        });
        let discovery = scan::discover(root, recursive, &self.scan)?;
        report.failures.extend(discovery.failures);

        // Later (lexicographically greater) paths overwrite earlier ones.
        let total = discovery.candidates.len() as u64;
        let mut by_identity: BTreeMap<ContentIdentity, (PathBuf, ContentKind)> = BTreeMap::new();
        for (i, candidate) in discovery.candidates.into_iter().enumerate() {
            match hash_file_async(&candidate.path).await {
                Ok(identity) => {
                    by_identity.insert(identity, (candidate.path, candidate.kind));
                }
                Err(e) => {
                    tracing::warn!(path = %candidate.path.display(), error = %e, "cannot hash file");
                    report.failures.push(ScanFailure {
                        path: candidate.path,
                        reason: e.to_string(),
                    });
                }
            }
            progress.report(ProgressEvent::Hashing {
                n: i as u64 + 1,
                total,
            });
        }

        for (identity, (path, kind)) in by_identity {
            match self.tracker.get_by_identity(&identity).await? {
                None => report.new_candidates.push(NewCandidate {
                    path,
                    kind,
                    content_identity: identity,
                }),
                Some(record) if record.current_location != path || !record.is_valid => {
                    self.tracker.set_location(&identity, &path).await?;
                    if record.current_location != path {
                        tracing::info!(
                            identity = %identity.short(),
                            from = %record.current_location.display(),
                            to = %path.display(),
                            "moved"
                        );
                        report.moved.push(MovedFile {
                            content_identity: identity,
                            from: record.current_location,
                            to: path,
                        });
                    }
                }
                Some(_) => {}
            }
        }

        report.new_candidates.sort_by(|a, b| a.path.cmp(&b.path));
        report.moved.sort_by(|a, b| a.to.cmp(&b.to));
        Ok(())
    }
}

/// Run `fvault sync <dir>`: reconcile and print a summary.
pub async fn run_sync(config: &Config, dir: &Path, recursive: bool, mode: ProgressMode) -> Result<()> {
    let tracker = FileTracker::open(config).await?;
    let reconciler = Reconciler::new(tracker, config.scan.clone());
    let progress = mode.reporter();
    let report = reconciler.reconcile(dir, recursive, progress.as_ref()).await?;

    println!("sync {}", dir.display());
    println!("  confirmed valid:   {}", report.confirmed_valid);
    println!("  confirmed invalid: {}", report.confirmed_invalid);
    println!("  new candidates:    {}", report.new_candidates.len());
    println!("  moved:             {}", report.moved.len());
    for m in &report.moved {
        println!("    {} -> {}", m.from.display(), m.to.display());
    }
    if !report.failures.is_empty() {
        println!("  failures:          {}", report.failures.len());
        for f in &report.failures {
            println!("    {}: {}", f.path.display(), f.reason);
        }
    }
    if !report.new_candidates.is_empty() {
        println!("  run `fvault index {}` to admit new files", dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::tests::Recorder;
    use crate::progress::NoProgress;
    use filevault_core::store::memory::InMemoryRecordStore;
    use std::sync::Arc;

    fn setup() -> (tempfile::TempDir, FileTracker, Reconciler) {
        let tmp = tempfile::tempdir().unwrap();
        let tracker = FileTracker::new(Arc::new(InMemoryRecordStore::new()));
        let reconciler = Reconciler::new(tracker.clone(), ScanConfig::default());
        (tmp, tracker, reconciler)
    }

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn new_files_are_reported_not_tracked() {
        let (tmp, tracker, rec) = setup();
        write(tmp.path(), "a.md", "alpha");
        write(tmp.path(), "b.txt", "beta");

        let report = rec.reconcile(tmp.path(), true, &NoProgress).await.unwrap();
        assert_eq!(report.new_candidates.len(), 2);
        assert!(report.moved.is_empty());
        assert_eq!(tracker.count(false).await.unwrap(), 0);
        assert_eq!(
            report.new_candidates[0].content_identity,
            ContentIdentity::from_bytes(b"alpha")
        );
    }

    #[tokio::test]
    async fn move_is_detected_within_scan_root() {
        let (tmp, tracker, rec) = setup();
        let p = write(&tmp.path().join("in"), "doc.md", "moving content");
        let original = tracker.upsert(&p, None).await.unwrap();

        let q_dir = tmp.path().join("out");
        std::fs::create_dir_all(&q_dir).unwrap();
        let q = q_dir.join("doc-renamed.md");
        std::fs::rename(&p, &q).unwrap();

        let report = rec.reconcile(&q_dir, true, &NoProgress).await.unwrap();
        assert_eq!(report.moved.len(), 1);
        assert_eq!(report.moved[0].to, q);
        assert!(report.new_candidates.is_empty());

        let at_q = tracker.get_by_location(&q).await.unwrap().unwrap();
        assert_eq!(at_q.content_identity, original.content_identity);
        assert!(at_q.is_valid);
        assert_eq!(at_q.original_location, p);
        assert!(tracker.get_by_location(&p).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_file_is_invalidated_and_restored_file_reconfirmed() {
        let (tmp, tracker, rec) = setup();
        let p = write(tmp.path(), "keep.txt", "persistent");
        let first = tracker.upsert(&p, None).await.unwrap();

        std::fs::remove_file(&p).unwrap();
        let report = rec.reconcile(tmp.path(), true, &NoProgress).await.unwrap();
        assert_eq!(report.confirmed_invalid, 1);
        let gone = tracker.get_by_identity(&first.content_identity).await.unwrap().unwrap();
        assert!(!gone.is_valid);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        write(tmp.path(), "keep.txt", "persistent");
        let report = rec.reconcile(tmp.path(), true, &NoProgress).await.unwrap();
        assert_eq!(report.confirmed_valid, 1);
        let back = tracker.get_by_identity(&first.content_identity).await.unwrap().unwrap();
        assert!(back.is_valid);
        assert!(back.last_confirmed_at > gone.last_confirmed_at);
    }

    #[tokio::test]
    async fn duplicate_content_resolves_to_last_path() {
        let (tmp, tracker, rec) = setup();
        let a = write(tmp.path(), "a.md", "twin");
        let b = write(tmp.path(), "b.md", "twin");
        tracker.upsert(&a, None).await.unwrap();

        let report = rec.reconcile(tmp.path(), true, &NoProgress).await.unwrap();
        assert_eq!(tracker.count(false).await.unwrap(), 1);
        assert_eq!(report.moved.len(), 1);
        let rec_ = tracker
            .get_by_identity(&ContentIdentity::from_bytes(b"twin"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec_.current_location, b);

        // Stable on a second pass.
        let again = rec.reconcile(tmp.path(), true, &NoProgress).await.unwrap();
        assert!(again.moved.is_empty());
    }

    #[tokio::test]
    async fn stale_location_claimed_by_new_content_stays_invalid() {
        let (tmp, tracker, rec) = setup();
        let p = write(tmp.path(), "doc.md", "version one");
        let v1 = tracker.upsert(&p, None).await.unwrap();
        tracker.invalidate(&v1.content_identity).await.unwrap();
        write(tmp.path(), "doc.md", "version two");
        let v2 = tracker.upsert(&p, None).await.unwrap();

        rec.reconcile(tmp.path(), true, &NoProgress).await.unwrap();
        let v1 = tracker.get_by_identity(&v1.content_identity).await.unwrap().unwrap();
        let v2 = tracker.get_by_identity(&v2.content_identity).await.unwrap().unwrap();
        assert!(!v1.is_valid);
        assert!(v2.is_valid);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_entry_is_a_failure_and_the_pass_continues() {
        let (tmp, tracker, _) = setup();
        write(tmp.path(), "good.md", "readable content");
        std::os::unix::fs::symlink(tmp.path().join("nowhere.md"), tmp.path().join("dangling.md"))
            .unwrap();
        let scan = ScanConfig {
            follow_symlinks: true,
            ..ScanConfig::default()
        };
        let rec = Reconciler::new(tracker, scan);

        let report = rec.reconcile(tmp.path(), true, &NoProgress).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("dangling.md"));
        assert_eq!(report.new_candidates.len(), 1);
        assert!(report.new_candidates[0].path.ends_with("good.md"));
    }

    #[tokio::test]
    async fn missing_root_fails_before_any_work() {
        let (tmp, tracker, rec) = setup();
        let p = write(tmp.path(), "a.md", "still here");
        tracker.upsert(&p, None).await.unwrap();
        std::fs::remove_file(&p).unwrap();

        let err = rec
            .reconcile(&tmp.path().join("absent"), true, &NoProgress)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        // Invalidation did not run.
        assert_eq!(tracker.count(true).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn progress_events_cover_both_phases() {
        let (tmp, tracker, rec) = setup();
        let p = write(tmp.path(), "a.md", "tracked");
        tracker.upsert(&p, None).await.unwrap();
        write(tmp.path(), "b.md", "new");

        let recorder = Recorder::default();
        rec.reconcile(tmp.path(), true, &recorder).await.unwrap();
        let events = recorder.0.lock().unwrap();
        assert_eq!(events[0], ProgressEvent::Confirming { n: 1, total: 1 });
        assert!(matches!(events[1], ProgressEvent::Discovering { .. }));
        assert_eq!(events.last(), Some(&ProgressEvent::Hashing { n: 2, total: 2 }));
    }
}
