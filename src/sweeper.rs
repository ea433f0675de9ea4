//! One pass over the top-level entries of the source directory.
//!
//! The entry list is read in full before anything moves, so files created by
//! the sweep itself are never picked up again in the same pass. Entries are
//! then handled one at a time, sorted by name. A file that cannot be moved is
//! recorded and the sweep carries on with the next one.

use crate::mover::{MoveError, MoveOutcome, MoveResult, SafeMover, SkipReason, SourceEntry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Counts of entries left in place, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    pub transient: usize,
    pub unclassified: usize,
    pub vanished: usize,
    pub directories: usize,
}

impl SkipCounts {
    fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Transient => self.transient += 1,
            SkipReason::Unclassified => self.unclassified += 1,
            SkipReason::Vanished => self.vanished += 1,
            SkipReason::Directory => self.directories += 1,
        }
    }
}

/// A file that was moved (or, in a dry run, would be).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveRecord {
    pub from: PathBuf,
    pub to: PathBuf,
    pub category: String,
}

/// A file that could not be moved, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEntry {
    pub entry: String,
    pub reason: String,
}

/// Everything one sweep did, for whoever reports it.
#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub source_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    /// Files moved per category. Every configured category is present, zero or not.
    pub moved: BTreeMap<String, usize>,
    pub skipped: SkipCounts,
    pub failures: Vec<FailedEntry>,
    pub moves: Vec<MoveRecord>,
}

impl SweepResult {
    fn new<'a>(source_dir: &Path, labels: impl IntoIterator<Item = &'a str>, dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            source_dir: source_dir.to_path_buf(),
            started_at: now,
            finished_at: now,
            dry_run,
            moved: labels.into_iter().map(|label| (label.to_string(), 0)).collect(),
            skipped: SkipCounts::default(),
            failures: Vec::new(),
            moves: Vec::new(),
        }
    }

    /// Moves recorded for one category (zero for unknown labels).
    pub fn count(&self, category: &str) -> usize {
        self.moved.get(category).copied().unwrap_or(0)
    }

    pub fn total_moved(&self) -> usize {
        self.moved.values().sum()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    fn record(&mut self, source_dir: &Path, entry: &SourceEntry, result: MoveResult<MoveOutcome>) {
        match result {
            Ok(MoveOutcome::Skipped(reason)) => self.skipped.record(reason),
            Ok(MoveOutcome::Moved {
                category,
                destination,
                ..
            })
            | Ok(MoveOutcome::Planned {
                category,
                destination,
            }) => {
                *self.moved.entry(category.clone()).or_insert(0) += 1;
                self.moves.push(MoveRecord {
                    from: source_dir.join(&entry.name),
                    to: destination,
                    category,
                });
            }
            Err(e) => {
                tracing::error!(entry = %entry.display_name(), error = %e, "could not move file");
                self.failures.push(FailedEntry {
                    entry: entry.display_name().into_owned(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Hooks for following a sweep while it runs (progress display).
pub trait SweepObserver {
    /// Called once with the number of entries in the snapshot.
    fn on_snapshot(&mut self, _entries: usize) {}

    /// Called after each entry has been handled.
    fn on_entry(&mut self, _entry: &SourceEntry, _result: &Result<MoveOutcome, MoveError>) {}
}

impl SweepObserver for () {}

/// Errors that stop a sweep before it starts.
#[derive(Debug)]
pub enum SweepError {
    /// The source directory could not be listed.
    ReadFailed { path: PathBuf, source: io::Error },
}

impl std::fmt::Display for SweepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadFailed { path, source } => {
                write!(f, "Error reading directory {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for SweepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFailed { source, .. } => Some(source),
        }
    }
}

/// Runs sweeps of one source directory with a fixed [`SafeMover`].
#[derive(Debug, Clone)]
pub struct DirectorySweeper {
    mover: SafeMover,
}

impl DirectorySweeper {
    pub fn new(mover: SafeMover) -> Self {
        Self { mover }
    }

    pub fn mover(&self) -> &SafeMover {
        &self.mover
    }

    /// Sweeps `source_dir` once.
    ///
    /// # Errors
    ///
    /// Only fails if the directory itself cannot be listed. Per-file problems
    /// end up in [`SweepResult::failures`].
    pub fn sweep(&self, source_dir: &Path) -> Result<SweepResult, SweepError> {
        self.sweep_observed(source_dir, &mut ())
    }

    /// Like [`Self::sweep`], reporting progress to `observer`.
    pub fn sweep_observed(
        &self,
        source_dir: &Path,
        observer: &mut dyn SweepObserver,
    ) -> Result<SweepResult, SweepError> {
        let _span = tracing::info_span!("sweep", source = %source_dir.display()).entered();

        let labels = self.mover.classifier().labels().iter().map(String::as_str);
        let mut result = SweepResult::new(source_dir, labels, self.mover.is_dry_run());

        let entries = snapshot(source_dir)?;
        observer.on_snapshot(entries.len());
        tracing::debug!(entries = entries.len(), "snapshot taken");

        for entry in &entries {
            let outcome = self.mover.move_one(source_dir, entry);
            observer.on_entry(entry, &outcome);
            result.record(source_dir, entry, outcome);
        }

        result.finished_at = Utc::now();
        tracing::debug!(
            moved = result.total_moved(),
            failed = result.failures.len(),
            "sweep finished"
        );
        Ok(result)
    }
}

/// Lists the direct children of `dir`, sorted by name.
///
/// Entries that disappear while being listed are dropped.
fn snapshot(dir: &Path) -> Result<Vec<SourceEntry>, SweepError> {
    let read_dir = fs::read_dir(dir).map_err(|e| SweepError::ReadFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut entries = Vec::new();
    for entry in read_dir {
        match entry.and_then(|entry| SourceEntry::from_dir_entry(&entry)) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!(error = %e, "skipping unreadable directory entry"),
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclusion::TempExclusionSet;
    use crate::file_category::ExtensionClassifier;
    use crate::mover::DestinationSet;
    use tempfile::TempDir;

    fn sweeper_for(root: &Path) -> DirectorySweeper {
        let classifier = ExtensionClassifier::default();
        let destinations = DestinationSet::under(root, classifier.labels().iter().map(String::as_str));
        DirectorySweeper::new(SafeMover::new(classifier, TempExclusionSet::default(), destinations))
    }

    #[derive(Default)]
    struct Recorder {
        total: Option<usize>,
        seen: Vec<String>,
    }

    impl SweepObserver for Recorder {
        fn on_snapshot(&mut self, entries: usize) {
            self.total = Some(entries);
        }

        fn on_entry(&mut self, entry: &SourceEntry, _result: &Result<MoveOutcome, MoveError>) {
            self.seen.push(entry.display_name().into_owned());
        }
    }

    #[test]
    fn test_empty_directory_reports_zero_for_every_category() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = sweeper_for(temp_dir.path()).sweep(temp_dir.path()).unwrap();

        assert_eq!(result.moved.len(), 6);
        assert!(result.moved.values().all(|&count| count == 0));
        assert_eq!(result.total_moved(), 0);
        assert!(!result.has_failures());
    }

    #[test]
    fn test_counts_and_records() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("a.mp3"), b"1").unwrap();
        fs::write(root.join("b.mp3"), b"2").unwrap();
        fs::write(root.join("c.pdf"), b"3").unwrap();
        fs::write(root.join("d.crdownload"), b"4").unwrap();
        fs::write(root.join("e.unknown"), b"5").unwrap();
        fs::create_dir(root.join("folder")).unwrap();

        let result = sweeper_for(root).sweep(root).unwrap();

        assert_eq!(result.count("Audio"), 2);
        assert_eq!(result.count("Docs"), 1);
        assert_eq!(result.count("Video"), 0);
        assert_eq!(result.total_moved(), 3);
        assert_eq!(
            result.skipped,
            SkipCounts {
                transient: 1,
                unclassified: 1,
                vanished: 0,
                directories: 1,
            }
        );
        assert_eq!(result.moves.len(), 3);
        assert_eq!(result.moves[0].from, root.join("a.mp3"));
        assert_eq!(result.moves[0].to, root.join("Audio").join("a.mp3"));
    }

    #[test]
    fn test_observer_sees_sorted_snapshot() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        for name in ["zeta.zip", "alpha.png", "mid.exe"] {
            fs::write(root.join(name), b"x").unwrap();
        }

        let mut recorder = Recorder::default();
        sweeper_for(root).sweep_observed(root, &mut recorder).unwrap();

        assert_eq!(recorder.total, Some(3));
        assert_eq!(recorder.seen, vec!["alpha.png", "mid.exe", "zeta.zip"]);
    }

    #[test]
    fn test_second_sweep_moves_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("clip.mp4"), b"v").unwrap();
        let sweeper = sweeper_for(root);

        assert_eq!(sweeper.sweep(root).unwrap().total_moved(), 1);
        let second = sweeper.sweep(root).unwrap();
        assert_eq!(second.total_moved(), 0);
        assert!(second.moved.values().all(|&count| count == 0));
    }

    #[test]
    fn test_failure_does_not_stop_sweep() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        let sweeper = sweeper_for(root);
        // Blocks creation of the Archives directory.
        fs::write(root.join("Archives"), b"").unwrap();
        fs::write(root.join("a.zip"), b"zip").unwrap();
        fs::write(root.join("b.png"), b"png").unwrap();

        let result = sweeper.sweep(root).unwrap();

        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].entry, "a.zip");
        assert_eq!(result.count("Images"), 1);
        assert!(root.join("a.zip").exists());
        assert!(root.join("Images/b.png").exists());
    }

    #[test]
    fn test_missing_source_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let missing = temp_dir.path().join("nope");
        let result = sweeper_for(temp_dir.path()).sweep(&missing);
        assert!(matches!(result, Err(SweepError::ReadFailed { .. })));
    }

    #[test]
    fn test_dry_run_counts_planned_moves() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("a.flac"), b"x").unwrap();

        let classifier = ExtensionClassifier::default();
        let destinations = DestinationSet::under(root, classifier.labels().iter().map(String::as_str));
        let mover = SafeMover::new(classifier, TempExclusionSet::default(), destinations).with_dry_run(true);
        let result = DirectorySweeper::new(mover).sweep(root).unwrap();

        assert!(result.dry_run);
        assert_eq!(result.count("Audio"), 1);
        assert!(root.join("a.flac").exists());
    }
}
