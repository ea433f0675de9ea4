/// Moving one file out of the source directory into its category directory.
///
/// A move goes through five steps, in this order:
/// 1. Transient files (partial downloads) are skipped
/// 2. The extension is classified; unknown extensions are skipped
/// 3. The category's destination directory is created if missing
/// 4. A collision-free name is picked in the destination
/// 5. The file is renamed into place, or copied, verified and removed when the
///    destination is on another volume
use crate::checksum::sha256_path;
use crate::collision::{CollisionResolver, ExistenceProbe, FsProbe};
use crate::exclusion::TempExclusionSet;
use crate::file_category::ExtensionClassifier;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// One top-level entry of the source directory, as seen during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub name: OsString,
    /// Lowercased extension with its leading dot, or empty.
    pub extension: String,
    pub is_dir: bool,
}

impl SourceEntry {
    pub fn new(name: impl Into<OsString>, is_dir: bool) -> Self {
        let name = name.into();
        let extension = Path::new(&name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        Self {
            name,
            extension,
            is_dir,
        }
    }

    /// Reads an entry from a directory listing.
    ///
    /// A symlink pointing at a directory counts as a directory.
    pub fn from_dir_entry(entry: &fs::DirEntry) -> io::Result<Self> {
        let file_type = entry.file_type()?;
        let is_dir = file_type.is_dir()
            || (file_type.is_symlink() && fs::metadata(entry.path()).map(|m| m.is_dir()).unwrap_or(false));
        Ok(Self::new(entry.file_name(), is_dir))
    }

    pub fn display_name(&self) -> Cow<'_, str> {
        self.name.to_string_lossy()
    }
}

/// Category label to destination directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationSet {
    dirs: BTreeMap<String, PathBuf>,
}

impl DestinationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One folder per label directly under `root`, named after the label.
    pub fn under<'a, I>(root: &Path, labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut set = Self::new();
        for label in labels {
            set.insert(label, root.join(label));
        }
        set
    }

    pub fn insert(&mut self, label: impl Into<String>, dir: impl Into<PathBuf>) {
        self.dirs.insert(label.into(), dir.into());
    }

    pub fn get(&self, label: &str) -> Option<&Path> {
        self.dirs.get(label).map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.dirs.iter().map(|(label, dir)| (label.as_str(), dir.as_path()))
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Returns the directory for a category, creating it first if needed.
    pub fn ensure(&self, label: &str) -> MoveResult<&Path> {
        let dir = self.get(label).ok_or_else(|| MoveError::DestinationUnknown {
            category: label.to_string(),
        })?;
        fs::create_dir_all(dir).map_err(|e| MoveError::DirectoryCreationFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
        Ok(dir)
    }
}

/// Why an entry was left where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Carries a partial-download marker.
    Transient,
    /// No category claims its extension.
    Unclassified,
    /// Gone before it could be moved.
    Vanished,
    /// A directory; only files are sorted.
    Directory,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SkipReason::Transient => "transient",
            SkipReason::Unclassified => "unclassified",
            SkipReason::Vanished => "vanished",
            SkipReason::Directory => "directory",
        };
        f.write_str(text)
    }
}

/// How a file reached its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveMethod {
    /// A single rename on the same volume.
    Renamed,
    /// Copied, checksum-verified, then the source removed.
    CopiedAcrossVolumes,
}

/// Result of handling one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Skipped(SkipReason),
    Moved {
        category: String,
        destination: PathBuf,
        method: MoveMethod,
    },
    /// Dry run: where the file would go.
    Planned { category: String, destination: PathBuf },
}

/// Errors that can occur while moving a single file.
#[derive(Debug)]
pub enum MoveError {
    /// The category has no destination directory configured.
    DestinationUnknown { category: String },
    /// Failed to create a category directory.
    DirectoryCreationFailed { path: PathBuf, source: io::Error },
    /// The rename into the destination failed (permissions, lock, disk full).
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    /// Copying to another volume failed; the source is untouched.
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    /// The copy on the other volume does not match the source; the source is untouched.
    ChecksumMismatch { from: PathBuf, to: PathBuf },
    /// The verified copy is in place but the source could not be removed.
    SourceRemovalFailed {
        from: PathBuf,
        copy: PathBuf,
        source: io::Error,
    },
}

impl std::fmt::Display for MoveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DestinationUnknown { category } => {
                write!(f, "No destination configured for category {}", category)
            }
            Self::DirectoryCreationFailed { path, source } => {
                write!(f, "Failed to create directory {}: {}", path.display(), source)
            }
            Self::RenameFailed { from, to, source } => {
                write!(f, "Failed to move {} to {}: {}", from.display(), to.display(), source)
            }
            Self::CopyFailed { from, to, source } => {
                write!(f, "Failed to copy {} to {}: {}", from.display(), to.display(), source)
            }
            Self::ChecksumMismatch { from, to } => {
                write!(
                    f,
                    "Copy of {} at {} does not match the original",
                    from.display(),
                    to.display()
                )
            }
            Self::SourceRemovalFailed { from, copy, source } => {
                write!(
                    f,
                    "Copied {} to {} but could not remove the original: {}",
                    from.display(),
                    copy.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for MoveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DirectoryCreationFailed { source, .. }
            | Self::RenameFailed { source, .. }
            | Self::CopyFailed { source, .. }
            | Self::SourceRemovalFailed { source, .. } => Some(source),
            Self::DestinationUnknown { .. } | Self::ChecksumMismatch { .. } => None,
        }
    }
}

/// Result type for single-file moves.
pub type MoveResult<T> = Result<T, MoveError>;

/// Classifies and relocates single entries of the source directory.
///
/// Holds the immutable rule set for the process: classifier, exclusions and
/// destinations are built once and never change.
#[derive(Debug, Clone)]
pub struct SafeMover {
    classifier: ExtensionClassifier,
    exclusions: TempExclusionSet,
    destinations: DestinationSet,
    resolver: CollisionResolver,
    dry_run: bool,
}

impl SafeMover {
    pub fn new(
        classifier: ExtensionClassifier,
        exclusions: TempExclusionSet,
        destinations: DestinationSet,
    ) -> Self {
        Self {
            classifier,
            exclusions,
            destinations,
            resolver: CollisionResolver::new(),
            dry_run: false,
        }
    }

    /// In dry-run mode nothing on disk is touched; moves come back as [`MoveOutcome::Planned`].
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn classifier(&self) -> &ExtensionClassifier {
        &self.classifier
    }

    pub fn destinations(&self) -> &DestinationSet {
        &self.destinations
    }

    /// Handles one entry of `source_dir`.
    ///
    /// Skips are not errors. An `Err` means this one file could not be moved;
    /// the source file is still in place (or, for
    /// [`MoveError::SourceRemovalFailed`], present in both places).
    pub fn move_one(&self, source_dir: &Path, entry: &SourceEntry) -> MoveResult<MoveOutcome> {
        if entry.is_dir {
            return Ok(MoveOutcome::Skipped(SkipReason::Directory));
        }

        let name = entry.display_name();
        if self.exclusions.is_transient(&name) {
            tracing::debug!(entry = %name, "skipping transient file");
            return Ok(MoveOutcome::Skipped(SkipReason::Transient));
        }

        let Some(category) = self.classifier.classify(&entry.extension) else {
            tracing::debug!(entry = %name, extension = %entry.extension, "no category");
            return Ok(MoveOutcome::Skipped(SkipReason::Unclassified));
        };

        let source = source_dir.join(&entry.name);
        if !FsProbe.exists(&source) {
            tracing::warn!(entry = %name, "file vanished before it could be moved");
            return Ok(MoveOutcome::Skipped(SkipReason::Vanished));
        }

        if self.dry_run {
            let dir = self.destinations.get(category).ok_or_else(|| MoveError::DestinationUnknown {
                category: category.to_string(),
            })?;
            let destination = dir.join(self.resolver.resolve(dir, &entry.name));
            return Ok(MoveOutcome::Planned {
                category: category.to_string(),
                destination,
            });
        }

        let dir = self.destinations.ensure(category)?;
        let destination = dir.join(self.resolver.resolve(dir, &entry.name));

        let method = match fs::rename(&source, &destination) {
            Ok(()) => MoveMethod::Renamed,
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                move_across_volumes(&source, &destination)?;
                MoveMethod::CopiedAcrossVolumes
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound && !FsProbe.exists(&source) => {
                tracing::warn!(entry = %name, "file vanished before it could be moved");
                return Ok(MoveOutcome::Skipped(SkipReason::Vanished));
            }
            Err(e) => {
                return Err(MoveError::RenameFailed {
                    from: source,
                    to: destination,
                    source: e,
                });
            }
        };

        tracing::info!(
            from = %source.display(),
            to = %destination.display(),
            category,
            "moved file"
        );

        Ok(MoveOutcome::Moved {
            category: category.to_string(),
            destination,
            method,
        })
    }
}

/// Moves a file to another volume without ever losing it.
///
/// The data is first copied to a hidden partial file next to `destination` and
/// synced. The source is removed only after the copy's SHA-256 matches the
/// source and the partial file has been renamed to `destination`.
pub fn move_across_volumes(source: &Path, destination: &Path) -> MoveResult<()> {
    let partial = partial_path(destination);

    if let Err(e) = copy_synced(source, &partial) {
        let _ = fs::remove_file(&partial);
        return Err(MoveError::CopyFailed {
            from: source.to_path_buf(),
            to: destination.to_path_buf(),
            source: e,
        });
    }

    let verified = sha256_path(source).and_then(|original| Ok(original == sha256_path(&partial)?));
    match verified {
        Ok(true) => {}
        Ok(false) => {
            let _ = fs::remove_file(&partial);
            return Err(MoveError::ChecksumMismatch {
                from: source.to_path_buf(),
                to: destination.to_path_buf(),
            });
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            return Err(MoveError::CopyFailed {
                from: source.to_path_buf(),
                to: destination.to_path_buf(),
                source: e,
            });
        }
    }

    if let Err(e) = fs::rename(&partial, destination) {
        let _ = fs::remove_file(&partial);
        return Err(MoveError::RenameFailed {
            from: partial,
            to: destination.to_path_buf(),
            source: e,
        });
    }

    fs::remove_file(source).map_err(|e| MoveError::SourceRemovalFailed {
        from: source.to_path_buf(),
        copy: destination.to_path_buf(),
        source: e,
    })
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(destination.file_name().unwrap_or_else(|| OsStr::new("file")));
    name.push(".dltidy-partial");
    destination.with_file_name(name)
}

fn copy_synced(source: &Path, target: &Path) -> io::Result<()> {
    fs::copy(source, target)?;
    File::open(target)?.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_category::CategoryRule;
    use tempfile::TempDir;

    fn mover_for(root: &Path) -> SafeMover {
        let classifier = ExtensionClassifier::default();
        let destinations = DestinationSet::under(root, classifier.labels().iter().map(String::as_str));
        SafeMover::new(classifier, TempExclusionSet::default(), destinations)
    }

    #[test]
    fn test_source_entry_extension() {
        assert_eq!(SourceEntry::new("Song.MP3", false).extension, ".mp3");
        assert_eq!(SourceEntry::new("archive.tar.gz", false).extension, ".gz");
        assert_eq!(SourceEntry::new("README", false).extension, "");
        assert_eq!(SourceEntry::new(".bashrc", false).extension, "");
        assert_eq!(SourceEntry::new("odd.", false).extension, "");
    }

    #[test]
    fn test_moves_file_into_category() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("song.mp3"), b"la la").unwrap();

        let outcome = mover_for(root)
            .move_one(root, &SourceEntry::new("song.mp3", false))
            .expect("move failed");

        assert_eq!(
            outcome,
            MoveOutcome::Moved {
                category: "Audio".to_string(),
                destination: root.join("Audio").join("song.mp3"),
                method: MoveMethod::Renamed,
            }
        );
        assert!(!root.join("song.mp3").exists());
        assert_eq!(fs::read(root.join("Audio/song.mp3")).unwrap(), b"la la");
    }

    #[test]
    fn test_uppercase_extension_is_classified() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("PHOTO.JPG"), b"jpg").unwrap();

        let outcome = mover_for(root).move_one(root, &SourceEntry::new("PHOTO.JPG", false)).unwrap();
        assert!(matches!(outcome, MoveOutcome::Moved { ref category, .. } if category == "Images"));
        assert!(root.join("Images/PHOTO.JPG").exists());
    }

    #[test]
    fn test_transient_checked_before_classification() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("movie.mp4.crdownload"), b"half").unwrap();

        let outcome = mover_for(root)
            .move_one(root, &SourceEntry::new("movie.mp4.crdownload", false))
            .unwrap();
        assert_eq!(outcome, MoveOutcome::Skipped(SkipReason::Transient));
        assert!(root.join("movie.mp4.crdownload").exists());
    }

    #[test]
    fn test_transient_wins_even_if_suffix_is_a_category_extension() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("draft.tmp"), b"x").unwrap();

        let classifier = ExtensionClassifier::new([CategoryRule::new("Scratch", [".tmp"])]);
        let destinations = DestinationSet::under(root, ["Scratch"]);
        let mover = SafeMover::new(classifier, TempExclusionSet::default(), destinations);

        let outcome = mover.move_one(root, &SourceEntry::new("draft.tmp", false)).unwrap();
        assert_eq!(outcome, MoveOutcome::Skipped(SkipReason::Transient));
    }

    #[test]
    fn test_unclassified_left_in_place() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("data.xyz"), b"?").unwrap();

        let outcome = mover_for(root).move_one(root, &SourceEntry::new("data.xyz", false)).unwrap();
        assert_eq!(outcome, MoveOutcome::Skipped(SkipReason::Unclassified));
        assert!(root.join("data.xyz").exists());
        assert!(!root.join("Docs").exists());
    }

    #[test]
    fn test_vanished_entry() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();

        let outcome = mover_for(root).move_one(root, &SourceEntry::new("gone.pdf", false)).unwrap();
        assert_eq!(outcome, MoveOutcome::Skipped(SkipReason::Vanished));
    }

    #[test]
    fn test_directory_entry_skipped() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::create_dir(root.join("album.zip")).unwrap();

        let outcome = mover_for(root).move_one(root, &SourceEntry::new("album.zip", true)).unwrap();
        assert_eq!(outcome, MoveOutcome::Skipped(SkipReason::Directory));
    }

    #[test]
    fn test_collision_gets_numbered_name() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::create_dir(root.join("Docs")).unwrap();
        fs::write(root.join("Docs/notes.pdf"), b"old").unwrap();
        fs::write(root.join("notes.pdf"), b"new").unwrap();

        let outcome = mover_for(root).move_one(root, &SourceEntry::new("notes.pdf", false)).unwrap();

        assert!(matches!(outcome, MoveOutcome::Moved { ref destination, .. }
            if destination == &root.join("Docs").join("notes (1).pdf")));
        assert_eq!(fs::read(root.join("Docs/notes.pdf")).unwrap(), b"old");
        assert_eq!(fs::read(root.join("Docs/notes (1).pdf")).unwrap(), b"new");
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("setup.exe"), b"MZ").unwrap();

        let mover = mover_for(root).with_dry_run(true);
        let outcome = mover.move_one(root, &SourceEntry::new("setup.exe", false)).unwrap();

        assert_eq!(
            outcome,
            MoveOutcome::Planned {
                category: "Executables".to_string(),
                destination: root.join("Executables").join("setup.exe"),
            }
        );
        assert!(root.join("setup.exe").exists());
        assert!(!root.join("Executables").exists());
    }

    #[test]
    fn test_destination_creation_failure_is_an_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        // A regular file where the category directory should go.
        fs::write(root.join("Archives"), b"not a dir").unwrap();
        fs::write(root.join("bundle.zip"), b"PK").unwrap();

        let result = mover_for(root).move_one(root, &SourceEntry::new("bundle.zip", false));
        assert!(matches!(result, Err(MoveError::DirectoryCreationFailed { .. })));
        assert!(root.join("bundle.zip").exists());
    }

    #[test]
    fn test_unknown_destination_is_an_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("a.mp3"), b"x").unwrap();

        let mover = SafeMover::new(
            ExtensionClassifier::default(),
            TempExclusionSet::default(),
            DestinationSet::new(),
        );
        let result = mover.move_one(root, &SourceEntry::new("a.mp3", false));
        assert!(matches!(result, Err(MoveError::DestinationUnknown { .. })));
    }

    #[test]
    fn test_move_across_volumes_preserves_content() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(root.join("big.iso"), &content).unwrap();
        fs::create_dir(root.join("out")).unwrap();

        let before = sha256_path(&root.join("big.iso")).unwrap();
        move_across_volumes(&root.join("big.iso"), &root.join("out/big.iso")).expect("copy move failed");

        assert!(!root.join("big.iso").exists());
        assert_eq!(sha256_path(&root.join("out/big.iso")).unwrap(), before);
        assert!(!root.join("out/.big.iso.dltidy-partial").exists());
    }

    #[test]
    fn test_move_across_volumes_missing_source_keeps_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::create_dir(root.join("out")).unwrap();

        let result = move_across_volumes(&root.join("nope.bin"), &root.join("out/nope.bin"));
        assert!(matches!(result, Err(MoveError::CopyFailed { .. })));
        assert_eq!(fs::read_dir(root.join("out")).unwrap().count(), 0);
    }

    #[test]
    fn test_destination_set_ensure_is_idempotent() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let destinations = DestinationSet::under(temp_dir.path(), ["Video"]);

        let first = destinations.ensure("Video").unwrap().to_path_buf();
        let second = destinations.ensure("Video").unwrap().to_path_buf();
        assert_eq!(first, second);
        assert!(first.is_dir());
    }
}
