//! Collision-free destination names.
//!
//! If `report.pdf` is already taken in the destination, the next free name out of
//! `report (1).pdf`, `report (2).pdf`, ... is used instead. Nothing is ever
//! overwritten.
//!
//! The existence check and the move that follows are two separate filesystem
//! calls. Another process creating the same name in between can still win the
//! race; within one process sweeps are serialized, which is all this guards.

use std::ffi::{OsStr, OsString};
use std::path::Path;

/// Answers "is this path taken?" for the resolver.
pub trait ExistenceProbe {
    fn exists(&self, path: &Path) -> bool;
}

/// Probes the real filesystem.
///
/// Uses `symlink_metadata`, so a dangling symlink still counts as taken.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl ExistenceProbe for FsProbe {
    fn exists(&self, path: &Path) -> bool {
        path.symlink_metadata().is_ok()
    }
}

impl<F> ExistenceProbe for F
where
    F: Fn(&Path) -> bool,
{
    fn exists(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Finds a name under a directory that is not yet taken.
#[derive(Debug, Clone, Default)]
pub struct CollisionResolver<P = FsProbe> {
    probe: P,
}

impl CollisionResolver<FsProbe> {
    pub fn new() -> Self {
        Self { probe: FsProbe }
    }
}

impl<P: ExistenceProbe> CollisionResolver<P> {
    pub fn with_probe(probe: P) -> Self {
        Self { probe }
    }

    /// Returns `desired` if it is free in `dir`, otherwise the first free
    /// `stem (n).ext` with `n` counting up from 1.
    ///
    /// ```
    /// use dltidy::collision::CollisionResolver;
    /// use std::ffi::OsStr;
    /// use std::path::Path;
    ///
    /// let taken = |p: &Path| p.ends_with("report.pdf") || p.ends_with("report (1).pdf");
    /// let resolver = CollisionResolver::with_probe(taken);
    /// assert_eq!(resolver.resolve(Path::new("/docs"), OsStr::new("report.pdf")), "report (2).pdf");
    /// ```
    pub fn resolve(&self, dir: &Path, desired: &OsStr) -> OsString {
        if !self.probe.exists(&dir.join(desired)) {
            return desired.to_os_string();
        }

        let (stem, extension) = split_name(desired);
        let mut counter: u64 = 1;
        loop {
            let candidate = numbered_name(stem, extension, counter);
            if !self.probe.exists(&dir.join(&candidate)) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Splits a file name into stem and extension the way [`Path`] does:
/// the extension is whatever follows the last dot, unless that dot starts the name.
fn split_name(name: &OsStr) -> (&OsStr, Option<&OsStr>) {
    let path = Path::new(name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), extension) => (stem, extension),
        (None, _) => (name, None),
    }
}

fn numbered_name(stem: &OsStr, extension: Option<&OsStr>, counter: u64) -> OsString {
    let mut name = stem.to_os_string();
    name.push(format!(" ({counter})"));
    if let Some(extension) = extension {
        name.push(".");
        name.push(extension);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn resolver_with(taken: &[&str]) -> CollisionResolver<impl Fn(&Path) -> bool> {
        let taken: HashSet<PathBuf> = taken.iter().map(|name| Path::new("/dest").join(name)).collect();
        CollisionResolver::with_probe(move |path: &Path| taken.contains(path))
    }

    #[test]
    fn test_free_name_is_unchanged() {
        let resolver = resolver_with(&[]);
        assert_eq!(resolver.resolve(Path::new("/dest"), OsStr::new("song.mp3")), "song.mp3");
    }

    #[test]
    fn test_first_collision_gets_one() {
        let resolver = resolver_with(&["song.mp3"]);
        assert_eq!(resolver.resolve(Path::new("/dest"), OsStr::new("song.mp3")), "song (1).mp3");
    }

    #[test]
    fn test_skips_taken_numbers() {
        let resolver = resolver_with(&["report.pdf", "report (1).pdf"]);
        assert_eq!(resolver.resolve(Path::new("/dest"), OsStr::new("report.pdf")), "report (2).pdf");
    }

    #[test]
    fn test_first_gap_wins() {
        let resolver = resolver_with(&["a.zip", "a (1).zip", "a (3).zip"]);
        assert_eq!(resolver.resolve(Path::new("/dest"), OsStr::new("a.zip")), "a (2).zip");
    }

    #[test]
    fn test_only_last_extension_is_kept_apart() {
        let resolver = resolver_with(&["backup.tar.gz"]);
        assert_eq!(
            resolver.resolve(Path::new("/dest"), OsStr::new("backup.tar.gz")),
            "backup.tar (1).gz"
        );
    }

    #[test]
    fn test_name_without_extension() {
        let resolver = resolver_with(&["README", ".bashrc"]);
        assert_eq!(resolver.resolve(Path::new("/dest"), OsStr::new("README")), "README (1)");
        assert_eq!(resolver.resolve(Path::new("/dest"), OsStr::new(".bashrc")), ".bashrc (1)");
    }

    #[test]
    fn test_many_collisions() {
        let mut names = vec!["clip.mp4".to_string()];
        names.extend((1..=250).map(|n| format!("clip ({n}).mp4")));
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let resolver = resolver_with(&refs);
        assert_eq!(resolver.resolve(Path::new("/dest"), OsStr::new("clip.mp4")), "clip (251).mp4");
    }

    #[test]
    fn test_filesystem_probe() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join("notes.pdf"), b"a").unwrap();
        fs::write(temp_dir.path().join("notes (1).pdf"), b"b").unwrap();

        let resolver = CollisionResolver::new();
        assert_eq!(resolver.resolve(temp_dir.path(), OsStr::new("notes.pdf")), "notes (2).pdf");
        assert_eq!(resolver.resolve(temp_dir.path(), OsStr::new("other.pdf")), "other.pdf");
    }

    #[test]
    fn test_directory_counts_as_taken() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::create_dir(temp_dir.path().join("photo.png")).unwrap();

        let resolver = CollisionResolver::new();
        assert_eq!(resolver.resolve(temp_dir.path(), OsStr::new("photo.png")), "photo (1).png");
    }
}
