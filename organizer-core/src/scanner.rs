use std::collections::HashSet;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

/// One candidate file surfaced by a walk, before it is known to the
/// identity registry (§4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedFile {
    pub path: PathBuf,
    pub inode: u64,
    pub device_id: u64,
    pub size: u64,
}

/// Walks a source root and yields candidate video files.
///
/// Stateless: every call performs a full walk (§4.1 — "No state; a full
/// walk per invocation").
#[derive(Debug, Clone)]
pub struct FilesystemProber {
    /// Lower-cased extensions without the leading dot.
    pub extensions: Vec<String>,
    pub min_file_size: u64,
    pub follow_symlinks: bool,
    /// Subtree to skip entirely, typically the destination root when it
    /// is nested under the source root.
    pub excluded_subtree: Option<PathBuf>,
}

impl Default for FilesystemProber {
    fn default() -> Self {
        Self {
            extensions: vec![
                "mp4", "mkv", "avi", "mov", "webm", "flv", "wmv", "m4v", "mpg", "mpeg", "3gp",
                "ogv", "ts", "mts", "m2ts",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            min_file_size: 0,
            follow_symlinks: false,
            excluded_subtree: None,
        }
    }
}

impl FilesystemProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.to_lowercase())
            .collect();
        self
    }

    pub fn with_min_file_size(mut self, bytes: u64) -> Self {
        self.min_file_size = bytes;
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn with_excluded_subtree(mut self, path: Option<PathBuf>) -> Self {
        self.excluded_subtree = path;
        self
    }

    fn has_allowed_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        match &self.excluded_subtree {
            Some(excluded) => path.starts_with(excluded),
            None => false,
        }
    }

    /// Walks `root`, applying the extension, size, and exclusion filters.
    /// Unreadable entries are skipped with a logged warning; the walk
    /// continues. When `follow_symlinks` is enabled, visited directory
    /// `(device_id, inode)` pairs are tracked and checked *before*
    /// descending, via `skip_current_dir`, so a symlink cycle is never
    /// re-entered rather than merely logged about after the fact.
    ///
    /// This holds a named, mutable `IntoIter` handle (rather than using
    /// `.filter_entry()` in a `for` loop) specifically so both the
    /// exclusion filter and the visited-directory guard can call
    /// `skip_current_dir()` on it.
    pub fn scan(&self, root: impl AsRef<Path>) -> Vec<ProbedFile> {
        let root = root.as_ref();
        let mut visited_dirs: HashSet<(u64, u64)> = HashSet::new();
        let mut found = Vec::new();

        let mut it = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .into_iter();

        while let Some(entry) = it.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("skipping unreadable entry during scan: {err}");
                    continue;
                }
            };

            if self.is_excluded(entry.path()) {
                if entry.file_type().is_dir() {
                    it.skip_current_dir();
                }
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(
                        "skipping {} (metadata read failed): {err}",
                        entry.path().display()
                    );
                    continue;
                }
            };

            if metadata.is_dir() {
                if self.follow_symlinks && !visited_dirs.insert((metadata.dev(), metadata.ino())) {
                    debug!(
                        "symlink loop detected at {}, not descending again",
                        entry.path().display()
                    );
                    it.skip_current_dir();
                }
                continue;
            }

            if !metadata.is_file() {
                continue;
            }

            let path = entry.path();
            if !self.has_allowed_extension(path) {
                continue;
            }

            let size = metadata.size();
            if size < self.min_file_size {
                debug!(
                    "skipping {} below minimum size ({size} < {})",
                    path.display(),
                    self.min_file_size
                );
                continue;
            }

            found.push(ProbedFile {
                path: path.to_path_buf(),
                inode: metadata.ino(),
                device_id: metadata.dev(),
                size,
            });
        }

        found
    }
}
