use std::path::Path;

use tracing::{debug, info};

/// Outcome of a single link attempt, ordered by the precedence of checks
/// in §4.6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Success,
    Conflict,
    CrossDevice,
    NoSource,
    Unknown(String),
}

/// `EXDEV` on Linux/BSD/macOS — returned when the kernel refuses to hard
/// link across filesystem boundaries.
#[cfg(unix)]
const EXDEV: i32 = 18;

/// Creates a hard link from `source` to `destination`, never overwriting
/// and never following symlinks when checking destination existence
/// (§4.6). Intended to run inside `spawn_blocking` — every call here is a
/// blocking syscall.
pub fn link(source: &Path, destination: &Path) -> LinkOutcome {
    let source_meta = match std::fs::symlink_metadata(source) {
        Ok(meta) if meta.is_file() => meta,
        _ => return LinkOutcome::NoSource,
    };
    let _ = source_meta;

    if std::fs::symlink_metadata(destination).is_ok() {
        return LinkOutcome::Conflict;
    }

    if let Some(parent) = destination.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            return LinkOutcome::Unknown(err.to_string());
        }
    }

    match std::fs::hard_link(source, destination) {
        Ok(()) => {
            info!("linked {} -> {}", source.display(), destination.display());
            LinkOutcome::Success
        }
        Err(err) => {
            #[cfg(unix)]
            {
                if err.raw_os_error() == Some(EXDEV) {
                    return LinkOutcome::CrossDevice;
                }
            }
            debug!("hard_link failed: {err}");
            LinkOutcome::Unknown(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn links_successfully_and_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.mkv");
        fs::write(&source, b"data").unwrap();
        let destination = dir.path().join("Movies/Film (2020)/Film (2020).mkv");

        let outcome = link(&source, &destination);

        assert_eq!(outcome, LinkOutcome::Success);
        assert!(destination.exists());
    }

    #[test]
    fn missing_source_is_reported() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("missing.mkv");
        let destination = dir.path().join("dest.mkv");

        assert_eq!(link(&source, &destination), LinkOutcome::NoSource);
    }

    #[test]
    fn existing_destination_is_a_conflict_and_is_untouched() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.mkv");
        fs::write(&source, b"new").unwrap();
        let destination = dir.path().join("dest.mkv");
        fs::write(&destination, b"original").unwrap();

        let outcome = link(&source, &destination);

        assert_eq!(outcome, LinkOutcome::Conflict);
        assert_eq!(fs::read(&destination).unwrap(), b"original");
    }

    #[test]
    fn directory_at_destination_is_also_a_conflict() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.mkv");
        fs::write(&source, b"data").unwrap();
        let destination = dir.path().join("dest_dir");
        fs::create_dir(&destination).unwrap();

        assert_eq!(link(&source, &destination), LinkOutcome::Conflict);
    }

    #[test]
    fn source_that_is_a_directory_is_no_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a_dir");
        fs::create_dir(&source).unwrap();
        let destination = dir.path().join("dest.mkv");

        assert_eq!(link(&source, &destination), LinkOutcome::NoSource);
    }
}
