//! Filesystem primitives for placing verified downloads.
//!
//! - [`StagedFile`]: a same-directory staging file committed by rename and
//!   removed on drop otherwise
//! - [`FileMode`]: octal permission strings such as `"644"`
//! - [`atomic_write`]: replace a small file through a sibling temp file

mod error;
mod mode;
mod staged;

pub use error::{Error, Result};
pub use mode::FileMode;
pub use staged::StagedFile;

use std::path::Path;

/// Writes `content` to the hidden sibling `.<name>.tmp` of `path` and renames
/// it into place.
///
/// Readers see either the previous content or the new content. There is no
/// locking: concurrent writers race and the last rename wins.
pub fn atomic_write(path: impl AsRef<Path>, content: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = path.parent().unwrap_or(Path::new(""));
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let staged = StagedFile::new(parent.join(format!(".{file_name}.tmp")));

    std::fs::write(staged.path(), content).map_err(|source| Error::Write {
        path: staged.path().to_path_buf(),
        source,
    })?;

    #[cfg(unix)]
    if let Ok(meta) = std::fs::metadata(path) {
        // keep the mode of the file being replaced
        let _ = std::fs::set_permissions(staged.path(), meta.permissions());
    }

    staged.commit(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.lock");
        atomic_write(&path, b"data")?;
        assert_eq!(std::fs::read(&path).unwrap(), b"data");
        assert!(!dir.path().join(".test.lock.tmp").exists());
        Ok(())
    }

    #[test]
    fn test_atomic_write_overwrites() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.lock");
        std::fs::write(&path, "original").unwrap();
        atomic_write(&path, b"new content")?;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new content");
        Ok(())
    }

    #[test]
    fn test_atomic_write_missing_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("test.lock");
        let err = atomic_write(&path, b"x").unwrap_err();
        assert!(matches!(err, Error::Write { .. }));
    }
}
