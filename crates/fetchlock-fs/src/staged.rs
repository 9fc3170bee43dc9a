use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// A file written beside its final destination and committed by rename.
///
/// Until [`StagedFile::commit`] succeeds the file is owned by the guard and
/// removed when the guard drops, so an aborted download never leaves a
/// partial file behind and never shows up under the final name.
#[derive(Debug)]
pub struct StagedFile {
    path:  PathBuf,
    armed: bool,
}

impl StagedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path:  path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Renames the staged file onto `destination`.
    ///
    /// Both paths must be on the same filesystem for the rename to be atomic;
    /// callers stage inside the destination directory.
    pub fn commit(mut self, destination: impl AsRef<Path>) -> Result<PathBuf> {
        let destination = destination.as_ref();
        std::fs::rename(&self.path, destination).map_err(|source| Error::Rename {
            from: self.path.clone(),
            to: destination.to_path_buf(),
            source,
        })?;
        self.armed = false;
        Ok(destination.to_path_buf())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.armed && self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::debug!(path = %self.path.display(), "failed to remove staged file: {e}");
            }
        }
    }
}
