//! Temp files owned by a medium.

use crate::error::CoreResult;
use docmedium_storage::DocUrl;
use std::fs;
use std::path::{Path, PathBuf};

/// Creates uniquely named temp files.
#[derive(Debug, Clone, Default)]
pub struct TempFileAllocator {
    dir: Option<PathBuf>,
}

impl TempFileAllocator {
    /// Allocates in `dir`, or in the system temp dir when `None`.
    #[must_use]
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Directory new files are created in.
    #[must_use]
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Creates an empty temp file that is deleted when dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is not writable.
    pub fn create(&self) -> CoreResult<TempFile> {
        self.create_named("dm", "", None)
    }

    /// Creates an empty temp file keeping `extension` (without dot).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is not writable.
    pub fn create_with_extension(&self, extension: Option<&str>) -> CoreResult<TempFile> {
        let suffix = extension.map(|e| format!(".{e}")).unwrap_or_default();
        self.create_named("dm", &suffix, None)
    }

    /// Reserves `prefix<unique>suffix` in `dir` (or the default dir).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create_named(&self, prefix: &str, suffix: &str, dir: Option<&Path>) -> CoreResult<TempFile> {
        let dir = dir.map_or_else(|| self.dir(), Path::to_path_buf);
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(dir)?;
        let (_, path) = file.keep().map_err(|e| e.error)?;
        Ok(TempFile::adopt(path))
    }
}

/// A file path optionally removed on drop.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    kill_on_drop: bool,
}

impl TempFile {
    /// Takes ownership of an existing file, deleting it on drop.
    #[must_use]
    pub fn adopt(path: PathBuf) -> Self {
        Self {
            path,
            kill_on_drop: true,
        }
    }

    /// Path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `file:` URL of the file.
    #[must_use]
    pub fn url(&self) -> DocUrl {
        DocUrl::from_path(&self.path)
    }

    /// Controls whether drop deletes the file.
    pub fn enable_killing_file(&mut self, kill: bool) {
        self.kill_on_drop = kill;
    }

    /// Returns true if drop deletes the file.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.kill_on_drop
    }

    /// Releases the file without deleting it.
    #[must_use]
    pub fn keep(mut self) -> PathBuf {
        self.kill_on_drop = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.kill_on_drop {
            if let Err(e) = fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "temp file not removed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn dropped_temp_file_is_removed() {
        let dir = tempdir().unwrap();
        let allocator = TempFileAllocator::new(Some(dir.path().to_path_buf()));
        let temp = allocator.create_with_extension(Some("odt")).unwrap();
        let path = temp.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "odt");
        drop(temp);
        assert!(!path.exists());
    }

    #[test]
    fn disarmed_temp_file_survives() {
        let dir = tempdir().unwrap();
        let allocator = TempFileAllocator::new(Some(dir.path().to_path_buf()));
        let mut temp = allocator.create().unwrap();
        temp.enable_killing_file(false);
        let path = temp.path().to_path_buf();
        drop(temp);
        assert!(path.exists());

        let kept = allocator.create().unwrap().keep();
        assert!(kept.exists());
    }

    #[test]
    fn named_reservations_are_unique() {
        let dir = tempdir().unwrap();
        let allocator = TempFileAllocator::default();
        let a = allocator.create_named("report", ".odt", Some(dir.path())).unwrap();
        let b = allocator.create_named("report", ".odt", Some(dir.path())).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(dir.path()));
        assert!(a.path().file_name().unwrap().to_string_lossy().starts_with("report"));
    }
}
