//! Test fixtures and workspace helpers.
//!
//! A [`TestWorkspace`] is a temp directory laid out the way the medium
//! expects: documents at the top, a `tmp/` directory for staged saves and
//! a `backup/` directory for backups. Everything is removed on drop.

use docmedium_core::{
    Config, LockFile, LockIdentity, MediaDescriptor, MediaHandles, Medium, MediumContext, OpenMode,
};
use docmedium_storage::{DocUrl, Folder, PackageStorage, StorageFactory};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Identity the workspace's media lock documents with.
pub fn test_identity() -> LockIdentity {
    LockIdentity::new("Tester", "tester", "testhost", "file:///profile")
}

/// Identity of a different installation.
pub fn foreign_identity() -> LockIdentity {
    LockIdentity::new("Other", "other", "elsewhere", "file:///other")
}

/// A temporary document directory with automatic cleanup.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// Creates a workspace with empty `tmp/` and `backup/` directories.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        fs::create_dir_all(dir.path().join("tmp")).expect("Failed to create tmp dir");
        fs::create_dir_all(dir.path().join("backup")).expect("Failed to create backup dir");
        Self { dir }
    }

    /// Root of the workspace.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Directory temp files are staged in.
    pub fn temp_dir(&self) -> PathBuf {
        self.root().join("tmp")
    }

    /// Directory backups go to.
    pub fn backup_dir(&self) -> PathBuf {
        self.root().join("backup")
    }

    /// Configuration pointing at the workspace directories.
    pub fn config(&self) -> Config {
        Config::new()
            .temp_dir(self.temp_dir())
            .backup_dir(self.backup_dir())
            .identity(test_identity())
    }

    /// A fresh context over [`TestWorkspace::config`].
    pub fn context(&self) -> MediumContext {
        MediumContext::new(self.config())
    }

    /// Path of a document in the workspace.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root().join(name)
    }

    /// URL of a document in the workspace.
    pub fn url(&self, name: &str) -> DocUrl {
        DocUrl::from_path(&self.path(name))
    }

    /// Writes a plain document.
    pub fn write(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, bytes).expect("Failed to write document");
        path
    }

    /// Reads a document.
    pub fn read(&self, name: &str) -> Vec<u8> {
        fs::read(self.path(name)).expect("Failed to read document")
    }

    /// Writes a package document holding `streams` at the root.
    pub fn write_package(&self, name: &str, streams: &[(&str, &[u8])]) -> PathBuf {
        let mut root = Folder::new();
        for (stream, data) in streams {
            root.put_stream(stream, data.to_vec());
        }
        self.write_folder(name, &root)
    }

    /// Writes a package document holding `root`.
    pub fn write_folder(&self, name: &str, root: &Folder) -> PathBuf {
        let bytes = PackageStorage::encode_folder(root).expect("Failed to encode package");
        self.write(name, &bytes)
    }

    /// Decodes a package document.
    pub fn read_folder(&self, name: &str) -> Folder {
        PackageStorage::decode_folder(&self.read(name)).expect("Failed to decode package")
    }

    /// Reads one stream of a package document.
    pub fn read_package_stream(&self, name: &str, stream: &str) -> Vec<u8> {
        self.read_folder(name)
            .stream_at(stream)
            .expect("Stream missing from package")
            .to_vec()
    }

    /// Path of the lock file belonging to a document.
    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.path(&format!(".~lock.{name}#"))
    }

    /// Places a lock record of another installation next to a document.
    pub fn foreign_lock(&self, name: &str) {
        LockFile::for_document(&self.url(name), self.context().content)
            .expect("Document has no folder")
            .create_own(&foreign_identity())
            .expect("Failed to write foreign lock");
    }

    /// Files currently staged in the temp directory.
    pub fn temp_files(&self) -> Vec<PathBuf> {
        list(&self.temp_dir())
    }

    /// Files currently in the backup directory.
    pub fn backup_files(&self) -> Vec<PathBuf> {
        list(&self.backup_dir())
    }

    /// Opens a medium on a workspace document.
    pub fn open(&self, name: &str, mode: OpenMode) -> Medium {
        Medium::open(self.context(), self.url(name).as_str(), mode)
    }

    /// Opens a medium whose storages come from `storages`.
    pub fn open_with_storages(
        &self,
        name: &str,
        mode: OpenMode,
        storages: Arc<dyn StorageFactory>,
    ) -> Medium {
        Medium::open(self.context().with_storages(storages), self.url(name).as_str(), mode)
    }

    /// Opens a medium with caller handles, such as an interaction handler.
    pub fn open_with_handles(&self, name: &str, mode: OpenMode, handles: MediaHandles) -> Medium {
        Medium::open_with(
            self.context(),
            self.url(name).as_str(),
            mode,
            None,
            MediaDescriptor::default(),
            handles,
        )
    }

    /// Opens a medium from a descriptor whose `FileName` is set to the document.
    pub fn open_descriptor(&self, name: &str, mut descriptor: MediaDescriptor) -> Medium {
        descriptor.file_name = Some(self.url(name).to_string());
        Medium::from_descriptor(self.context(), descriptor, MediaHandles::default())
            .expect("Failed to open medium from descriptor")
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

fn list(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
        .unwrap_or_default();
    files.sort();
    files
}

/// Runs a test with a fresh workspace.
///
/// # Example
///
/// ```rust,ignore
/// use docmedium_testkit::with_workspace;
///
/// #[test]
/// fn my_test() {
///     with_workspace(|ws| {
///         ws.write("doc.txt", b"hello");
///         // ... open and save
///     });
/// }
/// ```
pub fn with_workspace<F, R>(f: F) -> R
where
    F: FnOnce(&TestWorkspace) -> R,
{
    let ws = TestWorkspace::new();
    f(&ws)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_layout() {
        let ws = TestWorkspace::new();
        assert!(ws.temp_dir().is_dir());
        assert!(ws.backup_dir().is_dir());
        assert!(ws.temp_files().is_empty());
        assert_eq!(ws.lock_path("a.odt").file_name().unwrap(), ".~lock.a.odt#");
    }

    #[test]
    fn package_helpers_round_trip() {
        let ws = TestWorkspace::new();
        ws.write_package("p.dmpk", &[("content.xml", b"<x/>")]);
        assert_eq!(ws.read_package_stream("p.dmpk", "content.xml"), b"<x/>");
    }

    #[test]
    fn foreign_lock_is_not_ours() {
        let ws = TestWorkspace::new();
        ws.write("doc.odt", b"x");
        ws.foreign_lock("doc.odt");
        let lock = LockFile::for_document(&ws.url("doc.odt"), ws.context().content).unwrap();
        assert!(!lock.read_data().unwrap().is_same_installation(&test_identity()));
    }
}
