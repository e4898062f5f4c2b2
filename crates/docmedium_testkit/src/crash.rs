//! Commit fault injection.
//!
//! [`FaultyStorageFactory`] opens ordinary package storages and wraps them
//! so that the next commit misbehaves the way a crashing backend would:
//! it relocates its content, scribbles over the document stream first, or
//! fails outright.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docmedium_testkit::crash::{CommitFault, FaultyStorageFactory};
//!
//! let faults = FaultyStorageFactory::new(ws.temp_dir());
//! faults.arm(CommitFault::TearAndRelocate);
//! let mut medium = ws.open_with_storages("doc.dmpk", OpenMode::READWRITE, faults.shared());
//! ```

use docmedium_storage::{
    CommitOutcome, DocStream, ElementModes, EncryptionData, Folder, PackageStorage,
    PackageStorageFactory, Storage, StorageError, StorageFactory, StorageOpenOptions,
    StorageResult, StorageSource,
};
use parking_lot::Mutex;
use std::fs;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What the next commit does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitFault {
    /// Commit normally.
    None,
    /// Leave the backing object alone and report the content relocated.
    Relocate,
    /// Write garbage over the start of the document stream, then relocate.
    TearAndRelocate,
    /// Fail with an I/O error without writing anything.
    Fail,
}

#[derive(Debug)]
struct FaultState {
    armed: Mutex<CommitFault>,
    commits: AtomicUsize,
    relocations: Mutex<Vec<PathBuf>>,
    spill_dir: PathBuf,
}

/// A storage factory whose storages fail their next commit on demand.
#[derive(Debug, Clone)]
pub struct FaultyStorageFactory {
    inner: PackageStorageFactory,
    state: Arc<FaultState>,
}

impl FaultyStorageFactory {
    /// Creates a factory spilling relocated content into `spill_dir`.
    pub fn new(spill_dir: impl Into<PathBuf>) -> Self {
        let spill_dir = spill_dir.into();
        Self {
            inner: PackageStorageFactory::new().with_spill_dir(spill_dir.clone()),
            state: Arc::new(FaultState {
                armed: Mutex::new(CommitFault::None),
                commits: AtomicUsize::new(0),
                relocations: Mutex::new(Vec::new()),
                spill_dir,
            }),
        }
    }

    /// Makes the next commit of any storage from this factory misbehave.
    ///
    /// The fault fires once.
    pub fn arm(&self, fault: CommitFault) {
        *self.state.armed.lock() = fault;
    }

    /// Returns true while a fault is waiting to fire.
    pub fn is_armed(&self) -> bool {
        *self.state.armed.lock() != CommitFault::None
    }

    /// Number of commits attempted so far.
    pub fn commit_count(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    /// Files content was relocated into.
    pub fn relocations(&self) -> Vec<PathBuf> {
        self.state.relocations.lock().clone()
    }

    /// The factory as a shareable trait object.
    pub fn shared(&self) -> Arc<dyn StorageFactory> {
        Arc::new(self.clone())
    }
}

impl StorageFactory for FaultyStorageFactory {
    fn create(
        &self,
        source: StorageSource<'_>,
        mode: ElementModes,
        options: &StorageOpenOptions<'_>,
    ) -> StorageResult<Box<dyn Storage>> {
        let inner = self.inner.create(source, mode, options)?;
        Ok(Box::new(FaultyStorage {
            inner,
            state: Arc::clone(&self.state),
        }))
    }
}

/// A storage that consults its factory's armed fault on commit.
#[derive(Debug)]
pub struct FaultyStorage {
    inner: Box<dyn Storage>,
    state: Arc<FaultState>,
}

impl FaultyStorage {
    fn relocate(&self) -> StorageResult<PathBuf> {
        let bytes = PackageStorage::encode_folder(self.inner.root()?)?;
        let file = tempfile::Builder::new()
            .prefix("relocated-")
            .suffix(".dmpk")
            .tempfile_in(&self.state.spill_dir)?;
        let (_, path) = file.keep().map_err(|e| StorageError::Io(e.error))?;
        fs::write(&path, bytes)?;
        self.state.relocations.lock().push(path.clone());
        tracing::debug!(path = %path.display(), "injected relocation");
        Ok(path)
    }
}

fn tear(stream: &mut dyn DocStream) -> io::Result<()> {
    stream.seek(SeekFrom::Start(0))?;
    stream.write_all(b"\0torn write\0")?;
    stream.flush()
}

impl Storage for FaultyStorage {
    fn mode(&self) -> ElementModes {
        self.inner.mode()
    }

    fn root(&self) -> StorageResult<&Folder> {
        self.inner.root()
    }

    fn root_mut(&mut self) -> StorageResult<&mut Folder> {
        self.inner.root_mut()
    }

    fn commit(&mut self, stream: Option<&mut dyn DocStream>) -> StorageResult<CommitOutcome> {
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        let fault = std::mem::replace(&mut *self.state.armed.lock(), CommitFault::None);
        match fault {
            CommitFault::None => self.inner.commit(stream),
            CommitFault::Relocate => Ok(CommitOutcome::RelocatedTo(self.relocate()?)),
            CommitFault::TearAndRelocate => {
                if let Some(stream) = stream {
                    tear(stream)?;
                }
                Ok(CommitOutcome::RelocatedTo(self.relocate()?))
            }
            CommitFault::Fail => Err(StorageError::Io(io::Error::other("injected commit failure"))),
        }
    }

    fn attach_to_stream(&mut self, stream: &mut dyn DocStream) -> StorageResult<()> {
        self.inner.attach_to_stream(stream)
    }

    fn dispose(&mut self) {
        self.inner.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    fn set_encryption_data(&mut self, data: EncryptionData) -> StorageResult<()> {
        self.inner.set_encryption_data(data)
    }

    fn encryption_data(&self) -> Option<&EncryptionData> {
        self.inner.encryption_data()
    }

    fn set_segment_size(&mut self, size: u64) -> StorageResult<()> {
        self.inner.set_segment_size(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn open(factory: &FaultyStorageFactory, stream: &mut Cursor<Vec<u8>>) -> Box<dyn Storage> {
        factory
            .create(
                StorageSource::ReadWrite(stream),
                ElementModes::READWRITE,
                &StorageOpenOptions::default(),
            )
            .unwrap()
    }

    #[test]
    fn unarmed_factory_commits_normally() {
        let dir = TempDir::new().unwrap();
        let factory = FaultyStorageFactory::new(dir.path());
        let mut stream = Cursor::new(Vec::new());
        let mut storage = open(&factory, &mut stream);
        storage.root_mut().unwrap().put_stream("a", b"1".to_vec());
        assert_eq!(storage.commit(Some(&mut stream)).unwrap(), CommitOutcome::Committed);
        assert_eq!(factory.commit_count(), 1);
        assert!(factory.relocations().is_empty());
    }

    #[test]
    fn fault_fires_once() {
        let dir = TempDir::new().unwrap();
        let factory = FaultyStorageFactory::new(dir.path());
        let mut stream = Cursor::new(Vec::new());
        let mut storage = open(&factory, &mut stream);
        storage.root_mut().unwrap().put_stream("a", b"1".to_vec());

        factory.arm(CommitFault::Fail);
        assert!(factory.is_armed());
        assert!(storage.commit(Some(&mut stream)).is_err());
        assert!(!factory.is_armed());
        assert!(storage.commit(Some(&mut stream)).is_ok());
    }

    #[test]
    fn torn_relocation_spills_the_content() {
        let dir = TempDir::new().unwrap();
        let factory = FaultyStorageFactory::new(dir.path());
        let mut stream = Cursor::new(Vec::new());
        let mut storage = open(&factory, &mut stream);
        storage.root_mut().unwrap().put_stream("a", b"1".to_vec());

        factory.arm(CommitFault::TearAndRelocate);
        let CommitOutcome::RelocatedTo(path) = storage.commit(Some(&mut stream)).unwrap() else {
            panic!("expected relocation");
        };
        assert!(stream.get_ref().starts_with(b"\0torn"));
        let spilled = PackageStorage::decode_folder(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(spilled.stream("a"), Some(&b"1"[..]));
        assert_eq!(factory.relocations(), vec![path]);
    }
}
