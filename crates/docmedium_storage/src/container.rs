//! The storage boundary: transactional containers of streams and sub-storages.

use crate::error::{StorageError, StorageResult};
use crate::stream::{DocStream, InputStream};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Access mode of a storage or element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElementModes {
    /// Reading allowed.
    pub read: bool,
    /// Writing allowed.
    pub write: bool,
    /// Start from an empty container, ignoring existing bytes.
    pub truncate: bool,
}

impl ElementModes {
    /// Read-only.
    pub const READ: Self = Self {
        read: true,
        write: false,
        truncate: false,
    };

    /// Read-write.
    pub const READWRITE: Self = Self {
        read: true,
        write: true,
        truncate: false,
    };

    /// Returns the same mode with truncation requested.
    #[must_use]
    pub const fn truncating(self) -> Self {
        Self {
            truncate: true,
            ..self
        }
    }
}

/// One entry of a [`Folder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Element {
    /// A named byte stream.
    Stream(Vec<u8>),
    /// A nested sub-storage.
    Folder(Folder),
}

/// A tree of named streams and sub-storages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    entries: BTreeMap<String, Element>,
}

impl Folder {
    /// Creates an empty folder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns element names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Returns true if no element exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if an element named `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the stream named `name`.
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&[u8]> {
        match self.entries.get(name) {
            Some(Element::Stream(data)) => Some(data),
            _ => None,
        }
    }

    /// Stores a stream, replacing any element of that name.
    pub fn put_stream(&mut self, name: &str, data: Vec<u8>) {
        self.entries.insert(name.to_string(), Element::Stream(data));
    }

    /// Returns the sub-storage named `name`.
    #[must_use]
    pub fn folder(&self, name: &str) -> Option<&Folder> {
        match self.entries.get(name) {
            Some(Element::Folder(folder)) => Some(folder),
            _ => None,
        }
    }

    /// Returns the sub-storage named `name`, creating it if missing.
    ///
    /// # Errors
    ///
    /// Fails if a stream of that name exists.
    pub fn folder_mut(&mut self, name: &str) -> StorageResult<&mut Folder> {
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| Element::Folder(Folder::new()));
        match entry {
            Element::Folder(folder) => Ok(folder),
            Element::Stream(_) => Err(StorageError::WrongElementKind(name.to_string())),
        }
    }

    /// Removes and returns an element.
    pub fn remove(&mut self, name: &str) -> Option<Element> {
        self.entries.remove(name)
    }

    /// Resolves a `/`-separated path to a stream.
    ///
    /// # Errors
    ///
    /// Fails if any segment is missing or has the wrong kind.
    pub fn stream_at(&self, path: &str) -> StorageResult<&[u8]> {
        let mut folder = self;
        let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                return folder
                    .stream(segment)
                    .ok_or_else(|| StorageError::not_found(path));
            }
            folder = folder
                .folder(segment)
                .ok_or_else(|| StorageError::not_found(path))?;
        }
        Err(StorageError::not_found(path))
    }

    /// Copies every element into `target`, replacing same-named elements.
    pub fn copy_into(&self, target: &mut Folder) {
        for (name, element) in &self.entries {
            target.entries.insert(name.clone(), element.clone());
        }
    }
}

/// Named values attached to a storage for encrypting its streams.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EncryptionData {
    values: BTreeMap<String, Vec<u8>>,
}

impl EncryptionData {
    /// Creates empty encryption data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named value.
    #[must_use]
    pub fn with(mut self, name: &str, value: Vec<u8>) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    /// Returns a named value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// Returns true if no value is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns value names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl fmt::Debug for EncryptionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionData")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Result of a successful [`Storage::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The backing object now holds the committed content.
    Committed,
    /// The backing object could not be written; the committed content was
    /// written to this file instead and the original is untouched or damaged.
    RelocatedTo(PathBuf),
}

/// Progress sink used while repairing a damaged package.
pub trait ProgressHandler: Send + Sync {
    /// Reports `done` of `total` units.
    fn report(&self, done: u64, total: u64);
}

/// Options passed to [`StorageFactory::create`].
#[derive(Default)]
pub struct StorageOpenOptions<'a> {
    /// Tolerate damage instead of failing.
    pub repair: bool,
    /// Progress sink for repair.
    pub progress: Option<&'a dyn ProgressHandler>,
}

impl fmt::Debug for StorageOpenOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageOpenOptions")
            .field("repair", &self.repair)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Where a storage reads its initial content from.
///
/// Streams are borrowed for the call only.
pub enum StorageSource<'a> {
    /// A file path.
    Path(&'a Path),
    /// A read-only stream.
    Input(&'a mut dyn InputStream),
    /// A read-write stream the storage will be committed back into.
    ReadWrite(&'a mut dyn DocStream),
}

/// A transactional container.
///
/// Changes live in memory until [`Storage::commit`].
pub trait Storage: Send + fmt::Debug {
    /// The mode the storage was opened with.
    fn mode(&self) -> ElementModes;

    /// Read access to the element tree.
    ///
    /// # Errors
    ///
    /// Fails after [`Storage::dispose`].
    fn root(&self) -> StorageResult<&Folder>;

    /// Write access to the element tree.
    ///
    /// # Errors
    ///
    /// Fails on read-only or disposed storages.
    fn root_mut(&mut self) -> StorageResult<&mut Folder>;

    /// Commits pending changes to the backing object.
    ///
    /// Stream-based storages must be given their stream again.
    ///
    /// # Errors
    ///
    /// Fails on read-only or disposed storages, or if even relocation failed.
    fn commit(&mut self, stream: Option<&mut dyn DocStream>) -> StorageResult<CommitOutcome>;

    /// Writes the current content into `stream` and makes it the backing object.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be written.
    fn attach_to_stream(&mut self, stream: &mut dyn DocStream) -> StorageResult<()>;

    /// Releases the content; later calls fail with [`StorageError::Disposed`].
    fn dispose(&mut self);

    /// Returns true after [`Storage::dispose`].
    fn is_disposed(&self) -> bool;

    /// Attaches encryption data used for subsequent commits.
    ///
    /// # Errors
    ///
    /// Fails on disposed storages.
    fn set_encryption_data(&mut self, data: EncryptionData) -> StorageResult<()>;

    /// Returns attached encryption data.
    fn encryption_data(&self) -> Option<&EncryptionData>;

    /// Sets the disk-spanning segment size.
    ///
    /// # Errors
    ///
    /// Fails on read-only or disposed storages.
    fn set_segment_size(&mut self, size: u64) -> StorageResult<()>;

    /// Reads the stream at a `/`-separated path.
    ///
    /// # Errors
    ///
    /// Fails if the stream does not exist.
    fn read_stream(&self, path: &str) -> StorageResult<Vec<u8>> {
        Ok(self.root()?.stream_at(path)?.to_vec())
    }

    /// Copies the whole tree into `target`.
    ///
    /// # Errors
    ///
    /// Fails if this storage is disposed or `target` is not writable.
    fn copy_to(&self, target: &mut dyn Storage) -> StorageResult<()> {
        let source = self.root()?;
        source.copy_into(target.root_mut()?);
        Ok(())
    }
}

/// Opens storages.
pub trait StorageFactory: Send + Sync + fmt::Debug {
    /// Opens a storage over `source` with `mode`.
    ///
    /// # Errors
    ///
    /// Fails if the source cannot be read or is not a valid container.
    fn create(
        &self,
        source: StorageSource<'_>,
        mode: ElementModes,
        options: &StorageOpenOptions<'_>,
    ) -> StorageResult<Box<dyn Storage>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_paths_resolve() {
        let mut root = Folder::new();
        root.folder_mut("Versions")
            .unwrap()
            .put_stream("Version1", b"old".to_vec());
        assert_eq!(root.stream_at("Versions/Version1").unwrap(), b"old");
        assert!(matches!(
            root.stream_at("Versions/Version2"),
            Err(StorageError::ElementNotFound(_))
        ));
        assert!(root.stream_at("").is_err());
    }

    #[test]
    fn folder_mut_refuses_streams() {
        let mut root = Folder::new();
        root.put_stream("content.xml", Vec::new());
        assert!(matches!(
            root.folder_mut("content.xml"),
            Err(StorageError::WrongElementKind(_))
        ));
    }

    #[test]
    fn copy_into_replaces_same_names() {
        let mut source = Folder::new();
        source.put_stream("a", vec![1]);
        let mut target = Folder::new();
        target.put_stream("a", vec![9]);
        target.put_stream("b", vec![2]);
        source.copy_into(&mut target);
        assert_eq!(target.stream("a").unwrap(), &[1]);
        assert_eq!(target.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn encryption_data_debug_hides_values() {
        let data = EncryptionData::new().with("PackageSHA256UTF8EncryptionKey", vec![7; 32]);
        let text = format!("{data:?}");
        assert!(text.contains("PackageSHA256UTF8EncryptionKey"));
        assert!(!text.contains('7'));
    }
}
