//! Container storage acquisition.
//!
//! The storage is opened lazily over whichever document stream the medium
//! holds. A failed attempt is remembered so later calls do not retry until
//! the physical file changes.

use super::streams::InSlot;
use super::Medium;
use crate::error::ErrorCode;
use crate::open_mode::OpenMode;
use docmedium_storage::{
    ElementModes, EncryptionData, Storage, StorageOpenOptions, StorageSource, PACKAGE_MAGIC,
};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, SeekFrom};
use std::sync::Arc;

/// Key under which the password-derived package key is stored.
pub(crate) const SHA256_KEY_NAME: &str = "PackageSHA256UTF8EncryptionKey";

/// Sub-storage holding stored revisions.
pub(crate) const VERSIONS_FOLDER: &str = "Versions";

enum Source {
    Stream,
    Input,
    Path,
}

impl Medium {
    /// The container storage, opened on demand.
    ///
    /// With `create_temp` the document is staged in a temp file first, so
    /// the storage can be written without touching the original. A
    /// descriptor `Version` replaces the storage with the stored revision,
    /// opened read-only from its own temp file.
    ///
    /// Returns `None` when the document is not a container; the cause is
    /// available from [`Medium::last_storage_creation_state`].
    pub fn get_storage(&mut self, create_temp: bool) -> Option<&mut (dyn Storage + 'static)> {
        if self.storage.is_some() || self.tried_storage {
            return self.storage.as_deref_mut();
        }

        self.get_medium();
        if create_temp {
            self.create_temp_file(false);
        }
        self.get_medium();
        if self.error.is_error() {
            return None;
        }

        let repair = self.descriptor.repair_package == Some(true);
        if repair {
            self.create_temp_file(false);
            self.get_medium();
            if self.error.is_error() {
                return None;
            }
        }

        let progress = self.handles.progress.clone();
        let options = StorageOpenOptions {
            repair,
            progress: progress.as_deref(),
        };

        let source = if self.io.stream.is_some() {
            Source::Stream
        } else if self.io.input.is_some() {
            Source::Input
        } else {
            Source::Path
        };

        let factory = Arc::clone(&self.ctx.storages);
        let result = match source {
            Source::Stream => {
                self.storage_based_on_stream = true;
                match self.io.rw() {
                    Some(stream) => factory.create(
                        StorageSource::ReadWrite(stream),
                        ElementModes::READWRITE,
                        &options,
                    ),
                    None => return None,
                }
            }
            Source::Input => {
                self.storage_based_on_stream = true;
                match self.io.input.as_deref_mut() {
                    Some(input) => factory.create(StorageSource::Input(input), ElementModes::READ, &options),
                    None => return None,
                }
            }
            Source::Path => {
                self.storage_based_on_stream = false;
                self.close_streams();
                let Some(path) = self.physical_name.clone() else {
                    return None;
                };
                let mode = if self.open_mode.write {
                    ElementModes::READWRITE
                } else {
                    ElementModes::READ
                };
                factory.create(StorageSource::Path(&path), mode, &options)
            }
        };

        match result {
            Ok(storage) => {
                self.storage = Some(storage);
                self.last_storage_error = ErrorCode::None;
            }
            Err(e) => {
                tracing::debug!(error = %e, "document is not a storage");
                self.last_storage_error = ErrorCode::from(&e);
                self.add_log(format!("storage creation failed: {e}"));
            }
        }

        if self.error.is_error() {
            self.storage = None;
            self.rewind_reader();
            return None;
        }

        self.tried_storage = true;

        if self.storage.is_some() {
            self.set_encryption_data_to_storage();
            self.get_version_list(false);
        }

        if let Some(version) = self.descriptor.version.filter(|v| *v != 0) {
            self.open_stored_version(version);
        }

        self.is_storage = self.storage.is_some() && !self.error.is_error();
        if !self.is_storage {
            self.rewind_reader();
        }
        self.storage.as_deref_mut()
    }

    fn rewind_reader(&mut self) {
        if let Some(reader) = self.io.reader() {
            if let Err(e) = reader.seek(SeekFrom::Start(0)) {
                tracing::debug!(error = %e, "can not rewind document stream");
            }
        }
    }

    /// Replaces the storage by a read-only storage over a stored revision.
    fn open_stored_version(&mut self, version: i16) {
        let count = self.versions.len();
        let index = if version < 0 {
            count.checked_sub(usize::from(version.unsigned_abs()))
        } else {
            usize::try_from(version - 1).ok()
        };
        let Some(tag) = index.and_then(|i| self.versions.get(i)).cloned() else {
            tracing::warn!(version, count, "requested version does not exist");
            self.storage = None;
            self.rewind_reader();
            self.fail(ErrorCode::General, "requested version does not exist");
            return;
        };

        let path = match self.extract_version(&tag.identifier) {
            Ok(path) => path,
            Err(reason) => {
                tracing::warn!(version = %tag.identifier, %reason, "can not extract version");
                self.storage = None;
                self.rewind_reader();
                return;
            }
        };

        let factory = Arc::clone(&self.ctx.storages);
        match factory.create(StorageSource::Path(&path), ElementModes::READ, &StorageOpenOptions::default()) {
            Ok(storage) => {
                if let Some(mut old) = self.storage.replace(storage) {
                    if self.dispose_storage {
                        old.dispose();
                    }
                }
                self.open_mode = OpenMode::READ;
                self.storage_based_on_stream = false;
                self.close_streams();
                self.set_physical_name(Some(path));
                self.tried_storage = true;
                self.is_temp = true;
                self.descriptor.read_only = Some(true);
                self.versions.clear();
                self.versions_loaded = false;
                tracing::debug!(version = %tag.identifier, "opened stored version");
            }
            Err(e) => {
                tracing::warn!(version = %tag.identifier, error = %e, "stored version is not a storage");
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::debug!(error = %e, "can not remove version copy");
                }
                self.storage = None;
                self.rewind_reader();
            }
        }
    }

    fn extract_version(&self, identifier: &str) -> Result<std::path::PathBuf, String> {
        let storage = self.storage.as_deref().ok_or("no storage")?;
        let bytes = storage
            .read_stream(&format!("{VERSIONS_FOLDER}/{identifier}"))
            .map_err(|e| e.to_string())?;
        let temp = self.ctx.temp.create().map_err(|e| e.to_string())?;
        std::fs::write(temp.path(), &bytes).map_err(|e| e.to_string())?;
        Ok(temp.keep())
    }

    /// Closes the storage, disposing it only if the medium owns it.
    pub fn close_storage(&mut self) {
        if let Some(mut storage) = self.storage.take() {
            if self.dispose_storage && !self.salvage_mode {
                storage.dispose();
            }
        }
        self.storage_based_on_stream = false;
        self.tried_storage = false;
        self.is_storage = false;
    }

    pub(crate) fn close_zip_storage(&mut self) {
        if let Some(mut storage) = self.zip_storage.take() {
            storage.dispose();
        }
    }

    /// Sets whether closing disposes the storage.
    pub fn can_dispose_storage(&mut self, dispose: bool) {
        self.dispose_storage = dispose;
    }

    /// Whether closing disposes the storage.
    #[must_use]
    pub fn will_dispose_storage_on_close(&self) -> bool {
        self.dispose_storage
    }

    /// Hands the storage to the caller; the medium forgets it.
    pub fn take_storage(&mut self) -> Option<Box<dyn Storage>> {
        let storage = self.storage.take();
        self.storage_based_on_stream = false;
        self.tried_storage = false;
        self.is_storage = false;
        storage
    }

    /// Returns true while a storage is open.
    #[must_use]
    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    /// Whether the open storage reads from a document stream.
    #[must_use]
    pub fn is_storage_based_on_stream(&self) -> bool {
        self.storage_based_on_stream
    }

    /// A plain container over the document stream, for signing.
    ///
    /// Errors hit while opening are cleared again.
    pub(crate) fn get_zip_storage_to_sign(&mut self, read_only: bool) -> Option<&mut (dyn Storage + 'static)> {
        if !self.error.is_error() && self.zip_storage.is_none() {
            self.get_medium();
            let factory = Arc::clone(&self.ctx.storages);
            let options = StorageOpenOptions::default();
            let result = if !read_only && self.io.stream.is_some() {
                self.io
                    .rw()
                    .map(|stream| factory.create(StorageSource::ReadWrite(stream), ElementModes::READWRITE, &options))
            } else {
                self.io
                    .input()
                    .map(|input| factory.create(StorageSource::Input(input), ElementModes::READ, &options))
            };
            match result {
                Some(Ok(storage)) => self.zip_storage = Some(storage),
                Some(Err(e)) => tracing::debug!(error = %e, "no container to sign"),
                None => {}
            }
            if self.error.is_error() {
                self.reset_error();
            }
        }
        self.zip_storage.as_deref_mut()
    }

    /// The storage a save writes into.
    ///
    /// A storage the medium was created with, or one already over a temp
    /// file, is reused. Otherwise the document is staged in an empty temp
    /// file and a storage opened over it.
    pub fn get_output_storage(&mut self) -> Option<&mut (dyn Storage + 'static)> {
        if self.error.is_error() {
            return None;
        }
        if self.storage.is_some() && (self.logical_name.is_none() || self.temp_file.is_some()) {
            return self.storage.as_deref_mut();
        }

        let writable = match &self.io.in_stream {
            Some(InSlot::File(_)) => self.open_mode.write,
            Some(InSlot::Medium) => self.io.stream.is_some(),
            None => true,
        };
        if !writable {
            self.close_in_stream();
        }

        self.create_temp_file_no_copy();
        self.get_storage(false)
    }

    /// Turns a password into encryption data and attaches it to the storage.
    pub(crate) fn set_encryption_data_to_storage(&mut self) {
        if self.storage.is_none() {
            return;
        }
        if let Some(password) = self.descriptor.password.take() {
            let key = Sha256::digest(password.as_bytes()).to_vec();
            self.descriptor
                .encryption_data
                .get_or_insert_with(Default::default)
                .insert(SHA256_KEY_NAME.to_string(), key);
        }
        let Some(data) = self.descriptor.encryption_data.as_ref() else {
            return;
        };
        let data = data
            .iter()
            .fold(EncryptionData::new(), |acc, (name, value)| acc.with(name, value.clone()));
        if let Some(storage) = self.storage.as_deref_mut() {
            if let Err(e) = storage.set_encryption_data(data) {
                tracing::warn!(error = %e, "can not attach encryption data");
            }
        }
    }

    /// Whether the document is a container.
    ///
    /// Decided from the container magic without opening a storage. A
    /// negative answer from the read stream is remembered.
    pub fn is_storage(&mut self) -> bool {
        if self.storage.is_some() {
            return true;
        }
        if self.tried_storage {
            return self.is_storage;
        }

        if self.temp_file.is_some() {
            if let Some(path) = self.physical_name.clone() {
                self.is_storage = File::open(&path)
                    .and_then(|mut file| has_magic(&mut file))
                    .unwrap_or(false);
            }
            return self.is_storage;
        }

        let result = self.get_in_stream().map(|reader| -> std::io::Result<bool> {
            reader.seek(SeekFrom::Start(0))?;
            let found = has_magic(reader)?;
            reader.seek(SeekFrom::Start(0))?;
            Ok(found)
        });
        if let Some(result) = result {
            self.is_storage = result.unwrap_or(false);
            if !self.error.is_error() && !self.is_storage {
                self.tried_storage = true;
            }
        }
        self.is_storage
    }
}

fn has_magic<R: Read + ?Sized>(reader: &mut R) -> std::io::Result<bool> {
    let mut magic = [0u8; 4];
    let mut filled = 0;
    while filled < magic.len() {
        match reader.read(&mut magic[filled..])? {
            0 => return Ok(false),
            n => filled += n,
        }
    }
    Ok(magic == PACKAGE_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;
    use crate::descriptor::{MediaDescriptor, MediaHandles};
    use docmedium_storage::{DocUrl, Folder, PackageStorage};
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    fn package(streams: &[(&str, &[u8])]) -> Vec<u8> {
        let mut root = Folder::new();
        for (name, data) in streams {
            root.put_stream(name, data.to_vec());
        }
        PackageStorage::encode_folder(&root).unwrap()
    }

    fn versioned_package() -> Vec<u8> {
        let mut root = Folder::new();
        root.put_stream("content.xml", b"current".to_vec());
        let versions = root.folder_mut(VERSIONS_FOLDER).unwrap();
        versions.put_stream("Version1", package(&[("content.xml", b"first")]));
        versions.put_stream("Version2", package(&[("content.xml", b"second")]));
        let list = serde_json::json!([
            {"Identifier": "Version1", "Comment": "one", "Author": "a", "TimeStamp": "2024-01-01T00:00:00Z"},
            {"Identifier": "Version2", "Comment": "two", "Author": "b", "TimeStamp": "2024-02-01T00:00:00Z"}
        ]);
        root.put_stream("VersionList.json", serde_json::to_vec(&list).unwrap());
        PackageStorage::encode_folder(&root).unwrap()
    }

    fn write_doc(dir: &Path, bytes: &[u8]) -> PathBuf {
        let path = dir.join("doc.dmpk");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn open_version(dir: &Path, path: &Path, version: i16) -> Medium {
        let mut descriptor = MediaDescriptor::for_file(DocUrl::from_path(path).as_str());
        descriptor.version = Some(version);
        descriptor.read_only = Some(true);
        Medium::from_descriptor(context(dir), descriptor, MediaHandles::default()).unwrap()
    }

    #[test]
    fn opens_storage_over_document_stream() {
        let dir = tempdir().unwrap();
        let path = write_doc(dir.path(), &package(&[("content.xml", b"<doc/>")]));
        let mut medium = Medium::open(context(dir.path()), DocUrl::from_path(&path).as_str(), OpenMode::READ);

        let storage = medium.get_storage(false).unwrap();
        assert_eq!(storage.read_stream("content.xml").unwrap(), b"<doc/>");
        assert!(medium.is_storage_based_on_stream());
        assert!(medium.has_storage());
        assert!(medium.is_storage());
    }

    #[test]
    fn plain_file_is_not_a_storage_and_is_not_retried() {
        let dir = tempdir().unwrap();
        let path = write_doc(dir.path(), b"just some text, not a package");
        let mut medium = Medium::open(context(dir.path()), DocUrl::from_path(&path).as_str(), OpenMode::READ);

        assert!(medium.get_storage(false).is_none());
        assert_eq!(medium.error_code(), ErrorCode::None);
        assert_eq!(medium.last_storage_creation_state(), ErrorCode::General);
        assert!(!medium.is_storage());

        std::fs::write(&path, package(&[])).unwrap();
        assert!(medium.get_storage(false).is_none(), "a failed attempt is remembered");
    }

    #[test]
    fn is_storage_sniffs_without_opening() {
        let dir = tempdir().unwrap();
        let path = write_doc(dir.path(), &package(&[]));
        let mut medium = Medium::open(context(dir.path()), DocUrl::from_path(&path).as_str(), OpenMode::READ);
        assert!(medium.is_storage());
        assert!(!medium.has_storage());
    }

    #[test]
    fn storage_on_temp_copy_leaves_original_alone() {
        let dir = tempdir().unwrap();
        let original = package(&[("content.xml", b"v1")]);
        let path = write_doc(dir.path(), &original);
        let mut medium =
            Medium::open(context(dir.path()), DocUrl::from_path(&path).as_str(), OpenMode::READWRITE);

        let storage = medium.get_storage(true).unwrap();
        storage.root_mut().unwrap().put_stream("content.xml", b"v2".to_vec());
        assert!(medium.has_temp_file());
        assert_ne!(medium.current_physical_name(), Some(path.as_path()));
        assert_eq!(std::fs::read(&path).unwrap(), original);
    }

    #[test]
    fn password_becomes_encryption_data() {
        let dir = tempdir().unwrap();
        let path = write_doc(dir.path(), &package(&[]));
        let mut descriptor = MediaDescriptor::for_file(DocUrl::from_path(&path).as_str());
        descriptor.password = Some("secret".into());
        let mut medium =
            Medium::from_descriptor(context(dir.path()), descriptor, MediaHandles::default()).unwrap();

        let storage = medium.get_storage(false).unwrap();
        let expected = Sha256::digest(b"secret").to_vec();
        assert_eq!(
            storage.encryption_data().unwrap().get(SHA256_KEY_NAME),
            Some(expected.as_slice())
        );
        assert!(medium.descriptor().password.is_none());
        assert!(medium.descriptor().encryption_data.as_ref().unwrap().contains_key(SHA256_KEY_NAME));
    }

    #[test]
    fn stored_version_opens_read_only_from_its_own_copy() {
        let dir = tempdir().unwrap();
        let path = write_doc(dir.path(), &versioned_package());
        let mut medium = open_version(dir.path(), &path, 1);

        let storage = medium.get_storage(false).unwrap();
        assert_eq!(storage.read_stream("content.xml").unwrap(), b"first");
        assert!(medium.is_read_only());
        assert!(!medium.is_storage_based_on_stream());
        let copy = medium.current_physical_name().unwrap().to_path_buf();
        assert_ne!(copy, path);
        assert!(copy.exists());

        drop(medium);
        assert!(!copy.exists(), "version copy is removed with the medium");
        assert!(path.exists());
    }

    #[test]
    fn negative_version_counts_from_the_end() {
        let dir = tempdir().unwrap();
        let path = write_doc(dir.path(), &versioned_package());
        let mut medium = open_version(dir.path(), &path, -1);
        let storage = medium.get_storage(false).unwrap();
        assert_eq!(storage.read_stream("content.xml").unwrap(), b"second");
    }

    #[test]
    fn missing_version_is_an_error() {
        let dir = tempdir().unwrap();
        let path = write_doc(dir.path(), &versioned_package());
        let mut medium = open_version(dir.path(), &path, 5);
        assert!(medium.get_storage(false).is_none());
        assert_eq!(medium.error_code(), ErrorCode::General);
    }

    #[test]
    fn missing_version_rewinds_the_document_stream() {
        let dir = tempdir().unwrap();
        let path = write_doc(dir.path(), &versioned_package());
        let mut medium = open_version(dir.path(), &path, 5);
        assert!(medium.get_storage(false).is_none());

        let reader = medium.io.reader().unwrap();
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).unwrap();
        assert_eq!(magic, docmedium_storage::PACKAGE_MAGIC);
    }

    #[test]
    fn output_storage_starts_empty_in_a_temp_file() {
        let dir = tempdir().unwrap();
        let path = write_doc(dir.path(), &package(&[("old", b"x")]));
        let mut medium =
            Medium::open(context(dir.path()), DocUrl::from_path(&path).as_str(), OpenMode::READWRITE);

        let storage = medium.get_output_storage().unwrap();
        assert!(storage.root().unwrap().is_empty());
        assert!(storage.mode().write);
        assert!(medium.has_temp_file());

        medium.close_storage();
        assert!(!medium.has_storage());
    }

    #[test]
    fn out_stream_closes_the_open_storage() {
        let dir = tempdir().unwrap();
        let path = write_doc(dir.path(), &package(&[("content.xml", b"v1")]));
        let mut medium =
            Medium::open(context(dir.path()), DocUrl::from_path(&path).as_str(), OpenMode::READWRITE);
        medium.get_storage(true).unwrap();
        assert!(medium.has_storage());

        assert!(medium.get_out_stream().is_some());
        assert!(!medium.has_storage());
        assert_eq!(medium.error_code(), ErrorCode::None);
    }

    #[test]
    fn taken_storage_is_not_disposed() {
        let dir = tempdir().unwrap();
        let path = write_doc(dir.path(), &package(&[("a", b"1")]));
        let mut medium = Medium::open(context(dir.path()), DocUrl::from_path(&path).as_str(), OpenMode::READ);
        medium.get_storage(false).unwrap();
        medium.can_dispose_storage(true);
        assert!(medium.will_dispose_storage_on_close());

        let storage = medium.take_storage().unwrap();
        drop(medium);
        assert!(!storage.is_disposed());
        assert_eq!(storage.read_stream("a").unwrap(), b"1");
    }
}
