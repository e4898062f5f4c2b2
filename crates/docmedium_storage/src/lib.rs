//! # docmedium storage
//!
//! Content and container-storage boundaries for the docmedium engine.
//!
//! This crate holds the two collaborator layers the medium talks to:
//!
//! - **Content**: documents and folders addressed by [`DocUrl`]. A
//!   [`ContentBroker`] routes each URL to the [`ContentProvider`] registered
//!   for its scheme. Providers read, write, insert and delete content and
//!   report properties such as size, modification date and read-only state.
//! - **Storage**: transactional containers of named streams and sub-storages.
//!   A [`StorageFactory`] opens a [`Storage`] over a path, a borrowed input
//!   stream, or a borrowed read-write stream. Nothing is written until
//!   [`Storage::commit`].
//!
//! ## Design Principles
//!
//! - Streams handed to a storage are borrowed for the duration of a call only
//! - Commit reports relocation as a value, not as an error
//! - No knowledge of locks, backups, temp files or media
//!
//! ## Available Implementations
//!
//! - [`LocalFileProvider`] - `file:` URLs on the local file system
//! - [`MemoryContentProvider`] - in-memory content for any scheme, with check-in
//! - [`PackageStorage`] - checksummed container format
//!
//! ## Example
//!
//! ```rust
//! use docmedium_storage::{ElementModes, PackageStorageFactory, StorageFactory, StorageOpenOptions, StorageSource};
//! use std::io::Cursor;
//!
//! let mut stream = Cursor::new(Vec::new());
//! let factory = PackageStorageFactory::new();
//! let mut storage = factory
//!     .create(StorageSource::ReadWrite(&mut stream), ElementModes::READWRITE, &StorageOpenOptions::default())
//!     .unwrap();
//! storage.root_mut().unwrap().put_stream("content.xml", b"<doc/>".to_vec());
//! storage.commit(Some(&mut stream)).unwrap();
//! assert!(!stream.get_ref().is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod container;
mod content;
mod error;
mod local;
mod memory;
mod package;
mod stream;
mod url;

pub use container::{
    CommitOutcome, Element, ElementModes, EncryptionData, Folder, ProgressHandler, Storage,
    StorageFactory, StorageOpenOptions, StorageSource,
};
pub use content::{
    Content, ContentBroker, ContentProperties, ContentProvider, InsertRequest, NameClash,
    TransferOperation,
};
pub use error::{ContentError, ContentResult, IoErrorCode, StorageError, StorageResult};
pub use local::LocalFileProvider;
pub use memory::{ContentFault, FaultOp, MemoryContentProvider};
pub use package::{PackageMeta, PackageStorage, PackageStorageFactory, PACKAGE_MAGIC};
pub use stream::{DocStream, InputStream};
pub use url::DocUrl;
