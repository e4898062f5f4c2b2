//! # docmedium core
//!
//! Transactional persistence for documents.
//!
//! A [`Medium`] carries one document through a load or a save. It keeps
//! the original file safe while the document is edited and written:
//!
//! - saves are staged in a temp file and only moved over the original on
//!   commit
//! - the original is backed up before it is overwritten and restored when
//!   the write fails
//! - a `.~lock.<name>#` record (plus a system file lock where available)
//!   tells other editors the document is in use
//! - container documents are opened as a [`docmedium_storage::Storage`]
//!   and can carry stored revisions and signatures
//!
//! ## Error model
//!
//! Expected failures do not surface as `Result`s. The medium records a
//! sticky [`ErrorCode`] and returns `None` or `false`; check
//! [`Medium::error_code`] after each step. Only utility APIs such as
//! [`LockFile`] and [`MediaDescriptor::from_json`] return [`CoreResult`].
//!
//! ## Collaborators
//!
//! Everything a medium touches comes from a [`MediumContext`]: the
//! [`Config`], the content broker, the storage factory, the temp file
//! allocator, known filters and an optional default
//! [`InteractionHandler`]. There is no global state.
//!
//! ## Example
//!
//! ```rust
//! use docmedium_core::{Config, Medium, MediumContext, OpenMode};
//! use docmedium_storage::DocUrl;
//! use std::io::Write;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("letter.txt");
//! std::fs::write(&path, b"draft").unwrap();
//!
//! let ctx = MediumContext::new(
//!     Config::new()
//!         .temp_dir(dir.path())
//!         .backup_dir(dir.path().join("backup")),
//! );
//! let mut medium = Medium::open(ctx, DocUrl::from_path(&path).as_str(), OpenMode::READWRITE);
//!
//! let out = medium.get_out_stream().unwrap();
//! out.set_len(0).unwrap();
//! out.write_all(b"final").unwrap();
//! assert!(medium.commit());
//! drop(medium);
//!
//! assert_eq!(std::fs::read(&path).unwrap(), b"final");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod descriptor;
mod error;
mod filter;
mod interaction;
mod lockfile;
mod medium;
mod open_mode;
mod temp;

pub use config::{Config, LockIdentity, LockingPolicy};
pub use context::MediumContext;
pub use descriptor::{MediaDescriptor, MediaHandles};
pub use error::{CoreError, CoreResult, ErrorCode};
pub use filter::{Filter, FilterRegistry};
pub use interaction::{ApprovalRequest, FixedOutcome, InteractionHandler, LockConflict, Outcome};
pub use lockfile::{LockEntry, LockFile};
pub use medium::{
    DigestSigner, DocumentSigner, LockUiStatus, Medium, RevisionTag, SignatureState,
};
pub use open_mode::OpenMode;
pub use temp::{TempFile, TempFileAllocator};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
