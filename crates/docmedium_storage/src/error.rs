//! Error types for the content and storage boundaries.

use crate::url::DocUrl;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for content operations.
pub type ContentResult<T> = Result<T, ContentError>;

/// Errors raised by container storages.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The package bytes are not a valid container.
    #[error("package corrupted: {0}")]
    Corrupted(String),

    /// A named element does not exist.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// An element exists but has the wrong kind (stream vs. folder).
    #[error("element {0} has the wrong kind")]
    WrongElementKind(String),

    /// A mutation was attempted on a storage opened without write access.
    #[error("storage is read-only")]
    ReadOnly,

    /// The storage was disposed and can no longer be used.
    #[error("storage is disposed")]
    Disposed,

    /// The storage is bound to a stream but commit was called without it.
    #[error("storage is based on a stream but no stream was supplied")]
    MissingStream,

    /// Serialization of the element tree failed.
    #[error("encoding error: {0}")]
    Encode(String),

    /// Deserialization of the element tree failed.
    #[error("decoding error: {0}")]
    Decode(String),
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Creates an element-not-found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::ElementNotFound(name.into())
    }
}

/// Classification of content I/O failures.
///
/// The medium translates these into its own sticky error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoErrorCode {
    /// Permission was refused.
    AccessDenied,
    /// The addressed content does not exist.
    NotExisting,
    /// The content exists but could not be read.
    CantRead,
    /// The request is not supported by the underlying system.
    ///
    /// Lock-file creation reports this when the file system has no usable
    /// locking, which asks the user whether to continue unlocked.
    InvalidParameter,
    /// Anything else.
    General,
}

impl fmt::Display for IoErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AccessDenied => "access denied",
            Self::NotExisting => "not existing",
            Self::CantRead => "cannot read",
            Self::InvalidParameter => "invalid parameter",
            Self::General => "general I/O error",
        };
        f.write_str(name)
    }
}

/// Errors raised by content providers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContentError {
    /// An interactive I/O failure with a classified code.
    #[error("{code} at {url}: {message}")]
    Io {
        /// Failure class.
        code: IoErrorCode,
        /// Addressed URL.
        url: String,
        /// Provider detail.
        message: String,
    },

    /// No content object could be created for the URL.
    #[error("cannot create content for {0}")]
    CreationFailed(String),

    /// The command was aborted by an interaction or policy.
    #[error("command aborted: {0}")]
    Aborted(String),

    /// The command failed without further classification.
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// The destination name already exists and the clash policy forbids replacing it.
    #[error("name clash: {0} already exists")]
    NameClash(String),

    /// The provider does not implement the operation.
    #[error("{operation} is not supported for {url}")]
    Unsupported {
        /// Operation name.
        operation: &'static str,
        /// Addressed URL.
        url: String,
    },
}

impl ContentError {
    /// Creates a classified I/O error.
    pub fn io(code: IoErrorCode, url: &DocUrl, message: impl Into<String>) -> Self {
        Self::Io {
            code,
            url: url.to_string(),
            message: message.into(),
        }
    }

    /// Classifies an OS error raised while accessing `url`.
    pub fn from_io(err: &io::Error, url: &DocUrl) -> Self {
        let code = match err.kind() {
            io::ErrorKind::NotFound => IoErrorCode::NotExisting,
            io::ErrorKind::PermissionDenied => IoErrorCode::AccessDenied,
            io::ErrorKind::AlreadyExists => return Self::NameClash(url.to_string()),
            io::ErrorKind::Unsupported | io::ErrorKind::InvalidInput => {
                IoErrorCode::InvalidParameter
            }
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => IoErrorCode::CantRead,
            _ => IoErrorCode::General,
        };
        Self::io(code, url, err.to_string())
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(operation: &'static str, url: &DocUrl) -> Self {
        Self::Unsupported {
            operation,
            url: url.to_string(),
        }
    }

    /// Returns the I/O classification, if this is an I/O failure.
    #[must_use]
    pub fn io_code(&self) -> Option<IoErrorCode> {
        match self {
            Self::Io { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_errors_are_classified() {
        let url = DocUrl::parse("file:///tmp/doc.odt").unwrap();
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(
            ContentError::from_io(&denied, &url).io_code(),
            Some(IoErrorCode::AccessDenied)
        );
        let missing = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(
            ContentError::from_io(&missing, &url).io_code(),
            Some(IoErrorCode::NotExisting)
        );
        let exists = io::Error::from(io::ErrorKind::AlreadyExists);
        assert!(matches!(
            ContentError::from_io(&exists, &url),
            ContentError::NameClash(_)
        ));
    }

    #[test]
    fn display_names_the_url() {
        let url = DocUrl::parse("sftp://host/a.odt").unwrap();
        let err = ContentError::io(IoErrorCode::CantRead, &url, "short read");
        assert_eq!(
            err.to_string(),
            "cannot read at sftp://host/a.odt: short read"
        );
    }
}
