//! Error types for the medium.
//!
//! Two layers exist. [`CoreError`] is an ordinary `Result` error used by
//! utilities (lock files, descriptors, temp files). [`ErrorCode`] is the
//! sticky code a [`crate::Medium`] records instead of returning errors.

use docmedium_storage::{ContentError, IoErrorCode, StorageError};
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for core utility operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by core utilities.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Storage boundary error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Content boundary error.
    #[error("content error: {0}")]
    Content(#[from] ContentError),

    /// A lock-file record could not be parsed.
    #[error("malformed lock file: {message}")]
    LockFileFormat {
        /// What was wrong.
        message: String,
    },

    /// A media descriptor holds an invalid value.
    #[error("invalid media descriptor: {message}")]
    InvalidDescriptor {
        /// What was wrong.
        message: String,
    },

    /// A descriptor without `FileName` was used to create a medium.
    #[error("media descriptor has no file name")]
    MissingFileName,

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A lock file belongs to somebody else and removal was not forced.
    #[error("lock is held by {holder}")]
    ForeignLock {
        /// Holder description from the lock record.
        holder: String,
    },

    /// A medium operation left a sticky error code.
    #[error("medium error: {0}")]
    Medium(ErrorCode),
}

impl CoreError {
    /// Creates a lock-file format error.
    pub fn lock_file_format(message: impl Into<String>) -> Self {
        Self::LockFileFormat {
            message: message.into(),
        }
    }

    /// Creates a descriptor error.
    pub fn invalid_descriptor(message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            message: message.into(),
        }
    }
}

/// Sticky 32-bit error code of a medium.
///
/// The high byte is the error class, the low byte the code within it.
/// [`ErrorCode::None`] is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ErrorCode {
    /// No error.
    #[default]
    None = 0,
    /// An interactive step or policy cancelled the operation.
    Aborted = 0x0101,
    /// Write intent could not be satisfied.
    AccessDenied = 0x0201,
    /// No backup copy could be produced.
    CantCreateBackup = 0x0202,
    /// Local I/O failure while writing.
    CantWrite = 0x0301,
    /// Local I/O failure while reading.
    CantRead = 0x0302,
    /// The destination does not exist.
    NotExists = 0x0401,
    /// The destination's parent path does not exist or cannot be created.
    NotExistsPath = 0x0402,
    /// Any other failure of the content or storage boundary.
    General = 0x0F01,
}

impl ErrorCode {
    const ALL: [Self; 9] = [
        Self::None,
        Self::Aborted,
        Self::AccessDenied,
        Self::CantCreateBackup,
        Self::CantWrite,
        Self::CantRead,
        Self::NotExists,
        Self::NotExistsPath,
        Self::General,
    ];

    /// Returns the numeric code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Looks up a code by its numeric value.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Returns true for anything but [`ErrorCode::None`].
    #[must_use]
    pub const fn is_error(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "no error",
            Self::Aborted => "aborted",
            Self::AccessDenied => "access denied",
            Self::CantCreateBackup => "cannot create backup",
            Self::CantWrite => "cannot write",
            Self::CantRead => "cannot read",
            Self::NotExists => "does not exist",
            Self::NotExistsPath => "path does not exist",
            Self::General => "general I/O error",
        };
        write!(f, "{name} ({:#06x})", self.code())
    }
}

impl From<&ContentError> for ErrorCode {
    fn from(err: &ContentError) -> Self {
        match err {
            ContentError::Io { code, .. } => match code {
                IoErrorCode::AccessDenied => Self::AccessDenied,
                IoErrorCode::NotExisting => Self::NotExists,
                IoErrorCode::CantRead => Self::CantRead,
                IoErrorCode::InvalidParameter | IoErrorCode::General => Self::General,
            },
            ContentError::Aborted(_) | ContentError::CommandFailed(_) => Self::Aborted,
            ContentError::CreationFailed(_) => Self::NotExistsPath,
            ContentError::NameClash(_) | ContentError::Unsupported { .. } => Self::General,
        }
    }
}

impl From<&StorageError> for ErrorCode {
    fn from(_: &StorageError) -> Self {
        Self::General
    }
}
