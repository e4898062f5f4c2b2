//! Open mode of a medium.

use serde::{Deserialize, Serialize};

/// What a medium may do with its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenMode {
    /// Reading.
    pub read: bool,
    /// Writing.
    pub write: bool,
    /// Start from empty content instead of staging the existing bytes.
    pub truncate: bool,
}

impl OpenMode {
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

    /// Write-only, discarding existing content.
    pub const WRITE_TRUNCATE: Self = Self {
        read: false,
        write: true,
        truncate: true,
    };

    /// Returns the same mode with truncation.
    #[must_use]
    pub const fn truncating(self) -> Self {
        Self {
            truncate: true,
            ..self
        }
    }

    /// Returns the same mode with reading added.
    #[must_use]
    pub const fn with_read(self) -> Self {
        Self { read: true, ..self }
    }
}
