//! # docmedium testkit
//!
//! Test utilities for the docmedium engine.
//!
//! This crate provides:
//! - [`TestWorkspace`]: a temp directory with a ready [`docmedium_core::MediumContext`]
//! - [`FaultyStorageFactory`]: storages whose commit relocates, tears or fails on demand
//! - [`ScriptedInteraction`]: an interaction handler answering from a queue and recording prompts
//! - proptest strategies for documents, package trees and lock records
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docmedium_testkit::prelude::*;
//!
//! #[test]
//! fn save_keeps_original_on_relocation() {
//!     let ws = TestWorkspace::new();
//!     let faults = FaultyStorageFactory::new(ws.temp_dir());
//!     faults.arm(CommitFault::Relocate);
//!     let mut medium = ws.open_with_storages("doc.dmpk", OpenMode::READWRITE, faults.shared());
//!     // ... edit and commit
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod interaction;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::interaction::*;
    pub use docmedium_core::{ErrorCode, Medium, OpenMode, Outcome};
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use interaction::*;
