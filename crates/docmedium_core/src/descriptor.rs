//! Typed media descriptor.
//!
//! The descriptor is the serializable part of what a caller passes when
//! opening a medium. Property names follow the wire convention
//! (`FileName`, `ReadOnly`, `Version`, ...). Live handles such as streams
//! and interaction handlers travel separately in [`MediaHandles`].

use crate::error::{CoreError, CoreResult};
use crate::interaction::InteractionHandler;
use docmedium_storage::{DocStream, InputStream, ProgressHandler};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

/// Serializable open/save arguments of a medium.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MediaDescriptor {
    /// URL the medium was opened from.
    #[serde(alias = "URL", skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Name of the document filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_name: Option<String>,
    /// Filter-specific options; `B` marks a preview load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_options: Option<String>,
    /// Explicit read-only request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    /// Document password; replaced by encryption data once a storage opens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Derived encryption keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_data: Option<BTreeMap<String, Vec<u8>>>,
    /// URL of the document a recovery copy was salvaged from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salvaged_file: Option<String>,
    /// 1-based stored revision to open; 0 is the live document, negative counts from the end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i16>,
    /// Disk-spanning segment size for package saves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_size: Option<u64>,
    /// Overwrite an existing target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,
    /// Pick a free name instead of overwriting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename: Option<bool>,
    /// Check in as a major revision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_info_major: Option<bool>,
    /// Check-in comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_info_comments: Option<String>,
    /// Open a damaged package in repair mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair_package: Option<bool>,
    /// Open as an untitled copy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_template: Option<bool>,
    /// Fragment split off the URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jump_mark: Option<String>,
    /// Base URL for relative links.
    #[serde(rename = "DocumentBaseURL", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Preview load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<bool>,
    /// Media type of the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl MediaDescriptor {
    /// Creates an empty descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a descriptor naming a file.
    #[must_use]
    pub fn for_file(url: &str) -> Self {
        Self {
            file_name: Some(url.to_string()),
            ..Self::default()
        }
    }

    /// Parses a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON or mistyped properties.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes to a JSON object, omitting unset properties.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Builds a descriptor from a name/value property sequence.
    ///
    /// Unknown names are ignored.
    ///
    /// # Errors
    ///
    /// Fails on duplicate names or mistyped values.
    pub fn from_property_values<I>(values: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        let mut object = serde_json::Map::new();
        for (name, value) in values {
            if object.insert(name.clone(), value).is_some() {
                return Err(CoreError::invalid_descriptor(format!(
                    "duplicate property {name}"
                )));
            }
        }
        Ok(serde_json::from_value(serde_json::Value::Object(object))?)
    }
}

/// Live, non-serializable arguments of a medium.
#[derive(Default)]
pub struct MediaHandles {
    /// Caller-supplied read-write stream.
    pub stream: Option<Box<dyn DocStream>>,
    /// Caller-supplied read-only stream.
    pub input_stream: Option<Box<dyn InputStream>>,
    /// Destination for saves to `private:stream`.
    pub output_stream: Option<Box<dyn Write + Send>>,
    /// Interaction handler overriding the context default.
    pub interaction: Option<Arc<dyn InteractionHandler>>,
    /// Progress sink for package repair.
    pub progress: Option<Arc<dyn ProgressHandler>>,
}

impl MediaHandles {
    /// Creates empty handles.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Supplies a read-write stream.
    #[must_use]
    pub fn with_stream(mut self, stream: Box<dyn DocStream>) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Supplies a read-only stream.
    #[must_use]
    pub fn with_input_stream(mut self, stream: Box<dyn InputStream>) -> Self {
        self.input_stream = Some(stream);
        self
    }

    /// Supplies an output stream.
    #[must_use]
    pub fn with_output_stream(mut self, stream: Box<dyn Write + Send>) -> Self {
        self.output_stream = Some(stream);
        self
    }

    /// Supplies an interaction handler.
    #[must_use]
    pub fn with_interaction(mut self, handler: Arc<dyn InteractionHandler>) -> Self {
        self.interaction = Some(handler);
        self
    }
}

impl fmt::Debug for MediaHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandles")
            .field("stream", &self.stream.is_some())
            .field("input_stream", &self.input_stream.is_some())
            .field("output_stream", &self.output_stream.is_some())
            .field("interaction", &self.interaction.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}
