//! The content boundary: URL-addressed documents and folders.

use crate::error::{ContentError, ContentResult};
use crate::stream::{DocStream, InputStream};
use crate::url::DocUrl;
use chrono::{DateTime, Utc};
use std::fmt;
use std::io::Read;
use std::sync::Arc;

/// Properties reported for a content object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentProperties {
    /// Display name, usually the last URL segment.
    pub title: String,
    /// Size in bytes (zero for folders).
    pub size: u64,
    /// Last modification time, when known.
    pub date_modified: Option<DateTime<Utc>>,
    /// Whether the object refuses writes.
    pub is_read_only: bool,
    /// Whether the object is a document (has a stream).
    pub is_document: bool,
    /// Whether the object is a folder.
    pub is_folder: bool,
    /// Media type, when known.
    pub media_type: Option<String>,
}

/// Policy applied when an inserted name already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameClash {
    /// Replace the existing object.
    #[default]
    Overwrite,
    /// Pick a fresh name next to the existing object.
    Rename,
    /// Fail with [`ContentError::NameClash`].
    Error,
}

/// Kind of content-level transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOperation {
    /// Plain copy.
    Copy,
    /// Commit a new revision to a versioned store.
    CheckIn {
        /// Whether this is a major revision.
        major: bool,
        /// Revision comment.
        comment: String,
    },
}

/// Parameters of an insert into a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertRequest {
    /// Copy or check-in.
    pub operation: TransferOperation,
    /// Behaviour on existing names.
    pub name_clash: NameClash,
    /// Media type to record, if any.
    pub media_type: Option<String>,
}

impl InsertRequest {
    /// A plain copy with the given clash policy.
    #[must_use]
    pub fn copy(name_clash: NameClash) -> Self {
        Self {
            operation: TransferOperation::Copy,
            name_clash,
            media_type: None,
        }
    }
}

/// A provider serving all URLs of one scheme.
///
/// Providers are shared between media, so they take `&self` and use
/// interior locking where they keep state.
pub trait ContentProvider: Send + Sync + fmt::Debug {
    /// The URL scheme this provider serves, e.g. `file`.
    fn scheme(&self) -> &str;

    /// Reports properties of the object at `url`.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::IoErrorCode::NotExisting`] when nothing is there.
    fn properties(&self, url: &DocUrl) -> ContentResult<ContentProperties>;

    /// Opens the document at `url` for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is missing or unreadable.
    fn open_stream(&self, url: &DocUrl) -> ContentResult<Box<dyn InputStream>>;

    /// Opens the document at `url` for reading and writing.
    ///
    /// With `exclusive_lock` the provider also takes a system-level lock
    /// that lasts until the stream is dropped.
    ///
    /// # Errors
    ///
    /// Fails when the document is not writable or already locked.
    fn open_read_write(
        &self,
        url: &DocUrl,
        exclusive_lock: bool,
    ) -> ContentResult<Box<dyn DocStream>> {
        let _ = exclusive_lock;
        Err(ContentError::unsupported("open_read_write", url))
    }

    /// Writes `data` as the whole content of `url`.
    ///
    /// # Errors
    ///
    /// Fails with a name clash if the object exists and `replace_existing` is false.
    fn write_stream(
        &self,
        url: &DocUrl,
        data: &mut dyn Read,
        replace_existing: bool,
    ) -> ContentResult<()>;

    /// Truncates or extends the document at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is missing or not writable.
    fn set_size(&self, url: &DocUrl, size: u64) -> ContentResult<()>;

    /// Inserts `data` into `folder` under `name`.
    ///
    /// Returns the URL of a newly checked-in revision when the provider
    /// assigns one; plain copies return `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder is missing or the clash policy refuses.
    fn insert(
        &self,
        folder: &DocUrl,
        name: &str,
        data: &mut dyn Read,
        request: &InsertRequest,
    ) -> ContentResult<Option<DocUrl>>;

    /// Creates the folder at `url` and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder cannot be created.
    fn create_folder(&self, url: &DocUrl) -> ContentResult<()>;

    /// Deletes the object at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is missing or cannot be removed.
    fn delete(&self, url: &DocUrl) -> ContentResult<()>;

    /// Restricts write access on `url` to the current user.
    ///
    /// # Errors
    ///
    /// Returns an error if permissions cannot be changed.
    fn set_writable_for_user_only(&self, url: &DocUrl) -> ContentResult<()> {
        let _ = url;
        Ok(())
    }
}

/// Routes URLs to the provider registered for their scheme.
#[derive(Debug, Clone, Default)]
pub struct ContentBroker {
    providers: Vec<Arc<dyn ContentProvider>>,
}

impl ContentBroker {
    /// Creates a broker without providers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a broker serving `file:` URLs from the local file system.
    #[must_use]
    pub fn with_local_files() -> Self {
        Self::new().with_provider(Arc::new(crate::local::LocalFileProvider::new()))
    }

    /// Registers a provider, replacing any previous one for its scheme.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn ContentProvider>) -> Self {
        self.register(provider);
        self
    }

    /// Registers a provider, replacing any previous one for its scheme.
    pub fn register(&mut self, provider: Arc<dyn ContentProvider>) {
        self.providers
            .retain(|existing| existing.scheme() != provider.scheme());
        self.providers.push(provider);
    }

    /// Returns true if some provider serves the URL's scheme.
    #[must_use]
    pub fn supports(&self, url: &DocUrl) -> bool {
        self.provider(url).is_some()
    }

    fn provider(&self, url: &DocUrl) -> Option<&Arc<dyn ContentProvider>> {
        self.providers.iter().find(|p| p.scheme() == url.scheme())
    }

    /// Creates a content handle for `url`.
    ///
    /// The handle does not touch the object yet.
    ///
    /// # Errors
    ///
    /// Fails with [`ContentError::CreationFailed`] when no provider serves the URL.
    pub fn content(&self, url: &DocUrl) -> ContentResult<Content> {
        let provider = self
            .provider(url)
            .ok_or_else(|| ContentError::CreationFailed(url.to_string()))?;
        Ok(Content {
            url: url.clone(),
            provider: Arc::clone(provider),
        })
    }

    /// Copies the document at `source` into `folder` as `name`.
    ///
    /// The source may be served by a different provider than the folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or the insert fails.
    pub fn transfer(
        &self,
        source: &DocUrl,
        folder: &DocUrl,
        name: &str,
        request: &InsertRequest,
    ) -> ContentResult<Option<DocUrl>> {
        let mut data = self.content(source)?.open_stream()?;
        let target = self.content(folder)?;
        tracing::debug!(%source, %folder, name, "content transfer");
        target.insert(name, &mut data, request)
    }
}

/// A handle on one URL through its provider.
#[derive(Debug, Clone)]
pub struct Content {
    url: DocUrl,
    provider: Arc<dyn ContentProvider>,
}

impl Content {
    /// The addressed URL.
    #[must_use]
    pub fn url(&self) -> &DocUrl {
        &self.url
    }

    /// Reports properties.
    ///
    /// # Errors
    ///
    /// See [`ContentProvider::properties`].
    pub fn properties(&self) -> ContentResult<ContentProperties> {
        self.provider.properties(&self.url)
    }

    /// Returns true if a document exists at the URL.
    #[must_use]
    pub fn is_document(&self) -> bool {
        self.properties().is_ok_and(|p| p.is_document)
    }

    /// Returns true if a folder exists at the URL.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.properties().is_ok_and(|p| p.is_folder)
    }

    /// Opens the document for reading.
    ///
    /// # Errors
    ///
    /// See [`ContentProvider::open_stream`].
    pub fn open_stream(&self) -> ContentResult<Box<dyn InputStream>> {
        self.provider.open_stream(&self.url)
    }

    /// Opens the document for reading and writing.
    ///
    /// # Errors
    ///
    /// See [`ContentProvider::open_read_write`].
    pub fn open_read_write(&self, exclusive_lock: bool) -> ContentResult<Box<dyn DocStream>> {
        self.provider.open_read_write(&self.url, exclusive_lock)
    }

    /// Writes the whole document.
    ///
    /// # Errors
    ///
    /// See [`ContentProvider::write_stream`].
    pub fn write_stream(&self, data: &mut dyn Read, replace_existing: bool) -> ContentResult<()> {
        self.provider.write_stream(&self.url, data, replace_existing)
    }

    /// Resizes the document.
    ///
    /// # Errors
    ///
    /// See [`ContentProvider::set_size`].
    pub fn set_size(&self, size: u64) -> ContentResult<()> {
        self.provider.set_size(&self.url, size)
    }

    /// Inserts `data` into this folder under `name`.
    ///
    /// # Errors
    ///
    /// See [`ContentProvider::insert`].
    pub fn insert(
        &self,
        name: &str,
        data: &mut dyn Read,
        request: &InsertRequest,
    ) -> ContentResult<Option<DocUrl>> {
        self.provider.insert(&self.url, name, data, request)
    }

    /// Creates the folder at this URL.
    ///
    /// # Errors
    ///
    /// See [`ContentProvider::create_folder`].
    pub fn create_folder(&self) -> ContentResult<()> {
        self.provider.create_folder(&self.url)
    }

    /// Deletes the object.
    ///
    /// # Errors
    ///
    /// See [`ContentProvider::delete`].
    pub fn delete(&self) -> ContentResult<()> {
        self.provider.delete(&self.url)
    }

    /// Restricts write access to the current user.
    ///
    /// # Errors
    ///
    /// See [`ContentProvider::set_writable_for_user_only`].
    pub fn set_writable_for_user_only(&self) -> ContentResult<()> {
        self.provider.set_writable_for_user_only(&self.url)
    }
}
