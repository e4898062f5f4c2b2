//! The document medium.
//!
//! A [`Medium`] owns the transient I/O state of one document while it is
//! loaded or saved: its logical and physical names, the streams read from
//! and written to, the container storage, the document lock, the internal
//! backup and the temp file staging a save.
//!
//! Operations never return boundary errors for expected failures. They
//! record a sticky [`ErrorCode`] and return a sentinel; callers check
//! [`Medium::error_code`] after each step.
//!
//! The behaviour is split across facets:
//!
//! - `streams`: stream acquisition, temp files and the close protocol
//! - `storage`: container storage acquisition and version extraction
//! - `lock`: the document lock protocol and file date checks
//! - `backup`: internal and explicit backups
//! - `transfer`: commit and the final transfer to the target
//! - `versions`: the stored revision list
//! - `signature`: document signing

mod backup;
mod lock;
mod signature;
mod storage;
mod streams;
mod transfer;
mod versions;

pub use lock::LockUiStatus;
pub use signature::{DigestSigner, DocumentSigner, SignatureState};
pub use versions::RevisionTag;

use crate::context::MediumContext;
use crate::descriptor::{MediaDescriptor, MediaHandles};
use crate::error::{CoreError, CoreResult, ErrorCode};
use crate::filter::Filter;
use crate::interaction::{ApprovalRequest, InteractionHandler, Outcome};
use crate::open_mode::OpenMode;
use crate::temp::TempFile;
use chrono::{DateTime, Utc};
use docmedium_storage::{Content, DocUrl, Storage};
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use streams::StreamSet;

const LOG_CAPACITY: usize = 64;

const REMOTE_SCHEMES: &[&str] = &[
    "ftp", "http", "https", "webdav", "webdavs", "pop3", "imap", "news", "vim",
];

pub(crate) fn parse_url(text: &str) -> Option<DocUrl> {
    DocUrl::parse(text)
}

/// One document's I/O state during a load or save.
pub struct Medium {
    ctx: MediumContext,
    descriptor: MediaDescriptor,
    handles: MediaHandles,
    filter: Option<Arc<Filter>>,
    orig_filter: Option<Arc<Filter>>,
    open_mode: OpenMode,
    error: ErrorCode,
    log: VecDeque<String>,

    logical_name: Option<DocUrl>,
    orig_url: Option<DocUrl>,
    physical_name: Option<PathBuf>,
    temp_file: Option<TempFile>,
    salvage_copy: Option<TempFile>,
    is_temp: bool,

    io: StreamSet,

    storage: Option<Box<dyn Storage>>,
    zip_storage: Option<Box<dyn Storage>>,
    storage_based_on_stream: bool,
    tried_storage: bool,
    is_storage: bool,
    dispose_storage: bool,
    last_storage_error: ErrorCode,

    locked: bool,
    originally_read_only: bool,
    salvage_mode: bool,
    remote: bool,
    use_interaction: bool,
    allow_default_interaction: bool,
    in_check_in: bool,

    backup_url: Option<DocUrl>,
    remove_backup: bool,

    versions: Vec<RevisionTag>,
    versions_loaded: bool,

    document_signature: SignatureState,
    scripting_signature: SignatureState,

    init_date: Option<DateTime<Utc>>,
    got_init_date: bool,
}

impl Medium {
    fn blank(ctx: MediumContext, descriptor: MediaDescriptor, handles: MediaHandles) -> Self {
        Self {
            ctx,
            descriptor,
            handles,
            filter: None,
            orig_filter: None,
            open_mode: OpenMode::default(),
            error: ErrorCode::None,
            log: VecDeque::new(),
            logical_name: None,
            orig_url: None,
            physical_name: None,
            temp_file: None,
            salvage_copy: None,
            is_temp: false,
            io: StreamSet::default(),
            storage: None,
            zip_storage: None,
            storage_based_on_stream: false,
            tried_storage: false,
            is_storage: false,
            dispose_storage: false,
            last_storage_error: ErrorCode::None,
            locked: false,
            originally_read_only: false,
            salvage_mode: false,
            remote: false,
            use_interaction: true,
            allow_default_interaction: true,
            in_check_in: false,
            backup_url: None,
            remove_backup: false,
            versions: Vec::new(),
            versions_loaded: false,
            document_signature: SignatureState::Unknown,
            scripting_signature: SignatureState::Unknown,
            init_date: None,
            got_init_date: false,
        }
    }

    /// Creates a medium for `url` with default arguments.
    #[must_use]
    pub fn open(ctx: MediumContext, url: &str, mode: OpenMode) -> Self {
        Self::open_with(
            ctx,
            url,
            mode,
            None,
            MediaDescriptor::default(),
            MediaHandles::default(),
        )
    }

    /// Creates a medium for `url`.
    ///
    /// Nothing is opened yet; streams, storage and locks are acquired on
    /// demand.
    #[must_use]
    pub fn open_with(
        ctx: MediumContext,
        url: &str,
        mode: OpenMode,
        filter: Option<Arc<Filter>>,
        descriptor: MediaDescriptor,
        handles: MediaHandles,
    ) -> Self {
        let mut medium = Self::blank(ctx, descriptor, handles);
        medium.open_mode = mode;
        medium.filter = filter;
        medium.logical_name = parse_url(url);
        if medium.logical_name.is_none() && !url.is_empty() {
            tracing::warn!(url, "unparsable document URL");
        }
        medium.init();
        medium
    }

    /// Creates a medium from descriptor properties.
    ///
    /// The filter is looked up by `FilterName`. A non-empty `SalvagedFile`
    /// makes the medium read from a temp copy of `FileName` while naming the
    /// salvaged document.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::MissingFileName`] without `FileName`, and with
    /// [`CoreError::InvalidDescriptor`] if it cannot be parsed.
    pub fn from_descriptor(
        ctx: MediumContext,
        mut descriptor: MediaDescriptor,
        mut handles: MediaHandles,
    ) -> CoreResult<Self> {
        let filter = descriptor
            .filter_name
            .as_deref()
            .and_then(|name| ctx.filters.get(name));

        let mut salvage_copy = None;
        if descriptor.salvaged_file.as_deref().is_some_and(|s| !s.is_empty()) {
            let file_name = descriptor
                .file_name
                .clone()
                .ok_or(CoreError::MissingFileName)?;
            let source = parse_url(&file_name).ok_or_else(|| {
                CoreError::invalid_descriptor(format!("unparsable FileName {file_name}"))
            })?;
            match Self::create_temp_copy_with_ext(&ctx, &source) {
                Some(copy) => {
                    descriptor.file_name = Some(copy.url().to_string());
                    handles.stream = None;
                    handles.input_stream = None;
                    salvage_copy = Some(copy);
                }
                None => tracing::warn!(%source, "can not copy the salvaged file"),
            }
        }

        let read_only = descriptor.read_only == Some(true);
        let file_name = descriptor
            .file_name
            .clone()
            .ok_or(CoreError::MissingFileName)?;
        let logical = parse_url(&file_name).ok_or_else(|| {
            CoreError::invalid_descriptor(format!("unparsable FileName {file_name}"))
        })?;

        let mut medium = Self::blank(ctx, descriptor, handles);
        medium.filter = filter;
        medium.salvage_copy = salvage_copy;
        medium.originally_read_only = read_only;
        medium.open_mode = if read_only {
            OpenMode::READ
        } else {
            OpenMode::READWRITE
        };
        medium.logical_name = Some(logical);
        medium.init();
        Ok(medium)
    }

    /// Wraps an already open storage.
    ///
    /// The medium does not dispose the storage; [`Medium::take_storage`]
    /// hands it back.
    #[must_use]
    pub fn with_storage(
        ctx: MediumContext,
        storage: Box<dyn Storage>,
        base_url: &str,
        filter: Option<Arc<Filter>>,
        descriptor: MediaDescriptor,
    ) -> Self {
        let mut medium = Self::blank(ctx, descriptor, MediaHandles::default());
        medium.filter = filter;
        medium.init();
        medium.storage = Some(storage);
        medium.dispose_storage = false;
        medium.descriptor.base_url = Some(base_url.to_string());
        medium
    }

    fn init(&mut self) {
        self.dispose_storage = false;
        if self.descriptor.salvaged_file.as_deref() == Some("") {
            self.descriptor.salvaged_file = None;
        }

        if let Some(url) = self.logical_name.take() {
            let url = match url.fragment() {
                Some(mark) => {
                    self.descriptor.jump_mark = Some(mark.to_string());
                    url.without_fragment()
                }
                None => url,
            };
            if self.physical_name.is_none() {
                self.physical_name = url.to_path();
            }
            self.logical_name = Some(url);
        }

        if let Some(salvage) = self.descriptor.salvaged_file.as_deref().and_then(parse_url) {
            self.logical_name = Some(salvage);
            self.salvage_mode = true;
        }

        if self.handles.output_stream.is_some()
            && !self
                .logical_name
                .as_ref()
                .is_some_and(DocUrl::is_private_stream)
        {
            tracing::warn!("output stream ignored for a medium not named private:stream");
            self.handles.output_stream = None;
        }

        if self.descriptor.file_name.is_none() {
            self.descriptor.file_name = self.logical_name.as_ref().map(ToString::to_string);
        }

        self.set_is_remote();
    }

    fn set_is_remote(&mut self) {
        self.remote = self.logical_name.as_ref().is_some_and(|url| {
            REMOTE_SCHEMES.contains(&url.scheme()) || url.as_str().starts_with("private:msgid")
        });
        if self.remote {
            self.open_mode = self.open_mode.with_read();
        }
    }

    /// Renames the medium.
    ///
    /// The first rename remembers the previous name as the original URL;
    /// `set_orig` overrides it with the new one.
    pub fn set_name(&mut self, url: &DocUrl, set_orig: bool) {
        if self.orig_url.is_none() {
            self.orig_url = self.logical_name.clone();
        }
        if set_orig {
            self.orig_url = Some(url.clone());
        }
        self.logical_name = Some(url.clone());
        self.init();
    }

    /// The logical (nominal) document URL.
    #[must_use]
    pub fn name(&self) -> Option<&DocUrl> {
        self.logical_name.as_ref()
    }

    /// The URL the medium was first created for.
    #[must_use]
    pub fn orig_url(&self) -> Option<&DocUrl> {
        self.orig_url.as_ref().or(self.logical_name.as_ref())
    }

    /// The file currently read and written, without acquiring one.
    #[must_use]
    pub fn current_physical_name(&self) -> Option<&Path> {
        self.physical_name.as_deref()
    }

    /// The file currently read and written.
    ///
    /// Documents without a local file (remote or stream-based) are staged
    /// into a temp file first.
    pub fn physical_name(&mut self) -> Option<PathBuf> {
        if self.physical_name.is_none() && self.logical_name.is_some() {
            self.create_file_stream();
        }
        self.physical_name.clone()
    }

    /// Base URL for relative links.
    ///
    /// When saving, relative links are only kept where the configuration
    /// allows it.
    #[must_use]
    pub fn base_url(&self, for_saving: bool) -> Option<String> {
        let base = self.descriptor.base_url.clone().or_else(|| {
            self.content()
                .and(self.logical_name.as_ref())
                .map(ToString::to_string)
        });
        if for_saving {
            let config = &self.ctx.config;
            if (self.remote && !config.save_relative_inet)
                || (!self.remote && !config.save_relative_fs)
            {
                return None;
            }
        }
        base
    }

    /// The current filter.
    #[must_use]
    pub fn filter(&self) -> Option<&Arc<Filter>> {
        self.filter.as_ref()
    }

    /// Replaces the current filter.
    pub fn set_filter(&mut self, filter: Option<Arc<Filter>>) {
        self.filter = filter;
    }

    /// The filter the document was loaded with.
    ///
    /// Without `not_current` the current filter stands in when none was
    /// recorded.
    #[must_use]
    pub fn orig_filter(&self, not_current: bool) -> Option<&Arc<Filter>> {
        if self.orig_filter.is_some() || not_current {
            self.orig_filter.as_ref()
        } else {
            self.filter.as_ref()
        }
    }

    /// Records the load filter.
    pub fn set_orig_filter(&mut self, filter: Option<Arc<Filter>>) {
        self.orig_filter = filter;
    }

    fn filter_media_type(&self) -> Option<String> {
        self.filter
            .as_ref()
            .and_then(|f| f.media_type.clone())
            .or_else(|| self.descriptor.media_type.clone())
    }

    /// The open mode.
    #[must_use]
    pub fn open_mode(&self) -> OpenMode {
        self.open_mode
    }

    /// Changes the open mode, closing storage and streams unless `dont_close`.
    pub fn set_open_mode(&mut self, mode: OpenMode, dont_close: bool) {
        if self.open_mode != mode {
            self.open_mode = mode;
            if !dont_close {
                if self.storage.is_some() {
                    self.close_storage();
                }
                self.close_streams();
            }
        }
    }

    /// Whether the document lives on a remote server.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Whether the document must not be written.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.filter.as_ref().is_some_and(|f| f.open_read_only)
            || !self.open_mode.write
            || self.descriptor.read_only == Some(true)
    }

    /// Whether the file itself refused writes when the document was opened.
    #[must_use]
    pub fn is_originally_read_only(&self) -> bool {
        self.originally_read_only
    }

    /// Overrides the originally read-only flag.
    pub fn set_originally_read_only(&mut self, value: bool) {
        self.originally_read_only = value;
    }

    /// Whether this is a preview load.
    #[must_use]
    pub fn is_preview(&self) -> bool {
        match self.descriptor.preview {
            Some(preview) => preview,
            None => self
                .descriptor
                .filter_options
                .as_deref()
                .is_some_and(|o| o.to_uppercase().contains('B')),
        }
    }

    /// Whether this medium holds the document lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Whether the medium reads from a salvaged copy.
    #[must_use]
    pub fn is_salvage(&self) -> bool {
        self.salvage_mode
    }

    /// Whether a temp file currently stages the document.
    #[must_use]
    pub fn has_temp_file(&self) -> bool {
        self.temp_file.is_some()
    }

    /// The descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &MediaDescriptor {
        &self.descriptor
    }

    /// Mutable descriptor access.
    pub fn descriptor_mut(&mut self) -> &mut MediaDescriptor {
        &mut self.descriptor
    }

    /// Mutable handle access.
    pub fn handles_mut(&mut self) -> &mut MediaHandles {
        &mut self.handles
    }

    /// The context the medium was created with.
    #[must_use]
    pub fn context(&self) -> &MediumContext {
        &self.ctx
    }

    /// Sets whether check-in replaces plain copies on remote transfers.
    pub fn set_in_check_in(&mut self, value: bool) {
        self.in_check_in = value;
    }

    /// Whether the next remote transfer is a check-in.
    #[must_use]
    pub fn is_in_check_in(&self) -> bool {
        self.in_check_in
    }

    /// The sticky error code.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        self.error
    }

    /// Sets the error code, replacing any previous one.
    pub fn set_error(&mut self, code: ErrorCode) {
        self.error = code;
    }

    /// Clears the error code.
    pub fn reset_error(&mut self) {
        self.error = ErrorCode::None;
    }

    fn fail(&mut self, code: ErrorCode, context: &str) {
        tracing::warn!(%code, context, url = ?self.logical_name.as_ref().map(DocUrl::as_str), "medium error");
        self.add_log(format!("{context}: {code}"));
        self.error = code;
    }

    /// Error recorded by the last failed storage creation.
    #[must_use]
    pub fn last_storage_creation_state(&self) -> ErrorCode {
        self.last_storage_error
    }

    /// Appends a line to the medium log.
    pub fn add_log(&mut self, message: impl Into<String>) {
        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log
            .push_back(format!("{} {}", Utc::now().format("%H:%M:%S%.3f"), message.into()));
    }

    /// Notable events in order, oldest first.
    pub fn log_lines(&self) -> impl Iterator<Item = &str> {
        self.log.iter().map(String::as_str)
    }

    /// Enables or disables the context's default interaction handler.
    pub fn use_interaction_handler(&mut self, allow_default: bool) {
        self.allow_default_interaction = allow_default;
    }

    /// The handler interaction requests go to, if any.
    #[must_use]
    pub fn interaction_handler(&self) -> Option<Arc<dyn InteractionHandler>> {
        if !self.use_interaction {
            return None;
        }
        if let Some(handler) = &self.handles.interaction {
            return Some(Arc::clone(handler));
        }
        if !self.allow_default_interaction {
            return None;
        }
        self.ctx.default_interaction.clone()
    }

    /// Asks `handler` a yes/no question; true only on approval.
    pub fn call_approve_handler(handler: &dyn InteractionHandler, message: &str, allow_abort: bool) -> bool {
        let request = ApprovalRequest {
            message: message.to_string(),
            allow_abort,
        };
        handler.approve(&request) == Outcome::Approve
    }

    /// URL the content handle addresses: the physical file, else the logical name.
    fn content_url(&self) -> Option<DocUrl> {
        match &self.physical_name {
            Some(path) => Some(DocUrl::from_path(path)),
            None => self.logical_name.clone(),
        }
    }

    /// Content handle of the current document, if a provider serves it.
    #[must_use]
    pub fn content(&self) -> Option<Content> {
        let url = self.content_url()?;
        self.ctx.content.content(&url).ok()
    }

    /// Closes storage and streams and releases the lock.
    pub fn close(&mut self) {
        if self.storage.is_some() {
            self.close_storage();
        }
        self.close_streams();
        self.unlock_file(false);
    }

    /// Like [`Medium::close`] but also lets go of the raw stream handles.
    pub fn close_and_release(&mut self) {
        if self.storage.is_some() {
            self.close_storage();
        }
        self.close_and_release_streams();
        self.unlock_file(true);
    }
}

impl Drop for Medium {
    fn drop(&mut self) {
        self.clear_backup();
        self.close();
        if self.is_temp {
            if let Some(path) = &self.physical_name {
                if let Err(e) = std::fs::remove_file(path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(path = %path.display(), error = %e, "can not remove temp document");
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Medium")
            .field("logical_name", &self.logical_name.as_ref().map(DocUrl::as_str))
            .field("physical_name", &self.physical_name)
            .field("open_mode", &self.open_mode)
            .field("error", &self.error)
            .field("locked", &self.locked)
            .field("temp_file", &self.temp_file)
            .field("storage", &self.storage.is_some())
            .field("backup_url", &self.backup_url.as_ref().map(DocUrl::as_str))
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::context;
    use super::*;
    use crate::filter::FilterRegistry;
    use tempfile::tempdir;

    #[test]
    fn init_splits_jump_mark_and_sets_physical_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.odt");
        let url = format!("{}#Chapter2", DocUrl::from_path(&path));
        let medium = Medium::open(context(dir.path()), &url, OpenMode::READ);

        assert_eq!(medium.descriptor().jump_mark.as_deref(), Some("Chapter2"));
        assert_eq!(medium.name().unwrap().fragment(), None);
        assert_eq!(medium.current_physical_name(), Some(path.as_path()));
        assert_eq!(
            medium.descriptor().file_name.as_deref(),
            Some(DocUrl::from_path(&path).as_str())
        );
        assert!(!medium.is_remote());
    }

    #[test]
    fn remote_schemes_force_read() {
        let dir = tempdir().unwrap();
        let medium = Medium::open(
            context(dir.path()),
            "https://example.org/doc.odt",
            OpenMode::WRITE_TRUNCATE,
        );
        assert!(medium.is_remote());
        assert!(medium.open_mode().read);
        assert!(medium.current_physical_name().is_none());
    }

    #[test]
    fn read_only_sources() {
        let dir = tempdir().unwrap();
        let url = DocUrl::from_path(&dir.path().join("a.pdf")).to_string();
        let ctx = context(dir.path()).with_filters(
            FilterRegistry::new().with(Filter::new("pdf", Some("application/pdf")).read_only()),
        );

        let writable = Medium::open(ctx.clone(), &url, OpenMode::READWRITE);
        assert!(!writable.is_read_only());

        let by_filter = Medium::open_with(
            ctx.clone(),
            &url,
            OpenMode::READWRITE,
            ctx.filters.get("pdf"),
            MediaDescriptor::default(),
            MediaHandles::default(),
        );
        assert!(by_filter.is_read_only());

        let mut by_descriptor = Medium::open(ctx, &url, OpenMode::READWRITE);
        by_descriptor.descriptor_mut().read_only = Some(true);
        assert!(by_descriptor.is_read_only());
    }

    #[test]
    fn from_descriptor_requires_file_name() {
        let dir = tempdir().unwrap();
        let err = Medium::from_descriptor(
            context(dir.path()),
            MediaDescriptor::default(),
            MediaHandles::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::MissingFileName));
    }

    #[test]
    fn from_descriptor_read_only_and_filter() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path())
            .with_filters(FilterRegistry::new().with(Filter::new("writer8", None)));
        let mut descriptor = MediaDescriptor::for_file(dir.path().join("a.odt").to_str().unwrap());
        descriptor.read_only = Some(true);
        descriptor.filter_name = Some("writer8".into());

        let medium = Medium::from_descriptor(ctx, descriptor, MediaHandles::default()).unwrap();
        assert!(medium.is_originally_read_only());
        assert_eq!(medium.open_mode(), OpenMode::READ);
        assert_eq!(medium.filter().unwrap().name, "writer8");
    }

    #[test]
    fn salvage_reads_a_copy_under_the_salvaged_name() {
        let dir = tempdir().unwrap();
        let recovered = dir.path().join("recovered.odt");
        std::fs::write(&recovered, b"recovered bytes").unwrap();
        let original = DocUrl::from_path(&dir.path().join("original.odt"));

        let mut descriptor = MediaDescriptor::for_file(DocUrl::from_path(&recovered).as_str());
        descriptor.salvaged_file = Some(original.to_string());
        let medium =
            Medium::from_descriptor(context(dir.path()), descriptor, MediaHandles::default())
                .unwrap();

        assert!(medium.is_salvage());
        assert_eq!(medium.name(), Some(&original));
        let physical = medium.current_physical_name().unwrap().to_path_buf();
        assert_ne!(physical, recovered);
        assert_eq!(physical.extension().unwrap(), "odt");
        assert_eq!(std::fs::read(&physical).unwrap(), b"recovered bytes");

        drop(medium);
        assert!(!physical.exists());
        assert!(recovered.exists());
    }

    #[test]
    fn set_name_remembers_original() {
        let dir = tempdir().unwrap();
        let first = DocUrl::from_path(&dir.path().join("a.odt"));
        let second = DocUrl::from_path(&dir.path().join("b.odt"));
        let mut medium = Medium::open(context(dir.path()), first.as_str(), OpenMode::READ);
        medium.set_name(&second, false);
        assert_eq!(medium.name(), Some(&second));
        assert_eq!(medium.orig_url(), Some(&first));
    }

    #[test]
    fn base_url_respects_save_policy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.odt");
        std::fs::write(&path, b"x").unwrap();
        let url = DocUrl::from_path(&path);
        let medium = Medium::open(context(dir.path()), url.as_str(), OpenMode::READ);
        assert_eq!(medium.base_url(false).as_deref(), Some(url.as_str()));
        assert_eq!(medium.base_url(true).as_deref(), Some(url.as_str()));

        let remote = Medium::open(context(dir.path()), "https://h/a.odt", OpenMode::READ);
        assert_eq!(remote.base_url(true), None);
    }

    #[test]
    fn preview_from_filter_options() {
        let dir = tempdir().unwrap();
        let mut medium = Medium::open(context(dir.path()), "file:///x.odt", OpenMode::READ);
        assert!(!medium.is_preview());
        medium.descriptor_mut().filter_options = Some("b".into());
        assert!(medium.is_preview());
        medium.descriptor_mut().preview = Some(false);
        assert!(!medium.is_preview());
    }

    #[test]
    fn log_is_bounded() {
        let dir = tempdir().unwrap();
        let mut medium = Medium::open(context(dir.path()), "file:///x.odt", OpenMode::READ);
        for i in 0..100 {
            medium.add_log(format!("event {i}"));
        }
        let lines: Vec<_> = medium.log_lines().collect();
        assert_eq!(lines.len(), LOG_CAPACITY);
        assert!(lines[0].ends_with("event 36"));
        assert!(lines[LOG_CAPACITY - 1].ends_with("event 99"));
    }

    #[test]
    fn output_stream_only_for_private_stream() {
        let dir = tempdir().unwrap();
        let plain = Medium::open_with(
            context(dir.path()),
            "file:///x.odt",
            OpenMode::READWRITE,
            None,
            MediaDescriptor::default(),
            MediaHandles::new().with_output_stream(Box::new(Vec::new())),
        );
        assert!(plain.handles.output_stream.is_none());

        let private = Medium::open_with(
            context(dir.path()),
            "private:stream",
            OpenMode::READWRITE,
            None,
            MediaDescriptor::default(),
            MediaHandles::new().with_output_stream(Box::new(Vec::new())),
        );
        assert!(private.handles.output_stream.is_some());
    }
}
