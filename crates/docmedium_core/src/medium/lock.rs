//! The document lock protocol.
//!
//! Write access to a local or lock-suitable remote document is guarded by
//! two mechanisms: an exclusive system lock on a read-write handle of the
//! original file, and a lock-file record next to the document. A record
//! left behind by this installation (after a crash) is taken over
//! silently. Foreign records go to the interaction handler, or make the
//! document read-only when nobody can be asked.

use super::streams::RwSlot;
use super::Medium;
use crate::error::{CoreError, ErrorCode};
use crate::interaction::{LockConflict, Outcome};
use crate::lockfile::{LockEntry, LockFile};
use chrono::{DateTime, Utc};
use docmedium_storage::{DocUrl, IoErrorCode};

/// Upper bound on "try again" rounds of the locked-document dialog.
const MAX_LOCK_ATTEMPTS: usize = 8;

/// Result of [`Medium::show_locked_document_dialog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockUiStatus {
    /// No lock was taken.
    NoLock,
    /// The user took over the lock.
    Succeeded,
    /// The user asked to try again.
    Try,
}

impl Medium {
    pub(crate) fn system_locking_used(&self) -> bool {
        let policy = &self.ctx.config.locking;
        policy.locking_enabled && policy.use_system_file_locking
    }

    fn logical_is_local(&self) -> bool {
        self.logical_name.as_ref().is_some_and(DocUrl::is_local)
    }

    fn lock_file(&self) -> Option<LockFile> {
        LockFile::for_document(self.logical_name.as_ref()?, self.ctx.content.clone())
    }

    fn document_title(&self) -> String {
        self.logical_name
            .as_ref()
            .map(DocUrl::last_segment)
            .unwrap_or_default()
    }

    /// Locks the document for editing if the configuration asks for it.
    ///
    /// On load an unresolved conflict makes the document read-only without
    /// an error, unless read-write access was requested explicitly. On save
    /// it sets [`ErrorCode::AccessDenied`]. An aborted dialog sets
    /// [`ErrorCode::Aborted`].
    pub fn lock_orig_file_on_demand(&mut self, loading: bool, no_ui: bool) {
        if !self.ctx.config.locking.locking_enabled || self.logical_name.is_none() {
            return;
        }

        let local = self.logical_is_local();
        if self.locked && loading && local {
            // a save cycle may have dropped the system lock
            self.get_locking_stream();
        }

        let mut result = self.locked || (loading && self.descriptor.as_template == Some(true));

        if !result && !self.is_read_only() {
            if loading && local {
                self.get_locking_stream();
            }

            let mut content_read_only = false;
            if loading && self.io.locking.is_none() {
                content_read_only = self
                    .logical_name
                    .as_ref()
                    .and_then(|url| self.ctx.content.content(url).ok())
                    .and_then(|content| content.properties().ok())
                    .is_some_and(|props| props.is_read_only);
                if content_read_only {
                    self.originally_read_only = true;
                }
            }

            if !content_read_only {
                let suitable = self
                    .logical_name
                    .as_ref()
                    .is_some_and(|url| self.ctx.config.is_lock_suitable_scheme(url.scheme()));
                if suitable {
                    if loading {
                        self.get_medium();
                        if self.error.is_error() {
                            return;
                        }
                    }
                    result = self.acquire_lock_file(loading, no_ui);
                    self.locked = result;
                } else {
                    result = true;
                }
            }
        }

        if !result && !self.error.is_error() {
            if !loading || self.descriptor.read_only == Some(false) {
                self.fail(ErrorCode::AccessDenied, "document is locked");
            } else {
                tracing::info!(document = %self.document_title(), "document locked, opening read-only");
                self.add_log("opened read-only because of a lock");
                self.descriptor.read_only = Some(true);
            }
        }

        if result && self.doc_needs_file_date_check() {
            self.init_file_date(true);
        }
    }

    fn acquire_lock_file(&mut self, loading: bool, no_ui: bool) -> bool {
        let Some(lock_file) = self.lock_file() else {
            return false;
        };
        let identity = self.ctx.config.identity.clone();
        let use_system_lock = self.logical_is_local() && self.system_locking_used();
        let legacy = self.ctx.config.locking.use_legacy_lock_file;
        let take_over = |lock_file: &LockFile| {
            if let Err(e) = lock_file.overwrite_own(&identity) {
                tracing::debug!(lock = %lock_file.url(), error = %e, "can not overwrite lock file");
            }
            true
        };

        // the original is held by another process's system lock
        let mut handle_sys_locked =
            loading && use_system_lock && self.io.stream.is_none() && self.io.out_stream.is_none();
        let mut result = false;

        for _ in 0..MAX_LOCK_ATTEMPTS {
            let mut ui_status = LockUiStatus::NoLock;

            if !handle_sys_locked {
                result = match lock_file.create_own(&identity) {
                    Ok(created) => created,
                    Err(e) => {
                        tracing::debug!(lock = %lock_file.url(), error = %e, "lock file not accessible");
                        if use_system_lock || !legacy {
                            take_over(&lock_file)
                        } else if is_invalid_parameter(&e) {
                            self.ask_missing_locking()
                        } else {
                            false
                        }
                    }
                };
                if !result && !legacy {
                    result = take_over(&lock_file);
                }
            }

            if !result {
                let entry = lock_file.read_data().ok();
                let mut own_lock = false;
                if !handle_sys_locked {
                    if let Some(entry) = &entry {
                        own_lock = entry.sys_user_name == identity.sys_user_name;
                        if entry.is_same_installation(&identity) {
                            tracing::info!(lock = %lock_file.url(), "taking over stale lock of this installation");
                            result = true;
                        }
                    }
                }

                if !result && !no_ui {
                    ui_status = self.show_locked_document_dialog(entry.as_ref(), loading, own_lock);
                    if ui_status == LockUiStatus::Succeeded {
                        result = lock_file.overwrite_own(&identity).is_ok();
                    }
                }
                handle_sys_locked = false;
            }

            if result || ui_status != LockUiStatus::Try {
                break;
            }
        }

        if result {
            tracing::debug!(lock = %lock_file.url(), "document locked");
            self.add_log("document locked");
        }
        result
    }

    fn ask_missing_locking(&self) -> bool {
        match self.interaction_handler() {
            Some(handler) => handler.resolve_missing_locking(&self.document_title()) == Outcome::Approve,
            None => false,
        }
    }

    /// Asks what to do about a lock held by `entry`.
    ///
    /// Without a usable handler the answer is "read-only" on load and
    /// [`ErrorCode::AccessDenied`] on save.
    pub fn show_locked_document_dialog(
        &mut self,
        entry: Option<&LockEntry>,
        loading: bool,
        own_lock: bool,
    ) -> LockUiStatus {
        let handler = self
            .interaction_handler()
            .filter(|_| self.ctx.config.lock_interaction_allowed && (loading || own_lock));

        let Some(handler) = handler else {
            if loading {
                self.descriptor.read_only = Some(true);
            } else {
                self.fail(ErrorCode::AccessDenied, "locked document, nobody to ask");
            }
            return LockUiStatus::NoLock;
        };

        let info = match entry {
            Some(entry) if own_lock => entry.edit_time.clone(),
            Some(entry) => {
                let who = if entry.app_user_name.is_empty() {
                    entry.sys_user_name.clone()
                } else {
                    entry.app_user_name.clone()
                };
                if !who.is_empty() && !entry.edit_time.is_empty() {
                    format!("{who} ( {} )", entry.edit_time)
                } else {
                    who
                }
            }
            None => String::new(),
        };
        let conflict = LockConflict {
            document: self.document_title(),
            info,
            own_lock,
            loading,
        };

        match handler.resolve_lock_conflict(&conflict) {
            Outcome::Abort => {
                self.fail(ErrorCode::Aborted, "lock dialog aborted");
                LockUiStatus::NoLock
            }
            Outcome::Disapprove if own_lock => LockUiStatus::Succeeded,
            Outcome::Disapprove => {
                if loading {
                    self.descriptor.as_template = Some(true);
                }
                LockUiStatus::NoLock
            }
            Outcome::Approve if loading => {
                self.descriptor.read_only = Some(true);
                LockUiStatus::NoLock
            }
            Outcome::Approve => LockUiStatus::Try,
        }
    }

    /// Opens the original local file read-write to hold its system lock.
    ///
    /// While the medium still reads the original, the locking stream also
    /// serves as its document stream.
    pub(crate) fn get_locking_stream(&mut self) {
        if !self.logical_is_local() || self.io.locking.is_some() {
            return;
        }

        if let Some(stream) = self.handles.stream.take() {
            self.io.locking = Some(stream);
            if self.io.stream.is_none() {
                self.io.stream = Some(RwSlot::Locking);
            }
            return;
        }

        if self.temp_file.is_none() {
            if let Some(RwSlot::Owned(_)) = &self.io.stream {
                if let Some(RwSlot::Owned(stream)) = self.io.stream.take() {
                    self.io.locking = Some(stream);
                    self.io.stream = Some(RwSlot::Locking);
                }
                return;
            }
        }

        let Some(url) = self.logical_name.clone() else {
            return;
        };
        let opened = self
            .ctx
            .content
            .content(&url)
            .and_then(|content| content.open_read_write(self.system_locking_used()));
        match opened {
            Ok(stream) => {
                self.io.locking = Some(stream);
                if self.temp_file.is_none() && self.io.stream.is_none() {
                    self.io.stream = Some(RwSlot::Locking);
                }
            }
            Err(e) => tracing::debug!(%url, error = %e, "no locking stream"),
        }
    }

    /// Drops the locking stream and removes this installation's lock file.
    ///
    /// Without `release_stream` a locking stream that serves as document
    /// stream stays open as a plain stream.
    pub fn unlock_file(&mut self, release_stream: bool) {
        if let Some(locking) = self.io.locking.take() {
            if matches!(self.io.stream, Some(RwSlot::Locking)) {
                self.io.stream = if release_stream {
                    None
                } else {
                    Some(RwSlot::Owned(locking))
                };
            }
        }

        if self.locked {
            self.locked = false;
            if let Some(lock_file) = self.lock_file() {
                match lock_file.remove(&self.ctx.config.identity, false) {
                    Ok(()) => tracing::debug!(lock = %lock_file.url(), "lock file removed"),
                    Err(e) => tracing::warn!(lock = %lock_file.url(), error = %e, "lock file not removed"),
                }
            }
        }
    }

    /// Whether edits must be checked against concurrent changes on disk.
    #[must_use]
    pub fn doc_needs_file_date_check(&self) -> bool {
        !self.is_read_only() && self.logical_is_local()
    }

    /// Modification date of the document, read once and then cached.
    pub fn init_file_date(&mut self, ignore_old: bool) -> Option<DateTime<Utc>> {
        if ignore_old || !self.got_init_date {
            if let Some(url) = &self.logical_name {
                match self.ctx.content.content(url).and_then(|c| c.properties()) {
                    Ok(props) => {
                        self.init_date = props.date_modified;
                        self.got_init_date = true;
                    }
                    Err(e) => tracing::debug!(%url, error = %e, "no modification date"),
                }
            }
        }
        self.init_date
    }

    /// Compares the current modification date with `init_date`.
    ///
    /// A change is reported to the interaction handler; aborting sets
    /// [`ErrorCode::Aborted`].
    pub fn check_file_date(&mut self, init_date: Option<DateTime<Utc>>) {
        let current = self.init_file_date(true);
        if current.map(|d| d.timestamp()) == init_date.map(|d| d.timestamp()) {
            return;
        }
        tracing::info!(document = %self.document_title(), "document changed on disk");
        if let Some(handler) = self.interaction_handler() {
            if handler.resolve_changed_by_others(&self.document_title(), current) == Outcome::Abort {
                self.fail(ErrorCode::Aborted, "changed by others");
            }
        }
    }
}

fn is_invalid_parameter(error: &CoreError) -> bool {
    matches!(error, CoreError::Content(e) if e.io_code() == Some(IoErrorCode::InvalidParameter))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;
    use crate::config::{Config, LockIdentity, LockingPolicy};
    use crate::context::MediumContext;
    use crate::descriptor::{MediaDescriptor, MediaHandles};
    use crate::interaction::{FixedOutcome, InteractionHandler};
    use crate::open_mode::OpenMode;
    use docmedium_storage::{ContentBroker, ContentProvider, FaultOp, MemoryContentProvider};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct Counting {
        outcome: Outcome,
        calls: AtomicUsize,
    }

    impl Counting {
        fn new(outcome: Outcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl InteractionHandler for Counting {
        fn resolve_lock_conflict(&self, _conflict: &LockConflict) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
        }

        fn resolve_missing_locking(&self, _document: &str) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
        }
    }

    fn document(dir: &Path) -> PathBuf {
        let path = dir.join("doc.odt");
        std::fs::write(&path, b"content").unwrap();
        path
    }

    fn lock_path(doc: &Path) -> PathBuf {
        doc.with_file_name(".~lock.doc.odt#")
    }

    fn foreign_lock(ctx: &MediumContext, doc: &Path) {
        LockFile::for_document(&DocUrl::from_path(doc), ctx.content.clone())
            .unwrap()
            .create_own(&LockIdentity::new("Other", "other", "elsewhere", "file:///other"))
            .unwrap();
    }

    fn with_handler(ctx: MediumContext, doc: &Path, handler: Arc<dyn InteractionHandler>) -> Medium {
        Medium::open_with(
            ctx,
            doc.to_str().unwrap(),
            OpenMode::READWRITE,
            None,
            MediaDescriptor::default(),
            MediaHandles::new().with_interaction(handler),
        )
    }

    const REMOTE_DOC: &str = "sftp://host/docs/doc.odt";

    fn remote_context(dir: &Path, legacy: bool) -> (MediumContext, Arc<MemoryContentProvider>) {
        let provider = Arc::new(MemoryContentProvider::new("sftp"));
        provider.create_folder(&DocUrl::parse("sftp://host/docs").unwrap()).unwrap();
        provider.put(&DocUrl::parse(REMOTE_DOC).unwrap(), b"content".to_vec());
        let mut ctx = context(dir).with_content(ContentBroker::new().with_provider(provider.clone()));
        Arc::make_mut(&mut ctx.config).locking.use_legacy_lock_file = legacy;
        (ctx, provider)
    }

    fn remote_lock(ctx: &MediumContext) -> LockFile {
        LockFile::for_document(&DocUrl::parse(REMOTE_DOC).unwrap(), ctx.content.clone()).unwrap()
    }

    fn open_remote(ctx: MediumContext, handler: Arc<dyn InteractionHandler>) -> Medium {
        Medium::open_with(
            ctx,
            REMOTE_DOC,
            OpenMode::READWRITE,
            None,
            MediaDescriptor::default(),
            MediaHandles::new().with_interaction(handler),
        )
    }

    #[test]
    fn unwritable_lock_file_is_taken_over_without_legacy_locking() {
        let dir = tempdir().unwrap();
        let (ctx, provider) = remote_context(dir.path(), false);
        provider.fail_once(FaultOp::Insert, "doc.odt%23", IoErrorCode::AccessDenied);

        let handler = Counting::new(Outcome::Abort);
        let mut medium = open_remote(ctx.clone(), handler.clone());
        medium.lock_orig_file_on_demand(true, false);

        assert!(medium.is_locked());
        assert_eq!(medium.error_code(), ErrorCode::None);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert!(remote_lock(&ctx).read_data().unwrap().is_same_installation(&ctx.config.identity));
    }

    #[test]
    fn foreign_record_is_overwritten_without_legacy_locking() {
        let dir = tempdir().unwrap();
        let (ctx, _provider) = remote_context(dir.path(), false);
        remote_lock(&ctx)
            .create_own(&LockIdentity::new("Other", "other", "elsewhere", "file:///other"))
            .unwrap();

        let handler = Counting::new(Outcome::Abort);
        let mut medium = open_remote(ctx.clone(), handler.clone());
        medium.lock_orig_file_on_demand(true, false);

        assert!(medium.is_locked());
        assert_eq!(medium.error_code(), ErrorCode::None);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert!(remote_lock(&ctx).read_data().unwrap().is_same_installation(&ctx.config.identity));
    }

    #[test]
    fn missing_lock_support_can_be_accepted() {
        let dir = tempdir().unwrap();
        let (ctx, provider) = remote_context(dir.path(), true);
        provider.fail_once(FaultOp::Insert, "doc.odt%23", IoErrorCode::InvalidParameter);

        let handler = Counting::new(Outcome::Approve);
        let mut medium = open_remote(ctx.clone(), handler.clone());
        medium.lock_orig_file_on_demand(true, false);

        assert!(medium.is_locked());
        assert!(!medium.is_read_only());
        assert_eq!(medium.error_code(), ErrorCode::None);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert!(!remote_lock(&ctx).exists());
    }

    #[test]
    fn missing_lock_support_refused_opens_read_only() {
        let dir = tempdir().unwrap();
        let (ctx, provider) = remote_context(dir.path(), true);
        provider.fail_once(FaultOp::Insert, "doc.odt%23", IoErrorCode::InvalidParameter);

        let handler = Counting::new(Outcome::Abort);
        let mut medium = open_remote(ctx, handler.clone());
        medium.lock_orig_file_on_demand(true, true);

        assert!(!medium.is_locked());
        assert!(medium.is_read_only());
        assert_eq!(medium.error_code(), ErrorCode::None);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn other_lock_file_errors_are_not_asked_about() {
        let dir = tempdir().unwrap();
        let (ctx, provider) = remote_context(dir.path(), true);
        provider.fail_once(FaultOp::Insert, "doc.odt%23", IoErrorCode::AccessDenied);

        let handler = Counting::new(Outcome::Approve);
        let mut medium = open_remote(ctx, handler.clone());
        medium.lock_orig_file_on_demand(true, true);

        assert!(!medium.is_locked());
        assert!(medium.is_read_only());
        assert_eq!(medium.error_code(), ErrorCode::None);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn lock_is_taken_and_released() {
        let dir = tempdir().unwrap();
        let doc = document(dir.path());
        let mut medium = Medium::open(context(dir.path()), doc.to_str().unwrap(), OpenMode::READWRITE);

        medium.lock_orig_file_on_demand(true, true);
        assert_eq!(medium.error_code(), ErrorCode::None);
        assert!(medium.is_locked());
        assert!(!medium.is_read_only());
        assert!(lock_path(&doc).exists());
        assert!(medium.init_file_date(false).is_some());

        medium.close();
        assert!(!medium.is_locked());
        assert!(!lock_path(&doc).exists());
    }

    #[test]
    fn stale_own_lock_is_taken_over_without_prompt() {
        let dir = tempdir().unwrap();
        let doc = document(dir.path());
        let ctx = context(dir.path());
        LockFile::for_document(&DocUrl::from_path(&doc), ctx.content.clone())
            .unwrap()
            .create_own(&ctx.config.identity)
            .unwrap();

        let handler = Counting::new(Outcome::Abort);
        let mut medium = with_handler(ctx, &doc, handler.clone());
        medium.lock_orig_file_on_demand(true, false);

        assert!(medium.is_locked());
        assert_eq!(medium.error_code(), ErrorCode::None);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn locking_twice_is_idempotent() {
        let dir = tempdir().unwrap();
        let doc = document(dir.path());
        let mut medium = Medium::open(context(dir.path()), doc.to_str().unwrap(), OpenMode::READWRITE);
        medium.lock_orig_file_on_demand(true, true);
        medium.lock_orig_file_on_demand(true, true);
        assert!(medium.is_locked());
        assert_eq!(medium.error_code(), ErrorCode::None);
    }

    #[test]
    fn foreign_lock_without_ui_opens_read_only() {
        let dir = tempdir().unwrap();
        let doc = document(dir.path());
        let ctx = context(dir.path());
        foreign_lock(&ctx, &doc);

        let mut medium = Medium::open(ctx, doc.to_str().unwrap(), OpenMode::READWRITE);
        medium.lock_orig_file_on_demand(true, true);
        assert_eq!(medium.error_code(), ErrorCode::None);
        assert!(medium.is_read_only());
        assert!(!medium.is_locked());
        assert!(lock_path(&doc).exists());
    }

    #[test]
    fn foreign_lock_with_explicit_write_request_is_denied() {
        let dir = tempdir().unwrap();
        let doc = document(dir.path());
        let ctx = context(dir.path());
        foreign_lock(&ctx, &doc);

        let mut medium = Medium::open(ctx, doc.to_str().unwrap(), OpenMode::READWRITE);
        medium.descriptor_mut().read_only = Some(false);
        medium.lock_orig_file_on_demand(true, true);
        assert_eq!(medium.error_code(), ErrorCode::AccessDenied);
    }

    #[test]
    fn abort_propagates() {
        let dir = tempdir().unwrap();
        let doc = document(dir.path());
        let ctx = context(dir.path());
        foreign_lock(&ctx, &doc);

        let mut medium = with_handler(ctx, &doc, Arc::new(FixedOutcome(Outcome::Abort)));
        medium.lock_orig_file_on_demand(true, false);
        assert_eq!(medium.error_code(), ErrorCode::Aborted);
        assert!(!medium.is_locked());
    }

    #[test]
    fn disapprove_on_load_opens_a_copy() {
        let dir = tempdir().unwrap();
        let doc = document(dir.path());
        let ctx = context(dir.path());
        foreign_lock(&ctx, &doc);

        let mut medium = with_handler(ctx, &doc, Arc::new(FixedOutcome(Outcome::Disapprove)));
        medium.lock_orig_file_on_demand(true, false);
        assert_eq!(medium.descriptor().as_template, Some(true));
        assert_eq!(medium.error_code(), ErrorCode::None);
    }

    #[test]
    fn retry_on_save_is_bounded() {
        let dir = tempdir().unwrap();
        let doc = document(dir.path());
        let ctx = context(dir.path());
        LockFile::for_document(&DocUrl::from_path(&doc), ctx.content.clone())
            .unwrap()
            .create_own(&LockIdentity::new("Tester", "tester", "otherhost", "file:///profile"))
            .unwrap();

        let handler = Counting::new(Outcome::Approve);
        let mut medium = with_handler(ctx, &doc, handler.clone());
        medium.lock_orig_file_on_demand(false, false);
        assert_eq!(medium.error_code(), ErrorCode::AccessDenied);
        assert_eq!(handler.calls.load(Ordering::SeqCst), MAX_LOCK_ATTEMPTS);
    }

    #[test]
    fn own_lock_from_other_host_can_be_ignored_on_save() {
        let dir = tempdir().unwrap();
        let doc = document(dir.path());
        let ctx = context(dir.path());
        LockFile::for_document(&DocUrl::from_path(&doc), ctx.content.clone())
            .unwrap()
            .create_own(&LockIdentity::new("Tester", "tester", "otherhost", "file:///profile"))
            .unwrap();

        let mut medium = with_handler(ctx.clone(), &doc, Arc::new(FixedOutcome(Outcome::Disapprove)));
        medium.lock_orig_file_on_demand(false, false);
        assert!(medium.is_locked());
        let entry = LockFile::for_document(&DocUrl::from_path(&doc), ctx.content.clone())
            .unwrap()
            .read_data()
            .unwrap();
        assert!(entry.is_same_installation(&ctx.config.identity));
    }

    #[test]
    fn template_loads_need_no_lock() {
        let dir = tempdir().unwrap();
        let doc = document(dir.path());
        let ctx = context(dir.path());
        foreign_lock(&ctx, &doc);

        let mut medium = Medium::open(ctx, doc.to_str().unwrap(), OpenMode::READWRITE);
        medium.descriptor_mut().as_template = Some(true);
        medium.lock_orig_file_on_demand(true, true);
        assert!(!medium.is_read_only());
        assert!(!medium.is_locked());
    }

    #[test]
    fn disabled_locking_does_nothing() {
        let dir = tempdir().unwrap();
        let doc = document(dir.path());
        let mut config = Config::new().temp_dir(dir.path());
        config.locking = LockingPolicy::disabled();
        let mut medium = Medium::open(MediumContext::new(config), doc.to_str().unwrap(), OpenMode::READWRITE);
        medium.lock_orig_file_on_demand(true, true);
        assert!(!medium.is_locked());
        assert!(!lock_path(&doc).exists());
    }

    #[test]
    fn unlock_keeps_document_stream_unless_released() {
        let dir = tempdir().unwrap();
        let doc = document(dir.path());
        let mut medium = Medium::open(context(dir.path()), doc.to_str().unwrap(), OpenMode::READWRITE);
        medium.lock_orig_file_on_demand(true, true);
        assert!(medium.get_stream().is_some());

        medium.unlock_file(false);
        assert!(medium.get_stream().is_some());
        assert!(!lock_path(&doc).exists());

        medium.close_and_release();
        assert!(!medium.is_open());
    }

    #[test]
    fn changed_file_date_can_abort() {
        let dir = tempdir().unwrap();
        let doc = document(dir.path());
        let mut medium = with_handler(context(dir.path()), &doc, Arc::new(FixedOutcome(Outcome::Abort)));
        let initial = medium.init_file_date(false);

        let earlier = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&doc)
            .unwrap()
            .set_modified(earlier)
            .unwrap();

        medium.check_file_date(initial);
        assert_eq!(medium.error_code(), ErrorCode::Aborted);
    }

    #[test]
    fn unchanged_file_date_is_quiet() {
        let dir = tempdir().unwrap();
        let doc = document(dir.path());
        let mut medium = with_handler(context(dir.path()), &doc, Arc::new(FixedOutcome(Outcome::Abort)));
        let initial = medium.init_file_date(false);
        medium.check_file_date(initial);
        assert_eq!(medium.error_code(), ErrorCode::None);
    }
}
