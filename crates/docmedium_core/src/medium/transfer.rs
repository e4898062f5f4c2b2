//! Commit and the final transfer to the target.
//!
//! A save writes into a temp file (or a storage over it). `commit` makes
//! the storage persistent and `transfer` then moves the temp content to
//! the logical target: into a caller stream, a segmented package, the
//! local file system (backed up and restorable) or a remote folder.

use super::parse_url;
use super::streams::{copy_chunked, InSlot};
use super::Medium;
use crate::descriptor::MediaDescriptor;
use crate::error::ErrorCode;
use crate::open_mode::OpenMode;
use docmedium_storage::{
    CommitOutcome, Content, ContentError, DocStream, DocUrl, ElementModes, InsertRequest,
    NameClash, StorageOpenOptions, StorageResult, StorageSource, TransferOperation,
};
use std::fs::{File, OpenOptions};
use std::io::{SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

enum FsFailure {
    NoBackup,
    Content(ContentError),
}

impl Medium {
    /// Commits pending changes and transfers them to the target.
    ///
    /// Returns true if no error is set afterwards. A successful commit
    /// refreshes the cached file date and clears truncation from the open
    /// mode.
    pub fn commit(&mut self) -> bool {
        if self.storage.is_some() {
            self.storage_commit();
        } else if let Some(out) = self.io.out_stream.as_mut() {
            if let Err(e) = out.flush() {
                tracing::warn!(error = %e, "flushing output stream failed");
                self.fail(ErrorCode::CantWrite, "can not flush output stream");
            }
        } else if self.io.in_stream.is_some() {
            let flushed = if let Some(InSlot::File(file)) = self.io.in_stream.as_mut() {
                file.flush()
            } else {
                self.io.rw().map_or(Ok(()), |stream| stream.flush())
            };
            if let Err(e) = flushed {
                tracing::warn!(error = %e, "flushing document stream failed");
                self.fail(ErrorCode::CantWrite, "can not flush document stream");
            }
        }

        if !self.error.is_error() {
            self.transfer();
        }

        let result = !self.error.is_error();
        if result && self.doc_needs_file_date_check() {
            self.init_file_date(true);
        }
        self.open_mode.truncate = false;
        result
    }

    /// Commits the storage.
    ///
    /// A storage written in place over the original is backed up first. If
    /// the storage had to relocate its content, the original is restored
    /// from that backup, or the medium adopts the relocated file when the
    /// restore fails; either way [`ErrorCode::General`] is set.
    pub fn storage_commit(&mut self) -> bool {
        if self.storage.is_none() || self.error.is_error() {
            return false;
        }

        let in_place = self.storage_based_on_stream && self.io.stream.is_some() && self.temp_file.is_none();
        if in_place && self.backup_url.is_none() {
            self.storage_backup();
            if self.error.is_error() {
                return false;
            }
        }

        let stream = if self.storage_based_on_stream {
            self.io.rw().map(|s| s as &mut dyn DocStream)
        } else {
            None
        };
        let outcome = match self.storage.as_deref_mut() {
            Some(storage) => storage.commit(stream),
            None => return false,
        };

        match outcome {
            Ok(CommitOutcome::Committed) => {
                self.close_zip_storage();
                tracing::debug!("storage committed");
                true
            }
            Ok(CommitOutcome::RelocatedTo(relocated)) => {
                tracing::warn!(relocated = %relocated.display(), "storage commit relocated its content");
                self.add_log(format!("commit relocated to {}", relocated.display()));
                self.handle_relocation(&relocated)
            }
            Err(e) => {
                tracing::warn!(error = %e, "storage commit failed");
                self.fail(ErrorCode::General, "storage commit failed");
                false
            }
        }
    }

    fn handle_relocation(&mut self, relocated: &Path) -> bool {
        if let Some(temp) = self.temp_file.as_ref().map(|t| t.path().to_path_buf()) {
            return match std::fs::rename(relocated, &temp) {
                Ok(()) => {
                    self.close_zip_storage();
                    true
                }
                Err(e) => {
                    tracing::warn!(error = %e, "relocated content can not replace the temp file");
                    self.fail(ErrorCode::General, "storage relocated");
                    false
                }
            };
        }

        let original = self
            .logical_name
            .as_ref()
            .and_then(|url| self.ctx.content.content(url).ok());
        if let (Some(original), true) = (original, self.backup_url.is_some()) {
            self.close_and_release_streams();
            if !self.use_backup_to_restore(&original) {
                tracing::warn!(relocated = %relocated.display(), "medium now reads the relocated content");
                self.physical_name = Some(relocated.to_path_buf());
            }
        }
        if !self.error.is_error() {
            self.fail(ErrorCode::General, "storage relocated");
        }
        false
    }

    /// Moves the temp (or salvaged) content to the logical target.
    ///
    /// Does nothing without temp file or salvage copy, or while an error
    /// is set.
    pub fn transfer(&mut self) {
        let source_path = match &self.temp_file {
            Some(temp) => Some(temp.path().to_path_buf()),
            None if self.logical_name.is_some() && self.salvage_mode => self.physical_name.clone(),
            None => None,
        };
        let Some(source_path) = source_path else {
            return;
        };
        if self.error.is_error() {
            return;
        }
        let Some(target) = self.logical_name.clone() else {
            return;
        };
        tracing::debug!(source = %source_path.display(), %target, "transferring to target");

        if target.is_private_stream() {
            self.transfer_to_output_stream(&source_path);
            return;
        }

        if let Err(e) = self.ctx.content.content(&target) {
            tracing::warn!(%target, error = %e, "target has no content provider");
            self.fail(ErrorCode::NotExists, "no content for target");
            return;
        }

        if let Some(size) = self.descriptor.segment_size {
            self.transfer_segmented(&target, size);
            return;
        }

        let source = DocUrl::from_path(&source_path);
        if target.is_local() || target.parent().is_none() {
            self.transacted_transfer_for_fs(&source, &target);
            if let Some(path) = target.to_path() {
                match OpenOptions::new().write(true).open(&path).and_then(|f| f.sync_all()) {
                    Ok(()) => tracing::debug!(path = %path.display(), "saved file synced"),
                    Err(e) => tracing::debug!(path = %path.display(), error = %e, "saved file not synced"),
                }
            }
        } else {
            self.transfer_to_folder(&source, &target);
        }

        if !self.error.is_error() && self.temp_file.is_none() {
            self.physical_name = target.to_path();
            self.salvage_mode = false;
        }
    }

    fn transfer_to_output_stream(&mut self, source: &Path) {
        let Some(mut out) = self.handles.output_stream.take() else {
            tracing::warn!("private:stream target without output stream");
            self.fail(ErrorCode::General, "missing output stream");
            return;
        };
        if self.storage.is_some() {
            self.close_storage();
        }
        self.close_streams();

        let chunk = self.ctx.config.transfer_chunk_size;
        match File::open(source).and_then(|mut file| copy_chunked(&mut file, &mut out, chunk)) {
            Ok(written) => {
                tracing::debug!(written, "temp content streamed to caller");
                self.temp_file = None;
                self.physical_name = None;
            }
            Err(e) => {
                // the temp file stays armed and goes away with the medium
                tracing::warn!(error = %e, "streaming to caller failed");
                self.fail(ErrorCode::CantWrite, "output stream write failed");
            }
        }
    }

    fn transfer_segmented(&mut self, target: &DocUrl, size: u64) {
        let Some(path) = target.to_path() else {
            tracing::warn!(%target, "segmented packages need a local target");
            self.fail(ErrorCode::General, "segmented target not local");
            return;
        };
        if self.get_storage(false).is_none() {
            tracing::warn!(%target, "segmented save of a document that is not a package");
            self.fail(ErrorCode::General, "segmented save needs a package");
            return;
        }
        let Some(source) = self.storage.as_deref() else {
            return;
        };
        let factory = Arc::clone(&self.ctx.storages);
        let result = (|| -> StorageResult<CommitOutcome> {
            let mut spanned = factory.create(
                StorageSource::Path(&path),
                ElementModes::READWRITE.truncating(),
                &StorageOpenOptions::default(),
            )?;
            spanned.set_segment_size(size)?;
            source.copy_to(spanned.as_mut())?;
            spanned.commit(None)
        })();
        match result {
            Ok(CommitOutcome::Committed) => tracing::debug!(size, "segmented package written"),
            Ok(CommitOutcome::RelocatedTo(relocated)) => {
                tracing::warn!(relocated = %relocated.display(), "segmented package relocated");
                self.fail(ErrorCode::General, "segmented package relocated");
            }
            Err(e) => {
                tracing::warn!(error = %e, "segmented package failed");
                self.fail(ErrorCode::General, "segmented package failed");
            }
        }
    }

    fn name_clash(&self) -> NameClash {
        if self.descriptor.overwrite == Some(false) {
            NameClash::Error
        } else if self.descriptor.rename == Some(true) {
            NameClash::Rename
        } else {
            NameClash::Overwrite
        }
    }

    fn transfer_to_folder(&mut self, source: &DocUrl, target: &DocUrl) {
        let Some(folder) = target.parent() else {
            self.fail(ErrorCode::NotExistsPath, "target has no folder");
            return;
        };
        if let Err(e) = self.ctx.content.content(&folder) {
            tracing::warn!(%folder, error = %e, "no content for target folder");
            self.fail(ErrorCode::from(&e), "target folder unavailable");
            return;
        }

        if self.storage.is_some() {
            self.close_storage();
        }
        self.close_streams();

        let operation = if self.in_check_in {
            TransferOperation::CheckIn {
                major: self.descriptor.doc_info_major == Some(true),
                comment: self.descriptor.doc_info_comments.clone().unwrap_or_default(),
            }
        } else {
            TransferOperation::Copy
        };
        let request = InsertRequest {
            operation,
            name_clash: self.name_clash(),
            media_type: self.filter_media_type(),
        };

        match self.ctx.content.transfer(source, &folder, &target.last_segment(), &request) {
            Ok(Some(checked_in)) => {
                tracing::info!(url = %checked_in, "document checked in");
                self.switch_document_to_file(&checked_in);
            }
            Ok(None) => tracing::debug!(%target, "document transferred"),
            Err(e) => {
                tracing::warn!(%target, error = %e, "transfer failed");
                self.fail(ErrorCode::from(&e), "transfer failed");
            }
        }
    }

    /// Writes `source` over the local document `dest`.
    ///
    /// An existing document is backed up first and restored from the
    /// backup if the write fails. The temp file is disarmed before the
    /// write and deleted after it succeeded.
    pub fn transacted_transfer_for_fs(&mut self, source: &DocUrl, dest: &DocUrl) -> bool {
        let original = match self.ctx.content.content(dest) {
            Ok(content) => content,
            Err(e) => {
                self.fail(ErrorCode::from(&e), "no content for target");
                return false;
            }
        };

        if self.storage.is_some() {
            self.close_storage();
        }
        self.close_streams();

        let temp_content = match self.ctx.content.content(source) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(%source, error = %e, "temp content unavailable");
                self.fail(ErrorCode::CantRead, "can not read temp content");
                return false;
            }
        };

        let rename = self.descriptor.rename == Some(true);
        let overwrite = self.descriptor.overwrite.unwrap_or(!rename);

        if let Some(temp) = self.temp_file.as_mut() {
            temp.enable_killing_file(false);
        }

        let mut transact_started = false;
        let outcome = if overwrite && original.is_document() {
            if self.backup_url.is_none() {
                self.do_internal_backup(dest);
            }
            if self.backup_url.is_some() {
                transact_started = true;
                write_content(&temp_content, &original, true).map_err(FsFailure::Content)
            } else {
                Err(FsFailure::NoBackup)
            }
        } else {
            write_content(&temp_content, &original, overwrite).map_err(FsFailure::Content)
        };

        match outcome {
            Ok(()) => {
                if let Some(temp) = self.temp_file.take() {
                    if let Err(e) = std::fs::remove_file(temp.path()) {
                        tracing::warn!(path = %temp.path().display(), error = %e, "temp file not removed");
                    }
                }
                tracing::info!(target = %dest, "document written");
                self.add_log(format!("written {dest}"));
                true
            }
            Err(failure) => {
                if let Some(temp) = self.temp_file.as_mut() {
                    temp.enable_killing_file(true);
                }
                match failure {
                    FsFailure::NoBackup => {
                        self.fail(ErrorCode::CantCreateBackup, "no backup before overwrite");
                    }
                    FsFailure::Content(e) => {
                        tracing::warn!(target = %dest, error = %e, "writing target failed");
                        self.fail(ErrorCode::from(&e), "writing target failed");
                        if transact_started {
                            self.use_backup_to_restore(&original);
                        }
                    }
                }
                false
            }
        }
    }

    /// Copies the document stream to `url` unchanged.
    ///
    /// Only possible when `target` names the same filter and the same
    /// password (or none) as this medium.
    pub fn try_direct_transfer(&mut self, url: &str, target: &MediaDescriptor) -> bool {
        if self.error.is_error() {
            return false;
        }
        if self.descriptor.password != target.password {
            return false;
        }
        let same_filter = matches!(
            (&self.descriptor.filter_name, &target.filter_name),
            (Some(old), Some(new)) if old == new
        );
        if !same_filter {
            return false;
        }
        let Some(target_url) = parse_url(url) else {
            return false;
        };
        let replace = !(target.overwrite == Some(false) || target.rename == Some(true));

        let content = match self.ctx.content.content(&target_url) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(%target_url, error = %e, "direct transfer target unavailable");
                return false;
            }
        };

        self.get_input_stream();
        self.reset_error();
        let Some(input) = self.io.input() else {
            return false;
        };
        let result = (|| -> Result<(), String> {
            let position = input.stream_position().map_err(|e| e.to_string())?;
            input.seek(SeekFrom::Start(0)).map_err(|e| e.to_string())?;
            let mut reader = &mut *input;
            content
                .write_stream(&mut reader, replace)
                .map_err(|e| e.to_string())?;
            input.seek(SeekFrom::Start(position)).map_err(|e| e.to_string())?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                tracing::debug!(%target_url, "document copied directly");
                true
            }
            Err(e) => {
                tracing::debug!(%target_url, error = %e, "direct transfer failed");
                false
            }
        }
    }

    /// Moves the storage-based document to a fresh temp file with the
    /// same extension.
    ///
    /// Returns the new URL. On failure the medium is pointed back at the
    /// original document.
    pub fn switch_document_to_temp_file(&mut self) -> Option<DocUrl> {
        let original = self.logical_name.clone()?;
        let extension = original.extension();
        let new_path = match self.ctx.temp.create_with_extension(extension.as_deref()) {
            Ok(temp) => temp.keep(),
            Err(e) => {
                tracing::warn!(error = %e, "no temp file to switch to");
                return None;
            }
        };
        let new_url = DocUrl::from_path(&new_path);
        self.get_storage(false)?;
        let mut storage = self.storage.take()?;

        self.can_dispose_storage(false);
        self.close();
        self.set_physical_name(None);
        self.set_name(&new_url, false);

        let was_read_only = self.descriptor.read_only == Some(true);
        self.open_mode = OpenMode::READWRITE;
        self.descriptor.read_only = None;

        if self.reattach(storage.as_mut(), false) {
            self.storage = Some(storage);
            self.storage_based_on_stream = true;
            tracing::info!(url = %new_url, "document switched to temp file");
            return Some(new_url);
        }

        self.close();
        self.set_physical_name(None);
        self.set_name(&original, false);
        if was_read_only {
            self.open_mode = OpenMode::READ;
            self.descriptor.read_only = Some(true);
        }
        self.get_medium();
        self.storage = Some(storage);
        if let Err(e) = std::fs::remove_file(&new_path) {
            tracing::debug!(path = %new_path.display(), error = %e, "unused switch target not removed");
        }
        None
    }

    /// Points the storage-based document at `url`.
    pub fn switch_document_to_file(&mut self, url: &DocUrl) -> bool {
        let Some(original) = self.logical_name.clone() else {
            return false;
        };
        if self.get_storage(false).is_none() {
            return false;
        }
        let Some(mut storage) = self.storage.take() else {
            return false;
        };

        self.can_dispose_storage(false);
        self.close();
        self.set_physical_name(None);
        self.set_name(url, false);

        if self.reattach(storage.as_mut(), true) {
            self.storage = Some(storage);
            self.storage_based_on_stream = true;
            return true;
        }

        self.close();
        self.set_physical_name(None);
        self.set_name(&original, false);
        self.get_medium();
        self.storage = Some(storage);
        false
    }

    /// Opens the renamed document through a fresh temp file and writes
    /// `storage` into its stream.
    fn reattach(&mut self, storage: &mut dyn docmedium_storage::Storage, truncate: bool) -> bool {
        self.get_medium();
        self.lock_orig_file_on_demand(false, false);
        self.create_temp_file(true);
        self.get_medium();

        let Some(stream) = self.io.rw() else {
            return false;
        };
        if truncate {
            if let Err(e) = stream.set_len(0) {
                tracing::warn!(error = %e, "can not truncate document stream");
                return false;
            }
        }
        match storage.attach_to_stream(stream) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "can not attach storage to the new stream");
                false
            }
        }
    }
}

fn write_content(source: &Content, dest: &Content, replace: bool) -> Result<(), ContentError> {
    let mut data = source.open_stream()?;
    dest.write_stream(&mut data, replace)
}
