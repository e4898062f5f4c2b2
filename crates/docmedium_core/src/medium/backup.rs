//! Internal and explicit backups.
//!
//! The internal backup is a throw-away copy of the original taken before
//! it is overwritten in place; it is deleted once the save went through.
//! The explicit `.bak` backup is kept.

use super::Medium;
use crate::error::ErrorCode;
use docmedium_storage::{Content, DocUrl, InsertRequest, NameClash, TransferOperation};
use std::path::Path;

impl Medium {
    /// Takes the internal backup if the medium works on the original file.
    ///
    /// Only local documents read without temp file or salvage copy are
    /// backed up, once. Sets [`ErrorCode::CantCreateBackup`] if no copy
    /// could be made anywhere.
    pub fn storage_backup(&mut self) {
        let Some(original) = self.logical_name.clone() else {
            return;
        };
        let based_on_original = self.temp_file.is_none()
            && !self.salvage_mode
            && original.is_local()
            && self.ctx.content.content(&original).is_ok_and(|c| c.is_document());

        if based_on_original && self.backup_url.is_none() {
            self.do_internal_backup(&original);
            if self.backup_url.is_none() {
                self.fail(ErrorCode::CantCreateBackup, "can not back up the original");
            }
        }
    }

    /// The internal backup, taken on demand.
    pub fn get_backup(&mut self) -> Option<DocUrl> {
        if self.backup_url.is_none() {
            self.storage_backup();
        }
        self.backup_url.clone()
    }

    /// The current backup, internal or explicit.
    #[must_use]
    pub fn backup_url(&self) -> Option<&DocUrl> {
        self.backup_url.as_ref()
    }

    /// Whether [`Medium::clear_backup`] deletes the current backup.
    #[must_use]
    pub fn is_backup_disposable(&self) -> bool {
        self.remove_backup
    }

    /// Copies `original` into the backup directory, or next to the
    /// document when that fails.
    pub(crate) fn do_internal_backup(&mut self, original: &DocUrl) {
        if self.backup_url.is_some() {
            return;
        }
        let prefix = original.base_name();
        let suffix = original.extension().map(|e| format!(".{e}")).unwrap_or_default();

        if let Some(dir) = self.ctx.config.backup_dir.clone() {
            if self.ensure_folder(&DocUrl::from_path(&dir)) {
                self.internal_backup_into(original, &prefix, &suffix, &dir);
            }
        }

        if self.backup_url.is_none() {
            // the configured directory refused the copy, try the document's own folder
            if let Some(dir) = original.parent().and_then(|p| p.to_path()) {
                self.internal_backup_into(original, &prefix, &suffix, &dir);
            }
        }
    }

    fn internal_backup_into(&mut self, original: &DocUrl, prefix: &str, suffix: &str, dir: &Path) {
        let temp = match self.ctx.temp.create_named(prefix, suffix, Some(dir)) {
            Ok(temp) => temp,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "no backup slot");
                return;
            }
        };
        let backup = temp.url();
        let Some(folder) = backup.parent() else {
            return;
        };
        let request = InsertRequest {
            operation: TransferOperation::Copy,
            name_clash: NameClash::Overwrite,
            media_type: self.filter_media_type(),
        };
        match self.ctx.content.transfer(original, &folder, &backup.last_segment(), &request) {
            Ok(_) => {
                let _ = temp.keep();
                tracing::info!(%backup, "internal backup created");
                self.add_log(format!("backup {backup}"));
                self.backup_url = Some(backup);
                self.remove_backup = true;
            }
            Err(e) => tracing::debug!(%backup, error = %e, "backup copy failed"),
        }
    }

    fn ensure_folder(&self, url: &DocUrl) -> bool {
        let result = self.ctx.content.content(url).and_then(|folder| {
            if folder.is_folder() {
                Ok(())
            } else {
                folder.create_folder()
            }
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(%url, error = %e, "backup folder unavailable");
                false
            }
        }
    }

    /// Copies the document to `<name>.bak` in the backup directory.
    ///
    /// The copy survives [`Medium::clear_backup`]. A missing document is
    /// not backed up; any other failure sets
    /// [`ErrorCode::CantCreateBackup`].
    pub fn do_backup(&mut self) {
        let Some(source) = self.logical_name.clone() else {
            return;
        };
        if !self.ctx.content.content(&source).is_ok_and(|c| c.is_document()) {
            return;
        }

        let mut success = false;
        if let Some(dir) = self.ctx.config.backup_dir.clone() {
            let dir_url = DocUrl::from_path(&dir);
            if self.ensure_folder(&dir_url) {
                let name = format!("{}.bak", source.base_name());
                let request = InsertRequest {
                    operation: TransferOperation::Copy,
                    name_clash: NameClash::Overwrite,
                    media_type: self.filter_media_type(),
                };
                match self.ctx.content.transfer(&source, &dir_url, &name, &request) {
                    Ok(_) => {
                        let backup = dir_url.join(&name);
                        tracing::info!(%backup, "backup created");
                        self.backup_url = Some(backup);
                        self.remove_backup = false;
                        success = true;
                    }
                    Err(e) => tracing::warn!(%source, error = %e, "backup failed"),
                }
            }
        }

        if !success {
            self.fail(ErrorCode::CantCreateBackup, "can not create backup");
        }
    }

    /// Forgets the backup, deleting it if it is the internal one.
    ///
    /// An internal backup that cannot be deleted is still remembered.
    pub fn clear_backup(&mut self) {
        if !self.remove_backup {
            self.backup_url = None;
            return;
        }
        let Some(backup) = self.backup_url.clone() else {
            return;
        };
        match self.ctx.content.content(&backup).and_then(|c| c.delete()) {
            Ok(()) => {
                tracing::debug!(%backup, "internal backup removed");
                self.remove_backup = false;
                self.backup_url = None;
            }
            Err(e) => tracing::warn!(%backup, error = %e, "can not remove backup"),
        }
    }

    /// Writes the backup back over `original`.
    ///
    /// On failure the backup is kept on disk and [`ErrorCode::General`] is set.
    pub fn use_backup_to_restore(&mut self, original: &Content) -> bool {
        let result = match &self.backup_url {
            Some(backup) => self
                .ctx
                .content
                .content(backup)
                .and_then(|c| c.open_stream())
                .and_then(|mut data| original.write_stream(&mut data, true))
                .map_err(|e| e.to_string()),
            None => Err("no backup".to_string()),
        };
        match result {
            Ok(()) => {
                tracing::info!(url = %original.url(), "original restored from backup");
                true
            }
            Err(e) => {
                tracing::warn!(url = %original.url(), error = %e, "restoring from backup failed");
                self.remove_backup = false;
                self.error = ErrorCode::General;
                false
            }
        }
    }
}
