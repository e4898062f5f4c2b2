//! Content provider for `file:` URLs.

use crate::content::{ContentProperties, ContentProvider, InsertRequest, NameClash, TransferOperation};
use crate::error::{ContentError, ContentResult, IoErrorCode};
use crate::stream::{DocStream, InputStream};
use crate::url::DocUrl;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Serves `file:` URLs from the local file system.
///
/// # Durability
///
/// Whole-document writes end with `sync_all`, so a successful
/// [`ContentProvider::write_stream`] or insert is on disk when it returns.
///
/// # Locking
///
/// [`ContentProvider::open_read_write`] with `exclusive_lock` takes an
/// advisory `fs2` lock held for the lifetime of the returned stream.
#[derive(Debug, Default)]
pub struct LocalFileProvider;

impl LocalFileProvider {
    /// Creates the provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn path(url: &DocUrl) -> ContentResult<PathBuf> {
        url.to_path()
            .ok_or_else(|| ContentError::CreationFailed(url.to_string()))
    }

    fn write_file(path: &Path, url: &DocUrl, data: &mut dyn Read, create_new: bool) -> ContentResult<()> {
        let mut options = OpenOptions::new();
        options.write(true);
        if create_new {
            options.create_new(true);
        } else {
            options.create(true).truncate(true);
        }
        let mut file = options.open(path).map_err(|e| ContentError::from_io(&e, url))?;
        io::copy(data, &mut file).map_err(|e| ContentError::from_io(&e, url))?;
        file.flush().map_err(|e| ContentError::from_io(&e, url))?;
        file.sync_all().map_err(|e| ContentError::from_io(&e, url))?;
        Ok(())
    }

    /// Picks `name`, or `stem_N.ext` for the first free `N`.
    fn free_name(folder: &Path, name: &str) -> String {
        if !folder.join(name).exists() {
            return name.to_string();
        }
        let (stem, ext) = match name.rfind('.') {
            Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
            _ => (name, ""),
        };
        (1u32..)
            .map(|n| format!("{stem}_{n}{ext}"))
            .find(|candidate| !folder.join(candidate).exists())
            .unwrap_or_else(|| name.to_string())
    }
}

impl ContentProvider for LocalFileProvider {
    fn scheme(&self) -> &str {
        "file"
    }

    fn properties(&self, url: &DocUrl) -> ContentResult<ContentProperties> {
        let path = Self::path(url)?;
        let meta = fs::metadata(&path).map_err(|e| ContentError::from_io(&e, url))?;
        Ok(ContentProperties {
            title: url.last_segment(),
            size: if meta.is_file() { meta.len() } else { 0 },
            date_modified: meta.modified().ok().map(DateTime::<Utc>::from),
            is_read_only: meta.permissions().readonly(),
            is_document: meta.is_file(),
            is_folder: meta.is_dir(),
            media_type: None,
        })
    }

    fn open_stream(&self, url: &DocUrl) -> ContentResult<Box<dyn InputStream>> {
        let path = Self::path(url)?;
        let file = File::open(path).map_err(|e| ContentError::from_io(&e, url))?;
        Ok(Box::new(file))
    }

    fn open_read_write(&self, url: &DocUrl, exclusive_lock: bool) -> ContentResult<Box<dyn DocStream>> {
        let path = Self::path(url)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| ContentError::from_io(&e, url))?;
        if exclusive_lock {
            match file.try_lock_exclusive() {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Err(ContentError::io(
                        IoErrorCode::AccessDenied,
                        url,
                        "locked by another process",
                    ));
                }
                Err(e) => {
                    // No lock support on this file system; the handle is still usable.
                    tracing::debug!(%url, error = %e, "system lock unavailable");
                }
            }
        }
        Ok(Box::new(file))
    }

    fn write_stream(&self, url: &DocUrl, data: &mut dyn Read, replace_existing: bool) -> ContentResult<()> {
        let path = Self::path(url)?;
        Self::write_file(&path, url, data, !replace_existing)
    }

    fn set_size(&self, url: &DocUrl, size: u64) -> ContentResult<()> {
        let path = Self::path(url)?;
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| ContentError::from_io(&e, url))?;
        file.set_len(size).map_err(|e| ContentError::from_io(&e, url))
    }

    fn insert(
        &self,
        folder: &DocUrl,
        name: &str,
        data: &mut dyn Read,
        request: &InsertRequest,
    ) -> ContentResult<Option<DocUrl>> {
        if let TransferOperation::CheckIn { .. } = request.operation {
            return Err(ContentError::unsupported("check-in", folder));
        }
        let dir = Self::path(folder)?;
        if !dir.is_dir() {
            return Err(ContentError::io(IoErrorCode::NotExisting, folder, "folder does not exist"));
        }
        let target_name = match request.name_clash {
            NameClash::Rename => Self::free_name(&dir, name),
            NameClash::Overwrite | NameClash::Error => name.to_string(),
        };
        let target = folder.join(&target_name);
        Self::write_file(
            &dir.join(&target_name),
            &target,
            data,
            request.name_clash == NameClash::Error,
        )?;
        Ok(None)
    }

    fn create_folder(&self, url: &DocUrl) -> ContentResult<()> {
        let path = Self::path(url)?;
        fs::create_dir_all(path).map_err(|e| ContentError::from_io(&e, url))
    }

    fn delete(&self, url: &DocUrl) -> ContentResult<()> {
        let path = Self::path(url)?;
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|e| ContentError::from_io(&e, url))
    }

    #[cfg(unix)]
    fn set_writable_for_user_only(&self, url: &DocUrl) -> ContentResult<()> {
        use std::os::unix::fs::PermissionsExt;
        let path = Self::path(url)?;
        let meta = fs::metadata(&path).map_err(|e| ContentError::from_io(&e, url))?;
        let mode = (meta.permissions().mode() & 0o7555) | 0o600;
        fs::set_permissions(&path, fs::Permissions::from_mode(mode))
            .map_err(|e| ContentError::from_io(&e, url))
    }
}
