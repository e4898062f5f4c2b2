//! In-memory content provider for tests and remote schemes.

use crate::content::{ContentProperties, ContentProvider, InsertRequest, NameClash, TransferOperation};
use crate::error::{ContentError, ContentResult, IoErrorCode};
use crate::stream::InputStream;
use crate::url::DocUrl;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};

/// Operation a [`ContentFault`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    /// [`ContentProvider::properties`].
    Properties,
    /// [`ContentProvider::open_stream`].
    Read,
    /// [`ContentProvider::write_stream`] and [`ContentProvider::set_size`].
    Write,
    /// [`ContentProvider::insert`].
    Insert,
    /// [`ContentProvider::delete`].
    Delete,
}

/// An injected failure.
#[derive(Debug, Clone)]
pub struct ContentFault {
    /// Operation to fail.
    pub op: FaultOp,
    /// Fails URLs whose text ends with this suffix.
    pub url_suffix: String,
    /// Error to return.
    pub error: ContentError,
    /// Number of failures left; `None` fails forever.
    pub remaining: Option<usize>,
}

#[derive(Debug, Clone)]
enum Entry {
    Document {
        data: Vec<u8>,
        modified: DateTime<Utc>,
        read_only: bool,
        revisions: Vec<Vec<u8>>,
    },
    Folder,
}

/// An in-memory content tree for one scheme.
///
/// Folders are implied by the documents below them, and can also be created
/// explicitly. Check-in keeps the replaced bytes as revisions.
///
/// # Example
///
/// ```rust
/// use docmedium_storage::{ContentProvider, DocUrl, MemoryContentProvider};
///
/// let provider = MemoryContentProvider::new("sftp");
/// let url = DocUrl::parse("sftp://host/doc.odt").unwrap();
/// provider.put(&url, b"data".to_vec());
/// assert_eq!(provider.properties(&url).unwrap().size, 4);
/// ```
#[derive(Debug)]
pub struct MemoryContentProvider {
    scheme: String,
    entries: RwLock<BTreeMap<String, Entry>>,
    faults: Mutex<Vec<ContentFault>>,
}

fn key(url: &DocUrl) -> String {
    url.without_fragment().as_str().trim_end_matches('/').to_string()
}

impl MemoryContentProvider {
    /// Creates an empty provider serving `scheme`.
    #[must_use]
    pub fn new(scheme: &str) -> Self {
        Self {
            scheme: scheme.to_ascii_lowercase(),
            entries: RwLock::new(BTreeMap::new()),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Stores a document, replacing any previous content.
    pub fn put(&self, url: &DocUrl, data: Vec<u8>) {
        self.entries.write().insert(
            key(url),
            Entry::Document {
                data,
                modified: Utc::now(),
                read_only: false,
                revisions: Vec::new(),
            },
        );
    }

    /// Marks a document read-only (or writable again).
    pub fn set_read_only(&self, url: &DocUrl, read_only: bool) {
        if let Some(Entry::Document { read_only: flag, .. }) = self.entries.write().get_mut(&key(url)) {
            *flag = read_only;
        }
    }

    /// Returns a copy of the document bytes.
    #[must_use]
    pub fn data(&self, url: &DocUrl) -> Option<Vec<u8>> {
        match self.entries.read().get(&key(url)) {
            Some(Entry::Document { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Returns the number of checked-in revisions kept for a document.
    #[must_use]
    pub fn revision_count(&self, url: &DocUrl) -> usize {
        match self.entries.read().get(&key(url)) {
            Some(Entry::Document { revisions, .. }) => revisions.len(),
            _ => 0,
        }
    }

    /// Returns true if anything (document or folder) exists at `url`.
    #[must_use]
    pub fn exists(&self, url: &DocUrl) -> bool {
        self.entry_kind(&key(url)).is_some()
    }

    /// Injects a failure.
    pub fn inject(&self, fault: ContentFault) {
        self.faults.lock().push(fault);
    }

    /// Fails `op` on URLs ending with `url_suffix` once with an I/O code.
    pub fn fail_once(&self, op: FaultOp, url_suffix: &str, code: IoErrorCode) {
        self.inject(ContentFault {
            op,
            url_suffix: url_suffix.to_string(),
            error: ContentError::Io {
                code,
                url: url_suffix.to_string(),
                message: "injected fault".to_string(),
            },
            remaining: Some(1),
        });
    }

    fn check_fault(&self, op: FaultOp, url: &DocUrl) -> ContentResult<()> {
        let mut faults = self.faults.lock();
        let text = key(url);
        let Some(index) = faults
            .iter()
            .position(|f| f.op == op && text.ends_with(f.url_suffix.trim_end_matches('/')))
        else {
            return Ok(());
        };
        let error = faults[index].error.clone();
        if let Some(remaining) = faults[index].remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                faults.remove(index);
            }
        }
        Err(error)
    }

    /// `Some(true)` for documents, `Some(false)` for folders.
    fn entry_kind(&self, key: &str) -> Option<bool> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(Entry::Document { .. }) => return Some(true),
            Some(Entry::Folder) => return Some(false),
            None => {}
        }
        let prefix = format!("{key}/");
        let implied = entries.range(prefix.clone()..).next().is_some_and(|(k, _)| k.starts_with(&prefix));
        let is_root = key.ends_with(':') || key.rsplit_once("//").is_some_and(|(_, host)| !host.contains('/'));
        (implied || is_root).then_some(false)
    }

    fn store(&self, url: &DocUrl, bytes: Vec<u8>, check_in: bool) -> ContentResult<()> {
        let mut entries = self.entries.write();
        match entries.get_mut(&key(url)) {
            Some(Entry::Document { data, modified, read_only, revisions }) => {
                if *read_only {
                    return Err(ContentError::io(IoErrorCode::AccessDenied, url, "read-only document"));
                }
                let old = std::mem::replace(data, bytes);
                if check_in {
                    revisions.push(old);
                }
                *modified = Utc::now();
            }
            Some(Entry::Folder) => {
                return Err(ContentError::io(IoErrorCode::AccessDenied, url, "is a folder"));
            }
            None => {
                entries.insert(
                    key(url),
                    Entry::Document {
                        data: bytes,
                        modified: Utc::now(),
                        read_only: false,
                        revisions: Vec::new(),
                    },
                );
            }
        }
        Ok(())
    }
}

impl ContentProvider for MemoryContentProvider {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn properties(&self, url: &DocUrl) -> ContentResult<ContentProperties> {
        self.check_fault(FaultOp::Properties, url)?;
        let k = key(url);
        if let Some(Entry::Document { data, modified, read_only, .. }) = self.entries.read().get(&k) {
            return Ok(ContentProperties {
                title: url.last_segment(),
                size: data.len() as u64,
                date_modified: Some(*modified),
                is_read_only: *read_only,
                is_document: true,
                is_folder: false,
                media_type: None,
            });
        }
        match self.entry_kind(&k) {
            Some(_) => Ok(ContentProperties {
                title: url.last_segment(),
                is_folder: true,
                ..ContentProperties::default()
            }),
            None => Err(ContentError::io(IoErrorCode::NotExisting, url, "no such content")),
        }
    }

    fn open_stream(&self, url: &DocUrl) -> ContentResult<Box<dyn InputStream>> {
        self.check_fault(FaultOp::Read, url)?;
        self.data(url)
            .map(|data| Box::new(Cursor::new(data)) as Box<dyn InputStream>)
            .ok_or_else(|| ContentError::io(IoErrorCode::NotExisting, url, "no such document"))
    }

    fn write_stream(&self, url: &DocUrl, data: &mut dyn Read, replace_existing: bool) -> ContentResult<()> {
        self.check_fault(FaultOp::Write, url)?;
        if !replace_existing && self.exists(url) {
            return Err(ContentError::NameClash(url.to_string()));
        }
        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes)
            .map_err(|e| ContentError::from_io(&e, url))?;
        self.store(url, bytes, false)
    }

    fn set_size(&self, url: &DocUrl, size: u64) -> ContentResult<()> {
        self.check_fault(FaultOp::Write, url)?;
        let mut entries = self.entries.write();
        match entries.get_mut(&key(url)) {
            Some(Entry::Document { data, modified, .. }) => {
                let len = usize::try_from(size).map_err(|_| ContentError::io(IoErrorCode::InvalidParameter, url, "size"))?;
                data.resize(len, 0);
                *modified = Utc::now();
                Ok(())
            }
            _ => Err(ContentError::io(IoErrorCode::NotExisting, url, "no such document")),
        }
    }

    fn insert(
        &self,
        folder: &DocUrl,
        name: &str,
        data: &mut dyn Read,
        request: &InsertRequest,
    ) -> ContentResult<Option<DocUrl>> {
        let mut target = folder.join(name);
        self.check_fault(FaultOp::Insert, &target)?;
        if self.entry_kind(&key(folder)) != Some(false) {
            return Err(ContentError::io(IoErrorCode::NotExisting, folder, "no such folder"));
        }
        let check_in = matches!(request.operation, TransferOperation::CheckIn { .. });
        if self.exists(&target) && !check_in {
            match request.name_clash {
                NameClash::Overwrite => {}
                NameClash::Error => return Err(ContentError::NameClash(target.to_string())),
                NameClash::Rename => {
                    let stem = target.base_name();
                    let ext = target.extension().map(|e| format!(".{e}")).unwrap_or_default();
                    target = (1u32..)
                        .map(|n| folder.join(&format!("{stem}_{n}{ext}")))
                        .find(|candidate| !self.exists(candidate))
                        .unwrap_or(target);
                }
            }
        }
        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes)
            .map_err(|e| ContentError::from_io(&e, &target))?;
        self.store(&target, bytes, check_in)?;
        Ok(check_in.then_some(target))
    }

    fn create_folder(&self, url: &DocUrl) -> ContentResult<()> {
        let k = key(url);
        match self.entry_kind(&k) {
            Some(true) => Err(ContentError::NameClash(url.to_string())),
            Some(false) => Ok(()),
            None => {
                self.entries.write().insert(k, Entry::Folder);
                Ok(())
            }
        }
    }

    fn delete(&self, url: &DocUrl) -> ContentResult<()> {
        self.check_fault(FaultOp::Delete, url)?;
        let k = key(url);
        let prefix = format!("{k}/");
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|name, _| name != &k && !name.starts_with(&prefix));
        if entries.len() == before {
            return Err(ContentError::io(IoErrorCode::NotExisting, url, "no such content"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(text: &str) -> DocUrl {
        DocUrl::parse(text).unwrap()
    }

    #[test]
    fn memory_new_is_empty() {
        let provider = MemoryContentProvider::new("sftp");
        assert!(!provider.exists(&url("sftp://host/doc.odt")));
        assert!(provider.properties(&url("sftp://host/")).unwrap().is_folder);
    }

    #[test]
    fn folders_are_implied_by_documents() {
        let provider = MemoryContentProvider::new("sftp");
        provider.put(&url("sftp://host/a/b/doc.odt"), b"x".to_vec());
        assert!(provider.properties(&url("sftp://host/a/b/")).unwrap().is_folder);
        assert!(provider.properties(&url("sftp://host/a")).unwrap().is_folder);
    }

    #[test]
    fn check_in_keeps_revisions_and_returns_url() {
        let provider = MemoryContentProvider::new("vnd.store");
        let folder = url("vnd.store://repo/docs/");
        provider.create_folder(&folder).unwrap();
        let request = InsertRequest {
            operation: TransferOperation::CheckIn {
                major: true,
                comment: "first".into(),
            },
            name_clash: NameClash::Overwrite,
            media_type: None,
        };
        provider.insert(&folder, "a.odt", &mut Cursor::new(b"v1"), &request).unwrap();
        let new_url = provider
            .insert(&folder, "a.odt", &mut Cursor::new(b"v2"), &request)
            .unwrap()
            .unwrap();
        assert_eq!(new_url, folder.join("a.odt"));
        assert_eq!(provider.data(&new_url).unwrap(), b"v2");
        assert_eq!(provider.revision_count(&new_url), 1);
    }

    #[test]
    fn injected_fault_fires_once() {
        let provider = MemoryContentProvider::new("sftp");
        let doc = url("sftp://host/doc.odt");
        provider.put(&doc, b"x".to_vec());
        provider.fail_once(FaultOp::Read, "doc.odt", IoErrorCode::CantRead);
        assert_eq!(
            provider.open_stream(&doc).err().and_then(|e| e.io_code()),
            Some(IoErrorCode::CantRead)
        );
        assert!(provider.open_stream(&doc).is_ok());
    }

    #[test]
    fn read_only_refuses_writes() {
        let provider = MemoryContentProvider::new("sftp");
        let doc = url("sftp://host/doc.odt");
        provider.put(&doc, b"x".to_vec());
        provider.set_read_only(&doc, true);
        let err = provider
            .write_stream(&doc, &mut Cursor::new(b"y"), true)
            .unwrap_err();
        assert_eq!(err.io_code(), Some(IoErrorCode::AccessDenied));
    }

    #[test]
    fn delete_removes_subtree() {
        let provider = MemoryContentProvider::new("sftp");
        provider.put(&url("sftp://host/a/x"), vec![1]);
        provider.put(&url("sftp://host/a/y"), vec![2]);
        provider.delete(&url("sftp://host/a")).unwrap();
        assert!(!provider.exists(&url("sftp://host/a/x")));
        assert!(provider.delete(&url("sftp://host/a")).is_err());
    }
}
