//! Advisory `.~lock.<name>#` records next to documents.
//!
//! A record is one line of five comma-separated fields terminated by `;`:
//!
//! ```text
//! app user,sys user,host,dd.mm.yyyy hh:mm,user profile url;
//! ```
//!
//! Backslash, comma and semicolon inside a field are escaped with a
//! backslash.

use crate::config::LockIdentity;
use crate::error::{CoreError, CoreResult};
use docmedium_storage::{ContentBroker, DocUrl, InsertRequest, NameClash};
use std::io::{Cursor, Read};

/// One parsed lock record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LockEntry {
    /// Application user name.
    pub app_user_name: String,
    /// Operating-system user name.
    pub sys_user_name: String,
    /// Host name.
    pub host: String,
    /// Time the lock was taken, `dd.mm.yyyy hh:mm` local time.
    pub edit_time: String,
    /// User profile URL.
    pub user_url: String,
}

impl LockEntry {
    /// Creates the record this installation writes now.
    #[must_use]
    pub fn for_identity(identity: &LockIdentity) -> Self {
        Self {
            app_user_name: identity.app_user_name.clone(),
            sys_user_name: identity.sys_user_name.clone(),
            host: identity.host.clone(),
            edit_time: chrono::Local::now().format("%d.%m.%Y %H:%M").to_string(),
            user_url: identity.user_url.clone(),
        }
    }

    /// Returns true if the record was written by `identity`'s installation.
    #[must_use]
    pub fn is_same_installation(&self, identity: &LockIdentity) -> bool {
        self.sys_user_name == identity.sys_user_name
            && self.host == identity.host
            && self.user_url == identity.user_url
    }

    /// Encodes the record.
    #[must_use]
    pub fn encode(&self) -> String {
        let fields = [
            &self.app_user_name,
            &self.sys_user_name,
            &self.host,
            &self.edit_time,
            &self.user_url,
        ];
        let mut out = fields
            .iter()
            .map(|field| escape(field))
            .collect::<Vec<_>>()
            .join(",");
        out.push(';');
        out
    }

    /// Parses a record.
    ///
    /// # Errors
    ///
    /// Fails unless exactly five fields precede the terminating `;`.
    pub fn parse(text: &str) -> CoreResult<Self> {
        let mut fields = Vec::new();
        let mut current = String::new();
        let mut chars = text.chars();
        let mut terminated = false;
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => return Err(CoreError::lock_file_format("dangling escape")),
                },
                ',' => fields.push(std::mem::take(&mut current)),
                ';' => {
                    fields.push(std::mem::take(&mut current));
                    terminated = true;
                    break;
                }
                other => current.push(other),
            }
        }
        if !terminated {
            return Err(CoreError::lock_file_format("missing record terminator"));
        }
        let [app_user_name, sys_user_name, host, edit_time, user_url]: [String; 5] = fields
            .try_into()
            .map_err(|f: Vec<String>| {
                CoreError::lock_file_format(format!("expected 5 fields, found {}", f.len()))
            })?;
        Ok(Self {
            app_user_name,
            sys_user_name,
            host,
            edit_time,
            user_url,
        })
    }
}

fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        if matches!(c, '\\' | ',' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// The lock file belonging to one document.
#[derive(Debug, Clone)]
pub struct LockFile {
    folder: DocUrl,
    name: String,
    url: DocUrl,
    content: ContentBroker,
}

impl LockFile {
    /// Returns the lock file of `document`, or `None` if it has no folder.
    #[must_use]
    pub fn for_document(document: &DocUrl, content: ContentBroker) -> Option<Self> {
        let folder = document.parent()?;
        let name = format!(".~lock.{}#", document.last_segment());
        let url = folder.join(&name);
        Some(Self {
            folder,
            name,
            url,
            content,
        })
    }

    /// URL of the lock file.
    #[must_use]
    pub fn url(&self) -> &DocUrl {
        &self.url
    }

    /// Returns true if the lock file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.content
            .content(&self.url)
            .is_ok_and(|c| c.is_document())
    }

    /// Creates the lock file with this installation's record.
    ///
    /// Returns `Ok(false)` if a lock file already exists.
    ///
    /// # Errors
    ///
    /// Returns other content errors, e.g. when the folder refuses writes.
    pub fn create_own(&self, identity: &LockIdentity) -> CoreResult<bool> {
        let record = LockEntry::for_identity(identity).encode();
        match self.insert(&record, NameClash::Error) {
            Ok(()) => Ok(true),
            Err(CoreError::Content(docmedium_storage::ContentError::NameClash(_))) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Replaces the lock file with this installation's record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    pub fn overwrite_own(&self, identity: &LockIdentity) -> CoreResult<()> {
        let record = LockEntry::for_identity(identity).encode();
        self.insert(&record, NameClash::Overwrite)
    }

    fn insert(&self, record: &str, clash: NameClash) -> CoreResult<()> {
        let mut data = Cursor::new(record.as_bytes());
        self.content
            .content(&self.folder)?
            .insert(&self.name, &mut data, &InsertRequest::copy(clash))?;
        Ok(())
    }

    /// Reads and parses the current record.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, unreadable or malformed.
    pub fn read_data(&self) -> CoreResult<LockEntry> {
        let mut stream = self.content.content(&self.url)?.open_stream()?;
        let mut text = String::new();
        stream.read_to_string(&mut text)?;
        LockEntry::parse(&text)
    }

    /// Deletes the lock file.
    ///
    /// Without `force` the file is only removed if it belongs to `identity`.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::ForeignLock`] on somebody else's lock, or if
    /// the file cannot be read or deleted.
    pub fn remove(&self, identity: &LockIdentity, force: bool) -> CoreResult<()> {
        if !force {
            let entry = self.read_data()?;
            if !entry.is_same_installation(identity) {
                return Err(CoreError::ForeignLock {
                    holder: format!("{}@{}", entry.sys_user_name, entry.host),
                });
            }
        }
        self.content.content(&self.url)?.delete()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmedium_storage::{FaultOp, IoErrorCode, MemoryContentProvider};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn identity(user: &str) -> LockIdentity {
        LockIdentity::new(user, user, "host1", "file:///home/profile")
    }

    #[test]
    fn record_round_trips_with_separators() {
        let entry = LockEntry {
            app_user_name: "Doe, John; Jr.".into(),
            sys_user_name: "jdoe".into(),
            host: "box\\1".into(),
            edit_time: "01.02.2026 10:30".into(),
            user_url: "file:///home/jdoe".into(),
        };
        let encoded = entry.encode();
        assert!(encoded.ends_with(';'));
        assert_eq!(LockEntry::parse(&encoded).unwrap(), entry);
    }

    #[test]
    fn malformed_records_are_rejected() {
        assert!(matches!(
            LockEntry::parse("a,b,c;"),
            Err(CoreError::LockFileFormat { .. })
        ));
        assert!(LockEntry::parse("a,b,c,d,e").is_err());
        assert!(LockEntry::parse("a,b,c,d,e\\").is_err());
    }

    #[test]
    fn create_own_refuses_existing_lock() {
        let dir = tempfile::tempdir().unwrap();
        let doc = DocUrl::from_path(&dir.path().join("report.odt"));
        let lock = LockFile::for_document(&doc, ContentBroker::with_local_files()).unwrap();
        assert!(lock.url().as_str().ends_with(".~lock.report.odt%23"));

        assert!(lock.create_own(&identity("alice")).unwrap());
        assert!(lock.exists());
        assert!(!lock.create_own(&identity("bob")).unwrap());
        assert_eq!(lock.read_data().unwrap().sys_user_name, "alice");

        lock.overwrite_own(&identity("bob")).unwrap();
        assert_eq!(lock.read_data().unwrap().sys_user_name, "bob");
    }

    #[test]
    fn remove_checks_ownership() {
        let dir = tempfile::tempdir().unwrap();
        let doc = DocUrl::from_path(&dir.path().join("report.odt"));
        let lock = LockFile::for_document(&doc, ContentBroker::with_local_files()).unwrap();
        lock.create_own(&identity("alice")).unwrap();

        assert!(matches!(
            lock.remove(&identity("bob"), false),
            Err(CoreError::ForeignLock { .. })
        ));
        assert!(lock.exists());
        lock.remove(&identity("alice"), false).unwrap();
        assert!(!lock.exists());
    }

    #[test]
    fn remote_folder_errors_surface() {
        let remote = Arc::new(MemoryContentProvider::new("sftp"));
        let broker = ContentBroker::new().with_provider(remote.clone());
        let doc = DocUrl::parse("sftp://host/docs/a.odt").unwrap();
        remote.put(&doc, b"x".to_vec());
        remote.fail_once(FaultOp::Insert, "a.odt%23", IoErrorCode::InvalidParameter);

        let lock = LockFile::for_document(&doc, broker).unwrap();
        let err = lock.create_own(&identity("alice")).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Content(ref c) if c.io_code() == Some(IoErrorCode::InvalidParameter)
        ));
        assert!(lock.create_own(&identity("alice")).unwrap());
    }

    proptest! {
        #[test]
        fn any_fields_survive_encoding(
            app in ".{0,12}",
            sys in ".{0,12}",
            host in ".{0,12}",
            url in ".{0,24}",
        ) {
            let entry = LockEntry {
                app_user_name: app,
                sys_user_name: sys,
                host,
                edit_time: "16.10.2026 09:00".into(),
                user_url: url,
            };
            prop_assert_eq!(LockEntry::parse(&entry.encode()).unwrap(), entry);
        }
    }
}
