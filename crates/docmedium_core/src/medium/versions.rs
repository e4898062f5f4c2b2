//! The stored revision list.
//!
//! Revisions live as complete packages in the `Versions` sub-storage. The
//! list describing them is a JSON array in the root stream
//! `VersionList.json`.

use super::storage::VERSIONS_FOLDER;
use super::Medium;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Root stream holding the revision list.
pub(crate) const VERSION_LIST_STREAM: &str = "VersionList.json";

const IDENTIFIER_PREFIX: &str = "Version";

/// One stored revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RevisionTag {
    /// Name of the revision stream, `Version<N>`.
    pub identifier: String,
    /// Free-form comment.
    pub comment: String,
    /// Who stored the revision.
    pub author: String,
    /// When the revision was stored.
    pub time_stamp: DateTime<Utc>,
}

impl RevisionTag {
    /// Creates a tag stamped now; the identifier is assigned when added.
    #[must_use]
    pub fn new(comment: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            identifier: String::new(),
            comment: comment.into(),
            author: author.into(),
            time_stamp: Utc::now(),
        }
    }

    /// The numeric suffix of the identifier, 0 when there is none.
    #[must_use]
    pub fn number(&self) -> u32 {
        self.identifier
            .strip_prefix(IDENTIFIER_PREFIX)
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }

    /// Path of the revision stream inside the document storage.
    #[must_use]
    pub fn stream_path(&self) -> String {
        format!("{VERSIONS_FOLDER}/{}", self.identifier)
    }
}

/// Lowest suffix not used by `tags`, counting from 1.
fn lowest_free_number(tags: &[RevisionTag]) -> u32 {
    let mut numbers: Vec<u32> = tags.iter().map(RevisionTag::number).collect();
    numbers.sort_unstable();
    numbers.dedup();
    let mut candidate = 1;
    for n in numbers {
        if n == candidate {
            candidate += 1;
        } else if n > candidate {
            break;
        }
    }
    candidate
}

impl Medium {
    /// The stored revisions, loaded from the storage on first use.
    ///
    /// With `no_reload` an already loaded list is returned as is. A
    /// document without storage or list has no revisions.
    pub fn get_version_list(&mut self, no_reload: bool) -> &[RevisionTag] {
        let wanted = (!no_reload || !self.versions_loaded)
            && self.versions.is_empty()
            && self.logical_name.is_some();
        if wanted {
            if self.storage.is_none() {
                self.get_storage(false);
            }
            if let Some(storage) = self.storage.as_deref() {
                match storage.read_stream(VERSION_LIST_STREAM) {
                    Ok(bytes) => match serde_json::from_slice::<Vec<RevisionTag>>(&bytes) {
                        Ok(list) => self.versions = list,
                        Err(e) => tracing::warn!(error = %e, "unreadable revision list ignored"),
                    },
                    Err(e) => tracing::trace!(error = %e, "no revision list"),
                }
            }
            self.versions_loaded = true;
        }
        &self.versions
    }

    /// The revisions currently known, without loading.
    #[must_use]
    pub fn versions(&self) -> &[RevisionTag] {
        &self.versions
    }

    /// Adds a revision under the lowest free `Version<N>` name.
    ///
    /// Returns `N`. The caller stores the revision content under
    /// [`RevisionTag::stream_path`]. Needs a storage.
    pub fn add_version(&mut self, mut tag: RevisionTag) -> Option<u32> {
        self.get_storage(false)?;
        let number = lowest_free_number(&self.versions);
        tag.identifier = format!("{IDENTIFIER_PREFIX}{number}");
        tracing::debug!(identifier = %tag.identifier, "revision added");
        self.versions.push(tag);
        Some(number)
    }

    /// Removes the revision named `identifier`; false if unknown.
    pub fn remove_version(&mut self, identifier: &str) -> bool {
        match self.versions.iter().position(|t| t.identifier == identifier) {
            Some(index) => {
                self.versions.remove(index);
                true
            }
            None => false,
        }
    }

    /// Takes over the revision list of `other`; false if it has none.
    pub fn transfer_version_list(&mut self, other: &Medium) -> bool {
        if other.versions.is_empty() {
            return false;
        }
        self.versions = other.versions.clone();
        true
    }

    /// Writes the revision list into the storage.
    ///
    /// Without revisions there is nothing to write and the call succeeds.
    pub fn save_version_list(&mut self) -> bool {
        if self.versions.is_empty() {
            return true;
        }
        let bytes = match serde_json::to_vec_pretty(&self.versions) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "can not encode revision list");
                return false;
            }
        };
        if self.get_storage(false).is_none() {
            return false;
        }
        let Some(storage) = self.storage.as_deref_mut() else {
            return false;
        };
        match storage.root_mut() {
            Ok(root) => {
                root.put_stream(VERSION_LIST_STREAM, bytes);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "can not write revision list");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;
    use crate::open_mode::OpenMode;
    use docmedium_storage::{DocUrl, Folder, PackageStorage};
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn tag(identifier: &str) -> RevisionTag {
        RevisionTag {
            identifier: identifier.to_string(),
            ..RevisionTag::new("", "")
        }
    }

    #[test]
    fn gaps_are_filled_first() {
        assert_eq!(lowest_free_number(&[]), 1);
        assert_eq!(lowest_free_number(&[tag("Version1"), tag("Version2")]), 3);
        assert_eq!(lowest_free_number(&[tag("Version3"), tag("Version1")]), 2);
        assert_eq!(lowest_free_number(&[tag("Version2")]), 1);
        assert_eq!(lowest_free_number(&[tag("bogus"), tag("Version1")]), 2);
    }

    #[test]
    fn number_parses_suffix() {
        assert_eq!(tag("Version12").number(), 12);
        assert_eq!(tag("Version").number(), 0);
        assert_eq!(tag("other").number(), 0);
        assert_eq!(tag("Version4").stream_path(), "Versions/Version4");
    }

    #[test]
    fn add_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.dmpk");
        std::fs::write(&path, PackageStorage::encode_folder(&Folder::new()).unwrap()).unwrap();
        let url = DocUrl::from_path(&path);

        let mut medium = Medium::open(context(dir.path()), url.as_str(), OpenMode::READWRITE);
        assert!(medium.get_version_list(false).is_empty());
        assert_eq!(medium.add_version(RevisionTag::new("first", "ann")), Some(1));
        assert_eq!(medium.add_version(RevisionTag::new("second", "bob")), Some(2));
        assert!(medium.remove_version("Version1"));
        assert!(!medium.remove_version("Version1"));
        assert_eq!(medium.add_version(RevisionTag::new("third", "cid")), Some(1));
        assert!(medium.save_version_list());

        let stream = medium.io.rw().map(|s| s as &mut dyn docmedium_storage::DocStream);
        let storage = medium.storage.as_deref_mut().unwrap();
        storage.commit(stream).unwrap();
        drop(medium);

        let mut reopened = Medium::open(context(dir.path()), url.as_str(), OpenMode::READ);
        let list = reopened.get_version_list(false);
        let names: Vec<_> = list.iter().map(|t| t.identifier.as_str()).collect();
        assert_eq!(names, ["Version2", "Version1"]);
        assert_eq!(list[1].comment, "third");
    }

    #[test]
    fn transfer_copies_only_non_empty_lists() {
        let dir = tempdir().unwrap();
        let mut source = Medium::open(context(dir.path()), "file:///a.dmpk", OpenMode::READ);
        let mut target = Medium::open(context(dir.path()), "file:///b.dmpk", OpenMode::READ);
        assert!(!target.transfer_version_list(&source));
        source.versions.push(tag("Version1"));
        assert!(target.transfer_version_list(&source));
        assert_eq!(target.versions(), source.versions());
    }

    proptest! {
        #[test]
        fn lowest_free_number_is_unused_and_minimal(numbers in proptest::collection::vec(1u32..20, 0..12)) {
            let tags: Vec<_> = numbers.iter().map(|n| tag(&format!("Version{n}"))).collect();
            let free = lowest_free_number(&tags);
            prop_assert!(!numbers.contains(&free));
            prop_assert!((1..free).all(|n| numbers.contains(&n)));
        }
    }
}
