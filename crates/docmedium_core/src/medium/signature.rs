//! Document signing.
//!
//! Signatures are streams in the `META-INF` sub-storage of the package.
//! The medium only sequences the work: it stages the document, hands the
//! container to a [`DocumentSigner`], stores what comes back and commits.

use super::Medium;
use docmedium_storage::{Folder, Storage, StorageResult};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

const META_INF: &str = "META-INF";

/// Folders holding macro code.
const SCRIPT_FOLDERS: &[&str] = &["Basic", "Scripts"];

/// Verification state of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureState {
    /// Not checked yet.
    #[default]
    Unknown,
    /// The document carries no signature.
    NoSignature,
    /// All signatures verify.
    Ok,
    /// At least one signature does not match the content.
    Broken,
    /// Signatures match but the signer could not be validated.
    NotValidated,
    /// Some but not all of the content is covered.
    PartialOk,
}

/// Signs and verifies package content.
pub trait DocumentSigner {
    /// Name of the document signature stream inside `META-INF`.
    fn document_signature_stream_name(&self) -> &str {
        "documentsignatures.xml"
    }

    /// Name of the scripting signature stream inside `META-INF`.
    fn scripting_signature_stream_name(&self) -> &str {
        "macrosignatures.xml"
    }

    /// Signs the document content; `None` when the user cancelled or
    /// signing failed.
    fn sign_document_content(&self, storage: &dyn Storage) -> Option<Vec<u8>>;

    /// Signs the macro content.
    fn sign_scripting_content(
        &self,
        storage: &dyn Storage,
        has_valid_document_signature: bool,
    ) -> Option<Vec<u8>>;

    /// Checks and presents the document signatures of `storage`.
    fn show_document_signatures(&self, storage: Option<&dyn Storage>) -> SignatureState;

    /// Checks and presents the scripting signatures of `storage`.
    fn show_scripting_signatures(&self, storage: Option<&dyn Storage>) -> SignatureState;
}

/// A [`DocumentSigner`] writing SHA-256 digests of the covered streams.
///
/// One line per stream, `<hex digest> <path>`, sorted by path. It proves
/// integrity only, not authorship.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestSigner;

impl DigestSigner {
    /// Creates the signer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn manifest(storage: &dyn Storage, scripting: bool) -> StorageResult<Vec<u8>> {
        let mut lines = Vec::new();
        collect(storage.root()?, "", &mut |path, data| {
            let top = path.split('/').next().unwrap_or_default();
            let covered = if scripting {
                SCRIPT_FOLDERS.contains(&top)
            } else {
                top != META_INF
            };
            if covered {
                lines.push(format!("{} {path}", hex(&Sha256::digest(data))));
            }
        });
        lines.sort();
        let mut out = lines.join("\n");
        out.push('\n');
        Ok(out.into_bytes())
    }

    fn verify(&self, storage: Option<&dyn Storage>, stream_name: &str, scripting: bool) -> SignatureState {
        let Some(storage) = storage else {
            return SignatureState::Unknown;
        };
        let stored = match storage.root() {
            Ok(root) => root.folder(META_INF).and_then(|f| f.stream(stream_name)),
            Err(_) => return SignatureState::Unknown,
        };
        let Some(stored) = stored else {
            return SignatureState::NoSignature;
        };
        match Self::manifest(storage, scripting) {
            Ok(expected) if expected == stored => SignatureState::Ok,
            Ok(_) => SignatureState::Broken,
            Err(_) => SignatureState::Unknown,
        }
    }
}

fn collect(folder: &Folder, prefix: &str, visit: &mut dyn FnMut(&str, &[u8])) {
    for name in folder.names() {
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        };
        if let Some(data) = folder.stream(name) {
            visit(&path, data);
        } else if let Some(sub) = folder.folder(name) {
            collect(sub, &path, visit);
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

impl DocumentSigner for DigestSigner {
    fn sign_document_content(&self, storage: &dyn Storage) -> Option<Vec<u8>> {
        Self::manifest(storage, false).ok()
    }

    fn sign_scripting_content(&self, storage: &dyn Storage, _has_valid_document_signature: bool) -> Option<Vec<u8>> {
        Self::manifest(storage, true).ok()
    }

    fn show_document_signatures(&self, storage: Option<&dyn Storage>) -> SignatureState {
        self.verify(storage, self.document_signature_stream_name(), false)
    }

    fn show_scripting_signatures(&self, storage: Option<&dyn Storage>) -> SignatureState {
        self.verify(storage, self.scripting_signature_stream_name(), true)
    }
}

impl Medium {
    /// Signs the document or its macros in place.
    ///
    /// A writable document is staged in a temp file, signed through a
    /// container over the staged stream and committed to its target. A
    /// read-only document only has its signatures shown. Returns true if
    /// a signature was written. The error code is cleared afterwards.
    pub fn sign_contents(
        &mut self,
        signer: &dyn DocumentSigner,
        scripting: bool,
        has_valid_document_signature: bool,
    ) -> bool {
        if self.is_open() || self.error.is_error() {
            tracing::warn!("signing needs a closed medium without error");
            return false;
        }

        let mut changed = false;
        if self.is_read_only() {
            let storage = self.get_zip_storage_to_sign(true).map(|s| &*s as &dyn Storage);
            let state = if scripting {
                signer.show_scripting_signatures(storage)
            } else {
                signer.show_document_signatures(storage)
            };
            if scripting {
                self.scripting_signature = state;
            } else {
                self.document_signature = state;
            }
        } else {
            self.create_temp_file(true);
            self.get_medium();
            if self.io.rw().is_some() {
                changed = self.sign_staged(signer, scripting, has_valid_document_signature);
                if changed {
                    self.close_zip_storage();
                    self.commit();
                }
            }
        }

        self.close_and_release();
        self.reset_error();
        changed
    }

    fn sign_staged(
        &mut self,
        signer: &dyn DocumentSigner,
        scripting: bool,
        has_valid_document_signature: bool,
    ) -> bool {
        let Some(storage) = self.get_zip_storage_to_sign(false) else {
            return false;
        };
        let signature = if scripting {
            signer.sign_scripting_content(&*storage, has_valid_document_signature)
        } else {
            signer.sign_document_content(&*storage)
        };
        let Some(signature) = signature else {
            tracing::debug!(scripting, "signing cancelled");
            return false;
        };

        let stored = storage.root_mut().and_then(|root| root.folder_mut(META_INF)).map(|meta| {
            if scripting {
                meta.put_stream(signer.scripting_signature_stream_name(), signature);
                meta.remove(signer.document_signature_stream_name());
            } else {
                meta.put_stream(signer.document_signature_stream_name(), signature);
            }
        });
        if let Err(e) = stored {
            tracing::warn!(error = %e, "can not store signature");
            return false;
        }

        let stream = self.io.rw().map(|s| s as &mut dyn docmedium_storage::DocStream);
        let committed = match self.zip_storage.as_deref_mut() {
            Some(zip) => zip.commit(stream),
            None => return false,
        };
        match committed {
            Ok(docmedium_storage::CommitOutcome::Committed) => {
                tracing::info!(scripting, "signature written");
                self.add_log(if scripting { "macros signed" } else { "document signed" });
                true
            }
            Ok(docmedium_storage::CommitOutcome::RelocatedTo(path)) => {
                tracing::warn!(relocated = %path.display(), "signed package relocated, not saved");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "signed package not committed");
                false
            }
        }
    }

    /// Cached document signature state.
    #[must_use]
    pub fn document_signature_state(&self) -> SignatureState {
        self.document_signature
    }

    /// Caches the document signature state.
    pub fn set_document_signature_state(&mut self, state: SignatureState) {
        self.document_signature = state;
    }

    /// Cached scripting signature state.
    #[must_use]
    pub fn scripting_signature_state(&self) -> SignatureState {
        self.scripting_signature
    }

    /// Caches the scripting signature state.
    pub fn set_scripting_signature_state(&mut self, state: SignatureState) {
        self.scripting_signature = state;
    }
}
