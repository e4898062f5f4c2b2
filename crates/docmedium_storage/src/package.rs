//! Checksummed package container.
//!
//! ```text
//! +-------+---------+-------+--------------+-------------+--------+-----------+
//! | magic | version | flags | segment_size | payload_len | crc32  | payload   |
//! | 4     | 2       | 2     | 8            | 8           | 4      | CBOR tree |
//! +-------+---------+-------+--------------+-------------+--------+-----------+
//! ```
//!
//! All integers are little-endian. The CRC covers the payload only.

use crate::container::{
    CommitOutcome, ElementModes, EncryptionData, Folder, Storage, StorageFactory,
    StorageOpenOptions, StorageSource,
};
use crate::error::{StorageError, StorageResult};
use crate::stream::{read_all, rewrite, DocStream};
use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes at the start of every package.
pub const PACKAGE_MAGIC: [u8; 4] = *b"DMPK";

const FORMAT_VERSION: u16 = 1;
const HEADER_SIZE: usize = 28;
const FLAG_ENCRYPTED: u16 = 0x0001;

/// Header fields of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackageMeta {
    /// Whether encryption data was attached when the package was written.
    pub encrypted: bool,
    /// Disk-spanning segment size, zero when unset.
    pub segment_size: u64,
}

fn encode(root: &Folder, meta: PackageMeta) -> StorageResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::ser::into_writer(root, &mut payload)
        .map_err(|e| StorageError::Encode(e.to_string()))?;

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&PACKAGE_MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    let flags = if meta.encrypted { FLAG_ENCRYPTED } else { 0 };
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&meta.segment_size.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

fn decode(bytes: &[u8], options: &StorageOpenOptions<'_>) -> StorageResult<(Folder, PackageMeta)> {
    if bytes.is_empty() {
        return Ok((Folder::new(), PackageMeta::default()));
    }
    if bytes.len() < HEADER_SIZE {
        return Err(StorageError::corrupted("package shorter than header"));
    }
    if bytes[0..4] != PACKAGE_MAGIC {
        return Err(StorageError::corrupted("bad package magic"));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version > FORMAT_VERSION {
        return Err(StorageError::corrupted(format!(
            "unsupported package version {version}"
        )));
    }
    let flags = u16::from_le_bytes([bytes[6], bytes[7]]);
    let meta = PackageMeta {
        encrypted: flags & FLAG_ENCRYPTED != 0,
        segment_size: read_u64(bytes, 8),
    };
    let declared = usize::try_from(read_u64(bytes, 16)).unwrap_or(usize::MAX);
    let stored_crc = u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);
    let available = bytes.len() - HEADER_SIZE;
    let progress = |done| {
        if let Some(p) = options.progress {
            p.report(done, 3);
        }
    };

    progress(0);
    let payload = if declared > available {
        if !options.repair {
            return Err(StorageError::corrupted("package truncated"));
        }
        tracing::warn!(declared, available, "repairing truncated package");
        &bytes[HEADER_SIZE..]
    } else {
        &bytes[HEADER_SIZE..HEADER_SIZE + declared]
    };
    progress(1);

    if crc32fast::hash(payload) != stored_crc {
        if !options.repair {
            return Err(StorageError::corrupted("package checksum mismatch"));
        }
        tracing::warn!("repairing package with checksum mismatch");
    }
    progress(2);

    let root = match ciborium::de::from_reader::<Folder, _>(payload) {
        Ok(root) => root,
        Err(e) if options.repair => {
            tracing::warn!(error = %e, "package tree unreadable, repaired as empty");
            Folder::new()
        }
        Err(e) => return Err(StorageError::Decode(e.to_string())),
    };
    progress(3);
    Ok((root, meta))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Backing {
    Path(PathBuf),
    Stream,
    Detached,
}

/// A [`Storage`] holding its element tree in memory.
///
/// Path-backed packages commit through a sibling temp file and an atomic
/// rename. Stream-backed packages rewrite the stream in place; if that
/// fails the committed bytes are spilled into a fresh file and the commit
/// reports [`CommitOutcome::RelocatedTo`].
#[derive(Debug)]
pub struct PackageStorage {
    root: Option<Folder>,
    mode: ElementModes,
    backing: Backing,
    meta: PackageMeta,
    encryption: Option<EncryptionData>,
    spill_dir: Option<PathBuf>,
}

impl PackageStorage {
    /// Creates a writable storage that is not bound to any file or stream.
    ///
    /// Commits succeed without writing anything.
    #[must_use]
    pub fn detached(root: Folder) -> Self {
        Self {
            root: Some(root),
            mode: ElementModes::READWRITE,
            backing: Backing::Detached,
            meta: PackageMeta::default(),
            encryption: None,
            spill_dir: None,
        }
    }

    /// Encodes a tree in the package format.
    ///
    /// # Errors
    ///
    /// Fails if serialization fails.
    pub fn encode_folder(root: &Folder) -> StorageResult<Vec<u8>> {
        encode(root, PackageMeta::default())
    }

    /// Decodes package bytes strictly.
    ///
    /// # Errors
    ///
    /// Fails on damaged input.
    pub fn decode_folder(bytes: &[u8]) -> StorageResult<Folder> {
        decode(bytes, &StorageOpenOptions::default()).map(|(root, _)| root)
    }

    /// Returns header fields as currently set.
    #[must_use]
    pub fn meta(&self) -> PackageMeta {
        self.meta
    }

    fn live(&self) -> StorageResult<&Folder> {
        self.root.as_ref().ok_or(StorageError::Disposed)
    }

    fn encoded(&self) -> StorageResult<Vec<u8>> {
        encode(self.live()?, self.meta)
    }

    fn spill(&self, bytes: &[u8]) -> StorageResult<PathBuf> {
        let dir = self.spill_dir.clone().unwrap_or_else(std::env::temp_dir);
        let mut file = tempfile::Builder::new()
            .prefix("dmpk-")
            .suffix(".relocated")
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.as_file().sync_all()?;
        let (_, path) = file.keep().map_err(|e| e.error)?;
        Ok(path)
    }

    fn commit_to_path(&self, path: &Path, bytes: &[u8]) -> StorageResult<CommitOutcome> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut staged = tempfile::Builder::new()
            .prefix(".dmpk-")
            .suffix(".tmp")
            .tempfile_in(parent)?;
        staged.write_all(bytes)?;
        staged.as_file().sync_all()?;
        match staged.persist(path) {
            Ok(_) => {
                #[cfg(unix)]
                if let Ok(dir) = File::open(parent) {
                    let _ = dir.sync_all();
                }
                Ok(CommitOutcome::Committed)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e.error, "package rename failed, relocating");
                let (_, relocated) = e.file.keep().map_err(|e| e.error)?;
                Ok(CommitOutcome::RelocatedTo(relocated))
            }
        }
    }
}

impl Storage for PackageStorage {
    fn mode(&self) -> ElementModes {
        self.mode
    }

    fn root(&self) -> StorageResult<&Folder> {
        self.live()
    }

    fn root_mut(&mut self) -> StorageResult<&mut Folder> {
        if !self.mode.write {
            return Err(StorageError::ReadOnly);
        }
        self.root.as_mut().ok_or(StorageError::Disposed)
    }

    fn commit(&mut self, stream: Option<&mut dyn DocStream>) -> StorageResult<CommitOutcome> {
        self.live()?;
        if !self.mode.write {
            return Err(StorageError::ReadOnly);
        }
        self.meta.encrypted = self.encryption.as_ref().is_some_and(|d| !d.is_empty());
        let bytes = self.encoded()?;
        match &self.backing {
            Backing::Detached => Ok(CommitOutcome::Committed),
            Backing::Path(path) => self.commit_to_path(path, &bytes),
            Backing::Stream => {
                let stream = stream.ok_or(StorageError::MissingStream)?;
                match rewrite(stream, &bytes) {
                    Ok(()) => Ok(CommitOutcome::Committed),
                    Err(e) => {
                        tracing::warn!(error = %e, "stream commit failed, relocating package");
                        Ok(CommitOutcome::RelocatedTo(self.spill(&bytes)?))
                    }
                }
            }
        }
    }

    fn attach_to_stream(&mut self, stream: &mut dyn DocStream) -> StorageResult<()> {
        let bytes = self.encoded()?;
        rewrite(stream, &bytes)?;
        self.backing = Backing::Stream;
        Ok(())
    }

    fn dispose(&mut self) {
        self.root = None;
        self.encryption = None;
    }

    fn is_disposed(&self) -> bool {
        self.root.is_none()
    }

    fn set_encryption_data(&mut self, data: EncryptionData) -> StorageResult<()> {
        self.live()?;
        self.encryption = Some(data);
        Ok(())
    }

    fn encryption_data(&self) -> Option<&EncryptionData> {
        self.encryption.as_ref()
    }

    fn set_segment_size(&mut self, size: u64) -> StorageResult<()> {
        self.live()?;
        if !self.mode.write {
            return Err(StorageError::ReadOnly);
        }
        self.meta.segment_size = size;
        Ok(())
    }
}

/// Opens [`PackageStorage`]s.
#[derive(Debug, Clone, Default)]
pub struct PackageStorageFactory {
    spill_dir: Option<PathBuf>,
}

impl PackageStorageFactory {
    /// Creates a factory spilling relocated commits into the system temp dir.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the directory relocated commits are spilled into.
    #[must_use]
    pub fn with_spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }
}

impl StorageFactory for PackageStorageFactory {
    fn create(
        &self,
        source: StorageSource<'_>,
        mode: ElementModes,
        options: &StorageOpenOptions<'_>,
    ) -> StorageResult<Box<dyn Storage>> {
        let (bytes, backing) = match source {
            StorageSource::Path(path) => {
                let bytes = if mode.truncate {
                    Vec::new()
                } else {
                    match fs::read(path) {
                        Ok(bytes) => bytes,
                        Err(e) if e.kind() == io::ErrorKind::NotFound && mode.write => Vec::new(),
                        Err(e) => return Err(e.into()),
                    }
                };
                (bytes, Backing::Path(path.to_path_buf()))
            }
            StorageSource::Input(stream) => {
                let bytes = if mode.truncate { Vec::new() } else { read_all(stream)? };
                stream.seek(SeekFrom::Start(0))?;
                (bytes, Backing::Detached)
            }
            StorageSource::ReadWrite(stream) => {
                let bytes = if mode.truncate {
                    Vec::new()
                } else {
                    read_all(stream.as_input())?
                };
                stream.seek(SeekFrom::Start(0))?;
                (bytes, Backing::Stream)
            }
        };
        let (root, meta) = decode(&bytes, options)?;
        Ok(Box::new(PackageStorage {
            root: Some(root),
            mode,
            backing,
            meta,
            encryption: None,
            spill_dir: self.spill_dir.clone(),
        }))
    }
}
