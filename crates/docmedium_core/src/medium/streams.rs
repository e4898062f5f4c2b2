//! Stream acquisition, temp-file staging and the close protocol.
//!
//! A medium reads through one of three sources: a caller-supplied stream,
//! a stream opened on the physical file (or its temp copy), or the
//! locking stream held on the original. The read stream (`in_stream`)
//! wraps one of these or, when a temp file exists, a plain file handle on
//! it. The output stream always writes the temp file.

use super::Medium;
use crate::context::MediumContext;
use crate::error::ErrorCode;
use crate::temp::TempFile;
use docmedium_storage::{DocStream, DocUrl, InputStream, InsertRequest, NameClash, TransferOperation};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// The read-write stream slot.
pub(crate) enum RwSlot {
    /// The locking stream doubles as the document stream.
    Locking,
    /// A stream owned by the slot.
    Owned(Box<dyn DocStream>),
}

/// What the read stream reads from.
pub(crate) enum InSlot {
    /// A file handle on the temp file.
    File(File),
    /// The read-write stream, or else the input stream.
    Medium,
}

/// Streams owned by a medium.
#[derive(Default)]
pub(crate) struct StreamSet {
    pub(crate) stream: Option<RwSlot>,
    pub(crate) input: Option<Box<dyn InputStream>>,
    pub(crate) locking: Option<Box<dyn DocStream>>,
    pub(crate) in_stream: Option<InSlot>,
    pub(crate) out_stream: Option<File>,
}

impl StreamSet {
    /// The read-write document stream.
    pub(crate) fn rw(&mut self) -> Option<&mut (dyn DocStream + 'static)> {
        match &mut self.stream {
            Some(RwSlot::Owned(stream)) => Some(stream.as_mut()),
            Some(RwSlot::Locking) => self.locking.as_deref_mut(),
            None => None,
        }
    }

    /// Returns true if some document stream can be read.
    pub(crate) fn has_input(&self) -> bool {
        self.stream.is_some() || self.input.is_some()
    }

    /// The document input: the read side of the read-write stream, else the input stream.
    pub(crate) fn input(&mut self) -> Option<&mut dyn InputStream> {
        if self.stream.is_some() {
            return self.rw().map(|stream| stream.as_input());
        }
        match self.input.as_deref_mut() {
            Some(input) => {
                let input: &mut dyn InputStream = input;
                Some(input)
            }
            None => None,
        }
    }

    /// The read stream, if open.
    pub(crate) fn reader(&mut self) -> Option<&mut dyn InputStream> {
        if matches!(self.in_stream, Some(InSlot::Medium)) {
            return self.input();
        }
        match &mut self.in_stream {
            Some(InSlot::File(file)) => {
                let file: &mut dyn InputStream = file;
                Some(file)
            }
            _ => None,
        }
    }

    /// The output stream, if open.
    pub(crate) fn writer(&mut self) -> Option<&mut dyn DocStream> {
        match self.out_stream.as_mut() {
            Some(file) => {
                let file: &mut dyn DocStream = file;
                Some(file)
            }
            None => None,
        }
    }
}

impl fmt::Debug for StreamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSet")
            .field("stream", &self.stream.is_some())
            .field("input", &self.input.is_some())
            .field("locking", &self.locking.is_some())
            .field("in_stream", &self.in_stream.is_some())
            .field("out_stream", &self.out_stream.is_some())
            .finish()
    }
}

/// Copies `from` into `to` from the start in chunks of `chunk` bytes.
pub(crate) fn copy_chunked<R, W>(from: &mut R, to: &mut W, chunk: usize) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = vec![0u8; chunk.max(1)];
    let mut total = 0u64;
    loop {
        let read = match from.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        to.write_all(&buffer[..read])?;
        total += read as u64;
    }
    to.flush()?;
    Ok(total)
}

fn io_error_code(error: &io::Error) -> ErrorCode {
    match error.kind() {
        io::ErrorKind::PermissionDenied => ErrorCode::AccessDenied,
        io::ErrorKind::NotFound => ErrorCode::NotExists,
        _ => ErrorCode::CantRead,
    }
}

impl Medium {
    /// Acquires the document streams if no read stream is open yet.
    ///
    /// Sets [`ErrorCode::AccessDenied`] when nothing could be opened.
    pub(crate) fn get_medium(&mut self) {
        if self.io.in_stream.is_some() {
            return;
        }

        let supplied = self.handles.stream.is_some() || self.handles.input_stream.is_some();
        if let Some(stream) = self.handles.stream.take() {
            self.io.stream = Some(RwSlot::Owned(stream));
        }
        if let Some(input) = self.handles.input_stream.take() {
            self.io.input = Some(input);
        }
        if !supplied && !self.io.has_input() {
            self.open_document_streams();
        }

        if !self.error.is_error() && !self.io.has_input() {
            self.fail(ErrorCode::AccessDenied, "no stream for document");
        }
        if !self.error.is_error() {
            self.io.in_stream = Some(InSlot::Medium);
        }
    }

    fn open_document_streams(&mut self) {
        let Some(url) = self.content_url() else {
            return;
        };
        let from_temp = self.temp_file.is_some();
        if !from_temp {
            self.descriptor.file_name = Some(url.to_string());
            if !self.open_mode.write {
                self.descriptor.read_only = Some(true);
            }
        }

        if self.io.locking.is_some() && !from_temp {
            self.io.stream = Some(RwSlot::Locking);
            return;
        }

        let content = match self.ctx.content.content(&url) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(%url, error = %e, "no content provider");
                return;
            }
        };
        let write_intent =
            from_temp || (self.open_mode.write && self.descriptor.read_only != Some(true));
        let own_lock = !from_temp && url.is_local() && self.system_locking_used();
        if write_intent {
            match content.open_read_write(own_lock) {
                Ok(stream) => {
                    self.io.stream = Some(RwSlot::Owned(stream));
                    return;
                }
                Err(e) => tracing::debug!(%url, error = %e, "read-write open refused, reading only"),
            }
        }
        match content.open_stream() {
            Ok(input) => self.io.input = Some(input),
            Err(e) => tracing::debug!(%url, error = %e, "document not readable"),
        }
    }

    /// The read stream, opened on demand.
    ///
    /// With a temp file the stream is a file handle on it, writable when
    /// the open mode asks for writing.
    pub fn get_in_stream(&mut self) -> Option<&mut dyn InputStream> {
        if self.io.in_stream.is_none() {
            let temp_path = self.temp_file.as_ref().and(self.physical_name.clone());
            if let Some(path) = temp_path {
                let write = self.open_mode.write;
                match OpenOptions::new().read(true).write(write).open(&path) {
                    Ok(file) => self.io.in_stream = Some(InSlot::File(file)),
                    Err(e) => {
                        let code = if write && e.kind() == io::ErrorKind::PermissionDenied {
                            ErrorCode::AccessDenied
                        } else {
                            io_error_code(&e)
                        };
                        self.fail(code, "can not open temp file");
                    }
                }
            }
            if self.io.in_stream.is_none() {
                self.get_medium();
            }
        }
        if self.error.is_error() {
            return None;
        }
        self.io.reader()
    }

    /// The document input stream, opened on demand.
    pub fn get_input_stream(&mut self) -> Option<&mut dyn InputStream> {
        if !self.io.has_input() {
            self.get_medium();
        }
        self.io.input()
    }

    /// The read-write document stream, opened on demand.
    pub fn get_stream(&mut self) -> Option<&mut (dyn DocStream + 'static)> {
        if self.io.stream.is_none() {
            self.get_medium();
            if self.error.is_error() {
                return None;
            }
        }
        self.io.rw()
    }

    /// The output stream on the temp file, staging the document first.
    ///
    /// Any open storage is closed.
    pub fn get_out_stream(&mut self) -> Option<&mut dyn DocStream> {
        if self.io.out_stream.is_none() {
            self.create_temp_file(false);
            let temp_path = self.temp_file.as_ref().and(self.physical_name.clone());
            if let Some(path) = temp_path {
                self.close_storage();
                match OpenOptions::new().read(true).write(true).open(&path) {
                    Ok(file) => self.io.out_stream = Some(file),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "can not open temp file for writing");
                        self.fail(ErrorCode::CantWrite, "can not open output stream");
                    }
                }
            }
        }
        self.io.writer()
    }

    /// Closes the read stream.
    ///
    /// A storage built on the stream is closed first. A medium without a
    /// content location spills its stream into a temp file instead.
    pub fn close_in_stream(&mut self) {
        if self.io.in_stream.is_some() && self.storage.is_some() && self.storage_based_on_stream {
            self.close_storage();
        }

        if self.io.in_stream.is_some() && self.content().is_none() {
            self.create_temp_file(true);
            return;
        }

        self.io.in_stream = None;
        self.close_zip_storage();
        self.io.input = None;
        if self.io.out_stream.is_none() {
            self.io.stream = None;
        }
    }

    /// Closes the output stream, and any storage.
    pub fn close_out_stream(&mut self) {
        if self.io.out_stream.is_some() {
            if self.storage.is_some() {
                self.close_storage();
            }
            if let Some(mut out) = self.io.out_stream.take() {
                if let Err(e) = out.flush() {
                    tracing::warn!(error = %e, "flushing output stream failed");
                }
            }
        }
        if self.io.in_stream.is_none() {
            self.io.stream = None;
        }
    }

    /// Closes read and output streams.
    pub(crate) fn close_streams(&mut self) {
        self.close_in_stream();
        self.close_out_stream();
    }

    /// Closes the streams and drops the raw handles, including a locking
    /// stream that serves as the document stream.
    pub fn close_and_release_streams(&mut self) {
        self.close_zip_storage();
        if matches!(self.io.stream, Some(RwSlot::Locking)) {
            self.io.locking = None;
        }
        self.close_streams();
        if !self.salvage_mode {
            self.io.stream = None;
            self.io.input = None;
        }
    }

    /// Returns true while a stream or storage is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.io.in_stream.is_some() || self.io.out_stream.is_some() || self.storage.is_some()
    }

    /// Points the medium at another physical file, dropping any temp file.
    pub fn set_physical_name(&mut self, name: Option<std::path::PathBuf>) {
        if name != self.physical_name {
            self.temp_file = None;
            self.physical_name = name;
            self.tried_storage = false;
            self.is_storage = false;
        }
    }

    /// Stages the document into a fresh temp file and makes it the physical file.
    ///
    /// Unless the open mode truncates, the current content is copied: by
    /// content transfer when the document is a local file, else by copying
    /// the read stream. Without `replace` an existing temp file is kept.
    /// Sets [`ErrorCode::CantWrite`] on failure.
    pub fn create_temp_file(&mut self, replace: bool) {
        let previous = match self.temp_file.take() {
            Some(existing) if !replace => {
                self.temp_file = Some(existing);
                return;
            }
            Some(existing) => {
                drop(existing);
                self.physical_name = None;
                None
            }
            None => self.physical_name.clone(),
        };
        let source = previous
            .map(|path| DocUrl::from_path(&path))
            .or_else(|| self.logical_name.clone());

        let temp = match self.ctx.temp.create() {
            Ok(temp) => temp,
            Err(e) => {
                tracing::warn!(error = %e, "temp file creation failed");
                self.fail(ErrorCode::CantWrite, "can not create temp file");
                return;
            }
        };
        let temp_url = temp.url();
        self.physical_name = Some(temp.path().to_path_buf());
        self.temp_file = Some(temp);
        tracing::debug!(temp = %temp_url, "staging document in temp file");

        if !self.open_mode.truncate {
            let mut transferred = false;
            let local_document = self.logical_name.as_ref().is_some_and(|url| {
                url.is_local() && self.ctx.content.content(url).is_ok_and(|c| c.is_document())
            });
            if let (Some(source), true) = (&source, local_document) {
                transferred = self.copy_into_temp(source, &temp_url);
                if transferred {
                    self.close_out_stream();
                    self.close_in_stream();
                }
            }

            if !transferred && self.io.in_stream.is_some() {
                if self.get_out_stream().is_some() {
                    match self.copy_in_to_out() {
                        Ok(_) => transferred = true,
                        Err(e) => tracing::warn!(error = %e, "staging copy failed"),
                    }
                    self.close_in_stream();
                }
                self.close_out_stream();
            } else {
                // nothing to copy from, the document starts empty
                transferred = true;
                self.close_in_stream();
            }

            if !transferred {
                self.fail(ErrorCode::CantWrite, "can not stage document");
                return;
            }
        }

        self.close_storage();
    }

    fn copy_into_temp(&self, source: &DocUrl, temp_url: &DocUrl) -> bool {
        let (Some(folder), name) = (temp_url.parent(), temp_url.last_segment()) else {
            return false;
        };
        let request = InsertRequest {
            operation: TransferOperation::Copy,
            name_clash: NameClash::Overwrite,
            media_type: self.filter_media_type(),
        };
        match self.ctx.content.transfer(source, &folder, &name, &request) {
            Ok(_) => {
                if let Err(e) = self
                    .ctx
                    .content
                    .content(temp_url)
                    .and_then(|c| c.set_writable_for_user_only())
                {
                    tracing::debug!(error = %e, "can not restrict temp file permissions");
                }
                true
            }
            Err(e) => {
                tracing::debug!(%source, error = %e, "content copy into temp file failed");
                false
            }
        }
    }

    fn copy_in_to_out(&mut self) -> io::Result<u64> {
        let chunk = self.ctx.config.copy_buffer_size;
        let mut out = self.io.out_stream.take();
        let result = match (self.io.reader(), out.as_mut()) {
            (Some(reader), Some(file)) => (|| {
                reader.seek(SeekFrom::Start(0))?;
                file.seek(SeekFrom::Start(0))?;
                file.set_len(0)?;
                copy_chunked(reader, file, chunk)
            })(),
            _ => Err(io::Error::other("no stream to copy")),
        };
        self.io.out_stream = out;
        result
    }

    /// Replaces the temp file with an empty one.
    pub fn create_temp_file_no_copy(&mut self) {
        self.temp_file = None;
        match self.ctx.temp.create() {
            Ok(temp) => {
                self.physical_name = Some(temp.path().to_path_buf());
                self.temp_file = Some(temp);
            }
            Err(e) => {
                tracing::warn!(error = %e, "temp file creation failed");
                self.physical_name = None;
                self.fail(ErrorCode::CantWrite, "can not create temp file");
                return;
            }
        }
        self.close_out_stream();
        self.close_storage();
    }

    /// Copies `url` into a new temp file keeping its extension.
    #[must_use]
    pub fn create_temp_copy_with_ext(ctx: &MediumContext, url: &DocUrl) -> Option<TempFile> {
        let extension = url.extension();
        let temp = match ctx.temp.create_with_extension(extension.as_deref()) {
            Ok(temp) => temp,
            Err(e) => {
                tracing::warn!(error = %e, "temp file creation failed");
                return None;
            }
        };
        let temp_url = temp.url();
        let folder = temp_url.parent()?;
        match ctx.content.transfer(
            url,
            &folder,
            &temp_url.last_segment(),
            &InsertRequest::copy(NameClash::Overwrite),
        ) {
            Ok(_) => Some(temp),
            Err(e) => {
                tracing::warn!(%url, error = %e, "temp copy failed");
                None
            }
        }
    }

    pub(crate) fn create_file_stream(&mut self) {
        if self.get_in_stream().is_some() {
            self.create_temp_file(false);
            self.is_temp = true;
            self.close_in_stream();
        }
    }

    /// Reacquires the document streams without interaction.
    pub fn re_open(&mut self) {
        let use_interaction = self.use_interaction;
        self.use_interaction = false;
        self.get_medium();
        self.use_interaction = use_interaction;
    }

    /// Reopens from the document itself instead of the temp file.
    ///
    /// On success the old temp file is dropped; on failure it is restored.
    pub fn complete_re_open(&mut self) {
        let use_interaction = self.use_interaction;
        self.use_interaction = false;

        let old_temp = self.temp_file.take();
        let old_name = self.physical_name.clone();
        if old_temp.is_some() {
            self.physical_name = self.logical_name.as_ref().and_then(DocUrl::to_path);
        }

        self.get_medium();

        if self.error.is_error() {
            self.temp_file = None;
            if let Some(old) = old_temp {
                self.temp_file = Some(old);
                self.physical_name = old_name;
            }
        }

        self.use_interaction = use_interaction;
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;
    use crate::descriptor::{MediaDescriptor, MediaHandles};
    use crate::open_mode::OpenMode;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn read_all(stream: &mut dyn InputStream) -> Vec<u8> {
        let mut bytes = Vec::new();
        stream.seek(SeekFrom::Start(0)).unwrap();
        stream.read_to_end(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn reads_local_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, b"hello").unwrap();
        let mut medium = Medium::open(context(dir.path()), path.to_str().unwrap(), OpenMode::READ);

        let stream = medium.get_in_stream().unwrap();
        assert_eq!(read_all(stream), b"hello");
        assert_eq!(medium.descriptor().read_only, Some(true));
        assert!(medium.is_open());
        medium.close();
        assert!(!medium.is_open());
    }

    #[test]
    fn missing_document_is_access_denied() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        let mut medium = Medium::open(context(dir.path()), path.to_str().unwrap(), OpenMode::READ);
        assert!(medium.get_in_stream().is_none());
        assert_eq!(medium.error_code(), ErrorCode::AccessDenied);
    }

    #[test]
    fn sticky_error_short_circuits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, b"hello").unwrap();
        let mut medium = Medium::open(context(dir.path()), path.to_str().unwrap(), OpenMode::READ);
        medium.set_error(ErrorCode::CantRead);
        assert!(medium.get_in_stream().is_none());
        assert_eq!(medium.error_code(), ErrorCode::CantRead);
        medium.reset_error();
        assert!(medium.get_in_stream().is_some());
    }

    #[test]
    fn out_stream_stages_a_copy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, b"original").unwrap();
        let mut medium = Medium::open(context(dir.path()), path.to_str().unwrap(), OpenMode::READWRITE);

        let out = medium.get_out_stream().unwrap();
        assert_eq!(read_all(out.as_input()), b"original");
        let temp = medium.current_physical_name().unwrap().to_path_buf();
        assert_ne!(temp, path);
        assert!(temp.starts_with(dir.path().join("tmp")));

        drop(medium);
        assert!(!temp.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"original");
    }

    #[test]
    fn truncating_mode_skips_the_copy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, b"original").unwrap();
        let mut medium = Medium::open(
            context(dir.path()),
            path.to_str().unwrap(),
            OpenMode::READWRITE.truncating(),
        );
        let out = medium.get_out_stream().unwrap();
        assert!(read_all(out.as_input()).is_empty());
    }

    #[test]
    fn caller_stream_is_spilled_into_temp_file() {
        let dir = tempdir().unwrap();
        let handles = MediaHandles::new().with_input_stream(Box::new(Cursor::new(b"streamed".to_vec())));
        let mut medium = Medium::open_with(
            context(dir.path()),
            "private:stream",
            OpenMode::READ,
            None,
            MediaDescriptor::default(),
            handles,
        );
        assert_eq!(read_all(medium.get_in_stream().unwrap()), b"streamed");

        medium.close_in_stream();
        let temp = medium.current_physical_name().unwrap().to_path_buf();
        assert!(medium.has_temp_file());
        assert_eq!(std::fs::read(&temp).unwrap(), b"streamed");
    }

    #[test]
    fn physical_name_stages_remote_documents() {
        let dir = tempdir().unwrap();
        let remote = std::sync::Arc::new(docmedium_storage::MemoryContentProvider::new("sftp"));
        let url = DocUrl::parse("sftp://host/docs/a.odt").unwrap();
        remote.put(&url, b"remote".to_vec());
        let ctx = context(dir.path());
        let ctx = ctx.clone().with_content(ctx.content.clone().with_provider(remote));

        let mut medium = Medium::open(ctx, url.as_str(), OpenMode::READ);
        assert!(medium.current_physical_name().is_none());
        let physical = medium.physical_name().unwrap();
        assert_eq!(std::fs::read(&physical).unwrap(), b"remote");
        drop(medium);
        assert!(!physical.exists());
    }

    #[test]
    fn temp_copy_keeps_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.ods");
        std::fs::write(&path, b"cells").unwrap();
        let ctx = context(dir.path());
        let copy = Medium::create_temp_copy_with_ext(&ctx, &DocUrl::from_path(&path)).unwrap();
        assert_eq!(copy.path().extension().unwrap(), "ods");
        assert_eq!(std::fs::read(copy.path()).unwrap(), b"cells");
    }

    #[test]
    fn complete_re_open_drops_temp_file_on_success() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, b"data").unwrap();
        let mut medium = Medium::open(context(dir.path()), path.to_str().unwrap(), OpenMode::READ);
        medium.create_temp_file(false);
        let temp = medium.current_physical_name().unwrap().to_path_buf();
        assert!(temp.exists());

        medium.complete_re_open();
        assert_eq!(medium.error_code(), ErrorCode::None);
        assert!(!medium.has_temp_file());
        assert!(!temp.exists());
        assert_eq!(read_all(medium.get_in_stream().unwrap()), b"data");
    }

    #[test]
    fn chunked_copy_handles_small_chunks() {
        let mut from = Cursor::new(vec![7u8; 1000]);
        let mut to = Vec::new();
        assert_eq!(copy_chunked(&mut from, &mut to, 7).unwrap(), 1000);
        assert_eq!(to.len(), 1000);
    }
}
