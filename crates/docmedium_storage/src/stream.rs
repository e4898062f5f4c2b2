//! Stream capabilities shared by content providers, storages and the medium.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, Write};

/// A readable, seekable byte stream.
pub trait InputStream: Read + Seek + Send {}

impl<T: Read + Seek + Send + ?Sized> InputStream for T {}

/// A read-write stream over document bytes.
///
/// Files opened for writing, and in-memory buffers, implement this.
pub trait DocStream: Read + Write + Seek + Send {
    /// Truncates or extends the stream to `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying object cannot be resized.
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Flushes buffered bytes and asks the OS to persist them.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }

    /// Views this stream as a plain input stream.
    fn as_input(&mut self) -> &mut dyn InputStream;
}

impl DocStream for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.sync_all()
    }

    fn as_input(&mut self) -> &mut dyn InputStream {
        self
    }
}

impl DocStream for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        self.get_mut().resize(len, 0);
        if self.position() > len as u64 {
            self.set_position(len as u64);
        }
        Ok(())
    }

    fn as_input(&mut self) -> &mut dyn InputStream {
        self
    }
}

/// Replaces the whole content of `stream` with `bytes`.
pub(crate) fn rewrite(stream: &mut dyn DocStream, bytes: &[u8]) -> io::Result<()> {
    stream.seek(io::SeekFrom::Start(0))?;
    stream.set_len(0)?;
    stream.write_all(bytes)?;
    stream.sync()?;
    stream.seek(io::SeekFrom::Start(0))?;
    Ok(())
}

/// Reads a stream from its start to the end, restoring nothing.
pub(crate) fn read_all(stream: &mut dyn InputStream) -> io::Result<Vec<u8>> {
    stream.seek(io::SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempfile;

    #[test]
    fn cursor_truncates_and_clamps_position() {
        let mut cursor = Cursor::new(b"hello world".to_vec());
        cursor.seek(io::SeekFrom::End(0)).unwrap();
        DocStream::set_len(&mut cursor, 5).unwrap();
        assert_eq!(cursor.get_ref(), b"hello");
        assert_eq!(cursor.position(), 5);
    }

    #[test]
    fn rewrite_replaces_file_content() {
        let mut file = tempfile().unwrap();
        file.write_all(b"a much longer original text").unwrap();
        rewrite(&mut file, b"short").unwrap();
        assert_eq!(read_all(&mut file).unwrap(), b"short");
    }
}
