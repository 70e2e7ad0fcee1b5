//! Seekable byte-oriented source: the one abstraction every parser in this
//! crate reads through (§4.1).
//!
//! A `RandomSource` guarantees O(1) `seek` and a `peek` that never advances
//! the read position. Three backing forms are provided: an in-memory buffer
//! (the common case — most PDFs are read fully into memory once and then
//! seeked around), a buffered file, and a one-shot `Read` stream spooled to
//! a temp file so it can still be seeked.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Seekable, peekable byte source.
///
/// Implementors own their backing storage; `DocumentIndex` owns the only
/// live `RandomSource` for a document and hands `&mut` borrows to parsers
/// for the duration of a single operation (see §5 — no internal
/// parallelism, so no synchronization is needed here).
pub trait RandomSource {
    /// Read a single byte, advancing the position by one. `Ok(None)` at EOF.
    fn read(&mut self) -> Result<Option<u8>>;

    /// Look at the next byte without advancing the position. `Ok(None)` at EOF.
    fn peek(&mut self) -> Result<Option<u8>>;

    /// Fill `buf` completely, or return the short read as an error if the
    /// source runs out first (no silent truncation).
    fn read_into(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Jump to an absolute byte position. Always O(1).
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Advance the position by `n` bytes without reading them.
    fn skip(&mut self, n: u64) -> Result<()> {
        let pos = self.position()?;
        self.seek(pos + n)
    }

    /// Current absolute byte position.
    fn position(&mut self) -> Result<u64>;

    /// Total length of the source in bytes.
    fn length(&mut self) -> Result<u64>;

    /// Release any resources (temp files, file handles). Idempotent.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-memory backed source. Used when the whole file was already read into
/// a buffer (the common, fast path for files small enough to fit).
pub struct MemorySource {
    data: Vec<u8>,
    pos: u64,
}

impl MemorySource {
    /// Wrap an owned byte buffer.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// Read a whole file into memory and wrap it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(std::fs::read(path)?))
    }

    /// Borrow the underlying bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl RandomSource for MemorySource {
    fn read(&mut self) -> Result<Option<u8>> {
        if (self.pos as usize) < self.data.len() {
            let b = self.data[self.pos as usize];
            self.pos += 1;
            Ok(Some(b))
        } else {
            Ok(None)
        }
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        Ok(self.data.get(self.pos as usize).copied())
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let start = self.pos as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            return Err(Error::UnexpectedEof);
        }
        buf.copy_from_slice(&self.data[start..end]);
        self.pos = end as u64;
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.pos = pos;
        Ok(())
    }

    fn position(&mut self) -> Result<u64> {
        Ok(self.pos)
    }

    fn length(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

/// Buffered random-access file source: the default for documents opened by
/// path, large enough that reading them fully into memory is wasteful.
pub struct FileSource {
    reader: BufReader<File>,
    len: u64,
    pos: u64,
}

impl FileSource {
    /// Open a file for random access.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            len,
            pos: 0,
        })
    }
}

impl RandomSource for FileSource {
    fn read(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.reader.read(&mut buf)? {
            0 => Ok(None),
            _ => {
                self.pos += 1;
                Ok(Some(buf[0]))
            },
        }
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        let b = self.read()?;
        if b.is_some() {
            self.reader.seek(SeekFrom::Current(-1))?;
        }
        Ok(b)
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    fn position(&mut self) -> Result<u64> {
        Ok(self.pos)
    }

    fn length(&mut self) -> Result<u64> {
        Ok(self.len)
    }
}

/// Spools a one-shot, non-seekable `Read` stream to a temp file so it can
/// be treated as a `RandomSource`. The temp file is removed when dropped.
pub struct SpooledSource {
    inner: FileSource,
    _temp: tempfile::NamedTempFile,
}

impl SpooledSource {
    /// Copy `reader` fully into a fresh temp file and open it for random access.
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut temp = tempfile::NamedTempFile::new()?;
        std::io::copy(&mut reader, temp.as_file_mut())?;
        let path = temp.path().to_path_buf();
        let inner = FileSource::open(path)?;
        Ok(Self { inner, _temp: temp })
    }
}

impl RandomSource for SpooledSource {
    fn read(&mut self) -> Result<Option<u8>> {
        self.inner.read()
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        self.inner.peek()
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_into(buf)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.inner.seek(pos)
    }

    fn position(&mut self) -> Result<u64> {
        self.inner.position()
    }

    fn length(&mut self) -> Result<u64> {
        self.inner.length()
    }
}
