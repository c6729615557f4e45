#![forbid(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::trace;

use crate::types::{PenumbraError, Result};

/// Positioned byte access to a small persistent file.
///
/// Reads that run past the end fail with [`ErrorKind::UnexpectedEof`]
/// wrapped in [`PenumbraError::Io`].
pub trait FileIo: Send + Sync + 'static {
    /// Fills `dst` from offset `off`.
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()>;
    /// Writes all of `src` at offset `off`, extending the file if needed.
    fn write_at(&self, off: u64, src: &[u8]) -> Result<()>;
    /// Flushes data and metadata to stable storage.
    fn sync_all(&self) -> Result<()>;
    /// Current length in bytes.
    fn len(&self) -> Result<u64>;
    /// Returns true if the file holds no bytes.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
    /// Shrinks or zero-extends the file to `len` bytes.
    fn set_len(&self, len: u64) -> Result<()>;
}

/// [`FileIo`] over an operating-system file.
///
/// The cursor is shared, so every access seeks under one lock.
pub struct StdFileIo {
    file: Mutex<File>,
}

impl StdFileIo {
    /// Wraps an already opened file.
    pub fn new(file: File) -> Self {
        Self {
            file: Mutex::new(file),
        }
    }

    /// Opens an existing file for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::new(file))
    }

    /// Opens an existing file for reading only. Writes fail.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(Self::new(file))
    }

    /// Creates a file that must not exist yet.
    pub fn create_new(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        Ok(Self::new(file))
    }
}

impl FileIo for StdFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(off))?;
        file.read_exact(dst).map_err(|err| {
            if err.kind() == ErrorKind::UnexpectedEof {
                trace!(off, len = dst.len(), "io.read_at.eof");
            }
            PenumbraError::from(err)
        })
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(off))?;
        file.write_all(src)?;
        Ok(())
    }

    fn sync_all(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    fn set_len(&self, len: u64) -> Result<()> {
        self.file.lock().set_len(len)?;
        Ok(())
    }
}

/// In-memory [`FileIo`] that can be told to start failing writes.
///
/// Lets tests stop a writer partway through a sequence of writes and then
/// reopen whatever bytes made it, the way a crash would leave a real file.
#[derive(Default)]
pub struct MemFileIo {
    state: Mutex<MemFileState>,
}

#[derive(Default)]
struct MemFileState {
    bytes: Vec<u8>,
    writes_left: Option<usize>,
}

impl MemFileIo {
    /// Creates an empty in-memory file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows `writes` more successful mutations, after which every write,
    /// resize and sync fails.
    pub fn fail_after(&self, writes: usize) {
        self.state.lock().writes_left = Some(writes);
    }

    /// Lifts any pending failure.
    pub fn heal(&self) {
        self.state.lock().writes_left = None;
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<u8> {
        self.state.lock().bytes.clone()
    }

    fn take_write(state: &mut MemFileState) -> Result<()> {
        match state.writes_left.as_mut() {
            Some(0) => Err(PenumbraError::Io(io::Error::new(
                ErrorKind::Other,
                "injected write failure",
            ))),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl FileIo for MemFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        let state = self.state.lock();
        let start = usize::try_from(off)
            .map_err(|_| PenumbraError::Io(ErrorKind::UnexpectedEof.into()))?;
        let end = start
            .checked_add(dst.len())
            .filter(|end| *end <= state.bytes.len())
            .ok_or_else(|| PenumbraError::Io(ErrorKind::UnexpectedEof.into()))?;
        dst.copy_from_slice(&state.bytes[start..end]);
        Ok(())
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        Self::take_write(&mut state)?;
        let start = usize::try_from(off)
            .map_err(|_| PenumbraError::Invalid("offset beyond addressable memory"))?;
        let end = start + src.len();
        if state.bytes.len() < end {
            state.bytes.resize(end, 0);
        }
        state.bytes[start..end].copy_from_slice(src);
        Ok(())
    }

    fn sync_all(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.writes_left == Some(0) {
            return Self::take_write(&mut state);
        }
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.state.lock().bytes.len() as u64)
    }

    fn set_len(&self, len: u64) -> Result<()> {
        let mut state = self.state.lock();
        Self::take_write(&mut state)?;
        let len = usize::try_from(len)
            .map_err(|_| PenumbraError::Invalid("length beyond addressable memory"))?;
        state.bytes.resize(len, 0);
        Ok(())
    }
}
