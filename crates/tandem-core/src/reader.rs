//! Block reader over one side of a swap.
//!
//! A [`SourceFile`] opens its file for read/write, captures the length at
//! open time and then hands out fixed-size blocks with positioned reads.
//! Positioned reads never move a shared cursor, so the sink writing into the
//! same file through a cloned handle does not disturb the reader.

use crate::error::{Result, SwapError};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Sequential, offset-tracked block reader
#[derive(Debug)]
pub struct SourceFile {
    file: File,
    path: PathBuf,
    size: u64,
    offset: u64,
    eof: bool,
    buf: Vec<u8>,
}

impl SourceFile {
    /// Open a file for swapping
    ///
    /// The file must already exist and be readable and writable. Its length
    /// is captured here and only changes through [`SourceFile::truncate`].
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::InvalidFileName`] for an empty path,
    /// [`SwapError::InvalidBlockSize`] when `block_size` is zero, and
    /// [`SwapError::Open`] if the file cannot be opened or its metadata read.
    pub fn open<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(SwapError::InvalidFileName);
        }
        if block_size < 1 {
            return Err(SwapError::InvalidBlockSize(block_size));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| SwapError::open(path, e))?;

        Self::from_file(file, path, block_size)
    }

    /// Wrap an already opened handle, capturing its current length
    pub(crate) fn from_file(file: File, path: &Path, block_size: usize) -> Result<Self> {
        if block_size < 1 {
            return Err(SwapError::InvalidBlockSize(block_size));
        }

        let metadata = file.metadata().map_err(|e| SwapError::open(path, e))?;
        if !metadata.is_file() {
            return Err(SwapError::open(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        tracing::debug!("Opened {:?} ({} bytes)", path, metadata.len());

        Ok(Self {
            file,
            path: path.to_path_buf(),
            size: metadata.len(),
            offset: 0,
            eof: false,
            buf: vec![0u8; block_size],
        })
    }

    /// Read the next block
    ///
    /// Returns the bytes read, which may be shorter than the block size (the
    /// last block of a file usually is) and is empty once the file is
    /// exhausted. The slice borrows the reader's reusable buffer, so it must
    /// be consumed before the next call.
    ///
    /// Reads never extend past the length captured at open, even if the file
    /// has since grown.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Read`] on any I/O failure. The reader must not be
    /// used afterwards.
    pub fn read_block(&mut self) -> Result<&[u8]> {
        let remaining = self.size.saturating_sub(self.offset);
        let want = self
            .buf
            .len()
            .min(usize::try_from(remaining).unwrap_or(usize::MAX));

        let mut filled = 0;
        while filled < want {
            match read_at(&self.file, &mut self.buf[filled..want], self.offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SwapError::read(&self.path, self.offset, e)),
            }
        }

        self.offset += filled as u64;
        if filled < want || self.offset >= self.size {
            self.eof = true;
        }

        Ok(&self.buf[..filled])
    }

    /// Whether the reader has reached end-of-stream
    #[must_use]
    pub fn at_end(&self) -> bool {
        self.eof
    }

    /// Reset the read cursor
    ///
    /// Clears end-of-stream when the new offset lies before the captured
    /// size. Only used by verification flows, never by the swap itself.
    pub fn rewind(&mut self, offset: u64) {
        self.offset = offset;
        self.eof = offset >= self.size;
    }

    /// Truncate (or extend) the underlying file and update the cached size
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Truncate`] if the length cannot be set.
    pub fn truncate(&mut self, new_size: u64) -> Result<()> {
        self.file
            .set_len(new_size)
            .map_err(|e| SwapError::truncate(&self.path, new_size, e))?;
        self.size = new_size;
        Ok(())
    }

    /// Clone the file handle for a sink writing into this file
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Open`] if the handle cannot be duplicated.
    pub fn writer(&self) -> Result<File> {
        self.file
            .try_clone()
            .map_err(|e| SwapError::open(&self.path, e))
    }

    /// Flush file data to disk and release the handle
    ///
    /// Dropping a `SourceFile` also releases the handle; `close` additionally
    /// surfaces sync failures.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Sync`] if syncing fails.
    pub fn close(self) -> Result<()> {
        self.file
            .sync_all()
            .map_err(|e| SwapError::sync(&self.path, e))
    }

    /// Path the reader was opened with
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current cached file length
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current read offset
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Configured block size
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}
