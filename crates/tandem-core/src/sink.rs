//! Buffered sink: accumulates inbound bytes into write blocks.
//!
//! A [`BufferedSink`] owns the write cursor of one destination file. Bytes
//! arrive in arbitrary-sized pieces and leave as positioned writes of exactly
//! `block_size` bytes at monotonically advancing offsets. When the inbound
//! stream closes, a remaining partial block is written once, unpadded.
//!
//! With `block_size == 1` every byte is written immediately (the unbuffered
//! reference path).

use crate::error::{Result, SwapError};
use crate::signal::ErrorSignal;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Destination that accepts writes at explicit offsets
///
/// Implemented for [`std::fs::File`]. The sink is generic over this trait so
/// that faults can be injected in tests.
pub trait PositionedWrite: Send + 'static {
    /// Write all of `buf` starting at `offset`
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the destination.
    fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()>;

    /// Flush written data to stable storage
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the destination.
    fn sync(&self) -> io::Result<()> {
        Ok(())
    }

    /// Truncate or extend the destination to `len` bytes
    ///
    /// Used once per swap to reconcile lengths. Destinations that cannot be
    /// resized keep the default, which reports [`io::ErrorKind::Unsupported`].
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the destination.
    fn set_len(&self, len: u64) -> io::Result<()> {
        let _ = len;
        Err(io::ErrorKind::Unsupported.into())
    }
}

impl PositionedWrite for File {
    #[cfg(unix)]
    fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        std::os::unix::fs::FileExt::write_all_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn write_all_at(&self, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        while !buf.is_empty() {
            match self.seek_write(buf, offset) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    buf = &buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        self.sync_data()
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

impl<T: PositionedWrite + Sync> PositionedWrite for Arc<T> {
    fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        (**self).write_all_at(buf, offset)
    }

    fn sync(&self) -> io::Result<()> {
        (**self).sync()
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }
}

/// Summary of a sink's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkReport {
    /// Total bytes written to the destination
    pub bytes_written: u64,
    /// Number of positioned writes issued
    pub writes: u64,
    /// `true` if the inbound stream closed normally and the tail was flushed
    pub completed: bool,
}

/// Accumulates bytes into fixed-size blocks and writes them in order
pub struct BufferedSink<W> {
    target: W,
    path: PathBuf,
    buf: Vec<u8>,
    filled: usize,
    offset: u64,
    writes: u64,
}

impl<W: PositionedWrite> BufferedSink<W> {
    /// Create a sink writing into `target` from offset zero
    ///
    /// `path` labels errors; it is not opened.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::InvalidBlockSize`] when `block_size` is zero.
    pub fn new(target: W, path: impl Into<PathBuf>, block_size: usize) -> Result<Self> {
        if block_size < 1 {
            return Err(SwapError::InvalidBlockSize(block_size));
        }

        Ok(Self {
            target,
            path: path.into(),
            buf: vec![0u8; block_size],
            filled: 0,
            offset: 0,
            writes: 0,
        })
    }

    /// Append bytes, issuing a positioned write for every full block
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Write`] if a write fails; the offset is left at
    /// the start of the failed block.
    pub fn push(&mut self, mut bytes: &[u8]) -> Result<()> {
        let block_size = self.buf.len();

        if block_size == 1 {
            for byte in bytes {
                self.write_block(std::slice::from_ref(byte))?;
            }
            return Ok(());
        }

        while !bytes.is_empty() {
            // Whole blocks straight from the input when nothing is pending
            if self.filled == 0 && bytes.len() >= block_size {
                let (block, rest) = bytes.split_at(block_size);
                self.write_block(block)?;
                bytes = rest;
                continue;
            }

            let take = (block_size - self.filled).min(bytes.len());
            self.buf[self.filled..self.filled + take].copy_from_slice(&bytes[..take]);
            self.filled += take;
            bytes = &bytes[take..];

            if self.filled == block_size {
                self.flush_buffer()?;
            }
        }

        Ok(())
    }

    /// Write the pending partial block (if any) and sync the destination
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Write`] if the tail write fails and
    /// [`SwapError::Sync`] if the sync fails.
    pub fn finish(mut self) -> Result<SinkReport> {
        self.flush_tail()?;

        Ok(SinkReport {
            bytes_written: self.offset,
            writes: self.writes,
            completed: true,
        })
    }

    /// Drain an inbound block stream until it closes or a fault is signalled
    ///
    /// Blocking: run this on a blocking thread. After each received block the
    /// signal is checked; if any task has raised an error the block is
    /// discarded and the sink returns without writing anything further,
    /// including its tail. Its own write failures are deposited in the
    /// signal. Dropping `rx` on return unblocks a sender waiting on a full
    /// queue.
    pub fn run(mut self, mut rx: mpsc::Receiver<Vec<u8>>, signal: Arc<ErrorSignal>) -> SinkReport {
        while let Some(block) = rx.blocking_recv() {
            if signal.is_raised() {
                tracing::debug!(
                    "Sink for {:?} stopping at offset {}: fault signalled",
                    self.path,
                    self.offset
                );
                return self.abandon();
            }

            if let Err(e) = self.push(&block) {
                tracing::error!("Sink for {:?} failed: {}", self.path, e);
                signal.raise(e);
                return self.abandon();
            }
        }

        if signal.is_raised() {
            return self.abandon();
        }

        if let Err(e) = self.flush_tail() {
            tracing::error!("Sink for {:?} failed on final flush: {}", self.path, e);
            signal.raise(e);
            return self.abandon();
        }

        tracing::debug!(
            "Sink for {:?} finished: {} bytes in {} writes",
            self.path,
            self.offset,
            self.writes
        );
        SinkReport {
            bytes_written: self.offset,
            writes: self.writes,
            completed: true,
        }
    }

    /// Bytes written so far (excludes the pending partial block)
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    /// Bytes buffered but not yet written
    #[must_use]
    pub fn pending(&self) -> usize {
        self.filled
    }

    /// Destination label
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush_tail(&mut self) -> Result<()> {
        if self.filled > 0 {
            self.flush_buffer()?;
        }
        self.target
            .sync()
            .map_err(|e| SwapError::sync(&self.path, e))
    }

    fn flush_buffer(&mut self) -> Result<()> {
        let filled = self.filled;
        self.target
            .write_all_at(&self.buf[..filled], self.offset)
            .map_err(|e| SwapError::write(&self.path, self.offset, e))?;
        self.offset += filled as u64;
        self.writes += 1;
        self.filled = 0;
        Ok(())
    }

    fn write_block(&mut self, block: &[u8]) -> Result<()> {
        self.target
            .write_all_at(block, self.offset)
            .map_err(|e| SwapError::write(&self.path, self.offset, e))?;
        self.offset += block.len() as u64;
        self.writes += 1;
        Ok(())
    }

    fn abandon(self) -> SinkReport {
        SinkReport {
            bytes_written: self.offset,
            writes: self.writes,
            completed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory destination recording every write
    #[derive(Default, Clone)]
    struct MemTarget {
        data: Arc<Mutex<Vec<u8>>>,
        writes: Arc<Mutex<Vec<(u64, usize)>>>,
        fail_at_write: Option<usize>,
    }

    impl PositionedWrite for MemTarget {
        fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
            let mut writes = self.writes.lock().unwrap();
            if Some(writes.len()) == self.fail_at_write {
                return Err(io::Error::other("injected write fault"));
            }
            writes.push((offset, buf.len()));

            let mut data = self.data.lock().unwrap();
            let end = offset as usize + buf.len();
            if data.len() < end {
                data.resize(end, 0);
            }
            data[offset as usize..end].copy_from_slice(buf);
            Ok(())
        }
    }

    impl MemTarget {
        fn contents(&self) -> Vec<u8> {
            self.data.lock().unwrap().clone()
        }

        fn write_log(&self) -> Vec<(u64, usize)> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(matches!(
            BufferedSink::new(MemTarget::default(), "x", 0),
            Err(SwapError::InvalidBlockSize(0))
        ));
    }

    #[test]
    fn test_full_blocks_and_short_tail() {
        let target = MemTarget::default();
        let mut sink = BufferedSink::new(target.clone(), "dst", 4).unwrap();

        sink.push(b"abc").unwrap();
        assert_eq!(sink.pending(), 3);
        assert!(target.write_log().is_empty());

        sink.push(b"defghij").unwrap();
        assert_eq!(sink.bytes_written(), 8);
        assert_eq!(sink.pending(), 2);

        let report = sink.finish().unwrap();
        assert!(report.completed);
        assert_eq!(report.bytes_written, 10);
        assert_eq!(target.contents(), b"abcdefghij");
        assert_eq!(target.write_log(), vec![(0, 4), (4, 4), (8, 2)]);
    }

    #[test]
    fn test_no_tail_write_when_aligned() {
        let target = MemTarget::default();
        let mut sink = BufferedSink::new(target.clone(), "dst", 4).unwrap();
        sink.push(b"abcdefgh").unwrap();
        let report = sink.finish().unwrap();
        assert_eq!(report.writes, 2);
        assert_eq!(target.write_log(), vec![(0, 4), (4, 4)]);
    }

    #[test]
    fn test_unbuffered_writes_every_byte() {
        let target = MemTarget::default();
        let mut sink = BufferedSink::new(target.clone(), "dst", 1).unwrap();
        sink.push("héllo".as_bytes()).unwrap();
        let report = sink.finish().unwrap();

        assert_eq!(report.writes, "héllo".len() as u64);
        assert_eq!(target.contents(), "héllo".as_bytes());
        let offsets: Vec<u64> = target.write_log().iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, (0..report.writes).collect::<Vec<_>>());
    }

    #[test]
    fn test_write_failure_keeps_offset() {
        let target = MemTarget {
            fail_at_write: Some(1),
            ..Default::default()
        };
        let mut sink = BufferedSink::new(target, "dst", 2).unwrap();
        let err = sink.push(b"abcdef").unwrap_err();
        assert!(matches!(err, SwapError::Write { offset: 2, .. }));
        assert_eq!(sink.bytes_written(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_drains_stream() {
        let target = MemTarget::default();
        let sink = BufferedSink::new(target.clone(), "dst", 3).unwrap();
        let signal = Arc::new(ErrorSignal::new());
        let (tx, rx) = mpsc::channel(1);

        let handle = {
            let signal = signal.clone();
            tokio::task::spawn_blocking(move || sink.run(rx, signal))
        };

        for chunk in [&b"ab"[..], b"cdefg", b"h"] {
            tx.send(chunk.to_vec()).await.unwrap();
        }
        drop(tx);

        let report = handle.await.unwrap();
        assert!(report.completed);
        assert_eq!(report.bytes_written, 8);
        assert_eq!(target.contents(), b"abcdefgh");
        assert!(!signal.is_raised());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_stops_on_raised_signal() {
        let target = MemTarget::default();
        let sink = BufferedSink::new(target.clone(), "dst", 4).unwrap();
        let signal = Arc::new(ErrorSignal::new());
        signal.raise(SwapError::Task("other side failed".into()));
        let (tx, rx) = mpsc::channel(4);

        tx.send(b"abcd".to_vec()).await.unwrap();
        tx.send(b"ef".to_vec()).await.unwrap();
        drop(tx);

        let report = tokio::task::spawn_blocking(move || sink.run(rx, signal))
            .await
            .unwrap();

        assert!(!report.completed);
        assert_eq!(report.bytes_written, 0);
        assert!(target.write_log().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_deposits_own_failure() {
        let target = MemTarget {
            fail_at_write: Some(0),
            ..Default::default()
        };
        let sink = BufferedSink::new(target, "dst", 2).unwrap();
        let signal = Arc::new(ErrorSignal::new());
        let (tx, rx) = mpsc::channel(1);

        let handle = {
            let signal = signal.clone();
            tokio::task::spawn_blocking(move || sink.run(rx, signal))
        };

        tx.send(b"abcd".to_vec()).await.unwrap();
        // The sink drops its receiver once it fails
        let mut closed = false;
        for _ in 0..16 {
            if tx.send(b"more".to_vec()).await.is_err() {
                closed = true;
                break;
            }
        }

        let report = handle.await.unwrap();
        assert!(closed);
        assert!(!report.completed);
        assert!(matches!(signal.get(), Some(SwapError::Write { offset: 0, .. })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_tail_flush_keeps_write_count() {
        let target = MemTarget {
            fail_at_write: Some(2),
            ..Default::default()
        };
        let sink = BufferedSink::new(target.clone(), "dst", 4).unwrap();
        let signal = Arc::new(ErrorSignal::new());
        let (tx, rx) = mpsc::channel(1);

        let handle = {
            let signal = signal.clone();
            tokio::task::spawn_blocking(move || sink.run(rx, signal))
        };

        tx.send(b"abcdefghij".to_vec()).await.unwrap();
        drop(tx);

        let report = handle.await.unwrap();
        assert_eq!(report.writes, 2);
        assert_eq!(report.bytes_written, 8);
        assert!(!report.completed);
        assert_eq!(target.contents(), b"abcdefgh");
        assert!(matches!(signal.get(), Some(SwapError::Write { offset: 8, .. })));
    }

    #[test]
    fn test_shared_file_target_resizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dst.log");
        std::fs::write(&path, b"0123456789").unwrap();

        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        let target = Arc::new(file);
        target.write_all_at(b"ab", 0).unwrap();
        target.set_len(4).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"ab23");

        // In-memory targets keep the unsupported default
        assert_eq!(
            MemTarget::default().set_len(0).unwrap_err().kind(),
            io::ErrorKind::Unsupported
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Every write but the last is exactly one block, at a block boundary
            #[test]
            fn test_writes_are_block_aligned(
                pieces in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..300), 0..20),
                block_size in 2usize..128,
            ) {
                let target = MemTarget::default();
                let mut sink = BufferedSink::new(target.clone(), "prop", block_size).unwrap();
                let mut expected = Vec::new();
                for piece in &pieces {
                    sink.push(piece).unwrap();
                    expected.extend_from_slice(piece);
                }
                sink.finish().unwrap();

                let log = target.write_log();
                if let Some((last, full)) = log.split_last() {
                    for (i, &(offset, len)) in full.iter().enumerate() {
                        prop_assert_eq!(offset, (i * block_size) as u64);
                        prop_assert_eq!(len, block_size);
                    }
                    prop_assert!(last.1 <= block_size && last.1 > 0);
                }
                prop_assert_eq!(target.contents(), expected);
            }
        }
    }
}
