//! Error types for the swap engine.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result alias used throughout the swap engine
pub type Result<T> = std::result::Result<T, SwapError>;

/// Errors produced while swapping two files
///
/// The type is `Clone` so that a single fault deposited in the
/// [`ErrorSignal`](crate::signal::ErrorSignal) can be observed by every task
/// without being taken out of the slot. I/O sources are shared through `Arc`.
#[derive(Debug, Error, Clone)]
pub enum SwapError {
    // ============ Setup Errors ============
    /// Empty file path
    #[error("invalid file name")]
    InvalidFileName,

    /// Block size below the minimum of one byte
    #[error("invalid block size: {0} (must be at least 1)")]
    InvalidBlockSize(usize),

    /// Queue depth below the minimum of one block
    #[error("invalid queue depth: {0} (must be at least 1)")]
    InvalidQueueDepth(usize),

    /// File could not be opened for read/write or its metadata read
    #[error("cannot open {}: {source}", path.display())]
    Open {
        /// Path that failed to open
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: Arc<io::Error>,
    },

    // ============ Streaming Errors ============
    /// Positioned read failed
    #[error("read failed on {} at offset {offset}: {source}", path.display())]
    Read {
        /// File being read
        path: PathBuf,
        /// Offset of the failed read
        offset: u64,
        /// Underlying I/O error
        #[source]
        source: Arc<io::Error>,
    },

    /// Positioned write failed
    #[error("write failed on {} at offset {offset}: {source}", path.display())]
    Write {
        /// File being written
        path: PathBuf,
        /// Offset of the failed write
        offset: u64,
        /// Underlying I/O error
        #[source]
        source: Arc<io::Error>,
    },

    /// Flushing written data to disk failed
    #[error("sync of {} failed: {source}", path.display())]
    Sync {
        /// File being synced
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: Arc<io::Error>,
    },

    /// A sink stopped accepting blocks without depositing an error
    #[error("sink for {} stopped before its stream closed", path.display())]
    SinkClosed {
        /// Destination of the sink
        path: PathBuf,
    },

    /// A pipeline task panicked or was cancelled by the runtime
    #[error("swap task failed: {0}")]
    Task(String),

    // ============ Reconciliation Errors ============
    /// Final length correction failed
    #[error("truncate of {} to {size} bytes failed: {source}", path.display())]
    Truncate {
        /// File being truncated
        path: PathBuf,
        /// Requested length
        size: u64,
        /// Underlying I/O error
        #[source]
        source: Arc<io::Error>,
    },
}

impl SwapError {
    pub(crate) fn open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, offset: u64, source: io::Error) -> Self {
        Self::Read {
            path: path.into(),
            offset,
            source: Arc::new(source),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, offset: u64, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            offset,
            source: Arc::new(source),
        }
    }

    pub(crate) fn sync(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Sync {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn truncate(path: impl Into<PathBuf>, size: u64, source: io::Error) -> Self {
        Self::Truncate {
            path: path.into(),
            size,
            source: Arc::new(source),
        }
    }

    /// Name of the swap stage the error belongs to
    ///
    /// Used for user-visible reporting: a failed swap prints the stage
    /// together with the message.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidFileName | Self::InvalidBlockSize(_) | Self::InvalidQueueDepth(_) => {
                "config"
            }
            Self::Open { .. } => "open",
            Self::Read { .. } => "read",
            Self::Write { .. } | Self::Sync { .. } => "write",
            Self::SinkClosed { .. } | Self::Task(_) => "pipeline",
            Self::Truncate { .. } => "truncate",
        }
    }

    /// Whether the error happened while bytes were being streamed
    ///
    /// Streaming errors leave both files partially swapped.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(
            self,
            Self::Read { .. }
                | Self::Write { .. }
                | Self::Sync { .. }
                | Self::SinkClosed { .. }
                | Self::Task(_)
        )
    }
}
