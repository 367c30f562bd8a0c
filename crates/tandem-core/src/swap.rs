//! Swap orchestration.
//!
//! Drives two [`SourceFile`] readers and two [`BufferedSink`]s in lock-step
//! rounds. Each round reads one block from every reader that has not hit
//! end-of-stream, then forwards A's block to the sink writing into B and
//! B's block to the sink writing into A.
//!
//! # Pipeline
//!
//! ```text
//!             round loop (blocking thread)
//!   file A --read--> block A --queue--> sink B --write_at--> file B
//!   file B --read--> block B --queue--> sink A --write_at--> file A
//! ```
//!
//! Both blocks of a round are read before either is forwarded. A sink
//! therefore never receives more bytes than its destination's reader has
//! already consumed, and never overwrites unread data. The queues are
//! bounded, which caps memory at roughly `2 * (queue_depth + 1)` read blocks
//! plus two write blocks regardless of file size.
//!
//! # States
//!
//! `Running` -> `Draining` -> `Reconciling` -> `Done` | `Failed`
//!
//! Faults from any task land in a shared [`ErrorSignal`]. The round loop
//! checks it after every round, sinks check it after every received block.
//! Reconciliation (truncating each file to the other's original length) runs
//! regardless of outcome and its failures are only logged.

use crate::error::{Result, SwapError};
use crate::reader::SourceFile;
use crate::sink::{BufferedSink, PositionedWrite, SinkReport};
use crate::signal::ErrorSignal;
use crate::{DEFAULT_BLOCK_SIZE, DEFAULT_QUEUE_DEPTH};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Swap tuning parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapConfig {
    /// Bytes per read call
    pub read_block_size: usize,
    /// Bytes per accumulated positioned write
    pub write_block_size: usize,
    /// Capacity of each sink's inbound queue, in blocks
    pub queue_depth: usize,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            read_block_size: DEFAULT_BLOCK_SIZE,
            write_block_size: DEFAULT_BLOCK_SIZE,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl SwapConfig {
    /// Create a config with the given block sizes and the default queue depth
    #[must_use]
    pub fn new(read_block_size: usize, write_block_size: usize) -> Self {
        Self {
            read_block_size,
            write_block_size,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }

    /// Set the queue depth
    #[must_use]
    pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth;
        self
    }

    /// Check that every parameter is at least one
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::InvalidBlockSize`] or
    /// [`SwapError::InvalidQueueDepth`].
    pub fn validate(&self) -> Result<()> {
        if self.read_block_size < 1 {
            return Err(SwapError::InvalidBlockSize(self.read_block_size));
        }
        if self.write_block_size < 1 {
            return Err(SwapError::InvalidBlockSize(self.write_block_size));
        }
        if self.queue_depth < 1 {
            return Err(SwapError::InvalidQueueDepth(self.queue_depth));
        }
        Ok(())
    }
}

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapState {
    /// Round loop in progress
    Running,
    /// Waiting for both sinks to finish
    Draining,
    /// Truncating each file to the other's original length
    Reconciling,
    /// Swap succeeded
    Done,
    /// Swap failed with the signalled error
    Failed,
}

impl fmt::Display for SwapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Reconciling => "reconciling",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Progress snapshot delivered after every round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapProgress {
    /// Rounds completed so far
    pub round: u64,
    /// Bytes read from file A and forwarded so far
    pub bytes_from_a: u64,
    /// Bytes read from file B and forwarded so far
    pub bytes_from_b: u64,
    /// Total bytes to forward (sum of both original sizes)
    pub total: u64,
}

/// Progress callback invoked from the round loop
pub type ProgressFn = Arc<dyn Fn(SwapProgress) + Send + Sync>;

/// Outcome of a successful swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapReport {
    /// Rounds executed
    pub rounds: u64,
    /// Bytes forwarded from A into B
    pub bytes_from_a: u64,
    /// Bytes forwarded from B into A
    pub bytes_from_b: u64,
    /// Length of A before the swap
    pub original_size_a: u64,
    /// Length of B before the swap
    pub original_size_b: u64,
    /// Whether both final truncations succeeded
    pub reconciled: bool,
}

/// Swap orchestrator
#[derive(Clone)]
pub struct Swapper {
    config: SwapConfig,
    progress: Option<ProgressFn>,
}

impl fmt::Debug for Swapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Swapper")
            .field("config", &self.config)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Swapper {
    /// Create an orchestrator
    ///
    /// # Errors
    ///
    /// Returns an error if the config fails [`SwapConfig::validate`].
    pub fn new(config: SwapConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            progress: None,
        })
    }

    /// Register a callback receiving a [`SwapProgress`] after every round
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(SwapProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &SwapConfig {
        &self.config
    }

    /// Exchange the contents of the files at `path_a` and `path_b`
    ///
    /// On success the file at `path_a` holds the former bytes of `path_b`,
    /// truncated or extended to `path_b`'s former length, and vice versa.
    /// On failure both files are left in whatever partially swapped state
    /// existed when the fault occurred.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by any stage. Truncation failures are
    /// not errors; see [`SwapReport::reconciled`].
    pub async fn swap<P, Q>(&self, path_a: P, path_b: Q) -> Result<SwapReport>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let reader_a = SourceFile::open(path_a, self.config.read_block_size)?;
        let reader_b = SourceFile::open(path_b, self.config.read_block_size)?;
        let target_a = reader_a.writer()?;
        let target_b = reader_b.writer()?;

        let signal = Arc::new(ErrorSignal::new());
        self.run(reader_a, reader_b, target_a, target_b, signal)
            .await
    }

    /// Run the pipeline over opened readers and explicit sink targets
    ///
    /// `target_a` must write into the file behind `reader_a`, `target_b`
    /// into the file behind `reader_b`.
    pub(crate) async fn run<W: PositionedWrite + Sync>(
        &self,
        reader_a: SourceFile,
        reader_b: SourceFile,
        target_a: W,
        target_b: W,
        signal: Arc<ErrorSignal>,
    ) -> Result<SwapReport> {
        let original_size_a = reader_a.size();
        let original_size_b = reader_b.size();

        tracing::info!(
            "Swapping {:?} ({} bytes) <-> {:?} ({} bytes), read block {}, write block {}",
            reader_a.path(),
            original_size_a,
            reader_b.path(),
            original_size_b,
            self.config.read_block_size,
            self.config.write_block_size
        );

        // Sink A writes into file A and is fed from file B, and vice versa.
        // The targets are shared so reconciliation can resize through them.
        let target_a = Arc::new(target_a);
        let target_b = Arc::new(target_b);
        let sink_a = BufferedSink::new(
            target_a.clone(),
            reader_a.path(),
            self.config.write_block_size,
        )?;
        let sink_b = BufferedSink::new(
            target_b.clone(),
            reader_b.path(),
            self.config.write_block_size,
        )?;
        let (to_sink_a, sink_a_rx) = mpsc::channel(self.config.queue_depth);
        let (to_sink_b, sink_b_rx) = mpsc::channel(self.config.queue_depth);

        let sink_a_handle = {
            let signal = signal.clone();
            tokio::task::spawn_blocking(move || sink_a.run(sink_a_rx, signal))
        };
        let sink_b_handle = {
            let signal = signal.clone();
            tokio::task::spawn_blocking(move || sink_b.run(sink_b_rx, signal))
        };

        let mut state = SwapState::Running;
        tracing::debug!("Swap state: {}", state);

        let rounds_handle = {
            let signal = signal.clone();
            let progress = self.progress.clone();
            tokio::task::spawn_blocking(move || {
                let mut rounds = RoundLoop {
                    reader_a,
                    reader_b,
                    to_sink_a: Some(to_sink_a),
                    to_sink_b: Some(to_sink_b),
                    signal,
                    progress,
                    stats: RoundStats::default(),
                };
                rounds.run();
                (rounds.reader_a, rounds.reader_b, rounds.stats)
            })
        };

        let rounds_outcome = rounds_handle.await;

        transition(&mut state, SwapState::Draining);
        let sink_a_report = join_sink(sink_a_handle, &signal).await;
        let sink_b_report = join_sink(sink_b_handle, &signal).await;

        let (reader_a, reader_b, stats) = match rounds_outcome {
            Ok(parts) => parts,
            Err(e) => {
                // Readers are lost with the panicked task; nothing to reconcile
                let err = SwapError::Task(format!("round loop: {e}"));
                tracing::error!("Swap failed: {}", err);
                signal.raise(err);
                transition(&mut state, SwapState::Failed);
                return Err(signal.error().unwrap_or_else(|| SwapError::Task(e.to_string())));
            }
        };

        tracing::debug!(
            "Sinks drained: A wrote {} bytes (completed: {}), B wrote {} bytes (completed: {})",
            sink_a_report.bytes_written,
            sink_a_report.completed,
            sink_b_report.bytes_written,
            sink_b_report.completed
        );

        transition(&mut state, SwapState::Reconciling);
        let mut reconciled = true;
        for (target, path, size) in [
            (&target_a, reader_a.path(), original_size_b),
            (&target_b, reader_b.path(), original_size_a),
        ] {
            if let Err(e) = target.set_len(size) {
                let err = SwapError::truncate(path, size, e);
                tracing::warn!("Ignoring failed length reconciliation: {}", err);
                reconciled = false;
            }
        }

        for reader in [reader_a, reader_b] {
            let path = reader.path().to_path_buf();
            if let Err(e) = reader.close() {
                tracing::warn!("Failed to sync {:?} on close: {}", path, e);
            }
        }

        if let Some(err) = signal.error() {
            transition(&mut state, SwapState::Failed);
            tracing::error!("Swap failed after {} rounds: {}", stats.rounds, err);
            return Err(err);
        }

        transition(&mut state, SwapState::Done);
        tracing::info!(
            "Swap complete: {} rounds, {} + {} bytes exchanged",
            stats.rounds,
            stats.bytes_from_a,
            stats.bytes_from_b
        );

        Ok(SwapReport {
            rounds: stats.rounds,
            bytes_from_a: stats.bytes_from_a,
            bytes_from_b: stats.bytes_from_b,
            original_size_a,
            original_size_b,
            reconciled,
        })
    }
}

/// Exchange the contents of two files with the given configuration
///
/// Shorthand for [`Swapper::new`] followed by [`Swapper::swap`].
///
/// # Errors
///
/// See [`Swapper::swap`].
pub async fn swap_files<P, Q>(path_a: P, path_b: Q, config: &SwapConfig) -> Result<SwapReport>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    Swapper::new(*config)?.swap(path_a, path_b).await
}

fn transition(state: &mut SwapState, next: SwapState) {
    tracing::debug!("Swap state: {} -> {}", state, next);
    *state = next;
}

async fn join_sink(
    handle: tokio::task::JoinHandle<SinkReport>,
    signal: &ErrorSignal,
) -> SinkReport {
    match handle.await {
        Ok(report) => report,
        Err(e) => {
            signal.raise(SwapError::Task(format!("sink: {e}")));
            SinkReport::default()
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RoundStats {
    rounds: u64,
    bytes_from_a: u64,
    bytes_from_b: u64,
}

/// Reader/forwarder stage: runs on a blocking thread
struct RoundLoop {
    reader_a: SourceFile,
    reader_b: SourceFile,
    to_sink_a: Option<mpsc::Sender<Vec<u8>>>,
    to_sink_b: Option<mpsc::Sender<Vec<u8>>>,
    signal: Arc<ErrorSignal>,
    progress: Option<ProgressFn>,
    stats: RoundStats,
}

impl RoundLoop {
    fn run(&mut self) {
        let total = self.reader_a.size() + self.reader_b.size();

        while !self.reader_a.at_end() || !self.reader_b.at_end() {
            self.stats.rounds += 1;

            // Read both sides before forwarding either
            let block_a = match read_side(&mut self.reader_a) {
                Ok(block) => block,
                Err(e) => {
                    self.signal.raise(e);
                    break;
                }
            };
            let block_b = match read_side(&mut self.reader_b) {
                Ok(block) => block,
                Err(e) => {
                    self.signal.raise(e);
                    break;
                }
            };

            tracing::trace!(
                "Round {}: {} bytes from A, {} bytes from B",
                self.stats.rounds,
                block_a.as_ref().map_or(0, Vec::len),
                block_b.as_ref().map_or(0, Vec::len)
            );

            let a_len = block_a.as_ref().map_or(0, Vec::len) as u64;
            let b_len = block_b.as_ref().map_or(0, Vec::len) as u64;

            if !forward(
                &mut self.to_sink_b,
                block_a,
                self.reader_a.at_end(),
                self.reader_b.path(),
                &self.signal,
            ) || !forward(
                &mut self.to_sink_a,
                block_b,
                self.reader_b.at_end(),
                self.reader_a.path(),
                &self.signal,
            ) {
                break;
            }

            self.stats.bytes_from_a += a_len;
            self.stats.bytes_from_b += b_len;

            if self.signal.is_raised() {
                tracing::debug!("Fault observed after round {}", self.stats.rounds);
                break;
            }

            if let Some(progress) = &self.progress {
                progress(SwapProgress {
                    round: self.stats.rounds,
                    bytes_from_a: self.stats.bytes_from_a,
                    bytes_from_b: self.stats.bytes_from_b,
                    total,
                });
            }
        }

        // Closing the queues tells the sinks no more input is coming
        self.to_sink_a.take();
        self.to_sink_b.take();
    }
}

/// Read one block from a side that has not reached end-of-stream
fn read_side(reader: &mut SourceFile) -> Result<Option<Vec<u8>>> {
    if reader.at_end() {
        return Ok(None);
    }
    // The reader reuses its buffer, so the block is copied out here
    reader.read_block().map(|bytes| Some(bytes.to_vec()))
}

/// Send a block to a sink, closing the queue once its source is exhausted
///
/// Returns `false` if the sink has gone away or a fault is already signalled.
fn forward(
    queue: &mut Option<mpsc::Sender<Vec<u8>>>,
    block: Option<Vec<u8>>,
    source_at_end: bool,
    destination: &Path,
    signal: &ErrorSignal,
) -> bool {
    if let (Some(tx), Some(block)) = (queue.as_ref(), block) {
        if signal.is_raised() {
            return false;
        }
        if !block.is_empty() && tx.blocking_send(block).is_err() {
            // A sink only exits early on a fault, which it deposits first
            if !signal.is_raised() {
                signal.raise(SwapError::SinkClosed {
                    path: destination.to_path_buf(),
                });
            }
            return false;
        }
    }

    if source_at_end {
        queue.take();
    }
    true
}
