//! # Tandem Core
//!
//! Swap engine for Tandem: exchanges the contents of two files in place
//! without holding either one in memory.
//!
//! This crate provides:
//! - Offset-tracked block reader with captured file length
//! - Buffered sink issuing fixed-size positioned writes
//! - First-error-wins signal shared across pipeline tasks
//! - Round-based swap orchestrator with length reconciliation
//! - Selection of the min/max numbered files in a directory
//!
//! ```no_run
//! # async fn demo() -> tandem_core::Result<()> {
//! use tandem_core::{SwapConfig, swap_files};
//!
//! let report = swap_files("data/1.log", "data/9.log", &SwapConfig::new(64 * 1024, 64 * 1024)).await?;
//! println!("{} rounds", report.rounds);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod locate;
pub mod reader;
pub mod signal;
pub mod sink;
pub mod swap;

pub use error::{Result, SwapError};
pub use locate::{FileKey, LocateError, find_extremes};
pub use reader::SourceFile;
pub use signal::ErrorSignal;
pub use sink::{BufferedSink, PositionedWrite, SinkReport};
pub use swap::{SwapConfig, SwapProgress, SwapReport, SwapState, Swapper, swap_files};

/// Default read and write block size (64 KiB)
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Default capacity of each sink queue, in blocks
pub const DEFAULT_QUEUE_DEPTH: usize = 2;
