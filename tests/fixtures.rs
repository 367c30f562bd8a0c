//! Test fixtures

pub mod log_files;

pub use log_files::{LogDir, log_pattern};
