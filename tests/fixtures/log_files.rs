//! Log-shaped file fixtures
//!
//! Files are filled with 80-column lines of a single letter and end with a
//! short marker, so a misplaced block shows up as a wrong letter or a
//! missing marker.
//!
//! ```no_run
//! use tandem_integration_tests::fixtures::{LogDir, log_pattern};
//!
//! let dir = LogDir::new();
//! let small = dir.write("1.log", &log_pattern(32 * 1024 + 77, b'a', b"end"));
//! let large = dir.write("9.log", &log_pattern(36 * 1024 + 77, b'b', b"3n6"));
//! ```

use rand::RngCore;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Width of one generated line, terminator included
pub const LINE_WIDTH: usize = 80;

/// Build `size` bytes of `fill` lines ending in `marker`
///
/// Every line is `LINE_WIDTH` bytes wide and terminated by `\r\n`. The
/// marker overwrites the final bytes; it is truncated when `size` is
/// shorter than the marker.
pub fn log_pattern(size: usize, fill: u8, marker: &[u8]) -> Vec<u8> {
    let mut data: Vec<u8> = (0..size)
        .map(|i| match i % LINE_WIDTH {
            78 => b'\r',
            79 => b'\n',
            _ => fill,
        })
        .collect();

    let marker = &marker[marker.len().saturating_sub(size)..];
    let start = size - marker.len();
    data[start..].copy_from_slice(marker);
    data
}

/// Random bytes, for content where every byte value matters
pub fn random_bytes(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

/// Temporary directory of candidate files
pub struct LogDir {
    dir: TempDir,
}

impl LogDir {
    /// Create an empty directory
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    /// Directory path
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `data` to `name` and return the full path
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, data).expect("Failed to write fixture file");
        path
    }

    /// Read `name` back
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be read.
    pub fn read(&self, name: &str) -> Vec<u8> {
        std::fs::read(self.dir.path().join(name)).expect("Failed to read fixture file")
    }
}

impl Default for LogDir {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_pattern_shape() {
        let data = log_pattern(200, b'a', b"end");
        assert_eq!(data.len(), 200);
        assert_eq!(&data[78..80], b"\r\n");
        assert_eq!(&data[158..160], b"\r\n");
        assert_eq!(data[0], b'a');
        assert!(data.ends_with(b"end"));
    }

    #[test]
    fn test_log_pattern_shorter_than_marker() {
        assert_eq!(log_pattern(2, b'b', b"3n6"), b"n6");
        assert!(log_pattern(0, b'b', b"3n6").is_empty());
    }

    #[test]
    fn test_log_dir_roundtrip() {
        let dir = LogDir::new();
        let path = dir.write("5.log", b"hello");
        assert!(path.starts_with(dir.path()));
        assert_eq!(dir.read("5.log"), b"hello");
    }
}
