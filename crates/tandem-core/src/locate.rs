//! Selection of the two files to swap.
//!
//! Candidates are regular files named after an integer key: `<digits>.log`,
//! or `-<digits>.log` when negative keys are allowed. Keys compare as
//! arbitrary-precision integers, so names longer than any machine integer
//! still order correctly.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Extension every candidate file carries
pub const CANDIDATE_EXTENSION: &str = ".log";

/// File selection errors
#[derive(Debug, Error)]
pub enum LocateError {
    /// No file in the directory matches the naming rule
    #[error("there are no files that fit the conditions ([-][0-9]*.log or [0-9]*.log)")]
    NoFiles,

    /// Only one matching file
    #[error("there are not enough files (at least 2) that match the conditions")]
    NotEnoughFiles,

    /// Directory could not be read
    #[error("cannot read directory: {0}")]
    Io(#[from] io::Error),
}

/// Integer key parsed from a candidate file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileKey {
    negative: bool,
    magnitude: String,
    name: String,
}

impl FileKey {
    /// Parse a file name
    ///
    /// Returns `None` if the name does not match the naming rule, including
    /// negative names when `allow_negative` is off.
    #[must_use]
    pub fn parse(name: &str, allow_negative: bool) -> Option<Self> {
        let stem = name.strip_suffix(CANDIDATE_EXTENSION)?;
        let (negative, digits) = match stem.strip_prefix('-') {
            Some(rest) if allow_negative => (true, rest),
            Some(_) => return None,
            None => (false, stem),
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let trimmed = digits.trim_start_matches('0');
        let magnitude = if trimmed.is_empty() { "0" } else { trimmed };

        Some(Self {
            // -0 is zero
            negative: negative && magnitude != "0",
            magnitude: magnitude.to_string(),
            name: name.to_string(),
        })
    }

    /// Original file name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the key is below zero
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    fn cmp_magnitude(&self, other: &Self) -> Ordering {
        self.magnitude
            .len()
            .cmp(&other.magnitude.len())
            .then_with(|| self.magnitude.cmp(&other.magnitude))
    }

    /// Numeric comparison ignoring the file name
    #[must_use]
    pub fn cmp_value(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, false) => self.cmp_magnitude(other),
            (true, true) => other.cmp_magnitude(self),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
        }
    }
}

impl Ord for FileKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_value(other)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for FileKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Find the files with the smallest and largest keys in `dir`
///
/// Directories and non-matching names are skipped. Returns the bare file
/// names `(min, max)`.
///
/// # Errors
///
/// Returns [`LocateError::NoFiles`] if nothing matches,
/// [`LocateError::NotEnoughFiles`] if exactly one file matches, and
/// [`LocateError::Io`] if the directory cannot be listed.
pub fn find_extremes<P: AsRef<Path>>(
    dir: P,
    allow_negative: bool,
) -> Result<(String, String), LocateError> {
    let mut min: Option<FileKey> = None;
    let mut max: Option<FileKey> = None;
    let mut count = 0usize;

    for entry in fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let Some(key) = FileKey::parse(&name, allow_negative) else {
            continue;
        };

        count += 1;
        if min.as_ref().is_none_or(|m| key < *m) {
            min = Some(key.clone());
        }
        if max.as_ref().is_none_or(|m| key > *m) {
            max = Some(key);
        }
    }

    tracing::debug!(
        "Scanned {:?}: {} candidate files (negative names allowed: {})",
        dir.as_ref(),
        count,
        allow_negative
    );

    match (min, max) {
        (Some(min), Some(max)) if min != max => Ok((min.name, max.name)),
        (Some(_), Some(_)) => Err(LocateError::NotEnoughFiles),
        _ => Err(LocateError::NoFiles),
    }
}
