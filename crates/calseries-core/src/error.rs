//! Error types and SNAFU context selectors for the query pipeline.
//!
//! Each stage owns one enum (`LocateError`, `LoadError`, `MergeError`,
//! `OutputError`) and [`QueryError`] aggregates them for the public entry
//! point. Selectors are `pub(crate)` so stages can attach context without
//! re-exporting them at the crate root. Every failure aborts the whole
//! query; there is no skip-and-continue path.

use std::{io, path::PathBuf};

use arrow::error::ArrowError;
use chrono::{DateTime, Utc};
use snafu::{Backtrace, prelude::*};

use crate::continuity::Gap;

/// Errors raised while walking the directory tree.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LocateError {
    /// The query root does not exist.
    #[snafu(display("Data folder not found: {}", path.display()))]
    RootNotFound {
        /// Root folder given by the caller.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// A directory could not be listed.
    #[snafu(display("Failed to list directory {}: {source}", path.display()))]
    ReadDir {
        /// Directory being listed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Errors raised while reading one calibrated file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LoadError {
    /// The file does not exist.
    #[snafu(display("Calibrated file not found: {}", path.display()))]
    NotFound {
        /// Path that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// Any other I/O failure while opening or rewinding the file.
    #[snafu(display("Local I/O error at {}: {source}", path.display()))]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The CSV reader rejected the file.
    #[snafu(display("Failed to read CSV {}: {source}", path.display()))]
    Csv {
        /// Path being read.
        path: PathBuf,
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// The header has no time column.
    #[snafu(display("Missing time column {column} in {}", path.display()))]
    MissingTimeColumn {
        /// Path being read.
        path: PathBuf,
        /// Name of the expected column.
        column: String,
    },

    /// A time value does not follow the fixed timestamp format.
    #[snafu(display(
        "Unparseable time value {value:?} at data row {row} of {} (expected {format})",
        path.display()
    ))]
    TimeParse {
        /// Path being read.
        path: PathBuf,
        /// Zero-based data row (header excluded).
        row: usize,
        /// Raw cell content, `<null>` for empty cells.
        value: String,
        /// chrono format the value was checked against.
        format: &'static str,
    },
}

/// Errors raised while merging a candidate list.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MergeError {
    /// A gap larger than the inferred cadence exists between candidates.
    #[snafu(display(
        "Continuity problem: {} -> {} is {} min apart, cadence is {cadence_minutes} min \
         ({violations} gap(s) in total)",
        gap.before.display(),
        gap.after.display(),
        gap.size.num_minutes()
    ))]
    Continuity {
        /// First offending gap.
        gap: Gap,
        /// Inferred cadence in whole minutes.
        cadence_minutes: i64,
        /// Number of offending gaps.
        violations: usize,
    },

    /// Loading one of the candidates failed.
    #[snafu(display("Failed to load candidate: {source}"))]
    Load {
        /// Underlying load error.
        #[snafu(source(from(LoadError, Box::new)))]
        source: Box<LoadError>,
    },

    /// Arrow compute or conversion error while assembling the result.
    #[snafu(display("Arrow error while merging: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// The merged span deviates from the requested one beyond tolerance.
    #[snafu(display(
        "Merged span is {achieved_minutes:.2} min but {requested_minutes:.2} min were requested \
         (tolerance ±{:.0}%)",
        tolerance * 100.0
    ))]
    DurationMismatch {
        /// Requested `stop - start` in minutes.
        requested_minutes: f64,
        /// `max(time) - min(time)` of the sliced result in minutes.
        achieved_minutes: f64,
        /// Relative tolerance that was applied.
        tolerance: f64,
    },
}

/// Errors raised while writing a merged table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum OutputError {
    /// Filesystem failure creating, syncing or renaming the output.
    #[snafu(display("Local I/O error at {}: {source}", path.display()))]
    OutputIo {
        /// Path being written.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The CSV writer rejected the table.
    #[snafu(display("Failed to write CSV {}: {source}", path.display()))]
    CsvWrite {
        /// Path being written.
        path: PathBuf,
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

/// Errors from [`crate::query::read_calibrated_files`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QueryError {
    /// `stop < start` while the inverted-range policy is `Reject`.
    #[snafu(display("Invalid query range: start={start}, stop={stop} (expect start <= stop)"))]
    InvalidRange {
        /// Start supplied by the caller.
        start: DateTime<Utc>,
        /// Stop supplied by the caller.
        stop: DateTime<Utc>,
    },

    /// Directory traversal failed.
    #[snafu(display("Locating files failed: {source}"))]
    Locate {
        /// Underlying locate error.
        source: LocateError,
    },

    /// Validation, loading or merging failed.
    #[snafu(display("Merging files failed: {source}"))]
    Merge {
        /// Underlying merge error.
        source: MergeError,
    },
}

impl QueryError {
    /// True for the gap condition, which no retry of the same query fixes.
    pub fn is_continuity(&self) -> bool {
        matches!(
            self,
            QueryError::Merge {
                source: MergeError::Continuity { .. }
            }
        )
    }

    /// True when the merged span fell outside tolerance.
    pub fn is_duration_mismatch(&self) -> bool {
        matches!(
            self,
            QueryError::Merge {
                source: MergeError::DurationMismatch { .. }
            }
        )
    }
}
