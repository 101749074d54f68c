//! Core engine for querying minute-stamped calibrated CSV files.
//!
//! Measurement data is persisted as one CSV file per short time window, named
//! (and optionally grouped into day folders) by timestamp. This crate turns an
//! arbitrary `[start, stop)` query into a single contiguous table:
//!
//! - Filename codec that reads the time window encoded in file and folder
//!   names without opening the files (`naming` module).
//! - A windowed locator that walks the directory tree, pruning day folders
//!   and selecting files whose margin-expanded window intersects the query
//!   (`locate` module).
//! - A continuity validator that rejects candidate lists with missing files
//!   before any expensive read happens (`continuity` module).
//! - A CSV loader producing Arrow record batches indexed by the `time`
//!   column (`loader` module).
//! - A merge engine that concatenates, deduplicates, slices and cross-checks
//!   the merged span against the requested one (`merge` module).
//!
//! [`query::read_calibrated_files`] wires these stages together; the
//! `output` module serialises a result back to the same on-disk convention.
#![deny(missing_docs)]
pub mod continuity;
pub mod error;
pub mod loader;
pub mod locate;
pub mod merge;
pub mod naming;
pub mod output;
pub mod query;
pub mod table;
pub mod window;

pub use error::QueryError;
pub use locate::CandidateList;
pub use query::{InvertedRangePolicy, QueryConfig, read_calibrated_files};
pub use table::MergedTable;
pub use window::TimeWindow;
