use std::path::PathBuf;

use calseries_core::{QueryError, error::LocateError, error::OutputError};
use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display(
        "Invalid instant '{value}'. \
         Expected YYYY-MM-DDTHH:MM[:SS[.f]][Z] or 'YYYY-MM-DD HH:MM[:SS]'."
    ))]
    InvalidInstant { value: String },

    #[snafu(display("Failed to read config file {}: {source}", path.display()))]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Invalid config file {}: {source}", path.display()))]
    ParseConfig {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Invalid --split-minutes {minutes}: expected a positive minute count"))]
    InvalidSplit { minutes: i64 },

    #[snafu(display("--split-minutes requires --output-dir"))]
    SplitWithoutOutputDir,

    #[snafu(display("Failed to build worker pool: {source}"))]
    ThreadPool {
        source: rayon::ThreadPoolBuildError,
    },

    #[snafu(display("{source}"))]
    Locate {
        #[snafu(source(from(LocateError, Box::new)))]
        source: Box<LocateError>,
    },

    #[snafu(display("{source}"))]
    Query {
        #[snafu(source(from(QueryError, Box::new)))]
        source: Box<QueryError>,
    },

    #[snafu(display("{source}"))]
    Output {
        #[snafu(source(from(OutputError, Box::new)))]
        source: Box<OutputError>,
    },

    #[snafu(display("Failed to format preview: {source}"))]
    Preview {
        source: arrow::error::ArrowError,
    },

    #[snafu(display("Candidate files are not continuous ({violations} gap(s))"))]
    Discontinuous { violations: usize },

    #[snafu(display("{failed} of {total} window(s) failed"))]
    WindowsFailed { failed: usize, total: usize },
}
