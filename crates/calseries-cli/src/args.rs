//! Shared query flags and their conversion to a [`QueryConfig`].

use std::path::{Path, PathBuf};

use calseries_core::{InvertedRangePolicy, QueryConfig, TimeWindow};
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::Args;
use snafu::prelude::*;

use crate::error::{CliResult, InvalidInstantSnafu, ParseConfigSnafu, QuerySnafu, ReadConfigSnafu};

const INSTANT_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse a UTC instant given on the command line. A trailing `Z` is allowed.
pub fn parse_instant(value: &str) -> CliResult<DateTime<Utc>> {
    let trimmed = value.trim();
    let naive = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    INSTANT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .map(|dt| dt.and_utc())
        .context(InvalidInstantSnafu { value })
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Root data folder
    #[arg(long)]
    pub folder: PathBuf,

    /// Inclusive start, e.g. 2024-01-01T00:00
    #[arg(long)]
    pub start: String,

    /// Exclusive stop
    #[arg(long)]
    pub stop: String,

    /// Substructure id (default 0)
    #[arg(long)]
    pub substructure: Option<u8>,

    /// Margin in minutes applied to file and folder windows (default 1)
    #[arg(long)]
    pub margin: Option<u32>,

    /// Only select files with this root name
    #[arg(long = "root-name")]
    pub root_name: Option<String>,

    /// Fail instead of swapping when stop is before start
    #[arg(long, default_value_t = false)]
    pub reject_inverted: bool,

    /// Relative tolerance on the merged span (default 0.1)
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// JSON file with a QueryConfig; flags override its fields
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn read_config(path: &Path) -> CliResult<QueryConfig> {
    let text = std::fs::read_to_string(path).context(ReadConfigSnafu { path })?;
    serde_json::from_str(&text).context(ParseConfigSnafu { path })
}

impl QueryArgs {
    pub fn query_config(&self) -> CliResult<QueryConfig> {
        let mut cfg = match &self.config {
            Some(path) => read_config(path)?,
            None => QueryConfig::default(),
        };

        if let Some(id) = self.substructure {
            cfg = cfg.with_substructure_id(id);
        }
        if let Some(margin) = self.margin {
            cfg = cfg.with_margin_minutes(margin);
        }
        if self.root_name.is_some() {
            cfg = cfg.with_root_name_filter(self.root_name.clone());
        }
        if self.reject_inverted {
            cfg = cfg.with_inverted_range(InvertedRangePolicy::Reject);
        }
        if let Some(tolerance) = self.tolerance {
            cfg = cfg.with_duration_tolerance(tolerance);
        }
        Ok(cfg)
    }

    pub fn window(&self, cfg: &QueryConfig) -> CliResult<TimeWindow> {
        let start = parse_instant(&self.start)?;
        let stop = parse_instant(&self.stop)?;
        cfg.window(start, stop).context(QuerySnafu)
    }
}
