//! Public query entry point and its configuration.

use std::path::Path;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    error::{InvalidRangeSnafu, LocateSnafu, MergeSnafu, QueryError},
    locate::locate,
    merge::{DEFAULT_DURATION_TOLERANCE, merge},
    table::MergedTable,
    window::TimeWindow,
};

/// What to do when the caller passes `stop < start`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvertedRangePolicy {
    /// Swap the endpoints and log a warning.
    #[default]
    Swap,
    /// Fail with [`QueryError::InvalidRange`].
    Reject,
}

/// Knobs for a query.
///
/// Every field has a default, so a partial JSON document deserializes:
///
/// ```
/// use calseries_core::QueryConfig;
///
/// let cfg: QueryConfig = serde_json::from_str(r#"{ "margin_minutes": 5 }"#).unwrap();
/// assert_eq!(cfg.margin_minutes, 5);
/// assert_eq!(cfg.substructure_id, 0);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Only files carrying this substructure id are selected.
    pub substructure_id: u8,
    /// Minutes added on both sides of every file and folder window.
    pub margin_minutes: u32,
    /// When set (and non-empty), only files with this root name are selected.
    pub root_name_filter: Option<String>,
    /// Handling of `stop < start`.
    pub inverted_range: InvertedRangePolicy,
    /// Relative tolerance on the merged span.
    pub duration_tolerance: f64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            substructure_id: 0,
            margin_minutes: 1,
            root_name_filter: None,
            inverted_range: InvertedRangePolicy::default(),
            duration_tolerance: DEFAULT_DURATION_TOLERANCE,
        }
    }
}

impl QueryConfig {
    /// Set the substructure id.
    pub fn with_substructure_id(mut self, id: u8) -> Self {
        self.substructure_id = id;
        self
    }

    /// Set the margin in minutes.
    pub fn with_margin_minutes(mut self, minutes: u32) -> Self {
        self.margin_minutes = minutes;
        self
    }

    /// Set or clear the root-name filter.
    pub fn with_root_name_filter(mut self, root: Option<String>) -> Self {
        self.root_name_filter = root;
        self
    }

    /// Set the inverted-range policy.
    pub fn with_inverted_range(mut self, policy: InvertedRangePolicy) -> Self {
        self.inverted_range = policy;
        self
    }

    /// Set the relative span tolerance.
    pub fn with_duration_tolerance(mut self, tolerance: f64) -> Self {
        self.duration_tolerance = tolerance;
        self
    }

    /// Build the query window, applying [`QueryConfig::inverted_range`].
    pub fn window(
        &self,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Result<TimeWindow, QueryError> {
        if let Some(window) = TimeWindow::checked(start, stop) {
            return Ok(window);
        }
        match self.inverted_range {
            InvertedRangePolicy::Swap => {
                warn!("stop {stop} is before start {start}; swapping");
                Ok(TimeWindow::new(start, stop))
            }
            InvertedRangePolicy::Reject => InvalidRangeSnafu { start, stop }.fail(),
        }
    }
}

/// Read every calibrated file under `root` covering `[start, stop)` and
/// merge them into a single deduplicated table.
///
/// Steps: normalise the range, [`locate`] candidates, then
/// [`merge`](crate::merge::merge) them. No candidate yields an empty table.
///
/// # Errors
///
/// See [`QueryError`]. Every failure aborts the query.
pub fn read_calibrated_files(
    root: &Path,
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
    config: &QueryConfig,
) -> Result<MergedTable, QueryError> {
    let window = config.window(start, stop)?;
    let candidates = locate(root, config, &window).context(LocateSnafu)?;
    let merged = merge(&candidates, &window, config.duration_tolerance).context(MergeSnafu)?;

    info!(
        "{window}: {} file(s), {} row(s) from {}",
        candidates.len(),
        merged.num_rows(),
        root.display()
    );
    Ok(merged)
}
