//! Continuity check over a candidate list.
//!
//! The nominal cadence is not configured anywhere: deployments mix file
//! durations, so the smallest gap between consecutive start instants is taken
//! as the cadence and any larger gap means at least one file is missing.
//!
//! Start instants are re-read from the file names (see
//! [`crate::naming::find_stamp`]); names without a stamp are ignored. The
//! list is checked in the order given, which for locator output is
//! chronological.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};

use crate::naming::find_stamp;

/// A gap that exceeds the inferred cadence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gap {
    /// File on the earlier side of the gap.
    pub before: PathBuf,
    /// File on the later side of the gap.
    pub after: PathBuf,
    /// Distance between the two start instants.
    pub size: Duration,
}

/// Outcome of [`continuity_report`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContinuityReport {
    /// Minimum gap between consecutive stamps, `None` with fewer than two.
    pub cadence: Option<Duration>,
    /// First gap strictly larger than `cadence`.
    pub first_violation: Option<Gap>,
    /// Number of gaps strictly larger than `cadence`.
    pub violations: usize,
}

impl ContinuityReport {
    /// True when no gap exceeds the cadence.
    pub fn is_continuous(&self) -> bool {
        self.violations == 0
    }
}

/// Compute the cadence and every gap violating it.
pub fn continuity_report<P: AsRef<Path>>(paths: &[P]) -> ContinuityReport {
    let stamped: Vec<(&Path, DateTime<Utc>)> = paths
        .iter()
        .filter_map(|path| {
            let path: &Path = path.as_ref();
            let name = path.file_name()?.to_str()?;
            find_stamp(name).map(|ts| (path, ts))
        })
        .collect();

    let gaps: Vec<Duration> = stamped.windows(2).map(|w| w[1].1 - w[0].1).collect();

    let Some(cadence) = gaps.iter().min().copied() else {
        return ContinuityReport {
            cadence: None,
            first_violation: None,
            violations: 0,
        };
    };

    let mut violations = gaps.iter().enumerate().filter(|(_, gap)| **gap > cadence);
    let first_violation = violations.next().map(|(i, gap)| Gap {
        before: stamped[i].0.to_path_buf(),
        after: stamped[i + 1].0.to_path_buf(),
        size: *gap,
    });
    let violations = first_violation.as_ref().map_or(0, |_| 1 + violations.count());

    ContinuityReport {
        cadence: Some(cadence),
        first_violation,
        violations,
    }
}

/// True when no gap between consecutive candidates exceeds the smallest one.
///
/// Zero or one candidate is trivially continuous.
pub fn is_continuous<P: AsRef<Path>>(paths: &[P]) -> bool {
    continuity_report(paths).is_continuous()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(minutes: &[u32]) -> Vec<PathBuf> {
        minutes
            .iter()
            .map(|m| {
                PathBuf::from(format!(
                    "f_1M_2024_01_01_{:02}h{:02}m_0_CALIBRATED.csv",
                    m / 60,
                    m % 60
                ))
            })
            .collect()
    }

    #[test]
    fn short_lists_are_continuous() {
        let empty: Vec<PathBuf> = Vec::new();
        assert!(is_continuous(&empty));
        assert!(is_continuous(&names(&[5])));
        assert_eq!(continuity_report(&names(&[5])).cadence, None);
    }

    #[test]
    fn uniform_spacing_is_continuous() {
        let report = continuity_report(&names(&[0, 10, 20, 30, 40]));
        assert!(report.is_continuous());
        assert_eq!(report.cadence, Some(Duration::minutes(10)));
    }

    #[test]
    fn one_double_gap_is_discontinuous() {
        let paths = names(&[0, 10, 20, 40, 50]);
        let report = continuity_report(&paths);
        assert!(!report.is_continuous());
        assert_eq!(report.violations, 1);

        let gap = report.first_violation.expect("gap reported");
        assert_eq!(gap.before, paths[2]);
        assert_eq!(gap.after, paths[3]);
        assert_eq!(gap.size, Duration::minutes(20));
    }

    #[test]
    fn cadence_is_the_smallest_gap_anywhere() {
        // A single tight pair makes every regular gap look too wide.
        let report = continuity_report(&names(&[0, 10, 20, 25, 35]));
        assert_eq!(report.cadence, Some(Duration::minutes(5)));
        assert_eq!(report.violations, 3);
    }

    #[test]
    fn duplicate_stamps_make_cadence_zero() {
        let mut paths = names(&[0, 1, 2]);
        paths.push(PathBuf::from("g_1M_2024_01_01_00h02m_0_CALIBRATED.csv"));
        assert!(!is_continuous(&paths));
    }

    #[test]
    fn names_without_stamp_are_ignored() {
        let mut paths = names(&[0, 1]);
        paths.insert(1, PathBuf::from("README.md"));
        paths.extend(names(&[2]));
        assert!(is_continuous(&paths));
    }
}
