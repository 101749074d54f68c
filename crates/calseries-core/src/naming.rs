//! Filename time codec.
//!
//! Calibrated files carry their whole time window in their name, so the
//! locator can decide relevance without opening anything:
//!
//! ```text
//! <root>_<DD>M_<YYYY>_<MM>_<DD>_<HH>h<MM>m_<S>_CALIBRATED.csv
//! ```
//!
//! - `<root>` is a free-form prefix (possibly empty, possibly containing `_`).
//! - `<DD>` is the file duration in minutes (one or two digits).
//! - `<S>` is a single-digit substructure id.
//!
//! Day folders only need to contain a `YYYY_MM_DD` date somewhere in their
//! name. Both parsers return `None` for names that do not conform, including
//! names whose digits do not form a valid calendar date; callers treat that
//! as "skip", never as a failure.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::window::TimeWindow;

/// Literal marker every calibrated file name ends with (before the extension).
pub const CALIBRATED_MARKER: &str = "CALIBRATED";

/// Extension of calibrated files.
pub const CSV_EXTENSION: &str = "csv";

const FILE_SUFFIX: &str = "_CALIBRATED.csv";

/// chrono format of the minute stamp embedded in file names.
pub const STAMP_FORMAT: &str = "%Y_%m_%d_%Hh%Mm";

const DAY_FORMAT: &str = "%Y_%m_%d";

// `#` stands for an ASCII digit, everything else is literal.
const STAMP_SHAPE: &[u8] = b"####_##_##_##h##m";
const DAY_SHAPE: &[u8] = b"####_##_##";

fn matches_shape(candidate: &[u8], shape: &[u8]) -> bool {
    candidate.len() == shape.len()
        && candidate.iter().zip(shape).all(|(c, s)| match s {
            b'#' => c.is_ascii_digit(),
            lit => c == lit,
        })
}

fn parse_stamp(stamp: &str) -> Option<DateTime<Utc>> {
    if !matches_shape(stamp.as_bytes(), STAMP_SHAPE) {
        return None;
    }
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_day(day: &str) -> Option<DateTime<Utc>> {
    if !matches_shape(day.as_bytes(), DAY_SHAPE) {
        return None;
    }
    NaiveDate::parse_from_str(day, DAY_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Leftmost substring of `text` matching `shape`.
fn find_shape<'a>(text: &'a str, shape: &[u8]) -> Option<&'a str> {
    let bytes = text.as_bytes();
    if bytes.len() < shape.len() {
        return None;
    }
    (0..=bytes.len() - shape.len())
        .find(|&i| matches_shape(&bytes[i..i + shape.len()], shape))
        // The shape is pure ASCII, so both ends are char boundaries.
        .map(|i| &text[i..i + shape.len()])
}

/// Extract the minute stamp found anywhere in a file name.
///
/// Unlike [`FileDescriptor::parse`] this ignores the rest of the grammar. It
/// is what the continuity check uses to order candidate files.
pub fn find_stamp(file_name: &str) -> Option<DateTime<Utc>> {
    find_shape(file_name, STAMP_SHAPE).and_then(parse_stamp)
}

fn file_name_of(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

/// Time window and stream identity decoded from a calibrated file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Path the name was read from.
    pub path: PathBuf,
    /// Instant encoded in the name (minute resolution).
    pub window_start: DateTime<Utc>,
    /// Nominal duration of the file in minutes.
    pub duration_minutes: u32,
    /// Substructure (data stream) id.
    pub substructure_id: u8,
    /// Free-form prefix before the duration field.
    pub root_name: String,
}

impl FileDescriptor {
    /// Parse the final component of `path`.
    ///
    /// When `expected_root` is a non-empty string only names whose prefix is
    /// exactly that root qualify; `None` or `Some("")` accepts any prefix.
    pub fn parse(path: impl Into<PathBuf>, expected_root: Option<&str>) -> Option<Self> {
        let path = path.into();
        let name = file_name_of(&path)?;

        // <root>_<DD>M_<stamp>_<S>
        let rest = name.strip_suffix(FILE_SUFFIX)?;

        let (rest, substructure) = rest.rsplit_once('_')?;
        if !matches_shape(substructure.as_bytes(), b"#") {
            return None;
        }
        let substructure_id = substructure.parse().ok()?;

        let split = rest.len().checked_sub(STAMP_SHAPE.len())?;
        if !rest.is_char_boundary(split) {
            return None;
        }
        let (rest, stamp) = rest.split_at(split);
        let window_start = parse_stamp(stamp)?;

        let rest = rest.strip_suffix("M_")?;
        let (root_name, duration) = rest.rsplit_once('_')?;
        let duration_ok = matches_shape(duration.as_bytes(), b"#")
            || matches_shape(duration.as_bytes(), b"##");
        if !duration_ok {
            return None;
        }
        let duration_minutes = duration.parse().ok()?;

        if expected_root.is_some_and(|root| !root.is_empty() && root != root_name) {
            return None;
        }

        let root_name = root_name.to_string();
        Some(Self {
            path,
            window_start,
            duration_minutes,
            substructure_id,
            root_name,
        })
    }

    /// `[window_start, window_start + duration)`.
    pub fn window(&self) -> TimeWindow {
        TimeWindow::from_minutes(self.window_start, i64::from(self.duration_minutes))
    }

    /// Render the canonical file name for this descriptor.
    pub fn file_name(&self) -> String {
        format_file_name(
            &self.root_name,
            self.window_start,
            i64::from(self.duration_minutes),
            self.substructure_id,
        )
    }
}

/// Render a calibrated file name.
///
/// Durations of three digits or more are written as-is; such names are valid
/// output but will not be picked up again by [`FileDescriptor::parse`].
pub fn format_file_name(
    root_name: &str,
    window_start: DateTime<Utc>,
    duration_minutes: i64,
    substructure_id: u8,
) -> String {
    format!(
        "{root_name}_{duration_minutes}M_{}_{substructure_id}_{CALIBRATED_MARKER}.{CSV_EXTENSION}",
        window_start.format(STAMP_FORMAT)
    )
}

/// A day folder (`YYYY_MM_DD` anywhere in its name).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderDescriptor {
    /// Path the name was read from.
    pub path: PathBuf,
    /// Midnight of the encoded day.
    pub day_start: DateTime<Utc>,
}

impl FolderDescriptor {
    /// Parse the final component of `path`.
    pub fn parse(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let day_start = file_name_of(&path)
            .and_then(|name| find_shape(name, DAY_SHAPE))
            .and_then(parse_day)?;
        Some(Self { path, day_start })
    }

    /// `[day_start, day_start + 1 day)`.
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.day_start, self.day_start + Duration::days(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ymd_hm(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn parses_full_file_name() {
        let fd = FileDescriptor::parse(
            "/data/2023_12_15/slkpontlagnieu_20M_2023_12_15_10h05m_2_CALIBRATED.csv",
            None,
        )
        .expect("conforming name");

        assert_eq!(fd.root_name, "slkpontlagnieu");
        assert_eq!(fd.duration_minutes, 20);
        assert_eq!(fd.substructure_id, 2);
        assert_eq!(fd.window_start, ymd_hm(2023, 12, 15, 10, 5));
        assert_eq!(
            fd.window(),
            TimeWindow::new(ymd_hm(2023, 12, 15, 10, 5), ymd_hm(2023, 12, 15, 10, 25))
        );
    }

    #[test]
    fn root_may_be_empty_or_contain_underscores() {
        let empty =
            FileDescriptor::parse("_1M_2024_01_01_00h00m_0_CALIBRATED.csv", None).unwrap();
        assert_eq!(empty.root_name, "");

        let nested =
            FileDescriptor::parse("site_a_north_5M_2024_01_01_00h00m_0_CALIBRATED.csv", None)
                .unwrap();
        assert_eq!(nested.root_name, "site_a_north");
        assert_eq!(nested.duration_minutes, 5);
    }

    #[test]
    fn root_filter_requires_exact_match() {
        let name = "f_1M_2024_01_01_00h00m_0_CALIBRATED.csv";
        assert!(FileDescriptor::parse(name, Some("f")).is_some());
        assert!(FileDescriptor::parse(name, Some("")).is_some());
        assert!(FileDescriptor::parse(name, Some("g")).is_none());
        let longer = "xf_1M_2024_01_01_00h00m_0_CALIBRATED.csv";
        assert!(FileDescriptor::parse(longer, Some("f")).is_none());
    }

    #[test]
    fn rejects_non_conforming_names() {
        for name in [
            "notes.txt",
            "f_1M_2024_01_01_00h00m_0_CALIBRATED.txt",
            "f_1M_2024_01_01_00h00m_0_RAW.csv",
            "f_1M_2024_01_01_00h00m_12_CALIBRATED.csv",
            "f_123M_2024_01_01_00h00m_0_CALIBRATED.csv",
            "f_M_2024_01_01_00h00m_0_CALIBRATED.csv",
            "f_1m_2024_01_01_00h00m_0_CALIBRATED.csv",
            "1M_2024_01_01_00h00m_0_CALIBRATED.csv",
            "f_1M_2024_1_01_00h00m_0_CALIBRATED.csv",
            "f_1M_2024_13_01_00h00m_0_CALIBRATED.csv",
            "f_1M_2024_02_30_00h00m_0_CALIBRATED.csv",
            "f_1M_2024_01_01_24h00m_0_CALIBRATED.csv",
        ] {
            assert!(
                FileDescriptor::parse(name, None).is_none(),
                "{name} should not parse"
            );
        }
    }

    #[test]
    fn file_name_round_trips_through_parse() {
        let fd = FileDescriptor::parse("f_0M_2024_01_01_00h09m_0_CALIBRATED.csv", None).unwrap();
        assert_eq!(fd.file_name(), "f_0M_2024_01_01_00h09m_0_CALIBRATED.csv");
    }

    #[test]
    fn format_file_name_allows_long_durations() {
        let name = format_file_name("bidon", ymd_hm(2023, 12, 15, 10, 5), 120, 0);
        assert_eq!(name, "bidon_120M_2023_12_15_10h05m_0_CALIBRATED.csv");
        assert!(FileDescriptor::parse(name.as_str(), None).is_none());
    }

    #[test]
    fn parses_day_folders() {
        let fd = FolderDescriptor::parse("/data/2024_02_29").unwrap();
        assert_eq!(fd.day_start, ymd_hm(2024, 2, 29, 0, 0));
        assert_eq!(fd.window().duration(), Duration::days(1));

        let decorated = FolderDescriptor::parse("/data/raw-2024_03_01-v2").unwrap();
        assert_eq!(decorated.day_start, ymd_hm(2024, 3, 1, 0, 0));
    }

    #[test]
    fn rejects_non_day_folders() {
        assert!(FolderDescriptor::parse("/data/archive").is_none());
        assert!(FolderDescriptor::parse("/data/2023_02_29").is_none());
        assert!(FolderDescriptor::parse("/data/2024_1_01").is_none());
    }

    #[test]
    fn find_stamp_ignores_surrounding_grammar() {
        assert_eq!(
            find_stamp("anything_2024_01_01_00h05m.csv"),
            Some(ymd_hm(2024, 1, 1, 0, 5))
        );
        assert_eq!(find_stamp("no-stamp-here.csv"), None);
    }
}
