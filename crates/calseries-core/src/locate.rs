//! Windowed file locator.
//!
//! Walks a data folder recursively and collects the calibrated files whose
//! name-encoded window, widened by the configured margin, intersects the
//! query window:
//! - Entries are visited in sorted name order. Names embed zero-padded
//!   timestamps, so that order is chronological within a directory.
//! - Directories are only entered when they parse as a day folder whose
//!   (margin-widened) day intersects the query.
//! - Files must parse, carry the requested substructure id and pass the
//!   same intersection test.
//! - Once a parsed file starts (margin-widened) strictly after the query
//!   stop, the rest of that directory level is skipped. Parent levels keep
//!   iterating.
//!
//! Nothing is opened; an empty result means "no data in range" and is not
//! an error.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Duration;
use log::{debug, trace};
use snafu::prelude::*;

use crate::{
    error::{LocateError, ReadDirSnafu, RootNotFoundSnafu},
    naming::{FileDescriptor, FolderDescriptor},
    query::QueryConfig,
    window::TimeWindow,
};

/// Ordered list of selected files, chronological by naming convention.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CandidateList(Vec<PathBuf>);

impl CandidateList {
    /// Wrap an already-ordered list of paths.
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self(paths)
    }

    /// Selected paths, in traversal order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.0
    }

    /// Number of selected files.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing matched.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the selected paths.
    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.0.iter()
    }
}

impl IntoIterator for CandidateList {
    type Item = PathBuf;
    type IntoIter = std::vec::IntoIter<PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a CandidateList {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

struct Locator<'a> {
    query: TimeWindow,
    margin: Duration,
    substructure_id: u8,
    root_name: Option<&'a str>,
}

impl Locator<'_> {
    fn sorted_entries(dir: &Path) -> Result<Vec<(String, PathBuf)>, LocateError> {
        let read_dir = fs::read_dir(dir).context(ReadDirSnafu { path: dir })?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.context(ReadDirSnafu { path: dir })?;
            // Names that are not valid UTF-8 cannot follow the grammar.
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            entries.push((name, entry.path()));
        }
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    fn collect(&self, dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), LocateError> {
        for (name, path) in Self::sorted_entries(dir)? {
            if path.is_dir() {
                let Some(folder) = FolderDescriptor::parse(&path) else {
                    trace!("skipping non-day folder {}", path.display());
                    continue;
                };
                if self.query.intersects(&folder.window().expand(self.margin)) {
                    debug!("descending into {}", path.display());
                    self.collect(&path, out)?;
                } else {
                    trace!("pruned folder {name}");
                }
                continue;
            }

            let Some(file) = FileDescriptor::parse(&path, self.root_name) else {
                continue;
            };
            let expanded = file.window().expand(self.margin);

            if file.substructure_id == self.substructure_id && self.query.intersects(&expanded) {
                out.push(file.path);
            } else if expanded.start() > self.query.stop() {
                trace!("{name} starts after the query; skipping rest of {}", dir.display());
                break;
            }
        }
        Ok(())
    }
}

/// Select the files under `root` relevant to `query`.
///
/// `config` supplies the substructure id, the margin in minutes and the
/// optional root-name filter. `query` is used as given; callers normalise
/// inverted ranges beforehand (see [`crate::query::QueryConfig::window`]).
pub fn locate(
    root: &Path,
    config: &QueryConfig,
    query: &TimeWindow,
) -> Result<CandidateList, LocateError> {
    fs::metadata(root).context(RootNotFoundSnafu { path: root })?;

    let locator = Locator {
        query: *query,
        margin: Duration::minutes(i64::from(config.margin_minutes)),
        substructure_id: config.substructure_id,
        root_name: config.root_name_filter.as_deref(),
    };

    let mut out = Vec::new();
    locator.collect(root, &mut out)?;

    debug!(
        "located {} candidate(s) under {} for {query}",
        out.len(),
        root.display()
    );
    Ok(CandidateList::new(out))
}
