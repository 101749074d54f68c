//! Half-open time windows and the interval test used for pruning.
//!
//! Every window in this crate is half-open: it includes `start` and excludes
//! `stop`. The same type is used for the caller's query and for the windows
//! implied by file and folder names, so a single [`TimeWindow::intersects`]
//! decides whether a file or folder is relevant.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// A half-open interval `[start, stop)` in UTC.
///
/// The invariant `start <= stop` always holds. [`TimeWindow::new`] swaps
/// inverted endpoints instead of failing; callers that want to reject
/// inverted input use [`TimeWindow::checked`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window, swapping the endpoints if `stop < start`.
    pub fn new(start: DateTime<Utc>, stop: DateTime<Utc>) -> Self {
        if stop < start {
            Self {
                start: stop,
                stop: start,
            }
        } else {
            Self { start, stop }
        }
    }

    /// Build a window, returning `None` when `stop < start`.
    pub fn checked(start: DateTime<Utc>, stop: DateTime<Utc>) -> Option<Self> {
        (start <= stop).then_some(Self { start, stop })
    }

    /// Window of `minutes` minutes starting at `start`.
    pub fn from_minutes(start: DateTime<Utc>, minutes: i64) -> Self {
        Self::new(start, start + Duration::minutes(minutes))
    }

    /// Inclusive lower bound.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive upper bound.
    pub fn stop(&self) -> DateTime<Utc> {
        self.stop
    }

    /// `stop - start`.
    pub fn duration(&self) -> Duration {
        self.stop - self.start
    }

    /// True when the window covers no instant at all.
    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    /// Half-open membership test.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.stop
    }

    /// Widen the window by `margin` on both sides.
    ///
    /// The margin absorbs skew between the timestamp encoded in a name and
    /// the timestamps actually stored in the file.
    /// Bounds saturate at the representable range.
    pub fn expand(&self, margin: Duration) -> Self {
        Self::new(
            self.start
                .checked_sub_signed(margin)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            self.stop
                .checked_add_signed(margin)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    /// Decide whether `candidate` (usually a margin-expanded file or folder
    /// window) is relevant to this query window.
    ///
    /// With `s`/`e` the candidate bounds and `S`/`E` the query bounds the
    /// candidate passes iff any of:
    ///
    /// - `s < S && e > E` (candidate strictly covers the query),
    /// - `S <= s && s < E` (candidate starts inside the query),
    /// - `S < e && e <= E` (candidate ends inside the query).
    ///
    /// A non-empty candidate ending exactly at `S` or starting exactly at `E`
    /// is rejected; margin expansion is what pulls such neighbours back in.
    pub fn intersects(&self, candidate: &TimeWindow) -> bool {
        let (s, e) = (candidate.start, candidate.stop);
        let (q_start, q_stop) = (self.start, self.stop);

        (s < q_start && e > q_stop)
            || (s >= q_start && s < q_stop)
            || (e > q_start && e <= q_stop)
    }

    /// Slice this window into consecutive sub-windows of length `step`.
    ///
    /// The last sub-window is clipped to `stop`, including when `cursor +
    /// step` is past the representable range. A non-positive `step` yields
    /// the whole window unchanged; an empty window yields nothing.
    pub fn split(&self, step: Duration) -> Vec<TimeWindow> {
        if self.is_empty() {
            return Vec::new();
        }
        if step <= Duration::zero() {
            return vec![*self];
        }

        let mut out = Vec::new();
        let mut cursor = self.start;
        while cursor < self.stop {
            let next = cursor
                .checked_add_signed(step)
                .map_or(self.stop, |next| next.min(self.stop));
            out.push(TimeWindow {
                start: cursor,
                stop: next,
            });
            cursor = next;
        }
        out
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%dT%H:%M:%S"),
            self.stop.format("%Y-%m-%dT%H:%M:%S")
        )
    }
}
