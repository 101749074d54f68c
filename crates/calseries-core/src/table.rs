//! Time-indexed tables.
//!
//! A table is an Arrow [`RecordBatch`] plus the position of its time index.
//! The index column is always `Timestamp(Microsecond, None)` holding UTC
//! instants; the other columns are whatever the CSV reader inferred.

use std::sync::Arc;

use arrow::{
    array::{Array, RecordBatch, TimestampMicrosecondArray},
    datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit},
};
use chrono::{DateTime, Utc};

use crate::window::TimeWindow;

/// Name of the column every calibrated file is indexed by.
pub const TIME_COLUMN: &str = "time";

/// Arrow type of the time index.
pub fn time_index_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, None)
}

pub(crate) fn micros_to_datetime(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}

/// One loaded file: a record batch indexed by [`TIME_COLUMN`].
#[derive(Clone, Debug)]
pub struct TimeTable {
    batch: RecordBatch,
    time_idx: usize,
    // Shares buffers with `batch`.
    times: TimestampMicrosecondArray,
}

impl TimeTable {
    /// Wrap `batch`, returning `None` unless column `time_idx` has the time
    /// index type.
    pub fn try_new(batch: RecordBatch, time_idx: usize) -> Option<Self> {
        let column = batch.columns().get(time_idx)?;
        if column.data_type() != &time_index_type() {
            return None;
        }
        let times = column
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()?
            .clone();
        Some(Self {
            batch,
            time_idx,
            times,
        })
    }

    pub(crate) fn from_parts(
        batch: RecordBatch,
        time_idx: usize,
        times: TimestampMicrosecondArray,
    ) -> Self {
        debug_assert_eq!(batch.column(time_idx).len(), times.len());
        Self {
            batch,
            time_idx,
            times,
        }
    }

    /// Table with only an empty time column.
    pub fn empty() -> Self {
        let schema = Arc::new(Schema::new(vec![Field::new(
            TIME_COLUMN,
            time_index_type(),
            false,
        )]));
        Self {
            batch: RecordBatch::new_empty(schema),
            time_idx: 0,
            times: TimestampMicrosecondArray::from(Vec::<i64>::new()),
        }
    }

    /// Underlying record batch.
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Schema of the underlying batch.
    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    /// Position of the time index column.
    pub fn time_index(&self) -> usize {
        self.time_idx
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    /// Time index as a typed array.
    pub fn times(&self) -> &TimestampMicrosecondArray {
        &self.times
    }

    /// Raw microsecond values of the time index.
    pub fn time_values(&self) -> &[i64] {
        &self.times.values()[..]
    }

    /// Instant of row `row`, `None` when out of bounds.
    pub fn time_at(&self, row: usize) -> Option<DateTime<Utc>> {
        self.time_values().get(row).copied().and_then(micros_to_datetime)
    }

    /// Earliest and latest instants, `None` for an empty table.
    pub fn time_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let values = self.time_values();
        let min = values.iter().min().copied()?;
        let max = values.iter().max().copied()?;
        Some((micros_to_datetime(min)?, micros_to_datetime(max)?))
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }
}

/// Result of a query: deduplicated rows inside the query window.
#[derive(Clone, Debug)]
pub struct MergedTable {
    window: TimeWindow,
    table: TimeTable,
}

impl MergedTable {
    pub(crate) fn new(window: TimeWindow, table: TimeTable) -> Self {
        Self { window, table }
    }

    /// Empty result for `window` (no candidate file).
    pub fn empty(window: TimeWindow) -> Self {
        Self::new(window, TimeTable::empty())
    }

    /// Window the table was sliced to.
    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// The merged rows.
    pub fn table(&self) -> &TimeTable {
        &self.table
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.table.num_rows()
    }

    /// True when the query produced no row.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Instants of the time index, in row order.
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.table
            .time_values()
            .iter()
            .filter_map(|v| micros_to_datetime(*v))
            .collect()
    }
}
