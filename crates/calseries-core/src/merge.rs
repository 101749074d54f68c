//! Merge a candidate list into one table.
//!
//! Pipeline:
//! 1. reject the list if [`continuity_report`] finds a gap,
//! 2. load every file in list order,
//! 3. take the union of the files' columns, widen types and concatenate,
//! 4. drop rows whose timestamp was already seen (first file wins),
//! 5. keep rows inside the half-open query window,
//! 6. compare the achieved span with the requested one.
//!
//! Row order is preserved throughout; the result is not re-sorted.

use std::{collections::HashSet, sync::Arc};

use arrow::{
    array::{
        Array, ArrayRef, BooleanArray, RecordBatch, Scalar, TimestampMicrosecondArray,
        new_null_array,
    },
    compute::{
        cast, concat_batches, filter_record_batch,
        kernels::{boolean as boolean_kernels, cmp as cmp_kernels},
    },
    datatypes::{DataType, Field, FieldRef, Schema, SchemaRef},
    error::ArrowError,
};
use chrono::Duration;
use log::{debug, warn};
use snafu::prelude::*;

use crate::{
    continuity::continuity_report,
    error::{ArrowSnafu, ContinuitySnafu, DurationMismatchSnafu, LoadSnafu, MergeError},
    loader::load_calibrated_file,
    locate::CandidateList,
    table::{MergedTable, TIME_COLUMN, TimeTable},
    window::TimeWindow,
};

/// Relative tolerance applied to the merged span by default.
pub const DEFAULT_DURATION_TOLERANCE: f64 = 0.1;

/// Common type for a column seen as `a` in one file and `b` in another.
///
/// Integers widen to floats, a column that was all-empty in one file takes
/// the other file's type, anything else falls back to text.
pub fn widen(a: &DataType, b: &DataType) -> DataType {
    match (a, b) {
        _ if a == b => a.clone(),
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            DataType::Float64
        }
        _ => DataType::Utf8,
    }
}

fn minutes(d: Duration) -> f64 {
    d.num_microseconds()
        .map_or(d.num_seconds() as f64 / 60.0, |us| us as f64 / 60_000_000.0)
}

/// Check that `achieved` lies within `tolerance` (relative) of `requested`.
pub fn check_duration(
    achieved: Duration,
    requested: Duration,
    tolerance: f64,
) -> Result<(), MergeError> {
    let achieved_minutes = minutes(achieved);
    let requested_minutes = minutes(requested);
    let lo = (1.0 - tolerance) * requested_minutes;
    let hi = (1.0 + tolerance) * requested_minutes;

    ensure!(
        achieved_minutes >= lo && achieved_minutes <= hi,
        DurationMismatchSnafu {
            requested_minutes,
            achieved_minutes,
            tolerance,
        }
    );
    Ok(())
}

/// Union of the columns of `tables`, in first-seen order.
///
/// A column missing from some file becomes nullable and is filled with
/// nulls for that file's rows.
fn unify_schema(tables: &[TimeTable]) -> SchemaRef {
    let mut names: Vec<String> = Vec::new();
    let mut types: Vec<DataType> = Vec::new();
    let mut nullable: Vec<bool> = Vec::new();
    let mut present: Vec<usize> = Vec::new();

    for table in tables {
        for field in table.schema().fields() {
            match names.iter().position(|n| n == field.name()) {
                Some(i) => {
                    types[i] = widen(&types[i], field.data_type());
                    nullable[i] |= field.is_nullable();
                    present[i] += 1;
                }
                None => {
                    names.push(field.name().clone());
                    types.push(field.data_type().clone());
                    nullable.push(field.is_nullable());
                    present.push(1);
                }
            }
        }
    }

    let fields: Vec<FieldRef> = names
        .into_iter()
        .zip(types)
        .zip(nullable.into_iter().zip(present))
        .map(|((name, data_type), (nullable, present))| {
            let nullable = nullable || present < tables.len();
            Arc::new(Field::new(name, data_type, nullable))
        })
        .collect();
    Arc::new(Schema::new(fields))
}

/// Reorder and cast `table` to `schema`, null-filling absent columns.
fn conform(table: &TimeTable, schema: &SchemaRef) -> Result<RecordBatch, ArrowError> {
    let batch = table.batch();
    let columns = schema
        .fields()
        .iter()
        .map(|field| match batch.column_by_name(field.name()) {
            None => Ok(new_null_array(field.data_type(), batch.num_rows())),
            Some(column) if column.data_type() == field.data_type() => Ok(column.clone()),
            Some(column) => cast(column, field.data_type()),
        })
        .collect::<Result<Vec<ArrayRef>, ArrowError>>()?;
    RecordBatch::try_new(schema.clone(), columns)
}

/// Mask keeping the first row of every distinct timestamp.
fn first_occurrence_mask(times: &[i64]) -> (BooleanArray, usize) {
    let mut seen = HashSet::with_capacity(times.len());
    let mask: Vec<bool> = times.iter().map(|ts| seen.insert(*ts)).collect();
    let dropped = times.len() - seen.len();
    (BooleanArray::from(mask), dropped)
}

/// Mask keeping rows inside `window`.
fn window_mask(
    times: &TimestampMicrosecondArray,
    window: &TimeWindow,
) -> Result<BooleanArray, ArrowError> {
    let start = Scalar::new(TimestampMicrosecondArray::from(vec![
        window.start().timestamp_micros(),
    ]));
    let stop = Scalar::new(TimestampMicrosecondArray::from(vec![
        window.stop().timestamp_micros(),
    ]));

    let ge = cmp_kernels::gt_eq(times, &start)?;
    let lt = cmp_kernels::lt(times, &stop)?;
    boolean_kernels::and(&ge, &lt)
}

/// Concatenate `tables`, deduplicate on time and slice to `window`.
pub fn combine(tables: &[TimeTable], window: &TimeWindow) -> Result<TimeTable, MergeError> {
    if tables.is_empty() {
        return Ok(TimeTable::empty());
    }

    let schema = unify_schema(tables);
    let batches = tables
        .iter()
        .map(|t| conform(t, &schema))
        .collect::<Result<Vec<_>, _>>()
        .context(ArrowSnafu)?;
    let all = concat_batches(&schema, &batches).context(ArrowSnafu)?;

    let time_idx = schema.index_of(TIME_COLUMN).context(ArrowSnafu)?;
    let all = TimeTable::try_new(all, time_idx)
        .ok_or_else(|| ArrowError::SchemaError(format!("{TIME_COLUMN} is not a timestamp")))
        .context(ArrowSnafu)?;

    let (unique, dropped) = first_occurrence_mask(all.time_values());
    if dropped > 0 {
        warn!("dropped {dropped} duplicate timestamp(s) while merging");
    }
    let in_window = window_mask(all.times(), window).context(ArrowSnafu)?;
    let keep = boolean_kernels::and(&unique, &in_window).context(ArrowSnafu)?;

    let filtered = filter_record_batch(all.batch(), &keep).context(ArrowSnafu)?;
    TimeTable::try_new(filtered, time_idx)
        .ok_or_else(|| ArrowError::SchemaError(format!("{TIME_COLUMN} is not a timestamp")))
        .context(ArrowSnafu)
}

/// Validate, load and merge `candidates` into the rows of `window`.
///
/// An empty candidate list yields an empty table without error. The span
/// check is skipped when no row survives the slice.
///
/// # Errors
///
/// - [`MergeError::Continuity`] before anything is read.
/// - [`MergeError::Load`] for the first file that fails to load.
/// - [`MergeError::DurationMismatch`] when the span is out of tolerance.
pub fn merge(
    candidates: &CandidateList,
    window: &TimeWindow,
    tolerance: f64,
) -> Result<MergedTable, MergeError> {
    if candidates.is_empty() {
        debug!("no candidate for {window}");
        return Ok(MergedTable::empty(*window));
    }

    let report = continuity_report(candidates.paths());
    if let Some(gap) = report.first_violation {
        return ContinuitySnafu {
            gap,
            cadence_minutes: report.cadence.map_or(0, |c| c.num_minutes()),
            violations: report.violations,
        }
        .fail();
    }

    let tables = candidates
        .iter()
        .map(|path| load_calibrated_file(path).context(LoadSnafu))
        .collect::<Result<Vec<_>, _>>()?;

    let table = combine(&tables, window)?;

    if let Some((min, max)) = table.time_bounds() {
        check_duration(max - min, window.duration(), tolerance)?;
    }

    debug!(
        "merged {} file(s) into {} row(s) for {window}",
        candidates.len(),
        table.num_rows()
    );
    Ok(MergedTable::new(*window, table))
}
