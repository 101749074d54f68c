//! Table loader for calibrated CSV files.
//!
//! Column types are inferred by `arrow-csv` from the whole file, except for
//! [`TIME_COLUMN`]: it is read as text and parsed strictly against
//! [`TIMESTAMP_PARSE_FORMAT`], then stored as a microsecond timestamp. A single
//! malformed time value fails the load; nothing else in the file is
//! validated here.

use std::{
    fs::File,
    io::{self, Seek},
    path::Path,
    sync::Arc,
};

use arrow::{
    array::{Array, ArrayRef, AsArray, RecordBatch, TimestampMicrosecondArray},
    compute::concat_batches,
    datatypes::{DataType, Field, FieldRef, Schema},
};
use arrow_csv::{ReaderBuilder, reader::Format};
use chrono::NaiveDateTime;
use log::debug;
use snafu::{IntoError, prelude::*};

use crate::{
    error::{
        CsvSnafu, IoSnafu, LoadError, MissingTimeColumnSnafu, NotFoundSnafu, TimeParseSnafu,
    },
    table::{TIME_COLUMN, TimeTable, time_index_type},
};

/// chrono format used when reading the time column.
///
/// chrono's `%.f` is looser than the on-disk format, so [`parse_timestamp`]
/// first requires a `.` followed by one to six digits before the `Z`.
pub const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

const MAX_FRACTION_DIGITS: usize = 6;

/// chrono format used when writing the time column (microsecond precision).
pub const TIMESTAMP_WRITE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

fn csv_format() -> Format {
    Format::default().with_header(true).with_delimiter(b',')
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => NotFoundSnafu { path }.into_error(source),
        _ => IoSnafu { path }.into_error(source),
    })
}

/// True when `value` ends in `.` + 1..=6 digits + `Z`.
fn has_microsecond_fraction(value: &str) -> bool {
    let Some((_, fraction)) = value
        .strip_suffix('Z')
        .and_then(|body| body.rsplit_once('.'))
    else {
        return false;
    };
    (1..=MAX_FRACTION_DIGITS).contains(&fraction.len())
        && fraction.bytes().all(|b| b.is_ascii_digit())
}

/// Parse one time cell, e.g. `2024-01-01T00:00:00.250000Z`.
///
/// A missing fraction or one finer than microseconds is rejected rather
/// than truncated.
pub fn parse_timestamp(value: &str) -> Option<i64> {
    if !has_microsecond_fraction(value) {
        return None;
    }
    NaiveDateTime::parse_from_str(value, TIMESTAMP_PARSE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc().timestamp_micros())
}

fn parse_time_column(
    path: &Path,
    column: &ArrayRef,
) -> Result<TimestampMicrosecondArray, LoadError> {
    let Some(raw) = column.as_string_opt::<i32>() else {
        return MissingTimeColumnSnafu {
            path,
            column: TIME_COLUMN,
        }
        .fail();
    };

    let mut micros = Vec::with_capacity(raw.len());
    for (row, value) in raw.iter().enumerate() {
        match value.and_then(parse_timestamp) {
            Some(ts) => micros.push(ts),
            None => {
                return TimeParseSnafu {
                    path,
                    row,
                    value: value.unwrap_or("<null>"),
                    format: TIMESTAMP_PARSE_FORMAT,
                }
                .fail();
            }
        }
    }
    Ok(TimestampMicrosecondArray::from(micros))
}

/// Read `path` into a table indexed by [`TIME_COLUMN`].
///
/// # Errors
///
/// - [`LoadError::NotFound`] when the file does not exist.
/// - [`LoadError::MissingTimeColumn`] when the header has no time column.
/// - [`LoadError::TimeParse`] on the first malformed time value.
/// - [`LoadError::Csv`] when the CSV itself cannot be read.
pub fn load_calibrated_file(path: &Path) -> Result<TimeTable, LoadError> {
    let mut file = open(path)?;

    let format = csv_format();
    let (inferred, _) = format
        .infer_schema(&mut file, None)
        .context(CsvSnafu { path })?;
    file.rewind().context(IoSnafu { path })?;

    let time_idx = inferred
        .index_of(TIME_COLUMN)
        .ok()
        .context(MissingTimeColumnSnafu {
            path,
            column: TIME_COLUMN,
        })?;

    // Read the time column as text so it can be checked against the fixed
    // format instead of arrow's lenient timestamp inference.
    let read_fields: Vec<FieldRef> = inferred
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| {
            if i == time_idx {
                Arc::new(Field::new(TIME_COLUMN, DataType::Utf8, true))
            } else {
                field.clone()
            }
        })
        .collect();
    let read_schema = Arc::new(Schema::new(read_fields));

    let reader = ReaderBuilder::new(read_schema.clone())
        .with_format(format)
        .build(file)
        .context(CsvSnafu { path })?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .context(CsvSnafu { path })?;
    let raw = concat_batches(&read_schema, &batches).context(CsvSnafu { path })?;

    let times = parse_time_column(path, raw.column(time_idx))?;

    let mut columns: Vec<ArrayRef> = raw.columns().to_vec();
    columns[time_idx] = Arc::new(times.clone());

    let fields: Vec<FieldRef> = read_schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| {
            if i == time_idx {
                Arc::new(Field::new(TIME_COLUMN, time_index_type(), false))
            } else {
                field.clone()
            }
        })
        .collect();
    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .context(CsvSnafu { path })?;

    debug!("loaded {} row(s) from {}", batch.num_rows(), path.display());
    Ok(TimeTable::from_parts(batch, time_idx, times))
}
