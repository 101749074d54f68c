//! Writing merged tables back to CSV.
//!
//! Output files follow the same naming convention as the inputs, so a merged
//! window can be dropped back into a data folder and located again. Writes go
//! to a temporary sibling first and are renamed into place once synced; a
//! failed write leaves no partial file behind.

use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    array::{ArrayRef, AsArray, RecordBatch, StringArray},
    datatypes::{DataType, Field, FieldRef, Float64Type, Schema},
    error::ArrowError,
};
use arrow_csv::WriterBuilder;
use log::debug;
use snafu::prelude::*;

use crate::{
    error::{CsvWriteSnafu, OutputError, OutputIoSnafu},
    loader::TIMESTAMP_WRITE_FORMAT,
    naming::format_file_name,
    table::MergedTable,
    window::TimeWindow,
};

/// File name for a merged `window`, e.g.
/// `merged_10M_2024_01_01_00h00m_0_CALIBRATED.csv`.
pub fn output_file_name(root_name: &str, window: &TimeWindow, substructure_id: u8) -> String {
    format_file_name(
        root_name,
        window.start(),
        window.duration().num_minutes(),
        substructure_id,
    )
}

/// Removes the temporary file on drop unless disarmed.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// `value` as `d.dddddddde±XX`: eight fraction digits, signed exponent of
/// at least two digits.
fn scientific(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    let rendered = format!("{value:.8e}");
    match rendered.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => rendered,
    }
}

/// Copy of `batch` with every `Float64` column rendered by [`scientific`].
fn with_scientific_floats(batch: &RecordBatch) -> Result<RecordBatch, ArrowError> {
    let schema = batch.schema();
    let mut fields: Vec<FieldRef> = Vec::with_capacity(schema.fields().len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());

    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        match column.as_primitive_opt::<Float64Type>() {
            Some(floats) => {
                let text: StringArray = floats.iter().map(|v| v.map(scientific)).collect();
                fields.push(Arc::new(Field::new(
                    field.name(),
                    DataType::Utf8,
                    field.is_nullable(),
                )));
                columns.push(Arc::new(text));
            }
            None => {
                fields.push(field.clone());
                columns.push(column.clone());
            }
        }
    }
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
}

fn create_parent_dir(path: &Path) -> Result<(), OutputError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context(OutputIoSnafu { path: parent })?;
    }
    Ok(())
}

/// Write `table` to `path` as CSV with a header row.
///
/// The time column is rendered with microsecond precision and a trailing
/// `Z`, which is the format [`crate::loader::load_calibrated_file`] reads.
/// Float columns are written as `%.8e` (`1.50000000e+00`). Missing parent
/// directories are created. An existing file is replaced.
pub fn write_csv(table: &MergedTable, path: &Path) -> Result<(), OutputError> {
    create_parent_dir(path)?;
    let batch = with_scientific_floats(table.table().batch()).context(CsvWriteSnafu { path })?;

    let tmp_path = path.with_extension("csv.tmp");
    let file = fs::File::create(&tmp_path).context(OutputIoSnafu { path: &tmp_path })?;
    let mut guard = TempFileGuard::new(tmp_path.clone());

    let mut writer = WriterBuilder::new()
        .with_header(true)
        .with_timestamp_format(TIMESTAMP_WRITE_FORMAT.to_string())
        .build(BufWriter::new(file));
    writer.write(&batch).context(CsvWriteSnafu { path })?;

    let mut buf = writer.into_inner();
    buf.flush().context(OutputIoSnafu { path: &tmp_path })?;
    buf.get_ref()
        .sync_all()
        .context(OutputIoSnafu { path: &tmp_path })?;
    drop(buf);

    fs::rename(&tmp_path, path).context(OutputIoSnafu { path })?;
    guard.disarm();

    debug!("wrote {} row(s) to {}", table.num_rows(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        loader::load_calibrated_file,
        table::{TIME_COLUMN, TimeTable, time_index_type},
    };
    use arrow::array::{Array, Float64Array, TimestampMicrosecondArray};
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn at(m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, m, s).unwrap()
    }

    fn merged() -> MergedTable {
        let schema = Arc::new(Schema::new(vec![
            Field::new(TIME_COLUMN, time_index_type(), false),
            Field::new("strain", DataType::Float64, true),
        ]));
        let times = vec![
            at(0, 0).timestamp_micros(),
            at(0, 0).timestamp_micros() + 125_000,
        ];
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(TimestampMicrosecondArray::from(times)),
                Arc::new(Float64Array::from(vec![1.5, -2.0])),
            ],
        )
        .unwrap();
        MergedTable::new(
            TimeWindow::new(at(0, 0), at(10, 0)),
            TimeTable::try_new(batch, 0).unwrap(),
        )
    }

    #[test]
    fn file_name_follows_convention() {
        let window = TimeWindow::new(at(0, 0), at(10, 0));
        assert_eq!(
            output_file_name("merged", &window, 2),
            "merged_10M_2024_01_01_00h00m_2_CALIBRATED.csv"
        );
    }

    #[test]
    fn writes_readable_csv() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("out").join("m.csv");
        let table = merged();

        write_csv(&table, &path)?;

        let text = fs::read_to_string(&path)?;
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("time,strain"));
        assert_eq!(
            lines.next(),
            Some("2024-01-01T00:00:00.000000Z,1.50000000e+00")
        );
        assert_eq!(
            lines.next(),
            Some("2024-01-01T00:00:00.125000Z,-2.00000000e+00")
        );

        let back = load_calibrated_file(&path)?;
        assert_eq!(back.time_values(), table.table().time_values());
        assert_eq!(back.schema().field(1).data_type(), &DataType::Float64);
        assert!(!path.with_extension("csv.tmp").exists());
        Ok(())
    }

    #[test]
    fn scientific_matches_printf_e_format() {
        assert_eq!(scientific(1.5), "1.50000000e+00");
        assert_eq!(scientific(-2.0), "-2.00000000e+00");
        assert_eq!(scientific(0.0), "0.00000000e+00");
        assert_eq!(scientific(1.234e-3), "1.23400000e-03");
        assert_eq!(scientific(6.02214076e23), "6.02214076e+23");
        assert_eq!(scientific(1e-300), "1.00000000e-300");
        assert_eq!(scientific(f64::NAN), "nan");
        assert_eq!(scientific(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn float_nulls_stay_empty() -> TestResult {
        let schema = Arc::new(Schema::new(vec![
            Field::new(TIME_COLUMN, time_index_type(), false),
            Field::new("strain", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(TimestampMicrosecondArray::from(vec![0, 1])),
                Arc::new(Float64Array::from(vec![None, Some(0.25)])),
            ],
        )?;

        let text = with_scientific_floats(&batch)?;
        assert_eq!(text.schema().field(1).data_type(), &DataType::Utf8);
        assert!(text.schema().field(1).is_nullable());
        let strain = text.column(1).as_string::<i32>();
        assert!(strain.is_null(0));
        assert_eq!(strain.value(1), "2.50000000e-01");
        // Non-float columns pass through untouched.
        assert_eq!(text.column(0).data_type(), &time_index_type());
        Ok(())
    }

    #[test]
    fn replaces_existing_file() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("m.csv");
        fs::write(&path, "stale")?;
        write_csv(&merged(), &path)?;
        assert!(fs::read_to_string(&path)?.starts_with("time,strain"));
        Ok(())
    }
}
