use arrow::{
    array::RecordBatch,
    error::ArrowError,
    util::display::{ArrayFormatter, FormatOptions},
};
use calseries_core::{MergedTable, loader::TIMESTAMP_WRITE_FORMAT};
use snafu::ResultExt;
use tabled::{
    builder::Builder,
    settings::{Style, object::Rows, style::LineText, width::MinWidth},
};

use crate::error::{CliResult, PreviewSnafu};

/// Column names and the first `max_rows` rows of `batch` as display strings.
fn preview_rows(
    batch: &RecordBatch,
    max_rows: usize,
) -> CliResult<(Vec<String>, Vec<Vec<String>>)> {
    let columns = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().to_string())
        .collect();

    let options = FormatOptions::default().with_timestamp_format(Some(TIMESTAMP_WRITE_FORMAT));
    let formatters = batch
        .columns()
        .iter()
        .map(|col| ArrayFormatter::try_new(col.as_ref(), &options))
        .collect::<Result<Vec<_>, ArrowError>>()
        .context(PreviewSnafu)?;

    let mut rows = Vec::new();
    for row_idx in 0..max_rows.min(batch.num_rows()) {
        let mut row = Vec::with_capacity(formatters.len());
        for formatter in &formatters {
            row.push(
                formatter
                    .value(row_idx)
                    .try_to_string()
                    .context(PreviewSnafu)?,
            );
        }
        rows.push(row);
    }
    Ok((columns, rows))
}

fn render_table(columns: &[String], rows: &[Vec<String>]) -> String {
    if columns.is_empty() {
        return String::new();
    }

    const PREVIEW_LABEL: &str = "Preview output";
    const PREVIEW_OFFSET: usize = 6;
    let min_width = PREVIEW_OFFSET + PREVIEW_LABEL.len() + 4;

    let mut builder = Builder::default();
    builder.push_record(columns);
    for row in rows {
        builder.push_record(row);
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    table.with(MinWidth::new(min_width));
    table.with(LineText::new(PREVIEW_LABEL, Rows::first()).offset(PREVIEW_OFFSET));
    // LineText re-estimates dimensions, so re-apply MinWidth afterwards.
    table.with(MinWidth::new(min_width));
    table.to_string()
}

/// Preview table followed by a one-line summary.
pub fn render_preview(merged: &MergedTable, max_rows: usize) -> CliResult<String> {
    let total = merged.num_rows();
    let mut out = String::new();

    if total > 0 && max_rows > 0 {
        let (columns, rows) = preview_rows(merged.table().batch(), max_rows)?;
        out.push_str(&render_table(&columns, &rows));
        out.push('\n');
    }

    let summary = if total == 0 {
        format!("(no rows in {})", merged.window())
    } else if max_rows == 0 {
        format!("{total} row(s) in {} (preview suppressed; use --max-rows > 0)", merged.window())
    } else if total > max_rows {
        format!("{total} row(s) in {}, showing first {max_rows}", merged.window())
    } else {
        format!("{total} row(s) in {}", merged.window())
    };
    out.push_str(&summary);
    Ok(out)
}
