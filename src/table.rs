use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};

use crate::coordinator::{PreviewRow, TableColumnMap};

const HEADERS: [&str; 3] = ["#", "table", "column"];
const PREVIEW_HEADERS: [&str; 4] = ["table", "column", "stored", "after encode"];

fn listing_rows(tables: &TableColumnMap) -> Vec<Vec<String>> {
    tables
        .column_refs()
        .enumerate()
        .map(|(idx, column)| vec![(idx + 1).to_string(), column.table, column.column])
        .collect()
}

fn preview_rows(rows: &[PreviewRow]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| {
            vec![
                row.column.table.clone(),
                row.column.column.clone(),
                row.stored.clone(),
                row.encoded.clone().unwrap_or_else(|| "NULL".to_string()),
            ]
        })
        .collect()
}

fn render_grid(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|header| display_width(header).max(3))
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(display_width(&sanitize(cell)));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_line(headers, &widths));
    let rule = widths.iter().map(|width| "-".repeat(*width)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_line(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_line(row, &widths));
    }
    output
}

/// Aligned plain-text listing of discovered columns.
pub fn render_columns(tables: &TableColumnMap) -> String {
    render_grid(&HEADERS, &listing_rows(tables))
}

pub fn print_columns(tables: &TableColumnMap) {
    print!("{}", render_columns(tables));
}

/// Sampled values before and after the rewrite; `NULL` marks values the
/// target charset cannot hold.
pub fn render_preview(rows: &[PreviewRow]) -> String {
    render_grid(&PREVIEW_HEADERS, &preview_rows(rows))
}

pub fn print_preview(rows: &[PreviewRow]) {
    print!("{}", render_preview(rows));
}

/// Same listing as CSV with a header row.
pub fn write_columns_csv<W: Write>(tables: &TableColumnMap, writer: W) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(&HEADERS[1..])
        .context("Writing column listing headers")?;
    for column in tables.column_refs() {
        out.write_record([column.table.as_str(), column.column.as_str()])
            .with_context(|| format!("Writing listing row for {column}"))?;
    }
    out.flush().context("Flushing column listing")?;
    Ok(())
}

/// Preview as CSV; values the target charset cannot hold are left empty.
pub fn write_preview_csv<W: Write>(rows: &[PreviewRow], writer: W) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(["table", "column", "stored", "encoded"])
        .context("Writing preview headers")?;
    for row in rows {
        out.write_record([
            row.column.table.as_str(),
            row.column.column.as_str(),
            row.stored.as_str(),
            row.encoded.as_deref().unwrap_or_default(),
        ])
        .with_context(|| format!("Writing preview row for {}", row.column))?;
    }
    out.flush().context("Flushing preview")?;
    Ok(())
}

fn format_line<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    let mut line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let cell = sanitize(cell.as_ref());
            let padding = width.saturating_sub(display_width(&cell));
            format!("{cell}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.truncate(line.trim_end().len());
    line
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

// Identifiers may legally contain control characters; keep one per line.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect()
}
