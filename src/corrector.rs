//! Heuristic repair of loaded tables.
//!
//! Text columns that mostly hold numbers written with stray spaces or comma
//! decimals are converted to numbers, gaps in numeric columns are filled
//! with the column mean and exact duplicate rows are dropped. The result is
//! saved as an XLSX workbook.

use crate::saving;
use crate::table::{Column, Table, Value};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Minimum share of parseable values, in percent, for a text column to be
/// converted to numbers. The bound is inclusive.
pub const NUMERIC_DENSITY_PERCENT: usize = 20;

/// Extension of the saved corrected file.
pub const SPREADSHEET_EXTENSION: &str = ".xlsx";

#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("failed to write corrected file: {0}")]
    Persist(#[from] std::io::Error),

    #[error("failed to build corrected workbook: {0}")]
    Writer(String),
}

/// Outcome of a correction pass.
#[derive(Clone, Debug, PartialEq)]
pub struct Correction {
    pub table: Table,
    pub saved_path: PathBuf,
    /// Columns turned from text into numbers.
    pub converted_columns: Vec<String>,
    /// Missing cells filled with a column mean.
    pub imputed_cells: usize,
    /// Duplicate rows dropped.
    pub removed_rows: usize,
}

/// Trims, strips inner whitespace and turns decimal commas into points.
pub fn normalize(text: &str) -> String {
    text.trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect()
}

fn parse_cell(value: &Value) -> Option<f64> {
    match value {
        Value::Missing => None,
        Value::Numeric(n) => Some(*n).filter(|n| n.is_finite()),
        Value::Text(s) => normalize(s).parse::<f64>().ok().filter(|n| n.is_finite()),
    }
}

/// Parses a text column as numbers if enough of it parses.
///
/// Returns `None` when no value parses or when fewer than
/// [`NUMERIC_DENSITY_PERCENT`] percent of all cells (missing ones included)
/// do. Otherwise unparsed cells become missing.
pub fn coerce_numeric(column: &Column) -> Option<Vec<Value>> {
    let parsed: Vec<Option<f64>> = column.values.iter().map(parse_cell).collect();
    let hits = parsed.iter().filter(|p| p.is_some()).count();

    if hits == 0 || hits * 100 < column.values.len() * NUMERIC_DENSITY_PERCENT {
        return None;
    }

    Some(
        parsed
            .into_iter()
            .map(|p| p.map(Value::Numeric).unwrap_or(Value::Missing))
            .collect(),
    )
}

/// Fills missing cells with the mean of the observed ones.
///
/// A column without any observed value, or whose mean is not finite, is
/// left as is. Returns the number of filled cells.
pub fn impute_mean(values: &mut [Value]) -> usize {
    let observed: Vec<f64> = values.iter().filter_map(Value::as_number).collect();
    if observed.is_empty() {
        return 0;
    }
    let mean = observed.iter().sum::<f64>() / observed.len() as f64;
    if !mean.is_finite() {
        warn!("column mean is not finite, missing cells left empty");
        return 0;
    }

    let mut filled = 0;
    for value in values.iter_mut().filter(|v| v.is_missing()) {
        *value = Value::Numeric(mean);
        filled += 1;
    }
    filled
}

/// Runs the repair steps on a copy of `table` without saving it.
pub fn repair(table: &Table) -> (Table, Vec<String>, usize) {
    let mut repaired = table.clone();
    let mut converted = Vec::new();
    let mut imputed = 0;

    for column in repaired.columns_mut() {
        if !column.is_textual() {
            continue;
        }
        match coerce_numeric(column) {
            Some(values) => {
                debug!("column '{}' converted to numbers", column.name);
                column.values = values;
                converted.push(column.name.clone());
            }
            None => debug!("column '{}' left as text", column.name),
        }
    }

    for column in repaired.columns_mut() {
        if !column.is_textual() && column.missing_count() > 0 {
            imputed += impute_mean(&mut column.values);
        }
    }

    (repaired.without_duplicate_rows(), converted, imputed)
}

/// Correct a table and save it as a spreadsheet
///
/// The input is never modified. The corrected copy is written to
/// `destination`, with [`SPREADSHEET_EXTENSION`] appended when the path does
/// not already end with it.
///
/// # Errors
/// * [`CorrectionError::Writer`] if the workbook cannot be built
/// * [`CorrectionError::Persist`] if the file cannot be written
pub fn correct(table: &Table, destination: impl AsRef<Path>) -> Result<Correction, CorrectionError> {
    let (corrected, converted_columns, imputed_cells) = repair(table);
    let removed_rows = table.row_count() - corrected.row_count();

    let saved_path = saving::with_extension(destination, SPREADSHEET_EXTENSION);
    let bytes =
        saving::table_to_xlsx(&corrected).map_err(|e| CorrectionError::Writer(e.to_string()))?;
    saving::write_file(&saved_path, &bytes)?;

    info!(
        "corrected table saved to {} ({} column(s) converted, {} cell(s) imputed, {} row(s) removed)",
        saved_path.display(),
        converted_columns.len(),
        imputed_cells,
        removed_rows
    );

    Ok(Correction {
        table: corrected,
        saved_path,
        converted_columns,
        imputed_cells,
        removed_rows,
    })
}
