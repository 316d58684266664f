//! Data-quality report for loaded tables.

use crate::table::Table;
use std::fmt;

/// Sentence returned when a table has nothing to report.
pub const NO_ANOMALIES: &str = "no anomalies detected.";

/// Separator between report clauses.
pub const CLAUSE_SEPARATOR: &str = " ; ";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnAnomalies {
    pub name: String,
    pub missing: usize,
    pub duplicates: usize,
}

/// Counts behind an anomaly report. `Display` renders the report sentence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Anomalies {
    pub empty_cells: usize,
    pub duplicate_rows: usize,
    pub columns: Vec<ColumnAnomalies>,
}

impl Anomalies {
    pub fn scan(table: &Table) -> Self {
        Anomalies {
            empty_cells: table.missing_count(),
            duplicate_rows: table.duplicate_row_count(),
            columns: table
                .columns()
                .iter()
                .map(|c| ColumnAnomalies {
                    name: c.name.clone(),
                    missing: c.missing_count(),
                    duplicates: c.duplicate_count(),
                })
                .collect(),
        }
    }

    /// Report clauses in display order: totals first, then per column.
    pub fn clauses(&self) -> Vec<String> {
        let mut clauses = Vec::new();

        if self.empty_cells > 0 {
            clauses.push(format!("{} cellule(s) vide(s)", self.empty_cells));
        }
        if self.duplicate_rows > 0 {
            clauses.push(format!("{} ligne(s) en double", self.duplicate_rows));
        }

        for column in &self.columns {
            if column.missing > 0 {
                clauses.push(format!(
                    "Column '{}': {} missing value(s)",
                    column.name, column.missing
                ));
            }
            if column.duplicates > 0 {
                clauses.push(format!(
                    "Column '{}': {} duplicate(s)",
                    column.name, column.duplicates
                ));
            }
        }

        clauses
    }

    pub fn is_clean(&self) -> bool {
        self.clauses().is_empty()
    }
}

impl fmt::Display for Anomalies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clauses = self.clauses();
        if clauses.is_empty() {
            write!(f, "{}", NO_ANOMALIES)
        } else {
            write!(f, "{}", clauses.join(CLAUSE_SEPARATOR))
        }
    }
}

/// Builds the anomaly report for a table.
///
/// An absent table has nothing to report and yields an empty string.
pub fn detect(table: Option<&Table>) -> String {
    match table {
        Some(table) => Anomalies::scan(table).to_string(),
        None => String::new(),
    }
}
