use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A single cell of a loaded table.
///
/// Cells are typed individually; whether a whole column counts as text or
/// numeric is decided from its cells (see [`Column::is_textual`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Missing,
    Text(String),
    Numeric(f64),
}

/// Hashable view of a [`Value`] used for duplicate detection.
///
/// Numbers compare by value: `-0.0` and `0.0` map to the same key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellKey<'a> {
    Missing,
    Text(&'a str),
    Numeric(u64),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Numeric(n) => Some(*n),
            _ => None,
        }
    }

    pub fn key(&self) -> CellKey<'_> {
        match self {
            Value::Missing => CellKey::Missing,
            Value::Text(s) => CellKey::Text(s),
            Value::Numeric(n) if *n == 0.0 => CellKey::Numeric(0f64.to_bits()),
            Value::Numeric(n) => CellKey::Numeric(n.to_bits()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => write!(f, "NaN"),
            Value::Text(s) => write!(f, "{}", s),
            Value::Numeric(n) => write!(f, "{}", n),
        }
    }
}

static MISSING: Value = Value::Missing;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Column {
            name: name.into(),
            values,
        }
    }

    /// A column holding at least one text cell is treated as text as a whole.
    pub fn is_textual(&self) -> bool {
        self.values.iter().any(|v| matches!(v, Value::Text(_)))
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_missing()).count()
    }

    /// Number of cells equal to an earlier cell of the same column.
    /// Repeated missing cells count as duplicates too.
    pub fn duplicate_count(&self) -> usize {
        let mut seen = HashSet::new();
        self.values.iter().filter(|v| !seen.insert(v.key())).count()
    }
}

/// In-memory table: ordered named columns, rows aligned by index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Builds a table from columns. Shorter columns are padded with
    /// [`Value::Missing`] so every row has one cell per column.
    pub fn from_columns(mut columns: Vec<Column>) -> Self {
        let rows = columns.iter().map(|c| c.values.len()).max().unwrap_or(0);
        for column in &mut columns {
            column.values.resize(rows, Value::Missing);
        }
        Table { columns }
    }

    /// Builds a table from a header and row-major records.
    pub fn from_rows(header: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let mut columns: Vec<Column> = header
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(rows.len())))
            .collect();

        for row in rows {
            let mut cells = row.into_iter();
            for column in &mut columns {
                column.values.push(cells.next().unwrap_or(Value::Missing));
            }
        }

        Table { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Length of the longest column. Columns edited through
    /// [`Table::columns_mut`] may be shorter; their absent cells read as
    /// [`Value::Missing`].
    pub fn row_count(&self) -> usize {
        self.columns.iter().map(|c| c.values.len()).max().unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn row(&self, index: usize) -> Vec<&Value> {
        self.columns
            .iter()
            .map(|c| c.values.get(index).unwrap_or(&MISSING))
            .collect()
    }

    fn row_key(&self, index: usize) -> Vec<CellKey<'_>> {
        self.row(index).into_iter().map(Value::key).collect()
    }

    /// Missing cells, absent cells of short columns included.
    pub fn missing_count(&self) -> usize {
        let rows = self.row_count();
        self.columns
            .iter()
            .map(|c| c.missing_count() + rows.saturating_sub(c.values.len()))
            .sum()
    }

    /// Indices of rows that repeat an earlier row cell for cell.
    pub fn duplicate_rows(&self) -> Vec<usize> {
        let mut seen = HashSet::new();
        (0..self.row_count())
            .filter(|&r| !seen.insert(self.row_key(r)))
            .collect()
    }

    pub fn duplicate_row_count(&self) -> usize {
        self.duplicate_rows().len()
    }

    /// Returns a copy without duplicate rows, first occurrences kept in order.
    pub fn without_duplicate_rows(&self) -> Table {
        let duplicates: HashSet<usize> = self.duplicate_rows().into_iter().collect();
        if duplicates.is_empty() {
            return self.clone();
        }

        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                values: c
                    .values
                    .iter()
                    .enumerate()
                    .filter(|(r, _)| !duplicates.contains(r))
                    .map(|(_, v)| v.clone())
                    .collect(),
            })
            .collect();

        Table { columns }
    }

    /// First `n` rows as a new table.
    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.values.iter().take(n).cloned().collect()))
                .collect(),
        }
    }

    /// Renders the table as aligned text with a leading row index column.
    pub fn render(&self) -> String {
        if self.columns.is_empty() || self.is_empty() {
            return format!(
                "Empty table\nColumns: [{}]\nRows: []",
                self.column_names().join(", ")
            );
        }

        let rows = self.row_count();
        let index_width = (rows - 1).to_string().len();

        let cells: Vec<Vec<String>> = self
            .columns
            .iter()
            .map(|c| c.values.iter().map(|v| v.to_string()).collect())
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .zip(&cells)
            .map(|(c, rendered)| {
                rendered
                    .iter()
                    .map(|s| s.chars().count())
                    .chain(std::iter::once(c.name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        out.push_str(&" ".repeat(index_width));
        for (column, width) in self.columns.iter().zip(&widths) {
            out.push_str(&format!("  {:>width$}", column.name, width = *width));
        }

        for r in 0..rows {
            out.push('\n');
            out.push_str(&format!("{:<width$}", r, width = index_width));
            for (rendered, width) in cells.iter().zip(&widths) {
                let cell = rendered.get(r).map(String::as_str).unwrap_or("NaN");
                out.push_str(&format!("  {:>width$}", cell, width = *width));
            }
        }

        out
    }
}
