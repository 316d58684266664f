use crate::table::{Column, Table, Value};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Cell contents that the CSV reader treats as missing values.
pub const NA_MARKERS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "#N/A", "None"];

/// Number of rows shown in a table preview.
pub const PREVIEW_ROWS: usize = 10;

/// Number of characters shown in a plain-text preview.
pub const PREVIEW_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to read workbook: {0}")]
    Workbook(String),

    #[error("failed to read document: {0}")]
    Docx(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// File families accepted for upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Excel,
    Docx,
    Text,
}

impl FileKind {
    /// Resolves a kind from an extension, with or without the leading dot.
    pub fn from_extension(ext: &str) -> Result<Self, LoadError> {
        let ext = ext.trim_start_matches('.').to_lowercase();
        match ext.as_str() {
            "csv" => Ok(FileKind::Csv),
            "xls" | "xlsx" => Ok(FileKind::Excel),
            "docx" => Ok(FileKind::Docx),
            "txt" => Ok(FileKind::Text),
            "" => Err(LoadError::UnsupportedFormat("file has no extension".to_string())),
            other => Err(LoadError::UnsupportedFormat(format!(".{}", other))),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");
        Self::from_extension(ext)
    }

    pub fn is_tabular(self) -> bool {
        matches!(self, FileKind::Csv | FileKind::Excel)
    }
}

/// Load a table from a CSV file
///
/// The first record is the header. Empty cells and the usual NA markers
/// become [`Value::Missing`]. A column whose remaining cells all parse as
/// numbers is loaded as numeric; any other column keeps its cells as text.
///
/// # Arguments
/// * `filepath` - Path to the CSV file to load
///
/// # Returns
/// * `Result<Table, LoadError>` - The loaded table or an error
pub fn from_csv(filepath: impl AsRef<Path>) -> Result<Table, LoadError> {
    let file = fs::File::open(filepath)?;
    read_csv(file)
}

/// Same as [`from_csv`] over any reader.
pub fn read_csv<R: std::io::Read>(reader: R) -> Result<Table, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let header: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); header.len()];

    for record in reader.records() {
        let record = record?;
        for (c, column) in raw.iter_mut().enumerate() {
            let cell = record
                .get(c)
                .filter(|s| !NA_MARKERS.contains(s))
                .map(|s| s.to_string());
            column.push(cell);
        }
    }

    let columns = header
        .into_iter()
        .zip(raw)
        .map(|(name, cells)| Column::new(name, infer_column(cells)))
        .collect();

    Ok(Table::from_columns(columns))
}

fn parse_finite(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

// Per-column inference: numeric only if every present cell parses.
fn infer_column(cells: Vec<Option<String>>) -> Vec<Value> {
    let numeric = cells
        .iter()
        .flatten()
        .all(|s| parse_finite(s).is_some());

    cells
        .into_iter()
        .map(|cell| match cell {
            None => Value::Missing,
            Some(s) if numeric => parse_finite(&s).map(Value::Numeric).unwrap_or(Value::Missing),
            Some(s) => Value::Text(s),
        })
        .collect()
}

/// Load a table from an Excel workbook (XLSX or XLS)
///
/// Reads the first worksheet; its first row becomes the header. Integer and
/// float cells are numeric, empty cells are missing, and everything else is
/// kept as text in its display form.
///
/// # Arguments
/// * `filepath` - Path to the workbook
///
/// # Returns
/// * `Result<Table, LoadError>` - The loaded table or an error
pub fn from_excel(filepath: impl AsRef<Path>) -> Result<Table, LoadError> {
    use calamine::{Data, Reader, open_workbook_auto};

    let mut workbook =
        open_workbook_auto(filepath).map_err(|e| LoadError::Workbook(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LoadError::Workbook("no worksheet found".to_string()))?
        .map_err(|e| LoadError::Workbook(e.to_string()))?;

    let mut rows = range.rows();
    let header: Vec<String> = match rows.next() {
        Some(row) => row
            .iter()
            .enumerate()
            .map(|(c, cell)| match cell {
                Data::Empty => format!("Unnamed: {}", c),
                other => other.to_string(),
            })
            .collect(),
        None => return Ok(Table::default()),
    };

    let records = rows
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Data::Empty => Value::Missing,
                    Data::Int(i) => Value::Numeric(*i as f64),
                    Data::Float(f) if f.is_nan() => Value::Missing,
                    Data::Float(f) => Value::Numeric(*f),
                    Data::String(s) if s.is_empty() => Value::Missing,
                    Data::String(s) => Value::Text(s.clone()),
                    other => Value::Text(other.to_string()),
                })
                .collect()
        })
        .collect();

    Ok(Table::from_rows(header, records))
}

/// Detect file type and load the matching table format
pub fn load_table(filepath: impl AsRef<Path>) -> Result<Table, LoadError> {
    let path = filepath.as_ref();
    match FileKind::from_path(path)? {
        FileKind::Csv => from_csv(path),
        FileKind::Excel => from_excel(path),
        other => Err(LoadError::UnsupportedFormat(format!(
            "{:?} is not a tabular format",
            other
        ))),
    }
}

/// Top-level paragraphs of a DOCX document, empty ones included.
pub fn docx_paragraphs(filepath: impl AsRef<Path>) -> Result<Vec<String>, LoadError> {
    let bytes = fs::read(filepath)?;
    let docx = docx_rs::read_docx(&bytes).map_err(|e| LoadError::Docx(e.to_string()))?;

    let paragraphs = docx
        .document
        .children
        .iter()
        .filter_map(|child| match child {
            docx_rs::DocumentChild::Paragraph(paragraph) => Some(paragraph_text(paragraph)),
            _ => None,
        })
        .collect();

    Ok(paragraphs)
}

fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut buffer = String::new();
    for child in &paragraph.children {
        push_paragraph_child(child, &mut buffer);
    }
    buffer
}

fn push_paragraph_child(child: &docx_rs::ParagraphChild, buffer: &mut String) {
    match child {
        docx_rs::ParagraphChild::Run(run) => push_run(run, buffer),
        docx_rs::ParagraphChild::Hyperlink(link) => {
            for link_child in &link.children {
                push_paragraph_child(link_child, buffer);
            }
        }
        docx_rs::ParagraphChild::Insert(insert) => {
            for insert_child in &insert.children {
                if let docx_rs::InsertChild::Run(run) = insert_child {
                    push_run(run, buffer);
                }
            }
        }
        _ => {}
    }
}

fn push_run(run: &docx_rs::Run, buffer: &mut String) {
    for child in &run.children {
        match child {
            docx_rs::RunChild::Text(text) => buffer.push_str(&text.text),
            docx_rs::RunChild::Tab(_) => buffer.push('\t'),
            docx_rs::RunChild::Break(_) => buffer.push('\n'),
            _ => {}
        }
    }
}

/// Extract the full text of an uploaded file
///
/// Plain text is read as lossy UTF-8, tables are rendered as aligned text and
/// DOCX paragraphs are joined with newlines.
pub fn extract_text(filepath: impl AsRef<Path>) -> Result<String, LoadError> {
    let path = filepath.as_ref();
    match FileKind::from_path(path)? {
        FileKind::Text => Ok(String::from_utf8_lossy(&fs::read(path)?).into_owned()),
        FileKind::Csv => Ok(from_csv(path)?.render()),
        FileKind::Excel => Ok(from_excel(path)?.render()),
        FileKind::Docx => Ok(docx_paragraphs(path)?.join("\n")),
    }
}

pub fn table_preview(table: &Table) -> String {
    table.head(PREVIEW_ROWS).render()
}

pub fn text_preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
