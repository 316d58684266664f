use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::table::{Table, Value};

/// Serialize a table into XLSX bytes
///
/// Row 1 holds the column names in bold, data starts on row 2. Numbers are
/// written as numbers, text as strings and missing cells are left blank.
pub fn table_to_xlsx(table: &Table) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    let header = Format::new().set_bold();

    for (c, column) in table.columns().iter().enumerate() {
        let (_, col) = cell_position(0, c)?;
        worksheet.write_string_with_format(0, col, column.name.as_str(), &header)?;

        for (r, value) in column.values.iter().enumerate() {
            let (row, _) = cell_position(r + 1, c)?;
            match value {
                Value::Numeric(n) => {
                    worksheet.write_number(row, col, *n)?;
                }
                Value::Text(s) => {
                    worksheet.write_string(row, col, s.as_str())?;
                }
                Value::Missing => {}
            }
        }
    }

    workbook.push_worksheet(worksheet);
    workbook.save_to_buffer()
}

/// Worksheet coordinates for a zero-based row and column index.
fn cell_position(row: usize, col: usize) -> Result<(u32, u16), XlsxError> {
    let row = u32::try_from(row).map_err(|_| XlsxError::RowColumnLimitError)?;
    let col = u16::try_from(col).map_err(|_| XlsxError::RowColumnLimitError)?;
    Ok((row, col))
}

/// Write bytes to `path` through a sibling `.part` file renamed into place,
/// so a failed write never leaves a truncated file at `path`.
pub fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    let result = File::create(&part)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&part, path));

    if result.is_err() {
        let _ = fs::remove_file(&part);
    }
    result
}

/// Save paragraphs as a DOCX document, one paragraph each
pub fn save_docx(paragraphs: &[String], path: &Path) -> std::io::Result<()> {
    use docx_rs::{Docx, Paragraph, Run};

    let docx = paragraphs.iter().fold(Docx::new(), |docx, text| {
        docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(text.as_str())))
    });

    let mut buffer = std::io::Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buffer)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    write_file(path, buffer.get_ref())
}

/// Appends `extension` (with its dot) unless `path` already ends with it,
/// compared case-insensitively.
pub fn with_extension(path: impl AsRef<Path>, extension: &str) -> PathBuf {
    let path = path.as_ref();
    let lower = path.to_string_lossy().to_lowercase();
    if lower.ends_with(extension) {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(extension);
        PathBuf::from(name)
    }
}
