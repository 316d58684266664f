#![cfg(not(tarpaulin_include))]

use std::env;
use std::path::{Path, PathBuf};
use synthai::loader::{self, FileKind};
use synthai::{anomaly, corrector};

/// Offline analysis of one file
///
/// Prints the preview and, for tables, the anomaly report, then writes the
/// corrected spreadsheet next to the input (or to the given output path).
///
/// # Arguments
/// * `<file>` - CSV, Excel, DOCX or text file to analyse
/// * `[output]` - Destination of the corrected table (default `<file stem>_corr.xlsx`)
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <file> [output]", args[0]);
        return Ok(());
    }

    let input = Path::new(&args[1]);
    let kind = FileKind::from_path(input)?;

    if !kind.is_tabular() {
        let text = loader::extract_text(input)?;
        println!("{}", loader::text_preview(&text));
        return Ok(());
    }

    let table = loader::load_table(input)?;
    println!("{}", loader::table_preview(&table));
    println!();
    println!("Anomalies: {}", anomaly::detect(Some(&table)));

    let output = match args.get(2) {
        Some(output) => PathBuf::from(output),
        None => {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "output".to_string());
            input.with_file_name(format!("{}_corr", stem))
        }
    };

    let correction = corrector::correct(&table, &output)?;
    println!(
        "Corrected file: {} ({} column(s) converted, {} cell(s) imputed, {} row(s) removed)",
        correction.saved_path.display(),
        correction.converted_columns.len(),
        correction.imputed_cells,
        correction.removed_rows
    );

    Ok(())
}
