#![cfg(feature = "web")]
use crate::llm::{self, LlmClient};
use crate::saving;
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Extension of the saved corrected document.
pub const DOCUMENT_EXTENSION: &str = ".docx";

/// Splits plain text into paragraphs, one per line.
pub fn text_paragraphs(text: &str) -> Vec<String> {
    text.lines().map(|line| line.to_string()).collect()
}

/// Correct a document paragraph by paragraph
///
/// Each non-blank paragraph is sent to the language model; a paragraph whose
/// correction fails keeps its original text. The result is saved as DOCX at
/// `destination`, with [`DOCUMENT_EXTENSION`] appended when missing.
///
/// # Returns
/// * `std::io::Result<PathBuf>` - Path of the saved document
pub async fn correct_document(
    llm: &dyn LlmClient,
    paragraphs: &[String],
    destination: impl AsRef<Path>,
) -> std::io::Result<PathBuf> {
    let mut corrected = Vec::with_capacity(paragraphs.len());
    let mut failures = 0;

    for paragraph in paragraphs {
        if paragraph.trim().is_empty() {
            corrected.push(paragraph.clone());
            continue;
        }
        match llm::correct_paragraph(llm, paragraph).await {
            Ok(text) => corrected.push(text.trim_end().to_string()),
            Err(e) => {
                failures += 1;
                warn!("paragraph correction failed, keeping original: {}", e);
                corrected.push(paragraph.clone());
            }
        }
    }

    let saved_path = saving::with_extension(destination, DOCUMENT_EXTENSION);
    saving::save_docx(&corrected, &saved_path)?;

    info!(
        "corrected document saved to {} ({} paragraph(s), {} kept as is)",
        saved_path.display(),
        corrected.len(),
        failures
    );

    Ok(saved_path)
}
