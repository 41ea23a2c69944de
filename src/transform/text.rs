//! Text extraction into editable office formats.
//!
//! Lines come from pdfium's text layer, page by page. Scanned pages have no
//! text layer and contribute nothing; there is no OCR.

use super::{load_document, page_failed};
use crate::artifact::{ArtifactGuard, ArtifactRef, MediaKind};
use crate::error::DocforgeError;
use crate::ooxml::{docx, xlsx};
use crate::store::ArtifactStore;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Sheet name used for spreadsheet output.
pub const SHEET_NAME: &str = "Extracted";

/// Every text line of `input`, in page order then line order.
pub fn extract_lines(pdfium: &Pdfium, input: &ArtifactRef) -> Result<Vec<String>, DocforgeError> {
    let document = load_document(pdfium, input)?;
    let mut lines = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let text = page.text().map_err(page_failed(index))?.all();
        let before = lines.len();
        lines.extend(split_lines(&text));
        debug!("Page {}: {} lines", index + 1, lines.len() - before);
    }
    Ok(lines)
}

/// Split extracted page text into lines. Empty text yields no lines.
fn split_lines(text: &str) -> impl Iterator<Item = String> + '_ {
    text.lines().map(|line| line.trim_end().to_string())
}

/// One DOCX paragraph per extracted line.
pub fn document_to_word(
    pdfium: &Pdfium,
    store: &ArtifactStore,
    input: &ArtifactRef,
) -> Result<Vec<ArtifactRef>, DocforgeError> {
    let lines = extract_lines(pdfium, input)?;
    let output = store.reserve_output(
        "word",
        format!("{}.docx", input.stem()),
        MediaKind::Docx,
    )?;
    let mut guard = ArtifactGuard::new();
    guard.push(output.clone());
    docx::write_paragraphs(&output.path, &lines)?;
    info!("Wrote {} paragraphs from '{}'", lines.len(), input.original_name);
    Ok(guard.release())
}

/// One XLSX row per extracted line, column A of a sheet named `Extracted`.
pub fn document_to_spreadsheet(
    pdfium: &Pdfium,
    store: &ArtifactStore,
    input: &ArtifactRef,
) -> Result<Vec<ArtifactRef>, DocforgeError> {
    let lines = extract_lines(pdfium, input)?;
    let output = store.reserve_output(
        "excel",
        format!("{}.xlsx", input.stem()),
        MediaKind::Xlsx,
    )?;
    let mut guard = ArtifactGuard::new();
    guard.push(output.clone());
    xlsx::write_column(&output.path, SHEET_NAME, &lines)?;
    info!("Wrote {} rows from '{}'", lines.len(), input.original_name);
    Ok(guard.release())
}
