//! Page-level PDF operations: merge, split, rotate, watermark, compress.
//!
//! All functions here are blocking and expect to be called from
//! `spawn_blocking` with an already-bound [`Pdfium`].

use super::{load_document, page_failed, page_member_name, save_document};
use crate::artifact::{ArtifactGuard, ArtifactRef, MediaKind};
use crate::error::DocforgeError;
use crate::store::ArtifactStore;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Text stamped by the watermark operation.
#[derive(Debug, Clone)]
pub struct WatermarkStyle {
    pub text: String,
    pub font_size: f32,
    pub opacity: f32,
}

/// Concatenate every page of `inputs`, in order, into `merged.pdf`.
pub fn merge(
    pdfium: &Pdfium,
    store: &ArtifactStore,
    inputs: &[ArtifactRef],
) -> Result<Vec<ArtifactRef>, DocforgeError> {
    let mut merged = pdfium.create_new_pdf().map_err(internal)?;
    for input in inputs {
        let source = load_document(pdfium, input)?;
        merged
            .pages_mut()
            .append(&source)
            .map_err(|e| DocforgeError::CorruptDocument {
                name: input.original_name.clone(),
                detail: format!("{e:?}"),
            })?;
        debug!(
            "Appended {} pages from '{}'",
            source.pages().len(),
            input.original_name
        );
    }

    let total = merged.pages().len();
    let output = write_single(store, &merged, "merged", "merged.pdf")?;
    info!("Merged {} documents into {} pages", inputs.len(), total);
    Ok(vec![output])
}

/// One single-page document per page, named `page_{n}.pdf`.
///
/// A document without pages yields no outputs.
pub fn split(
    pdfium: &Pdfium,
    store: &ArtifactStore,
    input: &ArtifactRef,
) -> Result<Vec<ArtifactRef>, DocforgeError> {
    let source = load_document(pdfium, input)?;
    let count = source.pages().len();
    let mut outputs = ArtifactGuard::new();

    for index in 0..count {
        let page = index as usize;
        let mut single = pdfium.create_new_pdf().map_err(internal)?;
        single
            .pages_mut()
            .copy_page_from_document(&source, index, 0)
            .map_err(page_failed(page))?;

        let output = store.reserve_output("split", page_member_name(page, "pdf"), MediaKind::Pdf)?;
        outputs.push(output.clone());
        save_document(&single, &output.path)?;
        debug!("Split page {} → {}", page + 1, output.path.display());
    }

    info!("Split '{}' into {} documents", input.original_name, outputs.len());
    Ok(outputs.release())
}

/// Rotate every page clockwise by `degrees` (0, 90, 180 or 270), on top of
/// whatever rotation the page already carries.
pub fn rotate(
    pdfium: &Pdfium,
    store: &ArtifactStore,
    input: &ArtifactRef,
    degrees: u16,
) -> Result<Vec<ArtifactRef>, DocforgeError> {
    let document = load_document(pdfium, input)?;
    for (index, mut page) in document.pages().iter().enumerate() {
        let current = page.rotation().map_err(page_failed(index))?;
        let target = rotation_from_degrees(rotation_degrees(current) + degrees);
        page.set_rotation(target);
    }
    debug!("Rotated {} pages by {}°", document.pages().len(), degrees);
    Ok(vec![write_single(store, &document, "rotated", "rotated.pdf")?])
}

/// Stamp translucent text, horizontally centred at mid-height, on every page.
pub fn watermark(
    pdfium: &Pdfium,
    store: &ArtifactStore,
    input: &ArtifactRef,
    style: &WatermarkStyle,
) -> Result<Vec<ArtifactRef>, DocforgeError> {
    let mut document = load_document(pdfium, input)?;
    let font = document.fonts_mut().helvetica();
    let alpha = (style.opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
    let color = PdfColor::new(0, 0, 0, alpha);

    for (index, mut page) in document.pages().iter().enumerate() {
        let page_width = page.width().value;
        let page_height = page.height().value;

        let mut stamp = page
            .objects_mut()
            .create_text_object(
                PdfPoints::ZERO,
                PdfPoints::ZERO,
                style.text.as_str(),
                font,
                PdfPoints::new(style.font_size),
            )
            .map_err(page_failed(index))?;
        stamp.set_fill_color(color).map_err(page_failed(index))?;

        let text_width = stamp.width().map(|w| w.value).unwrap_or(0.0);
        stamp
            .translate(
                PdfPoints::new((page_width - text_width) / 2.0),
                PdfPoints::new(page_height / 2.0),
            )
            .map_err(page_failed(index))?;
    }

    debug!("Watermarked {} pages", document.pages().len());
    Ok(vec![write_single(store, &document, "watermarked", "watermarked.pdf")?])
}

/// Load and save the document again.
///
/// pdfium writes a fresh file: unreferenced objects and incremental-update
/// sections are dropped, content streams are kept as they are.
pub fn compress(
    pdfium: &Pdfium,
    store: &ArtifactStore,
    input: &ArtifactRef,
) -> Result<Vec<ArtifactRef>, DocforgeError> {
    let document = load_document(pdfium, input)?;
    let output = write_single(store, &document, "compressed", "compressed.pdf")?;

    let before = std::fs::metadata(&input.path).map(|m| m.len()).unwrap_or(0);
    let after = std::fs::metadata(&output.path).map(|m| m.len()).unwrap_or(0);
    info!("Re-serialised '{}': {} → {} bytes", input.original_name, before, after);
    Ok(vec![output])
}

/// Reserve `<prefix>_<token>.pdf`, save `document` there, and return it.
/// The reservation is removed again if saving fails.
fn write_single(
    store: &ArtifactStore,
    document: &PdfDocument,
    prefix: &str,
    download_name: &str,
) -> Result<ArtifactRef, DocforgeError> {
    let output = store.reserve_output(prefix, download_name, MediaKind::Pdf)?;
    let mut guard = ArtifactGuard::new();
    guard.push(output.clone());
    save_document(document, &output.path)?;
    guard.release();
    Ok(output)
}

fn rotation_degrees(rotation: PdfPageRenderRotation) -> u16 {
    match rotation {
        PdfPageRenderRotation::None => 0,
        PdfPageRenderRotation::Degrees90 => 90,
        PdfPageRenderRotation::Degrees180 => 180,
        PdfPageRenderRotation::Degrees270 => 270,
    }
}

fn rotation_from_degrees(degrees: u16) -> PdfPageRenderRotation {
    match degrees % 360 {
        90 => PdfPageRenderRotation::Degrees90,
        180 => PdfPageRenderRotation::Degrees180,
        270 => PdfPageRenderRotation::Degrees270,
        _ => PdfPageRenderRotation::None,
    }
}

fn internal(e: PdfiumError) -> DocforgeError {
    DocforgeError::Internal(format!("pdfium: {e:?}"))
}
