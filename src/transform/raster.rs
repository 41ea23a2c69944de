//! Image ↔ PDF operations and the slide deck built from page renders.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Page sizes vary wildly: an A0 poster at 200 DPI would render to roughly
//! 6,600 × 9,400 px. `max_pixels` bounds the longest edge regardless of the
//! physical page size, so memory per page stays predictable.

use super::{load_document, page_failed, page_member_name, scratch_file};
use crate::artifact::{ArtifactGuard, ArtifactRef, MediaKind};
use crate::error::DocforgeError;
use crate::ooxml::pptx::PresentationWriter;
use crate::store::ArtifactStore;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Rendering resolution and size bound for page rasterisation.
#[derive(Debug, Clone, Copy)]
pub struct RasterSettings {
    pub dpi: u32,
    pub max_pixels: u32,
}

impl RasterSettings {
    /// `max_pixels` as pdfium's signed bound, saturating at `i32::MAX`.
    pub fn pixel_cap(&self) -> i32 {
        i32::try_from(self.max_pixels).unwrap_or(i32::MAX)
    }
}

/// An input image decoded and normalised to RGB.
pub struct DecodedImage {
    pub name: String,
    pub image: DynamicImage,
}

/// Decode every input, in order, and convert it to 8-bit RGB.
///
/// Alpha channels and palette or greyscale encodings are flattened so every
/// page ends up with the same colour model.
pub fn decode_images(inputs: &[ArtifactRef]) -> Result<Vec<DecodedImage>, DocforgeError> {
    inputs
        .iter()
        .map(|input| {
            let bytes =
                std::fs::read(&input.path).map_err(|e| DocforgeError::storage(&input.path, e))?;
            let decoded =
                image::load_from_memory(&bytes).map_err(|e| DocforgeError::UnsupportedImage {
                    name: input.original_name.clone(),
                    detail: e.to_string(),
                })?;
            debug!(
                "Decoded '{}' ({}x{}, {:?})",
                input.original_name,
                decoded.width(),
                decoded.height(),
                decoded.color()
            );
            Ok(DecodedImage {
                name: input.original_name.clone(),
                image: DynamicImage::ImageRgb8(decoded.to_rgb8()),
            })
        })
        .collect()
}

/// One page per image, in order. Each page is the image's pixel size in
/// points (72 DPI) and the image fills it.
pub fn images_to_document(
    pdfium: &Pdfium,
    store: &ArtifactStore,
    images: Vec<DecodedImage>,
) -> Result<Vec<ArtifactRef>, DocforgeError> {
    let mut document = pdfium
        .create_new_pdf()
        .map_err(|e| DocforgeError::Internal(format!("pdfium: {e:?}")))?;

    for (index, decoded) in images.iter().enumerate() {
        let width = PdfPoints::new(decoded.image.width() as f32);
        let height = PdfPoints::new(decoded.image.height() as f32);

        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::from_points(width, height))
            .map_err(page_failed(index))?;
        page.objects_mut()
            .create_image_object(
                PdfPoints::ZERO,
                PdfPoints::ZERO,
                &decoded.image,
                Some(width),
                Some(height),
            )
            .map_err(page_failed(index))?;
        debug!("Placed '{}' on page {}", decoded.name, index + 1);
    }

    let output = store.reserve_output("images", "images.pdf", MediaKind::Pdf)?;
    let mut guard = ArtifactGuard::new();
    guard.push(output.clone());
    super::save_document(&document, &output.path)?;
    info!("Built a {}-page document from images", images.len());
    Ok(guard.release())
}

/// Render every page to `page_{n}.png`.
pub fn document_to_images(
    pdfium: &Pdfium,
    store: &ArtifactStore,
    input: &ArtifactRef,
    settings: RasterSettings,
) -> Result<Vec<ArtifactRef>, DocforgeError> {
    let mut outputs = ArtifactGuard::new();
    render_pages(pdfium, input, settings, |index, image| {
        let output = store.reserve_output("page", page_member_name(index, "png"), MediaKind::Png)?;
        outputs.push(output.clone());
        save_png(&image, &output.path)
    })?;
    info!("Rendered {} pages of '{}'", outputs.len(), input.original_name);
    Ok(outputs.release())
}

/// Render every page and place each render full-width on its own slide.
///
/// Page renders only live in a scratch directory for the duration of the
/// call; the deck is the single output.
pub fn document_to_presentation(
    pdfium: &Pdfium,
    store: &ArtifactStore,
    input: &ArtifactRef,
    settings: RasterSettings,
) -> Result<Vec<ArtifactRef>, DocforgeError> {
    let output = store.reserve_output(
        "slides",
        format!("{}.pptx", input.stem()),
        MediaKind::Pptx,
    )?;
    let mut guard = ArtifactGuard::new();
    guard.push(output.clone());

    let scratch = store.scratch_dir("slides")?;
    let mut deck = PresentationWriter::create(&output.path)?;
    render_pages(pdfium, input, settings, |index, image| {
        let png = scratch_file(scratch.path(), index, "png");
        save_png(&image, &png)?;
        deck.add_picture_slide(&png, image.width(), image.height())?;
        std::fs::remove_file(&png).map_err(|e| DocforgeError::storage(&png, e))
    })?;
    let slides = deck.slide_count();
    deck.finish()?;

    info!("Built a {}-slide deck from '{}'", slides, input.original_name);
    Ok(guard.release())
}

/// Render each page of `input` in order and hand it to `sink` with its
/// 0-based index. Stops at the first error from either side.
fn render_pages<F>(
    pdfium: &Pdfium,
    input: &ArtifactRef,
    settings: RasterSettings,
    mut sink: F,
) -> Result<(), DocforgeError>
where
    F: FnMut(usize, DynamicImage) -> Result<(), DocforgeError>,
{
    let document = load_document(pdfium, input)?;
    let max = settings.pixel_cap();
    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(settings.dpi as f32 / POINTS_PER_INCH)
        .set_maximum_width(max)
        .set_maximum_height(max);

    for (index, page) in document.pages().iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(page_failed(index))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            index + 1,
            image.width(),
            image.height()
        );
        sink(index, image)?;
    }
    Ok(())
}

fn save_png(image: &DynamicImage, path: &std::path::Path) -> Result<(), DocforgeError> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| DocforgeError::storage(path, std::io::Error::other(e.to_string())))
}
