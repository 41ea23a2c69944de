//! Transform operations: staged inputs in, output artifacts out.
//!
//! ## Execution model
//!
//! pdfium is a C library with global state and is not safe to drive from
//! async worker threads, so every pdfium transform runs inside
//! `tokio::task::spawn_blocking` and binds pdfium there through a
//! [`PdfiumSession`]. Sessions are exclusive, so pdfium work from concurrent
//! jobs is serialised while staging, packaging and engine runs still overlap.
//! The office conversion is different: it awaits an external process and
//! stays on the async side.
//!
//! ## Output ownership
//!
//! Each transform reserves its outputs on the [`ArtifactStore`] and tracks
//! them in an [`ArtifactGuard`] until the last one is written. A transform
//! that fails halfway therefore leaves nothing behind; the dispatcher only
//! ever sees complete output sets.
//!
//! | Module     | Operations                                             |
//! |------------|--------------------------------------------------------|
//! | [`pages`]  | merge, split, rotate, watermark, compress              |
//! | [`raster`] | images → PDF, PDF → images, PDF → PPTX                 |
//! | [`text`]   | PDF → DOCX, PDF → XLSX                                 |
//! | [`office`] | office document → PDF (external engine)                |
//!
//! [`ArtifactGuard`]: crate::artifact::ArtifactGuard

pub mod office;
pub mod pages;
pub mod raster;
pub mod text;

use crate::artifact::ArtifactRef;
use crate::config::PipelineConfig;
use crate::engine::ConversionEngine;
use crate::error::DocforgeError;
use crate::operation::{normalize_rotation, InputFormat, Operation};
use crate::store::ArtifactStore;
use pdfium_render::prelude::*;
use std::io::Read;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Everything a transform may touch.
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub store: ArtifactStore,
    pub engine: ConversionEngine,
    pub config: Arc<PipelineConfig>,
}

impl TransformContext {
    pub fn new(store: ArtifactStore, engine: ConversionEngine, config: Arc<PipelineConfig>) -> Self {
        Self {
            store,
            engine,
            config,
        }
    }

    /// Run `operation` on already-staged `inputs`.
    ///
    /// Inputs are never modified or deleted here. On success every returned
    /// artifact is complete; on failure no output is left in the store.
    pub async fn apply(
        &self,
        operation: &Operation,
        inputs: &[ArtifactRef],
    ) -> Result<Vec<ArtifactRef>, DocforgeError> {
        operation.validate(inputs.len())?;
        if operation.input_format() == InputFormat::Pdf {
            for input in inputs {
                ensure_pdf(input)?;
            }
        }

        let inputs = inputs.to_vec();
        match operation {
            Operation::Merge => self.with_pdfium("merge", move |p, s| pages::merge(p, s, &inputs)).await,
            Operation::Split => self.with_pdfium("split", move |p, s| pages::split(p, s, &inputs[0])).await,
            Operation::Rotate { angle } => {
                let degrees = normalize_rotation(*angle)?;
                self.with_pdfium("rotate", move |p, s| pages::rotate(p, s, &inputs[0], degrees))
                    .await
            }
            Operation::Watermark { text } => {
                let stamp = pages::WatermarkStyle {
                    text: text.clone(),
                    font_size: self.config.watermark_font_size,
                    opacity: self.config.watermark_opacity,
                };
                self.with_pdfium("watermark", move |p, s| pages::watermark(p, s, &inputs[0], &stamp))
                    .await
            }
            Operation::Compress => {
                self.with_pdfium("compress", move |p, s| pages::compress(p, s, &inputs[0]))
                    .await
            }
            Operation::ImagesToDocument => {
                let images = run_blocking("image decode", move || raster::decode_images(&inputs)).await?;
                self.with_pdfium("img-to-pdf", move |p, s| raster::images_to_document(p, s, images))
                    .await
            }
            Operation::DocumentToImages => {
                let raster = self.raster_settings();
                self.with_pdfium("pdf-to-images", move |p, s| {
                    raster::document_to_images(p, s, &inputs[0], raster)
                })
                .await
            }
            Operation::DocumentToPresentation => {
                let raster = self.raster_settings();
                self.with_pdfium("pdf-to-ppt", move |p, s| {
                    raster::document_to_presentation(p, s, &inputs[0], raster)
                })
                .await
            }
            Operation::DocumentToOfficeText => {
                self.with_pdfium("pdf-to-word", move |p, s| text::document_to_word(p, s, &inputs[0]))
                    .await
            }
            Operation::DocumentToSpreadsheet => {
                self.with_pdfium("pdf-to-excel", move |p, s| {
                    text::document_to_spreadsheet(p, s, &inputs[0])
                })
                .await
            }
            Operation::OfficeToDocument => {
                office::office_to_document(&self.store, &self.engine, &inputs[0]).await
            }
        }
    }

    fn raster_settings(&self) -> raster::RasterSettings {
        raster::RasterSettings {
            dpi: self.config.render_dpi,
            max_pixels: self.config.max_rendered_pixels,
        }
    }

    /// Bind pdfium on a blocking thread and run `f` there.
    async fn with_pdfium<T, F>(&self, what: &'static str, f: F) -> Result<T, DocforgeError>
    where
        T: Send + 'static,
        F: FnOnce(&Pdfium, &ArtifactStore) -> Result<T, DocforgeError> + Send + 'static,
    {
        let store = self.store.clone();
        let library = self.config.pdfium_library_path.clone();
        run_blocking(what, move || {
            let pdfium = PdfiumSession::open(library.as_deref())?;
            f(&pdfium, &store)
        })
        .await
    }
}

/// Run CPU-bound work on the blocking pool, surfacing a panic as an internal error.
pub(crate) async fn run_blocking<T, F>(what: &'static str, f: F) -> Result<T, DocforgeError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DocforgeError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DocforgeError::Internal(format!("{what} task panicked: {e}")))?
}

/// Held while a [`Pdfium`] instance is alive. pdfium initialises and tears
/// down process-global state, so two instances must never overlap.
static PDFIUM_LOCK: Mutex<()> = Mutex::new(());

/// A bound pdfium instance with exclusive use of the library.
pub struct PdfiumSession {
    // Field order matters: pdfium is torn down before the lock is released.
    pdfium: Pdfium,
    _lock: MutexGuard<'static, ()>,
}

impl PdfiumSession {
    /// Wait for the library to be free, then bind it.
    pub fn open(library: Option<&Path>) -> Result<Self, DocforgeError> {
        let lock = PDFIUM_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let pdfium = bind_pdfium(library)?;
        Ok(Self {
            pdfium,
            _lock: lock,
        })
    }
}

impl Deref for PdfiumSession {
    type Target = Pdfium;

    fn deref(&self) -> &Pdfium {
        &self.pdfium
    }
}

/// True when libpdfium can be bound with the given (or default) location.
pub fn pdfium_available(library: Option<&Path>) -> bool {
    PdfiumSession::open(library).is_ok()
}

/// Bind to libpdfium.
///
/// An explicit `library` path wins. Otherwise the working directory is tried
/// first, then the system library path.
fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium, DocforgeError> {
    let bindings = match library {
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| DocforgeError::PdfiumBindingFailed(e.to_string()))?;
    Ok(Pdfium::new(bindings))
}

/// Reject inputs that do not start with the PDF magic bytes.
pub(crate) fn ensure_pdf(input: &ArtifactRef) -> Result<(), DocforgeError> {
    let mut file =
        std::fs::File::open(&input.path).map_err(|e| DocforgeError::storage(&input.path, e))?;
    let mut magic = Vec::with_capacity(4);
    file.by_ref()
        .take(4)
        .read_to_end(&mut magic)
        .map_err(|e| DocforgeError::storage(&input.path, e))?;
    if magic != b"%PDF" {
        return Err(DocforgeError::NotAPdf {
            name: input.original_name.clone(),
            magic,
        });
    }
    debug!("'{}' has PDF magic", input.original_name);
    Ok(())
}

/// Open a staged PDF with pdfium.
pub(crate) fn load_document<'a>(
    pdfium: &'a Pdfium,
    input: &ArtifactRef,
) -> Result<PdfDocument<'a>, DocforgeError> {
    pdfium
        .load_pdf_from_file(&input.path, None)
        .map_err(|e| DocforgeError::CorruptDocument {
            name: input.original_name.clone(),
            detail: format!("{e:?}"),
        })
}

/// Write a document to a reserved output path.
pub(crate) fn save_document(document: &PdfDocument, path: &Path) -> Result<(), DocforgeError> {
    document
        .save_to_file(path)
        .map_err(|e| DocforgeError::storage(path, std::io::Error::other(format!("{e:?}"))))
}

/// Map a pdfium failure on page `index` (0-based).
pub(crate) fn page_failed(index: usize) -> impl Fn(PdfiumError) -> DocforgeError {
    move |e| DocforgeError::PageFailed {
        page: index + 1,
        detail: format!("{e:?}"),
    }
}

/// Name used inside archives for the file derived from page `index` (0-based).
pub(crate) fn page_member_name(index: usize, extension: &str) -> String {
    format!("page_{}.{}", index + 1, extension)
}

/// Path helper for scratch files that never become artifacts.
pub(crate) fn scratch_file(dir: &Path, index: usize, extension: &str) -> PathBuf {
    dir.join(page_member_name(index, extension))
}
