//! # docforge
//!
//! A document-transform job pipeline: merge, split, rotate, watermark and
//! compress PDFs, convert images and office files to PDF, and turn PDFs into
//! images, DOCX, PPTX or XLSX.
//!
//! ## Why a pipeline?
//!
//! Every operation follows the same lifecycle: uploads are staged on disk,
//! a transform runs (in-process through pdfium, or out-of-process through
//! LibreOffice), several outputs are bundled into one archive, and exactly
//! one file goes back to the caller. The interesting part is not any single
//! transform but keeping that lifecycle tidy when requests run concurrently
//! and fail halfway: names never collide, and nothing a job created outlives
//! it except its result.
//!
//! ## Pipeline Overview
//!
//! ```text
//! JobRequest
//!  │
//!  ├─ 1. Validate  input count, parameters, upload sizes (no side effects)
//!  ├─ 2. Stage     uploads → inbound/<token>_<name>
//!  ├─ 3. Transform pdfium (spawn_blocking) or soffice (subprocess + timeout)
//!  ├─ 4. Package   several outputs → one ZIP, members deleted as packed
//!  └─ 5. Return    one ArtifactRef; staged inputs removed
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docforge::{Dispatcher, JobRequest, Operation, PipelineConfig, Upload};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dispatcher = Dispatcher::new(PipelineConfig::default())?;
//!     let request = JobRequest::new(
//!         Operation::Merge,
//!         vec![
//!             Upload::from_path(Path::new("a.pdf")).await?,
//!             Upload::from_path(Path::new("b.pdf")).await?,
//!         ],
//!     );
//!     let output = dispatcher.run(request).await?;
//!     let name = output.download_name().to_string();
//!     dispatcher.store().deliver(output.artifact, Path::new(&name)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docforge` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## Native dependencies
//!
//! PDF work needs libpdfium at runtime (see [`PipelineConfig::pdfium_library_path`]).
//! Office conversion needs LibreOffice's `soffice` (see
//! [`PipelineConfig::engine_program`]). Neither is needed for the other's
//! operations.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod artifact;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ooxml;
pub mod operation;
pub mod store;
pub mod transform;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use archive::ArchivePackager;
pub use artifact::{ArtifactGuard, ArtifactRef, MediaKind};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use dispatch::{Dispatcher, JobOutput, JobRequest, JobState, JobStats, Upload};
pub use engine::ConversionEngine;
pub use error::{DocforgeError, ErrorKind};
pub use operation::{normalize_rotation, Operation};
pub use store::{clean_file_name, ArtifactStore};
pub use transform::{pdfium_available, TransformContext};
