//! Error types for the docforge library.
//!
//! Every failure a job can hit is a [`DocforgeError`]. Callers that only need
//! to decide how to answer a request (reject the input, report a processing
//! failure) look at [`DocforgeError::kind`], which folds the variants onto the
//! four job failure categories:
//!
//! * [`ErrorKind::Validation`]: malformed or missing input/parameters. Raised
//!   before anything is staged, so no side effects happened.
//! * [`ErrorKind::Format`]: the bytes do not parse as the expected document
//!   or image kind.
//! * [`ErrorKind::Engine`]: the external conversion process failed, timed
//!   out, or produced no output.
//! * [`ErrorKind::Storage`]: I/O failure while staging or writing artifacts.
//!
//! A fifth category, [`ErrorKind::Internal`], covers environment problems
//! (pdfium not bindable, invalid configuration, a panicked worker task).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the docforge library.
#[derive(Debug, Error)]
pub enum DocforgeError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// The operation received the wrong number of input files.
    #[error("'{operation}' expects {expected}, got {got} file(s)")]
    InputCount {
        operation: &'static str,
        expected: &'static str,
        got: usize,
    },

    /// Rotation angle is not a multiple of 90 degrees.
    #[error("Rotation angle must be a multiple of 90 degrees, got {angle}")]
    InvalidRotation { angle: i32 },

    /// Watermark text is empty or whitespace only.
    #[error("Watermark text must not be empty")]
    EmptyWatermark,

    /// An uploaded file has no content.
    #[error("Upload '{name}' is empty")]
    EmptyUpload { name: String },

    /// An uploaded file exceeds the configured size limit.
    #[error("Upload '{name}' is {size} bytes, limit is {limit} bytes")]
    UploadTooLarge { name: String, size: u64, limit: u64 },

    // ── Format errors ─────────────────────────────────────────────────────
    /// The file is not a PDF (magic bytes mismatch).
    #[error("File is not a valid PDF: '{name}'\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    /// pdfium rejected the document.
    #[error("PDF '{name}' could not be read: {detail}")]
    CorruptDocument { name: String, detail: String },

    /// The image decoder rejected an upload.
    #[error("Image '{name}' could not be decoded: {detail}")]
    UnsupportedImage { name: String, detail: String },

    /// pdfium failed while transforming or rendering a page.
    #[error("Processing page {page} failed: {detail}")]
    PageFailed { page: usize, detail: String },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The conversion engine could not be started at all.
    #[error("Failed to start conversion engine '{program}': {source}\nSet --soffice to the engine executable.")]
    EngineSpawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The conversion engine exited with a non-zero status.
    #[error("Conversion engine exited with {}: {stderr}", describe_exit(.exit_code))]
    EngineFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The conversion engine did not finish in time and was killed.
    #[error("Conversion engine timed out after {secs}s")]
    EngineTimeout { secs: u64 },

    /// The engine reported success but the expected file is missing.
    #[error("Conversion engine exited successfully but produced no output at '{expected}'")]
    EngineNoOutput { expected: PathBuf },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Reading or writing an artifact failed.
    #[error("Storage error at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a ZIP container (result archive or OOXML package) failed.
    #[error("Failed to write archive '{path}': {detail}")]
    ArchiveWrite { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium from https://github.com/bblanchon/pdfium-binaries and either\n\
  • place it next to the binary or in the system library path, or\n\
  • set DOCFORGE_PDFIUM_LIB=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "a signal".to_string(),
    }
}

/// Failure category reported to the caller of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Format,
    Engine,
    Storage,
    Internal,
}

impl ErrorKind {
    /// True for requests rejected before processing began. Everything else,
    /// format errors included, is a processing failure.
    pub fn is_user_error(self) -> bool {
        matches!(self, ErrorKind::Validation)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation error",
            ErrorKind::Format => "format error",
            ErrorKind::Engine => "engine error",
            ErrorKind::Storage => "storage error",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(s)
    }
}

impl DocforgeError {
    /// The failure category of this error.
    pub fn kind(&self) -> ErrorKind {
        use DocforgeError::*;
        match self {
            InputCount { .. }
            | InvalidRotation { .. }
            | EmptyWatermark
            | EmptyUpload { .. }
            | UploadTooLarge { .. } => ErrorKind::Validation,
            NotAPdf { .. } | CorruptDocument { .. } | UnsupportedImage { .. } | PageFailed { .. } => {
                ErrorKind::Format
            }
            EngineSpawn { .. } | EngineFailed { .. } | EngineTimeout { .. } | EngineNoOutput { .. } => {
                ErrorKind::Engine
            }
            Storage { .. } | ArchiveWrite { .. } => ErrorKind::Storage,
            InvalidConfig(_) | PdfiumBindingFailed(_) | Internal(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for wrapping an I/O error with the path it happened on.
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocforgeError::Storage {
            path: path.into(),
            source,
        }
    }
}
