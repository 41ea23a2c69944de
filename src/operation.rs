//! The eleven transform operations and their request-level validation.
//!
//! Validation here is purely structural (input count, parameter values) and
//! runs before anything touches the artifact store.

use crate::error::DocforgeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A transform operation plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    /// Concatenate the pages of every input PDF, in input order.
    Merge,
    /// One single-page PDF per page of the input.
    Split,
    /// Rotate every page by `angle` degrees clockwise (a multiple of 90).
    Rotate { angle: i32 },
    /// Stamp translucent `text` on every page.
    Watermark { text: String },
    /// Re-serialise the input PDF.
    Compress,
    /// One page per input image, in input order.
    ImagesToDocument,
    /// Rasterise every page to PNG.
    DocumentToImages,
    /// Convert an office document to PDF with the external engine.
    OfficeToDocument,
    /// Extracted text lines as DOCX paragraphs.
    DocumentToOfficeText,
    /// One page picture per PPTX slide.
    DocumentToPresentation,
    /// Extracted text lines as XLSX rows.
    DocumentToSpreadsheet,
}

/// How many inputs an operation takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    ExactlyOne,
    AtLeastOne,
}

impl Arity {
    fn accepts(self, count: usize) -> bool {
        match self {
            Arity::ExactlyOne => count == 1,
            Arity::AtLeastOne => count >= 1,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Arity::ExactlyOne => "exactly 1 file",
            Arity::AtLeastOne => "at least 1 file",
        }
    }
}

/// What an operation's inputs must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Pdf,
    Image,
    /// Anything the conversion engine can open; not checked up front.
    Office,
}

impl Operation {
    /// Short command-style name, used in logs, spans and output prefixes.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Merge => "merge",
            Operation::Split => "split",
            Operation::Rotate { .. } => "rotate",
            Operation::Watermark { .. } => "watermark",
            Operation::Compress => "compress",
            Operation::ImagesToDocument => "img-to-pdf",
            Operation::DocumentToImages => "pdf-to-images",
            Operation::OfficeToDocument => "office-to-pdf",
            Operation::DocumentToOfficeText => "pdf-to-word",
            Operation::DocumentToPresentation => "pdf-to-ppt",
            Operation::DocumentToSpreadsheet => "pdf-to-excel",
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Operation::Merge | Operation::ImagesToDocument => Arity::AtLeastOne,
            _ => Arity::ExactlyOne,
        }
    }

    pub fn input_format(&self) -> InputFormat {
        match self {
            Operation::ImagesToDocument => InputFormat::Image,
            Operation::OfficeToDocument => InputFormat::Office,
            _ => InputFormat::Pdf,
        }
    }

    /// Download name of the archive used when the operation yields several
    /// files. Only split and rasterisation ever do.
    pub fn archive_name(&self) -> &'static str {
        match self {
            Operation::Split => "split.zip",
            Operation::DocumentToImages => "images.zip",
            _ => "outputs.zip",
        }
    }

    /// Check input count and parameters.
    ///
    /// Returns a validation error without side effects.
    pub fn validate(&self, input_count: usize) -> Result<(), DocforgeError> {
        let arity = self.arity();
        if !arity.accepts(input_count) {
            return Err(DocforgeError::InputCount {
                operation: self.name(),
                expected: arity.describe(),
                got: input_count,
            });
        }
        match self {
            Operation::Rotate { angle } => normalize_rotation(*angle).map(|_| ()),
            Operation::Watermark { text } if text.trim().is_empty() => {
                Err(DocforgeError::EmptyWatermark)
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reduce a rotation to 0, 90, 180 or 270 degrees.
///
/// Negative multiples of 90 are accepted (`-90` is `270`); anything else is
/// a validation error.
pub fn normalize_rotation(angle: i32) -> Result<u16, DocforgeError> {
    if angle % 90 != 0 {
        return Err(DocforgeError::InvalidRotation { angle });
    }
    Ok(angle.rem_euclid(360) as u16)
}
