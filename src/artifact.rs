//! Artifact references and the cleanup guard that owns them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What kind of file an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Pdf,
    Png,
    Jpeg,
    Zip,
    Docx,
    Pptx,
    Xlsx,
    /// An office document the engine can read (doc, odt, ppt, xls, html, …).
    Office,
    Other,
}

impl MediaKind {
    /// Guess the kind from a file name's extension (case-insensitive).
    pub fn from_name(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => MediaKind::Pdf,
            "png" => MediaKind::Png,
            "jpg" | "jpeg" => MediaKind::Jpeg,
            "zip" => MediaKind::Zip,
            "docx" => MediaKind::Docx,
            "pptx" => MediaKind::Pptx,
            "xlsx" => MediaKind::Xlsx,
            "doc" | "odt" | "rtf" | "ppt" | "odp" | "xls" | "ods" | "csv" | "html" | "htm"
            | "txt" => MediaKind::Office,
            _ => MediaKind::Other,
        }
    }

    /// Canonical file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Pdf => "pdf",
            MediaKind::Png => "png",
            MediaKind::Jpeg => "jpg",
            MediaKind::Zip => "zip",
            MediaKind::Docx => "docx",
            MediaKind::Pptx => "pptx",
            MediaKind::Xlsx => "xlsx",
            MediaKind::Office | MediaKind::Other => "bin",
        }
    }

    /// MIME type for the download response.
    pub fn mime_type(self) -> &'static str {
        match self {
            MediaKind::Pdf => "application/pdf",
            MediaKind::Png => "image/png",
            MediaKind::Jpeg => "image/jpeg",
            MediaKind::Zip => "application/zip",
            MediaKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            MediaKind::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            MediaKind::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            MediaKind::Office | MediaKind::Other => "application/octet-stream",
        }
    }
}

/// A file on the artifact store.
///
/// `original_name` is the name the file is known by outside the store: the
/// upload's filename for inputs, the archive member or download filename for
/// outputs. The on-disk name always carries a random token as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub original_name: String,
    pub kind: MediaKind,
}

impl ArtifactRef {
    pub fn new(path: impl Into<PathBuf>, original_name: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            path: path.into(),
            original_name: original_name.into(),
            kind,
        }
    }

    /// The original name without its extension, for naming derived outputs.
    pub fn stem(&self) -> &str {
        Path::new(&self.original_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("document")
    }
}

/// Remove an artifact's file; a missing file is not an error.
pub(crate) fn remove_artifact_file(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Deleted artifact {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Owns a set of intermediate artifacts and deletes them when dropped.
///
/// Every early return, `?` and panic between staging and completion passes
/// through the guard's `Drop`, so intermediates cannot outlive their job.
/// Call [`ArtifactGuard::release`] to hand the artifacts on instead.
#[derive(Debug, Default)]
pub struct ArtifactGuard {
    artifacts: Vec<ArtifactRef>,
}

impl ArtifactGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, artifact: ArtifactRef) {
        self.artifacts.push(artifact);
    }

    pub fn artifacts(&self) -> &[ArtifactRef] {
        &self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Stop tracking any artifact stored at `path` (it became a deliverable).
    pub fn forget(&mut self, path: &Path) {
        self.artifacts.retain(|a| a.path != path);
    }

    /// Hand the artifacts to the caller; the guard no longer deletes them.
    pub fn release(mut self) -> Vec<ArtifactRef> {
        std::mem::take(&mut self.artifacts)
    }
}

impl From<Vec<ArtifactRef>> for ArtifactGuard {
    fn from(artifacts: Vec<ArtifactRef>) -> Self {
        Self { artifacts }
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        for artifact in self.artifacts.drain(..) {
            if let Err(e) = remove_artifact_file(&artifact.path) {
                warn!(
                    "Failed to delete intermediate artifact {}: {}",
                    artifact.path.display(),
                    e
                );
            }
        }
    }
}
