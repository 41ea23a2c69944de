//! Archive packager: bundle several outputs into one ZIP deliverable.
//!
//! A job hands back exactly one file. When a transform yields many (one PDF
//! per page, one PNG per page) they are streamed into a ZIP, each member is
//! deleted as soon as it has been copied in, and only the archive remains.

use crate::artifact::{ArtifactGuard, ArtifactRef, MediaKind};
use crate::error::DocforgeError;
use crate::store::ArtifactStore;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Packs artifacts into ZIP archives on an [`ArtifactStore`].
#[derive(Debug, Clone)]
pub struct ArchivePackager {
    store: ArtifactStore,
}

impl ArchivePackager {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    /// Pack `members` into a new archive named `download_name`.
    ///
    /// Each member is stored under its `original_name` (`page_1.pdf`, …).
    /// Members are deleted once copied; on failure the partial archive and
    /// every member not yet copied are deleted too. An empty member list
    /// produces a valid, empty archive.
    pub fn pack(
        &self,
        members: Vec<ArtifactRef>,
        prefix: &str,
        download_name: &str,
    ) -> Result<ArtifactRef, DocforgeError> {
        let count = members.len();
        let mut remaining = ArtifactGuard::from(members);
        let archive = self
            .store
            .reserve_output(prefix, download_name, MediaKind::Zip)?;
        let mut partial = ArtifactGuard::new();
        partial.push(archive.clone());

        let file = File::create(&archive.path).map_err(|e| DocforgeError::storage(&archive.path, e))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for member in remaining.artifacts().to_vec() {
            zip.start_file(member.original_name.as_str(), options)
                .map_err(|e| archive_error(&archive.path, e))?;
            let mut source =
                File::open(&member.path).map_err(|e| DocforgeError::storage(&member.path, e))?;
            std::io::copy(&mut source, &mut zip)
                .map_err(|e| DocforgeError::storage(&archive.path, e))?;
            drop(source);

            self.store.delete(&member)?;
            remaining.forget(&member.path);
            debug!("Packed {} into {}", member.original_name, archive.path.display());
        }

        let mut writer = zip.finish().map_err(|e| archive_error(&archive.path, e))?;
        writer
            .flush()
            .map_err(|e| DocforgeError::storage(&archive.path, e))?;

        partial.forget(&archive.path);
        info!("Packaged {} artifacts into {}", count, archive.path.display());
        Ok(archive)
    }
}

fn archive_error(path: &Path, e: zip::result::ZipError) -> DocforgeError {
    DocforgeError::ArchiveWrite {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}
