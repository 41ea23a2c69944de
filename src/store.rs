//! Artifact store: the on-disk staging area shared by all jobs.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!  ├─ inbound/   staged uploads      <token>_<clean name>
//!  └─ outbound/  generated outputs   <prefix>_<token>.<ext>
//!                engine scratch dirs <prefix>-XXXXXX/
//! ```
//!
//! Concurrent jobs share the directory namespace and nothing else. Every name
//! the store hands out carries a fresh UUID token and is reserved with an
//! exclusive create, so two jobs producing "merged.pdf" at the same instant
//! still land on different paths. No locking is involved.

use crate::artifact::{remove_artifact_file, ArtifactRef, MediaKind};
use crate::error::DocforgeError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

const INBOUND: &str = "inbound";
const OUTBOUND: &str = "outbound";

/// Attempts at reserving a fresh name before giving up. A UUID collision is
/// not expected in practice; the loop only exists so one cannot go unnoticed.
const RESERVE_ATTEMPTS: usize = 4;

/// Longest file-name fragment kept from an upload's suggested name.
const MAX_NAME_LEN: usize = 100;

/// Longer suffixes are treated as part of the stem.
const MAX_EXTENSION_LEN: usize = 16;

const FALLBACK_STEM: &str = "upload";

static UNSAFE_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static regex"));

/// Handle to the store. Cheap to clone; clones share the same directories.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    inbound: PathBuf,
    outbound: PathBuf,
}

impl ArtifactStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DocforgeError> {
        let root = root.into();
        let inbound = root.join(INBOUND);
        let outbound = root.join(OUTBOUND);
        for dir in [&inbound, &outbound] {
            std::fs::create_dir_all(dir).map_err(|e| DocforgeError::storage(dir, e))?;
        }
        debug!("Artifact store ready at {}", root.display());
        Ok(Self {
            root,
            inbound,
            outbound,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn inbound_dir(&self) -> &Path {
        &self.inbound
    }

    pub fn outbound_dir(&self) -> &Path {
        &self.outbound
    }

    /// Copy caller-provided bytes into the inbound area.
    ///
    /// The stored name is `<token>_<clean suggested name>`; the artifact keeps
    /// the cleaned suggested name as its `original_name`.
    pub async fn stage(
        &self,
        bytes: &[u8],
        suggested_name: &str,
    ) -> Result<ArtifactRef, DocforgeError> {
        let name = clean_file_name(suggested_name);

        for _ in 0..RESERVE_ATTEMPTS {
            let path = self.inbound.join(format!("{}_{}", new_token(), name));
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            let mut file = match file {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(DocforgeError::storage(&path, e)),
            };

            let written = async {
                file.write_all(bytes).await?;
                file.flush().await
            }
            .await;
            if let Err(e) = written {
                drop(file);
                let _ = remove_artifact_file(&path);
                return Err(DocforgeError::storage(&path, e));
            }

            debug!("Staged '{}' ({} bytes) → {}", name, bytes.len(), path.display());
            let kind = MediaKind::from_name(&name);
            return Ok(ArtifactRef::new(path, name, kind));
        }

        Err(exhausted(&self.inbound))
    }

    /// Reserve a unique path in the outbound area.
    ///
    /// An empty file is created at the returned path so no other job can
    /// claim it; the transform then overwrites it.
    pub fn materialize_output_path(
        &self,
        prefix: &str,
        extension: &str,
    ) -> Result<PathBuf, DocforgeError> {
        let prefix = clean_file_name(prefix);
        for _ in 0..RESERVE_ATTEMPTS {
            let path = self
                .outbound
                .join(format!("{}_{}.{}", prefix, new_token(), extension));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(DocforgeError::storage(&path, e)),
            }
        }
        Err(exhausted(&self.outbound))
    }

    /// Reserve an output location and wrap it as an artifact of `kind`.
    pub fn reserve_output(
        &self,
        prefix: &str,
        original_name: impl Into<String>,
        kind: MediaKind,
    ) -> Result<ArtifactRef, DocforgeError> {
        let path = self.materialize_output_path(prefix, kind.extension())?;
        Ok(ArtifactRef::new(path, original_name, kind))
    }

    /// Create a private, uniquely named directory in the outbound area.
    ///
    /// The directory and everything in it is removed when the returned
    /// [`TempDir`] is dropped.
    pub fn scratch_dir(&self, prefix: &str) -> Result<TempDir, DocforgeError> {
        tempfile::Builder::new()
            .prefix(&format!("{}-", clean_file_name(prefix)))
            .tempdir_in(&self.outbound)
            .map_err(|e| DocforgeError::storage(&self.outbound, e))
    }

    /// Move a file produced elsewhere (e.g. in a scratch dir) into the
    /// outbound area under a reserved name.
    pub fn adopt(
        &self,
        source: &Path,
        prefix: &str,
        original_name: impl Into<String>,
        kind: MediaKind,
    ) -> Result<ArtifactRef, DocforgeError> {
        let artifact = self.reserve_output(prefix, original_name, kind)?;
        if let Err(e) = std::fs::rename(source, &artifact.path) {
            let _ = remove_artifact_file(&artifact.path);
            return Err(DocforgeError::storage(source, e));
        }
        Ok(artifact)
    }

    /// Delete an artifact. Deleting something already gone is a no-op.
    pub fn delete(&self, artifact: &ArtifactRef) -> Result<(), DocforgeError> {
        remove_artifact_file(&artifact.path).map_err(|e| DocforgeError::storage(&artifact.path, e))
    }

    /// Copy a delivered artifact to `dest` and remove it from the store.
    ///
    /// Returns the number of bytes written.
    pub async fn deliver(&self, artifact: ArtifactRef, dest: &Path) -> Result<u64, DocforgeError> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DocforgeError::storage(parent, e))?;
        }
        let copied = tokio::fs::copy(&artifact.path, dest)
            .await
            .map_err(|e| DocforgeError::storage(dest, e))?;
        self.delete(&artifact)?;
        info!("Delivered '{}' → {}", artifact.original_name, dest.display());
        Ok(copied)
    }

    /// Read a delivered artifact into memory and remove it from the store.
    pub async fn take(&self, artifact: ArtifactRef) -> Result<Vec<u8>, DocforgeError> {
        let bytes = tokio::fs::read(&artifact.path)
            .await
            .map_err(|e| DocforgeError::storage(&artifact.path, e))?;
        self.delete(&artifact)?;
        Ok(bytes)
    }

    /// Remove every entry in both areas last modified more than `ttl` ago.
    ///
    /// Returns how many entries were removed.
    pub fn purge_older_than(&self, ttl: Duration) -> Result<usize, DocforgeError> {
        let cutoff = SystemTime::now()
            .checked_sub(ttl)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;

        for dir in [&self.inbound, &self.outbound] {
            let entries = std::fs::read_dir(dir).map_err(|e| DocforgeError::storage(dir, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| DocforgeError::storage(dir, e))?;
                let path = entry.path();
                let meta = match entry.metadata() {
                    Ok(m) => m,
                    // Deleted by its own job between read_dir and here.
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    Err(e) => return Err(DocforgeError::storage(&path, e)),
                };
                let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                if modified > cutoff {
                    continue;
                }
                let result = if meta.is_dir() {
                    std::fs::remove_dir_all(&path)
                } else {
                    remove_artifact_file(&path)
                };
                match result {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Retention sweep could not remove {}: {}", path.display(), e),
                }
            }
        }

        if removed > 0 {
            info!("Retention sweep removed {} expired artifacts", removed);
        }
        Ok(removed)
    }
}

fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

fn exhausted(dir: &Path) -> DocforgeError {
    DocforgeError::storage(
        dir,
        std::io::Error::new(ErrorKind::AlreadyExists, "could not reserve a unique name"),
    )
}

/// Reduce an untrusted file name to a safe single path component.
///
/// Directory parts (either separator style) are dropped, runs of unsafe
/// characters become `_`, and leading dots are stripped so the result can
/// never be `..` or a hidden file. Long names lose characters from the stem,
/// never from the extension. A stem with nothing readable left becomes
/// `upload`.
pub fn clean_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let replaced = UNSAFE_NAME_CHARS.replace_all(last, "_");
    let trimmed = replaced.trim_start_matches('.');

    let (stem, extension) = match trimmed.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() && ext.len() <= MAX_EXTENSION_LEN => (stem, Some(ext)),
        _ => (trimmed, None),
    };
    let stem = if stem.chars().all(|c| c == '_' || c == '.') {
        FALLBACK_STEM
    } else {
        stem
    };

    // Only ASCII survives the regex, so byte offsets are char offsets.
    match extension {
        Some(ext) => {
            let keep = MAX_NAME_LEN - ext.len() - 1;
            format!("{}.{ext}", &stem[..stem.len().min(keep)])
        }
        None => stem[..stem.len().min(MAX_NAME_LEN)].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_file_name_strips_paths_and_junk() {
        assert_eq!(clean_file_name("report.pdf"), "report.pdf");
        assert_eq!(clean_file_name("../../etc/passwd"), "passwd");
        assert_eq!(clean_file_name(r"C:\Users\me\My File (1).pdf"), "My_File_1_.pdf");
        assert_eq!(clean_file_name(".."), "upload");
        assert_eq!(clean_file_name(""), "upload");
        assert_eq!(clean_file_name("..hidden"), "hidden");
    }

    #[test]
    fn long_names_keep_their_extension() {
        let cleaned = clean_file_name(&format!("{}.docx", "a".repeat(120)));
        assert_eq!(cleaned.len(), MAX_NAME_LEN);
        assert!(cleaned.ends_with(".docx"), "got {cleaned}");
        assert_eq!(MediaKind::from_name(&cleaned), MediaKind::Docx);

        let bare = clean_file_name(&"b".repeat(150));
        assert_eq!(bare, "b".repeat(MAX_NAME_LEN));
    }

    #[test]
    fn unreadable_stems_fall_back_to_upload() {
        assert_eq!(clean_file_name("報告.docx"), "upload.docx");
        assert_eq!(clean_file_name("報告"), "upload");
        assert_eq!(clean_file_name("報告 2024.pdf"), "_2024.pdf");
        assert_eq!(clean_file_name("archive.tar.gz"), "archive.tar.gz");
    }

    #[tokio::test]
    async fn long_docx_upload_keeps_its_kind() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let name = format!("{}.docx", "q".repeat(120));

        let staged = store.stage(b"fake", &name).await.unwrap();
        assert_eq!(staged.kind, MediaKind::Docx);
        assert_eq!(staged.path.extension().unwrap(), "docx");
    }

    #[tokio::test]
    async fn same_name_uploads_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();

        let a = store.stage(b"first", "doc.pdf").await.unwrap();
        let b = store.stage(b"second", "doc.pdf").await.unwrap();

        assert_ne!(a.path, b.path);
        assert_eq!(a.original_name, "doc.pdf");
        assert_eq!(a.kind, MediaKind::Pdf);
        assert_eq!(std::fs::read(&a.path).unwrap(), b"first");
        assert_eq!(std::fs::read(&b.path).unwrap(), b"second");
        assert!(a.path.starts_with(store.inbound_dir()));
    }

    #[test]
    fn output_paths_are_unique_and_reserved() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();

        let a = store.materialize_output_path("merged", "pdf").unwrap();
        let b = store.materialize_output_path("merged", "pdf").unwrap();
        assert_ne!(a, b);
        assert!(a.exists(), "reservation must create the file");
        assert!(a.starts_with(store.outbound_dir()));
        assert!(a.file_name().unwrap().to_str().unwrap().starts_with("merged_"));
        assert_eq!(a.extension().unwrap(), "pdf");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let a = store.stage(b"x", "a.txt").await.unwrap();

        store.delete(&a).unwrap();
        store.delete(&a).unwrap();
        let never = ArtifactRef::new(dir.path().join("nope"), "nope", MediaKind::Other);
        store.delete(&never).unwrap();
        assert!(!a.path.exists());
    }

    #[tokio::test]
    async fn deliver_copies_then_removes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("store")).unwrap();
        let out = store.reserve_output("merged", "merged.pdf", MediaKind::Pdf).unwrap();
        std::fs::write(&out.path, b"%PDF-1.7").unwrap();
        let stored_at = out.path.clone();

        let dest = dir.path().join("downloads/merged.pdf");
        let n = store.deliver(out, &dest).await.unwrap();

        assert_eq!(n, 8);
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.7");
        assert!(!stored_at.exists());
    }

    #[tokio::test]
    async fn take_reads_then_removes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let a = store.stage(b"payload", "p.bin").await.unwrap();
        let path = a.path.clone();
        assert_eq!(store.take(a).await.unwrap(), b"payload");
        assert!(!path.exists());
    }

    #[test]
    fn adopt_moves_into_outbound() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let scratch = store.scratch_dir("engine").unwrap();
        let produced = scratch.path().join("report.pdf");
        std::fs::write(&produced, b"%PDF").unwrap();

        let a = store
            .adopt(&produced, "office", "report.pdf", MediaKind::Pdf)
            .unwrap();
        assert!(!produced.exists());
        assert_eq!(a.path.parent().unwrap(), store.outbound_dir());
        assert_eq!(std::fs::read(&a.path).unwrap(), b"%PDF");

        let scratch_path = scratch.path().to_path_buf();
        drop(scratch);
        assert!(!scratch_path.exists());
    }

    #[tokio::test]
    async fn purge_respects_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        store.stage(b"x", "a.pdf").await.unwrap();
        store.materialize_output_path("out", "pdf").unwrap();
        std::fs::create_dir(store.outbound_dir().join("engine-stale")).unwrap();

        assert_eq!(store.purge_older_than(Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(store.purge_older_than(Duration::ZERO).unwrap(), 3);
        assert_eq!(std::fs::read_dir(store.inbound_dir()).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(store.outbound_dir()).unwrap().count(), 0);
    }
}
