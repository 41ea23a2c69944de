//! Job dispatcher: validate → stage → transform → package → deliver.
//!
//! ## State machine
//!
//! ```text
//! Received ─► InputsStaged ─► TransformRunning ─┬─────────────────────┬─► Completed
//!                                                └─► OutputsPackaged ──┘
//!     any step ─► Failed
//! ```
//!
//! Validation happens in `Received`, before anything touches the store, so a
//! rejected request has no side effects at all. From `InputsStaged` on, the
//! staged inputs live in an [`ArtifactGuard`]; whichever way the job ends,
//! the guard's `Drop` removes them. The caller receives exactly one artifact
//! (a packaged archive when the transform produced several files), or an
//! error and an untouched store.

use crate::archive::ArchivePackager;
use crate::artifact::{ArtifactGuard, ArtifactRef};
use crate::config::PipelineConfig;
use crate::engine::ConversionEngine;
use crate::error::DocforgeError;
use crate::operation::Operation;
use crate::store::ArtifactStore;
use crate::transform::{run_blocking, TransformContext};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// One uploaded file: its client-side name and its content.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a local file as an upload named after its file name.
    pub async fn from_path(path: &Path) -> Result<Self, DocforgeError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DocforgeError::storage(path, e))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { filename, bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// An operation and its ordered inputs.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub operation: Operation,
    pub uploads: Vec<Upload>,
}

impl JobRequest {
    pub fn new(operation: Operation, uploads: Vec<Upload>) -> Self {
        Self {
            operation,
            uploads,
        }
    }
}

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Received,
    InputsStaged,
    TransformRunning,
    OutputsPackaged,
    Completed,
    Failed,
}

/// Per-job figures reported alongside the result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStats {
    /// Files received with the request.
    pub inputs: usize,
    /// Files the transform produced, before packaging.
    pub outputs: usize,
    /// True when the outputs were bundled into an archive.
    pub packaged: bool,
    /// Wall-clock time from validation to completion.
    pub duration_ms: u64,
}

/// The single deliverable of a successful job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutput {
    pub artifact: ArtifactRef,
    pub stats: JobStats,
}

impl JobOutput {
    /// File name to offer the caller (`merged.pdf`, `split.zip`, …).
    pub fn download_name(&self) -> &str {
        &self.artifact.original_name
    }
}

/// Runs jobs against one artifact store. Cheap to clone; clones share the
/// store and configuration, so a clone per concurrent request is fine.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    context: TransformContext,
    packager: ArchivePackager,
}

impl Dispatcher {
    /// Open the store at `config.storage_root` and configure the engine from
    /// `config`.
    pub fn new(config: PipelineConfig) -> Result<Self, DocforgeError> {
        let store = ArtifactStore::open(&config.storage_root)?;
        let engine = ConversionEngine::from_config(&config);
        Ok(Self::from_parts(store, engine, config))
    }

    /// Assemble a dispatcher from existing parts, e.g. an engine with extra
    /// leading arguments.
    pub fn from_parts(store: ArtifactStore, engine: ConversionEngine, config: PipelineConfig) -> Self {
        Self {
            packager: ArchivePackager::new(store.clone()),
            context: TransformContext::new(store, engine, Arc::new(config)),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.context.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.context.config
    }

    /// Remove store entries older than the configured retention period.
    pub fn purge_expired(&self) -> Result<usize, DocforgeError> {
        self.context.store.purge_older_than(self.context.config.retention())
    }

    /// Run one job to completion.
    ///
    /// On success the returned artifact is the only file the job left in
    /// the store; the caller owns it (see [`ArtifactStore::deliver`]). On
    /// failure the job left nothing behind.
    pub async fn run(&self, request: JobRequest) -> Result<JobOutput, DocforgeError> {
        let token = Uuid::new_v4().simple().to_string();
        let span = info_span!("job", id = &token[..8], op = request.operation.name());
        async move {
            let start = Instant::now();
            let mut state = JobState::Received;
            info!(
                "Job received: {} with {} file(s)",
                request.operation,
                request.uploads.len()
            );

            match self.execute(&request, &mut state).await {
                Ok((artifact, mut stats)) => {
                    stats.duration_ms = start.elapsed().as_millis() as u64;
                    advance(&mut state, JobState::Completed);
                    info!(
                        "Job completed in {}ms → '{}'",
                        stats.duration_ms, artifact.original_name
                    );
                    Ok(JobOutput { artifact, stats })
                }
                Err(e) => {
                    warn!("Job failed during {:?} ({}): {}", state, e.kind(), e);
                    advance(&mut state, JobState::Failed);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        request: &JobRequest,
        state: &mut JobState,
    ) -> Result<(ArtifactRef, JobStats), DocforgeError> {
        let operation = &request.operation;
        self.validate(request)?;

        let mut staged = ArtifactGuard::new();
        for upload in &request.uploads {
            let artifact = self
                .context
                .store
                .stage(&upload.bytes, &upload.filename)
                .await?;
            staged.push(artifact);
        }
        advance(state, JobState::InputsStaged);

        advance(state, JobState::TransformRunning);
        let outputs = self.context.apply(operation, staged.artifacts()).await?;
        let mut stats = JobStats {
            inputs: request.uploads.len(),
            outputs: outputs.len(),
            ..JobStats::default()
        };

        let artifact = match <[ArtifactRef; 1]>::try_from(outputs) {
            Ok([single]) => single,
            Err(many) => {
                let packager = self.packager.clone();
                let prefix = operation.name();
                let download_name = operation.archive_name();
                let archive = run_blocking("package", move || {
                    packager.pack(many, prefix, download_name)
                })
                .await?;
                stats.packaged = true;
                advance(state, JobState::OutputsPackaged);
                archive
            }
        };

        // A transform may hand back one of its inputs as the result.
        staged.forget(&artifact.path);
        drop(staged);
        debug!("Staged inputs released");
        Ok((artifact, stats))
    }

    /// Structural checks that must pass before anything is staged.
    fn validate(&self, request: &JobRequest) -> Result<(), DocforgeError> {
        request.operation.validate(request.uploads.len())?;
        let limit = self.context.config.max_upload_bytes;
        for upload in &request.uploads {
            if upload.is_empty() {
                return Err(DocforgeError::EmptyUpload {
                    name: upload.filename.clone(),
                });
            }
            let size = upload.len() as u64;
            if size > limit {
                return Err(DocforgeError::UploadTooLarge {
                    name: upload.filename.clone(),
                    size,
                    limit,
                });
            }
        }
        Ok(())
    }
}

fn advance(state: &mut JobState, next: JobState) {
    debug!("{:?} → {:?}", state, next);
    *state = next;
}
