//! Configuration for the transform pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config between the store, the engine adapter and the
//! transforms, and to dump it as JSON when diagnosing a deployment.
//!
//! Nothing here is global: the engine executable, its timeout and the pdfium
//! library location are values handed to the components that use them.

use crate::error::DocforgeError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`crate::Dispatcher`] and the components it owns.
///
/// # Example
/// ```rust
/// use docforge::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .storage_root("/var/lib/docforge")
///     .engine_program("/usr/bin/soffice")
///     .engine_timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.engine_timeout_secs, 60);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root of the artifact store. `inbound/` and `outbound/` live below it.
    /// Default: `$TMPDIR/docforge`.
    pub storage_root: PathBuf,

    /// Office conversion engine executable. Default: `soffice` (looked up on `PATH`).
    pub engine_program: PathBuf,

    /// Upper bound on one engine invocation, in seconds. Default: 120.
    ///
    /// A hung engine process would otherwise block its job forever. The child
    /// is killed when the bound is hit and the job fails with an engine error.
    pub engine_timeout_secs: u64,

    /// Give every engine invocation its own user profile directory. Default: true.
    ///
    /// LibreOffice locks its profile; two concurrent conversions sharing one
    /// profile make the second one exit immediately without output.
    pub engine_isolated_profile: bool,

    /// Rasterisation resolution for page-to-image operations. Range: 72–600. Default: 200.
    pub render_dpi: u32,

    /// Cap on either rendered dimension, in pixels. Default: 5000.
    ///
    /// Keeps a poster-sized page at high DPI from allocating gigabytes.
    pub max_rendered_pixels: u32,

    /// Watermark font size in points. Default: 40.
    pub watermark_font_size: f32,

    /// Watermark opacity, 0.0–1.0. Default: 0.3.
    pub watermark_opacity: f32,

    /// Largest accepted upload, in bytes. Default: 100 MiB.
    pub max_upload_bytes: u64,

    /// How long an undelivered output may stay in the store before
    /// [`crate::ArtifactStore::purge_older_than`] removes it. Default: 3600.
    pub retention_secs: u64,

    /// Explicit path to libpdfium. If None, the working directory and then
    /// the system library path are searched.
    pub pdfium_library_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage_root: std::env::temp_dir().join("docforge"),
            engine_program: PathBuf::from("soffice"),
            engine_timeout_secs: 120,
            engine_isolated_profile: true,
            render_dpi: 200,
            max_rendered_pixels: 5000,
            watermark_font_size: 40.0,
            watermark_opacity: 0.3,
            max_upload_bytes: 100 * 1024 * 1024,
            retention_secs: 3600,
            pdfium_library_path: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage_root = root.into();
        self
    }

    pub fn engine_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.engine_program = program.into();
        self
    }

    pub fn engine_timeout_secs(mut self, secs: u64) -> Self {
        self.config.engine_timeout_secs = secs;
        self
    }

    pub fn engine_isolated_profile(mut self, v: bool) -> Self {
        self.config.engine_isolated_profile = v;
        self
    }

    pub fn render_dpi(mut self, dpi: u32) -> Self {
        self.config.render_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.clamp(100, i32::MAX as u32);
        self
    }

    pub fn watermark_font_size(mut self, size: f32) -> Self {
        self.config.watermark_font_size = size.clamp(4.0, 400.0);
        self
    }

    pub fn watermark_opacity(mut self, opacity: f32) -> Self {
        self.config.watermark_opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn retention_secs(mut self, secs: u64) -> Self {
        self.config.retention_secs = secs;
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, DocforgeError> {
        let c = &self.config;
        if c.engine_timeout_secs == 0 {
            return Err(DocforgeError::InvalidConfig(
                "Engine timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(DocforgeError::InvalidConfig(
                "Upload limit must be ≥ 1 byte".into(),
            ));
        }
        if c.engine_program.as_os_str().is_empty() {
            return Err(DocforgeError::InvalidConfig(
                "Engine program must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
