//! External conversion engine adapter (LibreOffice `soffice` by default).
//!
//! The engine is an opaque subprocess with a narrow contract:
//!
//! ```text
//! <program> [leading args] [-env:UserInstallation=…] --headless \
//!     --convert-to pdf --outdir <output_dir> <input>
//! ```
//!
//! Success means exit status 0 **and** a non-empty `<output_dir>/<stem>.pdf`.
//! Anything else is an engine error carrying the exit code and whatever the
//! process printed. There is no retry: one failed conversion fails the job.
//!
//! ## Why a timeout?
//!
//! `soffice` occasionally hangs on malformed input or a stale profile lock.
//! Without a bound the job's context would block forever. The child is
//! spawned with `kill_on_drop`, so when the timeout fires and the wait future
//! is dropped, the process is killed as well.

use crate::config::PipelineConfig;
use crate::error::DocforgeError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

/// Target format passed to `--convert-to`.
const TARGET_FORMAT: &str = "pdf";

/// Diagnostic output kept in an engine error, in characters.
const MAX_DIAGNOSTIC_CHARS: usize = 2000;

/// Handle to the configured conversion engine.
#[derive(Debug, Clone)]
pub struct ConversionEngine {
    program: PathBuf,
    leading_args: Vec<OsString>,
    timeout: Duration,
    isolated_profile: bool,
}

impl ConversionEngine {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout,
            isolated_profile: true,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.engine_program, config.engine_timeout())
            .with_isolated_profile(config.engine_isolated_profile)
    }

    /// Arguments placed before the conversion flags, e.g. for
    /// `flatpak run org.libreoffice.LibreOffice`.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_isolated_profile(mut self, v: bool) -> Self {
        self.isolated_profile = v;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Where the engine will write the result for `input`.
    pub fn expected_output(&self, input: &Path, output_dir: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| OsString::from("output"));
        let mut name = stem;
        name.push(".");
        name.push(TARGET_FORMAT);
        output_dir.join(name)
    }

    /// Full argument list for one invocation.
    fn command_args(&self, input: &Path, output_dir: &Path) -> Vec<OsString> {
        let mut args = self.leading_args.clone();
        if self.isolated_profile {
            match profile_url(output_dir) {
                Some(url) => args.push(format!("-env:UserInstallation={url}").into()),
                None => warn!(
                    "Cannot express {} as a file URL; using the shared engine profile",
                    output_dir.display()
                ),
            }
        }
        args.push("--headless".into());
        args.push("--convert-to".into());
        args.push(TARGET_FORMAT.into());
        args.push("--outdir".into());
        args.push(output_dir.as_os_str().to_os_string());
        args.push(input.as_os_str().to_os_string());
        args
    }

    /// Convert `input` into a PDF inside `output_dir`.
    ///
    /// `output_dir` should be private to this invocation; the engine may leave
    /// lock or profile files next to its output.
    pub async fn convert(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, DocforgeError> {
        let expected = self.expected_output(input, output_dir);
        let args = self.command_args(input, output_dir);
        info!(
            "Running conversion engine {} on {}",
            self.program.display(),
            input.display()
        );
        debug!("Engine arguments: {:?}", args);

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DocforgeError::EngineSpawn {
                program: self.program.clone(),
                source: e,
            })?;

        let start = Instant::now();
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(DocforgeError::EngineFailed {
                    exit_code: None,
                    stderr: format!("waiting for engine failed: {e}"),
                })
            }
            Err(_) => {
                warn!(
                    "Conversion engine exceeded {:?} on {}; killed",
                    self.timeout,
                    input.display()
                );
                return Err(DocforgeError::EngineTimeout {
                    secs: self.timeout.as_secs().max(1),
                });
            }
        };
        debug!(
            "Engine exited with {:?} after {}ms",
            output.status.code(),
            start.elapsed().as_millis()
        );

        if !output.status.success() {
            let diagnostic = diagnostic_text(&output.stderr, &output.stdout);
            warn!(
                "Conversion engine failed with {:?}: {}",
                output.status.code(),
                diagnostic
            );
            return Err(DocforgeError::EngineFailed {
                exit_code: output.status.code(),
                stderr: diagnostic,
            });
        }

        match tokio::fs::metadata(&expected).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(expected),
            _ => {
                warn!(
                    "Conversion engine exited 0 but {} is missing or empty",
                    expected.display()
                );
                Err(DocforgeError::EngineNoOutput { expected })
            }
        }
    }
}

/// Prefer stderr; soffice reports some failures on stdout only.
/// `file://` URL of the private profile directory under `output_dir`.
fn profile_url(output_dir: &Path) -> Option<Url> {
    let profile = output_dir.join(".profile");
    let profile = std::path::absolute(&profile).ok()?;
    Url::from_file_path(&profile).ok()
}

fn diagnostic_text(stderr: &[u8], stdout: &[u8]) -> String {
    let err = String::from_utf8_lossy(stderr);
    let text = if err.trim().is_empty() {
        String::from_utf8_lossy(stdout)
    } else {
        err
    };
    text.trim().chars().take(MAX_DIAGNOSTIC_CHARS).collect()
}
