//! CLI binary for docforge.
//!
//! A thin shim over the library crate: each subcommand becomes one
//! `JobRequest`, the result is delivered to `--output` (or the current
//! directory under its download name) and removed from the store.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use docforge::{Dispatcher, JobOutput, JobRequest, Operation, PipelineConfig, Upload};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Merge in the given order (writes ./merged.pdf)
  docforge merge cover.pdf body.pdf appendix.pdf

  # Split into single pages (writes ./split.zip)
  docforge split report.pdf

  # Rotate every page a quarter turn counter-clockwise
  docforge rotate --angle -90 scan.pdf -o upright.pdf

  # Watermark
  docforge watermark --text "DRAFT" contract.pdf

  # Office → PDF with a specific LibreOffice
  docforge --soffice /opt/libreoffice/program/soffice office-to-pdf slides.pptx

  # PDF → PNG pages at 300 DPI, result description as JSON
  docforge --dpi 300 --json pdf-to-images manual.pdf

  # Remove store entries older than one hour
  docforge purge --older-than 3600

ENVIRONMENT VARIABLES:
  DOCFORGE_STORE          Artifact store root (default: $TMPDIR/docforge)
  DOCFORGE_SOFFICE        Office conversion engine executable
  DOCFORGE_ENGINE_TIMEOUT Engine timeout in seconds
  DOCFORGE_PDFIUM_LIB     Path to libpdfium
  RUST_LOG                Overrides the log filter (e.g. docforge=debug)

SETUP:
  PDF operations need libpdfium (https://github.com/bblanchon/pdfium-binaries)
  next to the binary, on the system library path, or at DOCFORGE_PDFIUM_LIB.
  office-to-pdf needs LibreOffice's soffice on PATH or at DOCFORGE_SOFFICE.
"#;

/// Merge, split, rotate, watermark and convert documents.
#[derive(Parser, Debug)]
#[command(
    name = "docforge",
    version,
    about = "Merge, split, rotate, watermark and convert PDFs, images and office documents",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Write the result to this path instead of ./<download name>.
    #[arg(short, long, global = true, env = "DOCFORGE_OUTPUT")]
    output: Option<PathBuf>,

    /// Artifact store root.
    #[arg(long, global = true, env = "DOCFORGE_STORE")]
    store: Option<PathBuf>,

    /// Office conversion engine executable.
    #[arg(long, global = true, env = "DOCFORGE_SOFFICE", default_value = "soffice")]
    soffice: PathBuf,

    /// Engine timeout in seconds.
    #[arg(long, global = true, env = "DOCFORGE_ENGINE_TIMEOUT", default_value_t = 120)]
    engine_timeout: u64,

    /// Rendering DPI for pdf-to-images and pdf-to-ppt (72–600).
    #[arg(long, global = true, env = "DOCFORGE_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Path to libpdfium.
    #[arg(long, global = true, env = "DOCFORGE_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Print the job result as JSON on stdout.
    #[arg(long, global = true, env = "DOCFORGE_JSON")]
    json: bool,

    /// Disable the spinner.
    #[arg(long, global = true, env = "DOCFORGE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCFORGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCFORGE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Concatenate PDFs in the given order.
    Merge {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// One PDF per page, bundled as a ZIP when there is more than one.
    Split { file: PathBuf },
    /// Rotate every page by a multiple of 90 degrees (clockwise).
    Rotate {
        #[arg(long, allow_negative_numbers = true)]
        angle: i32,
        file: PathBuf,
    },
    /// Stamp translucent text on every page.
    Watermark {
        #[arg(long)]
        text: String,
        file: PathBuf,
    },
    /// Re-serialise a PDF.
    Compress { file: PathBuf },
    /// One page per image, in the given order.
    ImgToPdf {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Render every page to PNG.
    PdfToImages { file: PathBuf },
    /// Convert an office document to PDF with the external engine.
    OfficeToPdf { file: PathBuf },
    /// Extract text lines into a Word document.
    PdfToWord { file: PathBuf },
    /// Render pages onto PowerPoint slides.
    PdfToPpt { file: PathBuf },
    /// Extract text lines into an Excel sheet.
    PdfToExcel { file: PathBuf },
    /// Remove store entries older than the retention period.
    Purge {
        /// Age in seconds; defaults to the configured retention.
        #[arg(long)]
        older_than: Option<u64>,
    },
}

impl Command {
    /// The operation and its input files; `None` for maintenance commands.
    fn job(&self) -> Option<(Operation, Vec<PathBuf>)> {
        let one = |f: &PathBuf| vec![f.clone()];
        let job = match self {
            Command::Merge { files } => (Operation::Merge, files.clone()),
            Command::Split { file } => (Operation::Split, one(file)),
            Command::Rotate { angle, file } => (Operation::Rotate { angle: *angle }, one(file)),
            Command::Watermark { text, file } => {
                (Operation::Watermark { text: text.clone() }, one(file))
            }
            Command::Compress { file } => (Operation::Compress, one(file)),
            Command::ImgToPdf { files } => (Operation::ImagesToDocument, files.clone()),
            Command::PdfToImages { file } => (Operation::DocumentToImages, one(file)),
            Command::OfficeToPdf { file } => (Operation::OfficeToDocument, one(file)),
            Command::PdfToWord { file } => (Operation::DocumentToOfficeText, one(file)),
            Command::PdfToPpt { file } => (Operation::DocumentToPresentation, one(file)),
            Command::PdfToExcel { file } => (Operation::DocumentToSpreadsheet, one(file)),
            Command::Purge { .. } => return None,
        };
        Some(job)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let g = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; library INFO logs
    // would only tear it.
    let show_progress = !g.quiet && !g.no_progress && !g.json;
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(g)?;
    let dispatcher = Dispatcher::new(config).context("Failed to open the artifact store")?;

    // ── Maintenance ──────────────────────────────────────────────────────
    if let Command::Purge { older_than } = cli.command {
        let removed = match older_than {
            Some(secs) => dispatcher
                .store()
                .purge_older_than(Duration::from_secs(secs)),
            None => dispatcher.purge_expired(),
        }
        .context("Retention sweep failed")?;
        if g.json {
            println!("{}", serde_json::json!({ "removed": removed }));
        } else if !g.quiet {
            eprintln!("{} removed {} expired entries", green("✔"), bold(&removed.to_string()));
        }
        return Ok(());
    }

    let Some((operation, files)) = cli.command.job() else {
        return Ok(());
    };

    // ── Read inputs ──────────────────────────────────────────────────────
    let mut uploads = Vec::with_capacity(files.len());
    for path in &files {
        uploads.push(
            Upload::from_path(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        );
    }

    // ── Run job ──────────────────────────────────────────────────────────
    let spinner = show_progress.then(|| job_spinner(&operation, files.len()));
    let result = dispatcher.run(JobRequest::new(operation.clone(), uploads)).await;
    if let Some(bar) = &spinner {
        bar.finish_and_clear();
    }

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            if !g.quiet {
                eprintln!("{} {} ({})", red("✘"), bold(operation.name()), e.kind());
            }
            return Err(e).context(format!("'{}' failed", operation.name()));
        }
    };

    // ── Deliver ──────────────────────────────────────────────────────────
    let dest = g
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(output.download_name()));
    let summary = output.clone();
    let bytes = dispatcher
        .store()
        .deliver(output.artifact, &dest)
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))?;

    if g.json {
        print_json(&summary, &dest, bytes)?;
    } else if !g.quiet {
        eprintln!(
            "{}  {}  {} → {} output(s){}  {}ms  →  {}",
            green("✔"),
            bold(operation.name()),
            summary.stats.inputs,
            summary.stats.outputs,
            if summary.stats.packaged { " zipped" } else { "" },
            summary.stats.duration_ms,
            bold(&dest.display().to_string()),
        );
        eprintln!("   {}", dim(&format!("{bytes} bytes, {}", summary.artifact.kind.mime_type())));
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(g: &GlobalArgs) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .engine_program(&g.soffice)
        .engine_timeout_secs(g.engine_timeout)
        .render_dpi(g.dpi);
    if let Some(ref root) = g.store {
        builder = builder.storage_root(root);
    }
    if let Some(ref lib) = g.pdfium_lib {
        builder = builder.pdfium_library_path(lib);
    }
    builder.build().context("Invalid configuration")
}

fn job_spinner(operation: &Operation, inputs: usize) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix(operation.name());
    bar.set_message(format!("{inputs} file(s)…"));
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn print_json(output: &JobOutput, dest: &std::path::Path, bytes: u64) -> Result<()> {
    let value = serde_json::json!({
        "output": dest,
        "download_name": output.download_name(),
        "mime_type": output.artifact.kind.mime_type(),
        "bytes": bytes,
        "stats": output.stats,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&value).context("Failed to serialise result")?
    );
    Ok(())
}
