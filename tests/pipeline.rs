//! Integration tests for the docforge job pipeline.
//!
//! Validation, cleanup and engine tests run everywhere (the engine is a small
//! shell script standing in for `soffice`, so those are unix-only). Tests
//! that need libpdfium skip themselves when it cannot be bound.
//!
//! Run with:
//!   DOCFORGE_PDFIUM_LIB=/path/to/libpdfium.so cargo test --test pipeline -- --nocapture

use docforge::transform::PdfiumSession;
use docforge::{
    ArtifactStore, ConversionEngine, Dispatcher, ErrorKind, JobOutput, JobRequest, MediaKind,
    Operation, PipelineConfig, Upload,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn pdfium_lib() -> Option<PathBuf> {
    std::env::var_os("DOCFORGE_PDFIUM_LIB").map(PathBuf::from)
}

/// Skip this test if libpdfium cannot be bound.
macro_rules! skip_unless_pdfium {
    () => {{
        if !docforge::pdfium_available(pdfium_lib().as_deref()) {
            println!("SKIP: libpdfium not found; set DOCFORGE_PDFIUM_LIB to run");
            return;
        }
    }};
}

fn config(root: &Path) -> PipelineConfig {
    let mut builder = PipelineConfig::builder().storage_root(root).render_dpi(72);
    if let Some(lib) = pdfium_lib() {
        builder = builder.pdfium_library_path(lib);
    }
    builder.build().unwrap()
}

fn dispatcher(root: &Path) -> Dispatcher {
    Dispatcher::new(config(root)).unwrap()
}

/// Dispatcher whose engine runs `script` through `/bin/sh`.
fn scripted_dispatcher(root: &Path, script: &str) -> Dispatcher {
    let script_path = root.join("fake-soffice.sh");
    std::fs::write(&script_path, script).unwrap();
    let config = config(&root.join("store"));
    let store = ArtifactStore::open(&config.storage_root).unwrap();
    let engine = ConversionEngine::new("/bin/sh", Duration::from_secs(10))
        .with_leading_args([script_path.into_os_string()]);
    Dispatcher::from_parts(store, engine, config)
}

/// Everything left in the store, inbound and outbound.
fn store_entries(d: &Dispatcher) -> Vec<PathBuf> {
    let mut entries = Vec::new();
    for dir in [d.store().inbound_dir(), d.store().outbound_dir()] {
        for e in std::fs::read_dir(dir).unwrap() {
            entries.push(e.unwrap().path());
        }
    }
    entries.sort();
    entries
}

/// A minimal PDF with `pages` empty Letter pages and a correct xref table.
fn blank_pdf(pages: usize) -> Vec<u8> {
    sized_pdf(&vec![(612, 792); pages])
}

/// A minimal PDF with one empty page per `(width, height)` in points, so
/// pages can be told apart by size after a transform.
fn sized_pdf(sizes: &[(u32, u32)]) -> Vec<u8> {
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            (0..sizes.len())
                .map(|i| format!("{} 0 R", i + 3))
                .collect::<Vec<_>>()
                .join(" "),
            sizes.len()
        ),
    ];
    for (w, h) in sizes {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {w} {h}] >>"
        ));
    }

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    pdf
}

fn png(w: u32, h: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(w, h, Rgb([30, 120, 200]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn zip_names(path: &Path) -> Vec<String> {
    let zip = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    zip.file_names().map(str::to_string).collect()
}

fn page_rotations(path: &Path) -> Vec<u16> {
    let pdfium = PdfiumSession::open(pdfium_lib().as_deref()).unwrap();
    let doc = pdfium.load_pdf_from_file(path, None).unwrap();
    let rotations = doc
        .pages()
        .iter()
        .map(|p| match p.rotation().unwrap() {
            PdfPageRenderRotation::None => 0,
            PdfPageRenderRotation::Degrees90 => 90,
            PdfPageRenderRotation::Degrees180 => 180,
            PdfPageRenderRotation::Degrees270 => 270,
        })
        .collect();
    rotations
}

/// Page sizes in whole points, in document order.
fn page_sizes(path: &Path) -> Vec<(u32, u32)> {
    let pdfium = PdfiumSession::open(pdfium_lib().as_deref()).unwrap();
    let doc = pdfium.load_pdf_from_file(path, None).unwrap();
    let sizes = doc
        .pages()
        .iter()
        .map(|p| (p.width().value.round() as u32, p.height().value.round() as u32))
        .collect();
    sizes
}

async fn run(d: &Dispatcher, operation: Operation, uploads: Vec<Upload>) -> JobOutput {
    d.run(JobRequest::new(operation, uploads)).await.unwrap()
}

/// Feed a job's result back in as the single upload of the next job.
async fn take_as_upload(d: &Dispatcher, output: JobOutput) -> Upload {
    let name = output.download_name().to_string();
    Upload::new(name, d.store().take(output.artifact).await.unwrap())
}

// ── Validation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_rotate_45_is_rejected_before_staging() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());

    let err = d
        .run(JobRequest::new(
            Operation::Rotate { angle: 45 },
            vec![Upload::new("a.pdf", blank_pdf(1))],
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.kind().is_user_error());
    assert!(store_entries(&d).is_empty());
}

#[tokio::test]
async fn test_empty_watermark_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());

    let err = d
        .run(JobRequest::new(
            Operation::Watermark { text: "   ".into() },
            vec![Upload::new("a.pdf", blank_pdf(1))],
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(store_entries(&d).is_empty());
}

#[tokio::test]
async fn test_images_to_document_needs_an_image() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());
    let err = d
        .run(JobRequest::new(Operation::ImagesToDocument, Vec::new()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_single_input_operations_reject_two_files() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());
    let err = d
        .run(JobRequest::new(
            Operation::Split,
            vec![Upload::new("a.pdf", blank_pdf(1)), Upload::new("b.pdf", blank_pdf(1))],
        ))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(store_entries(&d).is_empty());
}

#[tokio::test]
async fn test_non_pdf_merge_input_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());

    let err = d
        .run(JobRequest::new(
            Operation::Merge,
            vec![
                Upload::new("good.pdf", blank_pdf(1)),
                Upload::new("holiday.pdf", png(4, 4)),
            ],
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(err.to_string().contains("holiday.pdf"), "got: {err}");
    assert!(store_entries(&d).is_empty());
}

#[tokio::test]
async fn test_hostile_file_names_stay_inside_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(&dir.path().join("store"));

    let err = d
        .run(JobRequest::new(
            Operation::Compress,
            vec![Upload::new("../../escape.pdf", b"not a pdf".to_vec())],
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(!dir.path().join("escape.pdf").exists());
    assert!(store_entries(&d).is_empty());
}

// ── Office conversion (scripted engine) ──────────────────────────────────────

/// Writes `%PDF-1.4` followed by the input's bytes to `<outdir>/<stem>.pdf`.
#[cfg(unix)]
const ECHOING_ENGINE: &str = r#"
outdir=""
while [ $# -gt 1 ]; do
  if [ "$1" = "--outdir" ]; then outdir="$2"; shift; fi
  shift
done
base=$(basename "$1")
{ printf '%%PDF-1.4\n'; cat "$1"; } > "$outdir/${base%.*}.pdf"
"#;

#[cfg(unix)]
#[tokio::test]
async fn test_office_to_pdf_returns_only_the_output() {
    let dir = tempfile::tempdir().unwrap();
    let d = scripted_dispatcher(dir.path(), ECHOING_ENGINE);

    let output = run(
        &d,
        Operation::OfficeToDocument,
        vec![Upload::new("minutes.docx", b"meeting notes".to_vec())],
    )
    .await;

    assert_eq!(output.download_name(), "minutes.pdf");
    assert_eq!(output.artifact.kind, MediaKind::Pdf);
    assert!(!output.stats.packaged);
    assert_eq!(store_entries(&d), vec![output.artifact.path.clone()]);

    let bytes = d.store().take(output.artifact).await.unwrap();
    assert!(bytes.starts_with(b"%PDF-1.4\nmeeting notes"));
    assert!(store_entries(&d).is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_office_engine_failure_is_an_engine_error() {
    let dir = tempfile::tempdir().unwrap();
    let d = scripted_dispatcher(dir.path(), "echo 'Error: source file could not be loaded' >&2\nexit 1\n");

    let err = d
        .run(JobRequest::new(
            Operation::OfficeToDocument,
            vec![Upload::new("broken.docx", b"garbage".to_vec())],
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Engine);
    assert!(!err.kind().is_user_error());
    assert!(err.to_string().contains("could not be loaded"), "got: {err}");
    assert!(store_entries(&d).is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_office_engine_without_output_is_an_engine_error() {
    let dir = tempfile::tempdir().unwrap();
    let d = scripted_dispatcher(dir.path(), "exit 0\n");

    let err = d
        .run(JobRequest::new(
            Operation::OfficeToDocument,
            vec![Upload::new("silent.odt", b"x".to_vec())],
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Engine);
    assert!(store_entries(&d).is_empty());
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_name_jobs_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let d = scripted_dispatcher(dir.path(), ECHOING_ENGINE);

    let mut handles = Vec::new();
    for i in 0..6 {
        let d = d.clone();
        handles.push(tokio::spawn(async move {
            let upload = Upload::new("report.docx", format!("job-{i}").into_bytes());
            let output = d
                .run(JobRequest::new(Operation::OfficeToDocument, vec![upload]))
                .await
                .unwrap();
            (i, output)
        }));
    }

    let mut outputs = Vec::new();
    for h in handles {
        outputs.push(h.await.unwrap());
    }

    let mut paths: Vec<_> = outputs.iter().map(|(_, o)| o.artifact.path.clone()).collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 6, "every job must get its own output path");
    assert_eq!(store_entries(&d), paths);

    for (i, output) in outputs {
        assert_eq!(output.download_name(), "report.pdf");
        let bytes = std::fs::read(&output.artifact.path).unwrap();
        let expected = format!("%PDF-1.4\njob-{i}");
        assert_eq!(bytes, expected.as_bytes());
    }
}

// ── PDF operations (need libpdfium) ──────────────────────────────────────────

#[tokio::test]
async fn test_merge_two_single_page_documents() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());

    let merged = run(
        &d,
        Operation::Merge,
        vec![Upload::new("a.pdf", blank_pdf(1)), Upload::new("b.pdf", blank_pdf(1))],
    )
    .await;
    assert_eq!(merged.download_name(), "merged.pdf");
    assert_eq!(merged.stats.inputs, 2);
    assert_eq!(store_entries(&d), vec![merged.artifact.path.clone()]);

    // Splitting the result shows the page count.
    let upload = take_as_upload(&d, merged).await;
    let split = run(&d, Operation::Split, vec![upload]).await;
    assert_eq!(split.download_name(), "split.zip");
    assert!(split.stats.packaged);
    assert_eq!(zip_names(&split.artifact.path), vec!["page_1.pdf", "page_2.pdf"]);
    assert_eq!(store_entries(&d), vec![split.artifact.path.clone()]);
}

#[tokio::test]
async fn test_merge_page_count_is_the_sum() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());

    let merged = run(
        &d,
        Operation::Merge,
        vec![
            Upload::new("a.pdf", blank_pdf(2)),
            Upload::new("b.pdf", blank_pdf(3)),
            Upload::new("c.pdf", blank_pdf(1)),
        ],
    )
    .await;
    let upload = take_as_upload(&d, merged).await;
    let split = run(&d, Operation::Split, vec![upload]).await;
    assert_eq!(split.stats.outputs, 6);
    assert_eq!(zip_names(&split.artifact.path).len(), 6);
}

#[tokio::test]
async fn test_split_single_page_is_returned_directly() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());

    let out = run(&d, Operation::Split, vec![Upload::new("one.pdf", blank_pdf(1))]).await;
    assert!(!out.stats.packaged);
    assert_eq!(out.download_name(), "page_1.pdf");
    assert_eq!(out.artifact.kind, MediaKind::Pdf);
    assert_eq!(store_entries(&d), vec![out.artifact.path.clone()]);
}

#[tokio::test]
async fn test_four_quarter_turns_restore_orientation() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());

    let mut upload = Upload::new("r.pdf", blank_pdf(2));
    for turn in 1..=4u16 {
        let out = run(&d, Operation::Rotate { angle: 90 }, vec![upload]).await;
        assert_eq!(out.download_name(), "rotated.pdf");
        let expected = (turn * 90) % 360;
        assert_eq!(page_rotations(&out.artifact.path), vec![expected, expected]);
        upload = take_as_upload(&d, out).await;
    }
    assert!(store_entries(&d).is_empty());
}

#[tokio::test]
async fn test_negative_rotation_is_normalised() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());

    let out = run(
        &d,
        Operation::Rotate { angle: -90 },
        vec![Upload::new("r.pdf", blank_pdf(1))],
    )
    .await;
    assert_eq!(page_rotations(&out.artifact.path), vec![270]);
}

#[tokio::test]
async fn test_images_round_trip_preserves_count() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());

    let doc = run(
        &d,
        Operation::ImagesToDocument,
        vec![
            Upload::new("1.png", png(64, 48)),
            Upload::new("2.png", png(48, 64)),
            Upload::new("3.png", png(32, 32)),
        ],
    )
    .await;
    assert_eq!(doc.download_name(), "images.pdf");

    let upload = take_as_upload(&d, doc).await;
    let images = run(&d, Operation::DocumentToImages, vec![upload]).await;
    assert_eq!(images.download_name(), "images.zip");
    assert_eq!(
        zip_names(&images.artifact.path),
        vec!["page_1.png", "page_2.png", "page_3.png"]
    );
    assert_eq!(store_entries(&d), vec![images.artifact.path.clone()]);
}

#[tokio::test]
async fn test_image_only_document_gives_empty_word_file() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());

    let doc = run(&d, Operation::ImagesToDocument, vec![Upload::new("scan.png", png(40, 40))]).await;
    let upload = take_as_upload(&d, doc).await;
    let word = run(&d, Operation::DocumentToOfficeText, vec![upload]).await;
    assert_eq!(word.download_name(), "images.docx");
    assert_eq!(word.artifact.kind, MediaKind::Docx);

    let mut zip = zip::ZipArchive::new(std::fs::File::open(&word.artifact.path).unwrap()).unwrap();
    let mut body = String::new();
    std::io::Read::read_to_string(&mut zip.by_name("word/document.xml").unwrap(), &mut body)
        .unwrap();
    assert!(
        !body.contains("<w:p>") && !body.contains("<w:p/>"),
        "expected no paragraphs: {body}"
    );
}

#[tokio::test]
async fn test_office_outputs_are_named_after_the_input() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());

    let ppt = run(
        &d,
        Operation::DocumentToPresentation,
        vec![Upload::new("deck.pdf", blank_pdf(3))],
    )
    .await;
    assert_eq!(ppt.download_name(), "deck.pptx");
    let slides = zip_names(&ppt.artifact.path)
        .into_iter()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .count();
    assert_eq!(slides, 3);

    let xlsx = run(
        &d,
        Operation::DocumentToSpreadsheet,
        vec![Upload::new("table.pdf", blank_pdf(1))],
    )
    .await;
    assert_eq!(xlsx.download_name(), "table.xlsx");
    assert_eq!(xlsx.artifact.kind.mime_type(), MediaKind::Xlsx.mime_type());
}

#[tokio::test]
async fn test_watermark_and_compress_keep_pages() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());

    let marked = run(
        &d,
        Operation::Watermark { text: "DRAFT".into() },
        vec![Upload::new("w.pdf", blank_pdf(2))],
    )
    .await;
    assert_eq!(marked.download_name(), "watermarked.pdf");

    let upload = take_as_upload(&d, marked).await;
    let compressed = run(&d, Operation::Compress, vec![upload]).await;
    assert_eq!(compressed.download_name(), "compressed.pdf");
    assert_eq!(page_rotations(&compressed.artifact.path).len(), 2);
}

#[tokio::test]
async fn test_deliver_leaves_the_store_empty() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(&dir.path().join("store"));

    let out = run(&d, Operation::Compress, vec![Upload::new("c.pdf", blank_pdf(1))]).await;
    let dest = dir.path().join("downloads").join(out.download_name());
    let written = d.store().deliver(out.artifact, &dest).await.unwrap();

    assert!(written > 0);
    assert!(std::fs::read(&dest).unwrap().starts_with(b"%PDF"));
    assert!(store_entries(&d).is_empty());
}

#[tokio::test]
async fn test_merge_keeps_input_order() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());

    let merged = run(
        &d,
        Operation::Merge,
        vec![
            Upload::new("a.pdf", sized_pdf(&[(200, 300), (210, 310)])),
            Upload::new("b.pdf", sized_pdf(&[(400, 500)])),
            Upload::new("c.pdf", sized_pdf(&[(600, 700), (610, 710)])),
        ],
    )
    .await;

    assert_eq!(
        page_sizes(&merged.artifact.path),
        vec![(200, 300), (210, 310), (400, 500), (600, 700), (610, 710)]
    );
}

#[tokio::test]
async fn test_images_become_pages_in_upload_order() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());

    let doc = run(
        &d,
        Operation::ImagesToDocument,
        vec![
            Upload::new("wide.png", png(120, 40)),
            Upload::new("tall.png", png(30, 90)),
            Upload::new("square.png", png(50, 50)),
        ],
    )
    .await;

    assert_eq!(
        page_sizes(&doc.artifact.path),
        vec![(120, 40), (30, 90), (50, 50)]
    );
}

#[tokio::test]
async fn test_split_of_empty_document_is_an_empty_archive() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let d = dispatcher(dir.path());

    let out = run(&d, Operation::Split, vec![Upload::new("empty.pdf", blank_pdf(0))]).await;

    assert_eq!(out.download_name(), "split.zip");
    assert_eq!(out.artifact.kind, MediaKind::Zip);
    assert!(out.stats.packaged);
    assert_eq!(out.stats.outputs, 0);
    assert!(zip_names(&out.artifact.path).is_empty());
    assert_eq!(store_entries(&d), vec![out.artifact.path.clone()]);
}
