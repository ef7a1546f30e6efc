//! End-to-end tests against the real pdfium backend.
//!
//! These bind libpdfium (downloading it on first run unless
//! `PDFIUM_LIB_PATH` points at a local copy) and are gated behind the
//! `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested. Only image and PDF inputs are used, so neither
//! LibreOffice nor an HTML renderer is needed.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test pdfium_e2e -- --nocapture

use pdfconv::pipeline::normalize::REFERENCE;
use pdfconv::{Converter, EngineConfig, PageRect, PdfiumBackend, RenderingBackend};
use std::path::Path;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test if E2E_ENABLED is not set.
macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

fn converter(dir: &TempDir) -> Converter<PdfiumBackend> {
    let config = EngineConfig::builder()
        .input_dir(dir.path().join("in"))
        .output_dir(dir.path().join("out"))
        .temp_dir(dir.path().join("tmp"))
        .build()
        .unwrap();
    Converter::with_pdfium(config).unwrap()
}

fn write_png(path: &Path, width: u32, height: u32) {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    img.save(path).unwrap();
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn image_converts_to_single_page_pdf() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let converter = converter(&dir);
    write_png(&dir.path().join("in/chart.png"), 400, 300);

    let result = converter.convert_file("chart.png", None).await;
    assert!(result.is_success(), "{:?}", result.error_detail());
    assert_eq!(result.output_file_name(), Some("chart.pdf"));

    let bytes = std::fs::read(result.output_path().unwrap()).unwrap();
    assert!(bytes.starts_with(b"%PDF"));

    let backend = converter.backend();
    let doc = backend.open_pdf(result.output_path().unwrap()).unwrap();
    assert_eq!(backend.page_count(&doc), 1);
    let size = backend.crop_box(&doc, 0).unwrap().geometry();
    assert!((size.width - 300.0).abs() < 1.0, "width {}", size.width);
    assert!((size.height - 225.0).abs() < 1.0, "height {}", size.height);
}

#[tokio::test]
async fn pdf_bytes_round_trip() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let converter = converter(&dir);
    write_png(&dir.path().join("in/pixel.png"), 64, 64);

    let first = converter.convert_file("pixel.png", None).await;
    assert!(first.is_success(), "{:?}", first.error_detail());
    let pdf = std::fs::read(first.output_path().unwrap()).unwrap();

    let result = converter.convert_bytes(pdf, None, Some("again")).await;
    assert!(result.is_success(), "{:?}", result.error_detail());
    assert_eq!(result.detected_type(), Some(".pdf"));
    assert_eq!(result.output_file_name(), Some("again.pdf"));
    assert!(result.pdf_bytes().unwrap().starts_with(b"%PDF"));
    assert_eq!(converter.live_temp_artifacts(), 0);
    assert!(is_empty_dir(&dir.path().join("tmp")));
}

#[tokio::test]
async fn merge_normalises_large_pages() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let converter = converter(&dir);
    // 1600 px → 1200 pt wide: more than 1.5× A4, so it gets scaled.
    write_png(&dir.path().join("in/poster.png"), 1600, 1200);
    write_png(&dir.path().join("in/small.png"), 700, 1000);

    let names = vec!["poster.png".to_string(), "small.png".to_string(), "gone.pdf".to_string()];
    let result = converter.merge(&names, Some("e2e")).await;
    assert!(result.is_success(), "{:?}", result.error_detail());
    assert_eq!(result.succeeded_files(), ["poster.png", "small.png"]);
    assert_eq!(result.failed_files().len(), 1);
    assert_eq!(result.page_count(), 2);

    let backend = converter.backend();
    let doc = backend.open_pdf(result.output_path().unwrap()).unwrap();
    assert_eq!(backend.page_count(&doc), 2);
    let first = backend.crop_box(&doc, 0).unwrap();
    let reference = PageRect::from_size(REFERENCE);
    assert!((first.geometry().width - reference.geometry().width).abs() < 1.0);
    assert!((first.geometry().height - reference.geometry().height).abs() < 1.0);
    assert!(is_empty_dir(&dir.path().join("tmp")));
}
