//! Deterministic in-memory backend.
//!
//! Documents are a list of page boxes. Saved files carry a PDF header
//! followed by a JSON page list, so they can be fed back in as inputs.
//!
//! Page counts:
//! * office and text sources: one page plus one per form feed (`\x0c`)
//! * images: one page, sized from the image header at 0.75 pt/px, or
//!   1600 × 1200 pt when the header is unreadable
//! * HTML: one page
//! * PDFs written by this backend: their recorded pages; other PDFs: one
//!   page per `/Type /Page` object

use super::{PageGeometry, PageRect, RenderingBackend};
use crate::error::BackendError;
use crate::pipeline::classify::{classify_path, ConversionCategory};
use crate::pipeline::markup;
use crate::pipeline::normalize::REFERENCE;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const HEADER: &[u8] = b"%PDF-1.7\n%mock-backend\n";

const DEFAULT_IMAGE_SIZE: PageGeometry = PageGeometry {
    width: 1600.0,
    height: 1200.0,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockPage {
    pub media_box: PageRect,
    pub crop_box: PageRect,
    /// Accumulated content scale.
    pub scale: f32,
}

impl MockPage {
    pub fn sized(size: PageGeometry) -> Self {
        let rect = PageRect::from_size(size);
        Self {
            media_box: rect,
            crop_box: rect,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockDocument {
    pages: Vec<MockPage>,
}

impl MockDocument {
    pub fn with_pages(sizes: &[PageGeometry]) -> Self {
        Self {
            pages: sizes.iter().copied().map(MockPage::sized).collect(),
        }
    }

    /// `count` A4 pages.
    pub fn a4(count: usize) -> Self {
        Self::with_pages(&vec![REFERENCE; count])
    }

    pub fn pages(&self) -> &[MockPage] {
        &self.pages
    }

    /// Serialized form written by [`MockBackend::save`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = HEADER.to_vec();
        // A Vec of plain structs always serializes.
        out.extend(serde_json::to_vec(&self.pages).unwrap_or_default());
        out.extend_from_slice(b"\n%%EOF\n");
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BackendError> {
        if let Some(body) = bytes.strip_prefix(HEADER) {
            let body = body.strip_suffix(b"\n%%EOF\n").unwrap_or(body);
            let pages = serde_json::from_slice(body)
                .map_err(|e| BackendError::Rendering(format!("Corrupt document: {e}")))?;
            return Ok(Self { pages });
        }
        if bytes.starts_with(b"%PDF") {
            let count = count_page_objects(bytes).max(1);
            return Ok(Self::a4(count));
        }
        Err(BackendError::Rendering("Not a PDF document".into()))
    }
}

fn count_page_objects(bytes: &[u8]) -> usize {
    let needle = b"/Type /Page";
    bytes
        .windows(needle.len() + 1)
        .filter(|w| w.starts_with(needle) && w[needle.len()] != b's')
        .count()
}

/// In-memory [`RenderingBackend`] with failure injection and call recording.
#[derive(Debug)]
pub struct MockBackend {
    initialized: AtomicBool,
    init_count: AtomicUsize,
    calls: Mutex<Vec<String>>,
    last_html: Mutex<Option<String>>,
    fail_init: bool,
    fail_html_string: bool,
    html_module_missing: bool,
    fail_save: bool,
    init_delay: Duration,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Uninitialised backend; the engine's readiness gate initialises it.
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            init_count: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            last_html: Mutex::new(None),
            fail_init: false,
            fail_html_string: false,
            html_module_missing: false,
            fail_save: false,
            init_delay: Duration::ZERO,
        }
    }

    /// Already initialised, for use without an engine.
    pub fn ready() -> Self {
        let b = Self::new();
        b.initialized.store(true, Ordering::SeqCst);
        b
    }

    pub fn with_failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Make the in-memory HTML renderer fail so the file fallback runs.
    pub fn with_html_string_failure(mut self) -> Self {
        self.fail_html_string = true;
        self
    }

    pub fn without_html_module(mut self) -> Self {
        self.html_module_missing = true;
        self
    }

    /// Saves write a partial file, then fail.
    pub fn with_save_failure(mut self) -> Self {
        self.fail_save = true;
        self
    }

    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    /// How many times `initialize` ran to completion.
    pub fn init_count(&self) -> usize {
        self.init_count.load(Ordering::SeqCst)
    }

    /// Recorded calls, e.g. `"render_office:b.docx"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// The last markup handed to either HTML renderer.
    pub fn last_html(&self) -> Option<String> {
        self.last_html.lock().ok().and_then(|h| h.clone())
    }

    fn record(&self, call: impl Into<String>) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call.into());
        }
    }

    fn remember_html(&self, html: String) {
        if let Ok(mut last) = self.last_html.lock() {
            *last = Some(html);
        }
    }

    fn check_ready(&self) -> Result<(), BackendError> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::NotInitialized)
        }
    }

    fn check_html_module(&self) -> Result<(), BackendError> {
        if self.html_module_missing {
            return Err(BackendError::ModuleMissing {
                module: "HTML rendering module".into(),
                hint: "Install wkhtmltopdf or set html_module_path.".into(),
            });
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<Vec<u8>, BackendError> {
        std::fs::read(path).map_err(|source| BackendError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn text_document(bytes: &[u8]) -> MockDocument {
        let breaks = bytes.iter().filter(|&&b| b == 0x0c).count();
        MockDocument::a4(1 + breaks)
    }

    fn image_document(path: &Path) -> MockDocument {
        let size = image::image_dimensions(path)
            .map(|(w, h)| PageGeometry {
                width: w as f32 * 0.75,
                height: h as f32 * 0.75,
            })
            .unwrap_or(DEFAULT_IMAGE_SIZE);
        MockDocument::with_pages(&[size])
    }

    fn page_mut<'d>(doc: &'d mut MockDocument, index: usize) -> Result<&'d mut MockPage, BackendError> {
        let total = doc.pages.len();
        doc.pages
            .get_mut(index)
            .ok_or(BackendError::PageOutOfRange { index, total })
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl RenderingBackend for MockBackend {
    type Document<'a>
        = MockDocument
    where
        Self: 'a;

    fn name(&self) -> &'static str {
        "mock"
    }

    fn initialize(&self, _license_key: Option<&str>) -> Result<(), BackendError> {
        if !self.init_delay.is_zero() {
            std::thread::sleep(self.init_delay);
        }
        if self.fail_init {
            return Err(BackendError::InitializationFailed(
                "mock backend configured to fail".into(),
            ));
        }
        self.init_count.fetch_add(1, Ordering::SeqCst);
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn render_office_to_pdf<'a>(&'a self, source: &Path) -> Result<MockDocument, BackendError> {
        self.check_ready()?;
        self.record(format!("render_office:{}", file_label(source)));
        Ok(Self::text_document(&Self::read(source)?))
    }

    fn render_generic_to_pdf<'a>(&'a self, source: &Path) -> Result<MockDocument, BackendError> {
        self.check_ready()?;
        self.record(format!("render_generic:{}", file_label(source)));
        let bytes = Self::read(source)?;
        match classify_path(source) {
            ConversionCategory::Image => Ok(Self::image_document(source)),
            ConversionCategory::PdfNative => MockDocument::from_bytes(&bytes),
            _ => Ok(Self::text_document(&bytes)),
        }
    }

    fn render_html_string_to_pdf<'a>(&'a self, html: &str) -> Result<MockDocument, BackendError> {
        self.check_ready()?;
        self.check_html_module()?;
        self.record("render_html_string");
        self.remember_html(html.to_string());
        if self.fail_html_string {
            return Err(BackendError::Rendering("HTML string rendering failed".into()));
        }
        Ok(MockDocument::a4(1))
    }

    fn render_html_url_to_pdf<'a>(&'a self, url: &Url) -> Result<MockDocument, BackendError> {
        self.check_ready()?;
        self.check_html_module()?;
        self.record(format!("render_html_url:{}", url.scheme()));
        if url.scheme() == "file" {
            let path = url
                .to_file_path()
                .map_err(|_| BackendError::Rendering(format!("Bad file URL: {url}")))?;
            self.remember_html(markup::decode(&Self::read(&path)?));
        }
        Ok(MockDocument::a4(1))
    }

    fn open_pdf<'a>(&'a self, path: &Path) -> Result<MockDocument, BackendError> {
        self.check_ready()?;
        self.record(format!("open_pdf:{}", file_label(path)));
        MockDocument::from_bytes(&Self::read(path)?)
    }

    fn new_document<'a>(&'a self) -> Result<MockDocument, BackendError> {
        self.check_ready()?;
        Ok(MockDocument::default())
    }

    fn page_count(&self, doc: &MockDocument) -> usize {
        doc.pages.len()
    }

    fn crop_box(&self, doc: &MockDocument, index: usize) -> Result<PageRect, BackendError> {
        doc.pages
            .get(index)
            .map(|p| p.crop_box)
            .ok_or(BackendError::PageOutOfRange {
                index,
                total: doc.pages.len(),
            })
    }

    fn scale_page(&self, doc: &mut MockDocument, index: usize, factor: f32) -> Result<(), BackendError> {
        let page = Self::page_mut(doc, index)?;
        page.scale *= factor;
        for rect in [&mut page.media_box, &mut page.crop_box] {
            *rect = PageRect::new(
                rect.left * factor,
                rect.bottom * factor,
                rect.right * factor,
                rect.top * factor,
            );
        }
        Ok(())
    }

    fn set_media_box(&self, doc: &mut MockDocument, index: usize, rect: PageRect) -> Result<(), BackendError> {
        Self::page_mut(doc, index)?.media_box = rect;
        Ok(())
    }

    fn set_crop_box(&self, doc: &mut MockDocument, index: usize, rect: PageRect) -> Result<(), BackendError> {
        Self::page_mut(doc, index)?.crop_box = rect;
        Ok(())
    }

    fn append_pages<'a>(&'a self, target: &mut MockDocument, source: &MockDocument) -> Result<(), BackendError> {
        target.pages.extend(source.pages.iter().cloned());
        Ok(())
    }

    fn save(&self, doc: &mut MockDocument, path: &Path, linearized: bool) -> Result<(), BackendError> {
        self.check_ready()?;
        self.record(format!("save:{}:linearized={}", file_label(path), linearized));
        let bytes = doc.to_bytes();
        let write = |data: &[u8]| {
            std::fs::write(path, data).map_err(|source| BackendError::Io {
                path: path.to_path_buf(),
                source,
            })
        };
        if self.fail_save {
            write(&bytes[..bytes.len() / 2])?;
            return Err(BackendError::Rendering("Save interrupted".into()));
        }
        write(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_documents_reopen_with_same_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two.pdf");
        let backend = MockBackend::ready();

        let mut doc = MockDocument::with_pages(&[REFERENCE, PageGeometry { width: 100.0, height: 50.0 }]);
        backend.save(&mut doc, &path, true).unwrap();

        let reopened = backend.open_pdf(&path).unwrap();
        assert_eq!(reopened, doc);
        assert!(std::fs::read(&path).unwrap().starts_with(b"%PDF"));
    }

    #[test]
    fn foreign_pdf_counts_page_objects() {
        let bytes = b"%PDF-1.4\n1 0 obj << /Type /Pages /Count 2 >>\n2 0 obj << /Type /Page >>\n3 0 obj << /Type /Page >>\n";
        assert_eq!(MockDocument::from_bytes(bytes).unwrap().pages().len(), 2);
        assert_eq!(MockDocument::from_bytes(b"%PDF").unwrap().pages().len(), 1);
        assert!(MockDocument::from_bytes(b"hello").is_err());
    }

    #[test]
    fn form_feeds_make_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.docx");
        std::fs::write(&path, b"one\x0ctwo\x0cthree").unwrap();
        let backend = MockBackend::ready();
        assert_eq!(backend.render_office_to_pdf(&path).unwrap().pages().len(), 3);
        assert_eq!(backend.calls(), vec!["render_office:b.docx"]);
    }

    #[test]
    fn unreadable_image_gets_default_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        let doc = MockBackend::ready().render_generic_to_pdf(&path).unwrap();
        assert_eq!(doc.pages()[0].crop_box, PageRect::from_size(DEFAULT_IMAGE_SIZE));
    }

    #[test]
    fn uninitialised_backend_refuses_work() {
        let backend = MockBackend::new();
        assert!(matches!(
            backend.render_html_string_to_pdf("<p>x</p>"),
            Err(BackendError::NotInitialized)
        ));
        backend.initialize(None).unwrap();
        assert!(backend.render_html_string_to_pdf("<p>x</p>").is_ok());
        assert_eq!(backend.init_count(), 1);
    }

    #[test]
    fn missing_html_module() {
        let backend = MockBackend::ready().without_html_module();
        let err = backend.render_html_string_to_pdf("<p/>").unwrap_err();
        assert!(matches!(err, BackendError::ModuleMissing { .. }));
    }

    #[test]
    fn page_out_of_range() {
        let backend = MockBackend::ready();
        let doc = MockDocument::a4(1);
        assert!(matches!(
            backend.crop_box(&doc, 3),
            Err(BackendError::PageOutOfRange { index: 3, total: 1 })
        ));
    }
}
