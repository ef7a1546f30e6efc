//! Production backend: pdfium-render for PDF work, helper programs for
//! layout.
//!
//! | Source | Path to PDF |
//! |--------|-------------|
//! | raster image | decoded with `image`, placed on a page of the same size (0.75 pt/px) |
//! | office, text, vector image | LibreOffice (`soffice --convert-to pdf`) |
//! | HTML | the HTML rendering module (`wkhtmltopdf`-compatible) |
//! | PDF | loaded directly |
//!
//! Documents are always loaded from memory, so the source file can be
//! deleted while the document is still open.
//!
//! pdfium has no linearized writer: `save(.., linearized = true)` writes a
//! complete, non-incremental file.

use super::external::{HtmlRenderer, OfficeConverter};
use super::{PageRect, RenderingBackend};
use crate::config::EngineConfig;
use crate::error::BackendError;
use crate::pipeline::classify::{classify_path, ConversionCategory};
use pdfium_render::prelude::*;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::TempDir;
use tracing::{debug, info, warn};

const POINTS_PER_PIXEL: f32 = 0.75;

pub struct PdfiumBackend {
    pdfium: OnceLock<Pdfium>,
    library_path: Option<PathBuf>,
    allow_download: bool,
    office: OfficeConverter,
    html_module_path: Option<PathBuf>,
    scratch_dir: PathBuf,
}

impl std::fmt::Debug for PdfiumBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumBackend")
            .field("bound", &self.pdfium.get().is_some())
            .field("library_path", &self.library_path)
            .field("office", &self.office)
            .field("html_module_path", &self.html_module_path)
            .finish()
    }
}

impl PdfiumBackend {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            pdfium: OnceLock::new(),
            library_path: config.pdfium_library_path.clone(),
            allow_download: config.allow_pdfium_download,
            office: OfficeConverter::new(config.office_command.clone()),
            html_module_path: config.html_module_path.clone(),
            scratch_dir: config.temp_dir.clone(),
        }
    }

    fn pdfium(&self) -> Result<&Pdfium, BackendError> {
        self.pdfium.get().ok_or(BackendError::NotInitialized)
    }

    fn scratch(&self, prefix: &str) -> Result<TempDir, BackendError> {
        std::fs::create_dir_all(&self.scratch_dir).map_err(|source| BackendError::Io {
            path: self.scratch_dir.clone(),
            source,
        })?;
        tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.scratch_dir)
            .map_err(|source| BackendError::Io {
                path: self.scratch_dir.clone(),
                source,
            })
    }

    fn load_file<'a>(&'a self, path: &Path) -> Result<PdfDocument<'a>, BackendError> {
        let bytes = std::fs::read(path).map_err(|source| BackendError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.pdfium()?
            .load_pdf_from_byte_vec(bytes, None)
            .map_err(|e| BackendError::Rendering(format!("Failed to load PDF {}: {:?}", path.display(), e)))
    }

    fn via_office<'a>(&'a self, source: &Path) -> Result<PdfDocument<'a>, BackendError> {
        self.pdfium()?;
        let scratch = self.scratch("office_")?;
        let pdf = self.office.convert(source, scratch.path())?;
        self.load_file(&pdf)
    }

    fn image_to_pdf<'a>(
        &'a self,
        source: &Path,
        image: &image::DynamicImage,
    ) -> Result<PdfDocument<'a>, BackendError> {
        let width = PdfPoints::new(image.width() as f32 * POINTS_PER_PIXEL);
        let height = PdfPoints::new(image.height() as f32 * POINTS_PER_PIXEL);
        debug!(
            "Placing {}x{} px image {} on a {:.0}x{:.0} pt page",
            image.width(),
            image.height(),
            source.display(),
            width.value,
            height.value
        );

        let mut doc = self.pdfium()?.create_new_pdf().map_err(rendering)?;
        let mut page = doc
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(width, height))
            .map_err(rendering)?;
        let object = PdfPageImageObject::new_with_size(&doc, image, width, height).map_err(rendering)?;
        page.objects_mut().add_image_object(object).map_err(rendering)?;
        Ok(doc)
    }

    fn page<'a>(&self, doc: &PdfDocument<'a>, index: usize) -> Result<PdfPage<'a>, BackendError> {
        let total = doc.pages().len() as usize;
        if index >= total {
            return Err(BackendError::PageOutOfRange { index, total });
        }
        doc.pages().get(index as u16).map_err(rendering)
    }
}

fn rendering(e: PdfiumError) -> BackendError {
    BackendError::Rendering(format!("{:?}", e))
}

fn to_pdf_rect(rect: PageRect) -> PdfRect {
    PdfRect::new_from_values(rect.bottom, rect.left, rect.top, rect.right)
}

impl RenderingBackend for PdfiumBackend {
    type Document<'a>
        = PdfDocument<'a>
    where
        Self: 'a;

    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn initialize(&self, license_key: Option<&str>) -> Result<(), BackendError> {
        if self.pdfium.get().is_some() {
            return Ok(());
        }
        if license_key.is_some() {
            debug!("pdfium does not use a licence key; ignoring the configured one");
        }

        let path = pdfium_loader::resolve_library(self.library_path.as_deref(), self.allow_download)?;
        let pdfium = pdfium_loader::bind(&path)?;
        if self.pdfium.set(pdfium).is_err() {
            warn!("pdfium was bound concurrently; keeping the first binding");
        }
        info!("pdfium bound from {}", path.display());

        match HtmlRenderer::locate(self.html_module_path.as_deref()) {
            Ok(renderer) => info!("HTML rendering module: {}", renderer.program().display()),
            Err(_) => warn!("HTML rendering module not found; HTML conversions will fail"),
        }
        Ok(())
    }

    fn render_office_to_pdf<'a>(&'a self, source: &Path) -> Result<PdfDocument<'a>, BackendError> {
        self.via_office(source)
    }

    fn render_generic_to_pdf<'a>(&'a self, source: &Path) -> Result<PdfDocument<'a>, BackendError> {
        match classify_path(source) {
            ConversionCategory::PdfNative => self.load_file(source),
            ConversionCategory::Image => match image::open(source) {
                Ok(img) => self.image_to_pdf(source, &img),
                // svg, emf, wmf, eps: LibreOffice Draw imports them.
                Err(e) => {
                    debug!("image decoder declined {}: {}", source.display(), e);
                    self.via_office(source)
                }
            },
            _ => self.via_office(source),
        }
    }

    fn render_html_string_to_pdf<'a>(&'a self, html: &str) -> Result<PdfDocument<'a>, BackendError> {
        self.pdfium()?;
        let renderer = HtmlRenderer::locate(self.html_module_path.as_deref())?;
        let scratch = self.scratch("html_")?;
        let out = scratch.path().join("out.pdf");
        renderer.render_string(html, &out)?;
        self.load_file(&out)
    }

    fn render_html_url_to_pdf<'a>(&'a self, url: &Url) -> Result<PdfDocument<'a>, BackendError> {
        self.pdfium()?;
        let renderer = HtmlRenderer::locate(self.html_module_path.as_deref())?;
        let scratch = self.scratch("html_")?;
        let out = scratch.path().join("out.pdf");
        renderer.render_url(url, &out)?;
        self.load_file(&out)
    }

    fn open_pdf<'a>(&'a self, path: &Path) -> Result<PdfDocument<'a>, BackendError> {
        self.load_file(path)
    }

    fn new_document<'a>(&'a self) -> Result<PdfDocument<'a>, BackendError> {
        self.pdfium()?.create_new_pdf().map_err(rendering)
    }

    fn page_count(&self, doc: &PdfDocument<'_>) -> usize {
        doc.pages().len() as usize
    }

    fn crop_box(&self, doc: &PdfDocument<'_>, index: usize) -> Result<PageRect, BackendError> {
        let page = self.page(doc, index)?;
        let boundaries = page.boundaries();
        let rect = boundaries
            .crop()
            .or_else(|_| boundaries.media())
            .map_err(rendering)?
            .bounds;
        Ok(PageRect::new(
            rect.left().value,
            rect.bottom().value,
            rect.right().value,
            rect.top().value,
        ))
    }

    fn scale_page(&self, doc: &mut PdfDocument<'_>, index: usize, factor: f32) -> Result<(), BackendError> {
        let mut page = self.page(doc, index)?;
        page.scale(factor, factor).map_err(rendering)
    }

    fn set_media_box(&self, doc: &mut PdfDocument<'_>, index: usize, rect: PageRect) -> Result<(), BackendError> {
        let mut page = self.page(doc, index)?;
        page.boundaries_mut().set_media(to_pdf_rect(rect)).map_err(rendering)
    }

    fn set_crop_box(&self, doc: &mut PdfDocument<'_>, index: usize, rect: PageRect) -> Result<(), BackendError> {
        let mut page = self.page(doc, index)?;
        page.boundaries_mut().set_crop(to_pdf_rect(rect)).map_err(rendering)
    }

    fn append_pages<'a>(
        &'a self,
        target: &mut PdfDocument<'a>,
        source: &PdfDocument<'a>,
    ) -> Result<(), BackendError> {
        target.pages_mut().append(source).map_err(rendering)
    }

    fn save(&self, doc: &mut PdfDocument<'_>, path: &Path, linearized: bool) -> Result<(), BackendError> {
        if linearized {
            debug!("pdfium writes full saves; linearization request noted for {}", path.display());
        }
        doc.save_to_file(path).map_err(rendering)
    }
}
