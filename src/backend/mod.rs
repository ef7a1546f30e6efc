//! The rendering backend seam.
//!
//! Everything that turns a source format into PDF pages, or edits PDF
//! pages, goes through [`RenderingBackend`]. The engine never touches a
//! document model directly; it only holds the backend's opaque
//! [`RenderingBackend::Document`] values and passes them back.
//!
//! All methods are synchronous and may block; the engine always calls them
//! from `tokio::task::spawn_blocking`.
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`PdfiumBackend`] | production: pdfium-render plus external office / HTML renderers |
//! | [`MockBackend`]   | tests and dry runs: deterministic in-memory documents |

pub mod external;
pub mod mock;
pub mod pdfium;

pub use mock::{MockBackend, MockDocument};
pub use pdfium::PdfiumBackend;

use crate::error::BackendError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Width and height in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
}

/// A page boundary box in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageRect {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl PageRect {
    pub fn new(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    /// `[0 0 width height]`.
    pub fn from_size(size: PageGeometry) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    pub fn geometry(&self) -> PageGeometry {
        PageGeometry {
            width: (self.right - self.left).abs(),
            height: (self.top - self.bottom).abs(),
        }
    }
}

/// A format-to-PDF engine plus the page operations the merge pipeline needs.
pub trait RenderingBackend: Send + Sync + 'static {
    /// An open PDF document. May borrow from the backend.
    type Document<'a>
    where
        Self: 'a;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// One-time setup. Called through a [`ReadyGate`], so at most once per
    /// successful initialisation.
    fn initialize(&self, license_key: Option<&str>) -> Result<(), BackendError>;

    fn render_office_to_pdf<'a>(&'a self, source: &Path) -> Result<Self::Document<'a>, BackendError>;

    fn render_generic_to_pdf<'a>(&'a self, source: &Path) -> Result<Self::Document<'a>, BackendError>;

    fn render_html_string_to_pdf<'a>(&'a self, html: &str) -> Result<Self::Document<'a>, BackendError>;

    fn render_html_url_to_pdf<'a>(&'a self, url: &Url) -> Result<Self::Document<'a>, BackendError>;

    fn open_pdf<'a>(&'a self, path: &Path) -> Result<Self::Document<'a>, BackendError>;

    fn new_document<'a>(&'a self) -> Result<Self::Document<'a>, BackendError>;

    fn page_count(&self, doc: &Self::Document<'_>) -> usize;

    fn crop_box(&self, doc: &Self::Document<'_>, index: usize) -> Result<PageRect, BackendError>;

    /// Scale the page's content uniformly by `factor`.
    fn scale_page(
        &self,
        doc: &mut Self::Document<'_>,
        index: usize,
        factor: f32,
    ) -> Result<(), BackendError>;

    fn set_media_box(
        &self,
        doc: &mut Self::Document<'_>,
        index: usize,
        rect: PageRect,
    ) -> Result<(), BackendError>;

    fn set_crop_box(
        &self,
        doc: &mut Self::Document<'_>,
        index: usize,
        rect: PageRect,
    ) -> Result<(), BackendError>;

    /// Append every page of `source` to the end of `target`.
    fn append_pages<'a>(
        &'a self,
        target: &mut Self::Document<'a>,
        source: &Self::Document<'a>,
    ) -> Result<(), BackendError>;

    fn save(
        &self,
        doc: &mut Self::Document<'_>,
        path: &Path,
        linearized: bool,
    ) -> Result<(), BackendError>;
}

/// Idempotent, thread-safe initialisation guard.
///
/// The flag is checked before and after taking the lock, so concurrent
/// callers run `init` at most once. A failed `init` leaves the gate closed
/// and the next caller retries.
#[derive(Debug, Default)]
pub struct ReadyGate {
    ready: AtomicBool,
    lock: Mutex<()>,
}

impl ReadyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn ensure<F>(&self, init: F) -> Result<(), BackendError>
    where
        F: FnOnce() -> Result<(), BackendError>,
    {
        if self.is_ready() {
            return Ok(());
        }
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.is_ready() {
            return Ok(());
        }
        init()?;
        self.ready.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn gate_runs_init_once_across_threads() {
        let gate = Arc::new(ReadyGate::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    gate.ensure(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        Ok(())
                    })
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(gate.is_ready());
    }

    #[test]
    fn failed_init_is_retried() {
        let gate = ReadyGate::new();
        let err = gate.ensure(|| Err(BackendError::InitializationFailed("boom".into())));
        assert!(err.is_err());
        assert!(!gate.is_ready());

        gate.ensure(|| Ok(())).unwrap();
        assert!(gate.is_ready());
    }

    #[test]
    fn rect_geometry() {
        let r = PageRect::new(10.0, 20.0, 605.0, 862.0);
        assert_eq!(r.geometry(), PageGeometry { width: 595.0, height: 842.0 });
        assert_eq!(
            PageRect::from_size(PageGeometry { width: 1.0, height: 2.0 }),
            PageRect::new(0.0, 0.0, 1.0, 2.0)
        );
    }
}
