//! Page-size normalization for merged documents.
//!
//! Pages are compared against A4 portrait (595 × 842 pt). A page whose
//! width or height is more than 1.5× or less than 0.5× the reference is
//! scaled by `min(595 / w, 842 / h)` and its media and crop boxes are
//! reset to `[0 0 595 842]`. Pages within bounds are left alone.

use crate::backend::{PageGeometry, PageRect, RenderingBackend};
use crate::error::BackendError;
use tracing::{debug, info};

pub const REFERENCE: PageGeometry = PageGeometry {
    width: 595.0,
    height: 842.0,
};

const UPPER_BOUND: f32 = 1.5;
const LOWER_BOUND: f32 = 0.5;

pub fn needs_normalization(page: PageGeometry) -> bool {
    let out_of_bounds = |v: f32, reference: f32| {
        v > reference * UPPER_BOUND || v < reference * LOWER_BOUND
    };
    out_of_bounds(page.width, REFERENCE.width) || out_of_bounds(page.height, REFERENCE.height)
}

/// Uniform factor fitting `page` inside the reference.
pub fn scale_factor(page: PageGeometry) -> f32 {
    (REFERENCE.width / page.width).min(REFERENCE.height / page.height)
}

/// Normalize one page. Returns true if the page was changed.
pub fn normalize_page<B: RenderingBackend>(
    backend: &B,
    doc: &mut B::Document<'_>,
    index: usize,
) -> Result<bool, BackendError> {
    let geometry = backend.crop_box(doc, index)?.geometry();
    if geometry.width <= 0.0 || geometry.height <= 0.0 || !needs_normalization(geometry) {
        return Ok(false);
    }

    let factor = scale_factor(geometry);
    info!(
        "Normalizing page {} from {:.0}x{:.0} to A4 (scale {:.3})",
        index + 1,
        geometry.width,
        geometry.height,
        factor
    );

    let reference = PageRect::from_size(REFERENCE);
    backend.scale_page(doc, index, factor)?;
    backend.set_media_box(doc, index, reference)?;
    backend.set_crop_box(doc, index, reference)?;
    Ok(true)
}

/// Normalize every page of `doc`; returns how many were changed.
pub fn normalize_document<B: RenderingBackend>(
    backend: &B,
    doc: &mut B::Document<'_>,
) -> Result<usize, BackendError> {
    let mut changed = 0;
    for index in 0..backend.page_count(doc) {
        if normalize_page(backend, doc, index)? {
            changed += 1;
        }
    }
    debug!("Normalized {} page(s)", changed);
    Ok(changed)
}
