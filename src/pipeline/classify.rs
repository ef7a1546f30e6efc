//! Extension → conversion category.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

/// How a source file is turned into PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionCategory {
    /// Word, Excel and PowerPoint formats.
    Office,
    /// Raster and vector images.
    Image,
    /// HTML; needs the auxiliary HTML renderer.
    Markup,
    /// Already a PDF.
    PdfNative,
    /// Anything else; handed to the backend's generic converter.
    Generic,
}

const OFFICE: [&str; 21] = [
    ".doc", ".docx", ".docm", ".dot", ".dotx", ".dotm",
    ".xls", ".xlsx", ".xlsm", ".xlt", ".xltx", ".xltm",
    ".ppt", ".pptx", ".pptm", ".pot", ".potx", ".potm", ".pps", ".ppsx", ".ppsm",
];

const IMAGE: [&str; 12] = [
    ".jpg", ".jpeg", ".png", ".bmp", ".gif", ".tif", ".tiff", ".webp",
    ".svg", ".emf", ".wmf", ".eps",
];

const MARKUP: [&str; 2] = [".html", ".htm"];

static TABLE: Lazy<HashMap<&'static str, ConversionCategory>> = Lazy::new(|| {
    let mut table = HashMap::with_capacity(OFFICE.len() + IMAGE.len() + MARKUP.len() + 1);
    table.extend(OFFICE.iter().map(|e| (*e, ConversionCategory::Office)));
    table.extend(IMAGE.iter().map(|e| (*e, ConversionCategory::Image)));
    table.extend(MARKUP.iter().map(|e| (*e, ConversionCategory::Markup)));
    table.insert(".pdf", ConversionCategory::PdfNative);
    table
});

/// Classify an extension. Leading dot optional, case ignored.
pub fn classify(extension: &str) -> ConversionCategory {
    let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
    TABLE
        .get(format!(".{ext}").as_str())
        .copied()
        .unwrap_or(ConversionCategory::Generic)
}

/// Classify by a file name's extension.
pub fn classify_path(path: &std::path::Path) -> ConversionCategory {
    path.extension()
        .and_then(|e| e.to_str())
        .map(classify)
        .unwrap_or(ConversionCategory::Generic)
}

/// Zip-container Office extension (`.docx`, `.xlsm`, …).
pub(crate) fn is_zip_office(extension: &str) -> bool {
    let ext = extension.to_ascii_lowercase();
    classify(&ext) == ConversionCategory::Office && ext.len() == 5 && ext.ends_with(['x', 'm'])
}

/// Legacy OLE Office extension (`.doc`, `.xls`, `.pps`, …).
pub(crate) fn is_ole_office(extension: &str) -> bool {
    let ext = extension.to_ascii_lowercase();
    classify(&ext) == ConversionCategory::Office && ext.len() == 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn table_sizes() {
        assert_eq!(TABLE.len(), 36);
        assert_eq!(
            TABLE.values().filter(|c| **c == ConversionCategory::Office).count(),
            21
        );
    }

    #[test]
    fn dot_and_case_insensitive() {
        assert_eq!(classify(".docx"), ConversionCategory::Office);
        assert_eq!(classify("DOCX"), ConversionCategory::Office);
        assert_eq!(classify(".JPeG"), ConversionCategory::Image);
        assert_eq!(classify("htm"), ConversionCategory::Markup);
        assert_eq!(classify(".pdf"), ConversionCategory::PdfNative);
    }

    #[test]
    fn unknown_is_generic() {
        for ext in [".txt", ".md", ".xps", "", ".", ".weird"] {
            assert_eq!(classify(ext), ConversionCategory::Generic, "{ext}");
        }
    }

    #[test]
    fn stable_across_calls() {
        for ext in OFFICE.iter().chain(IMAGE.iter()) {
            assert_eq!(classify(ext), classify(ext));
        }
    }

    #[test]
    fn by_path() {
        assert_eq!(classify_path(Path::new("/in/a.PPTX")), ConversionCategory::Office);
        assert_eq!(classify_path(Path::new("/in/noext")), ConversionCategory::Generic);
    }

    #[test]
    fn container_families() {
        assert!(is_zip_office(".docx"));
        assert!(is_zip_office(".PPSM"));
        assert!(!is_zip_office(".doc"));
        assert!(is_ole_office(".xls"));
        assert!(is_ole_office(".pot"));
        assert!(!is_ole_office(".xlsx"));
        assert!(!is_ole_office(".png"));
    }
}
