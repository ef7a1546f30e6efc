//! Content sniffing: decide a file's type from its leading bytes.
//!
//! Order of evidence:
//!
//! 1. magic signature (first match wins; zip and OLE containers are further
//!    split into Word / Excel / PowerPoint by the entry names they carry)
//! 2. the extension of the caller's file-name hint
//! 3. a printable-ASCII ratio over the first 1000 bytes → `.txt`

use crate::pipeline::classify::{is_ole_office, is_zip_office};
use std::path::Path;
use tracing::debug;

const TEXT_SAMPLE_LEN: usize = 1000;
const TEXT_RATIO: f64 = 0.95;

const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Clone, Copy)]
enum Signature {
    Exact(&'static str),
    Zip,
    Ole,
    Webp,
}

/// Signature table, checked in order.
const SIGNATURES: &[(&[u8], Signature)] = &[
    (b"%PDF", Signature::Exact(".pdf")),
    (b"PK\x03\x04", Signature::Zip),
    (&OLE_MAGIC, Signature::Ole),
    (&[0xFF, 0xD8, 0xFF], Signature::Exact(".jpg")),
    (&PNG_MAGIC, Signature::Exact(".png")),
    (b"GIF8", Signature::Exact(".gif")),
    (b"BM", Signature::Exact(".bmp")),
    (b"II*\x00", Signature::Exact(".tif")),
    (b"MM\x00*", Signature::Exact(".tif")),
    (b"RIFF", Signature::Webp),
];

/// Detect the dot-prefixed extension of `bytes`, or `None`.
pub fn detect(bytes: &[u8], file_name_hint: Option<&str>) -> Option<String> {
    let hint = file_name_hint.and_then(hint_extension);

    if let Some(ext) = detect_signature(bytes, hint.as_deref()) {
        debug!("Detected file type from signature: {}", ext);
        return Some(ext);
    }

    if let Some(ext) = hint {
        debug!("Detected file type from file name: {}", ext);
        return Some(ext);
    }

    if looks_like_text(bytes) {
        debug!("Detected file type from content: .txt");
        return Some(".txt".to_string());
    }

    None
}

fn detect_signature(bytes: &[u8], hint: Option<&str>) -> Option<String> {
    let (_, sig) = SIGNATURES
        .iter()
        .find(|(magic, _)| bytes.starts_with(magic))?;

    match *sig {
        Signature::Exact(ext) => Some(ext.to_string()),
        Signature::Zip => Some(disambiguate(
            bytes,
            &[
                (&b"word/"[..], ".docx"),
                (&b"xl/"[..], ".xlsx"),
                (&b"ppt/"[..], ".pptx"),
            ],
            hint.filter(|h| is_zip_office(h)),
            ".docx",
        )),
        Signature::Ole => {
            let word = utf16le("WordDocument");
            let workbook = utf16le("Workbook");
            let book = utf16le("Book");
            let powerpoint = utf16le("PowerPoint Document");
            Some(disambiguate(
                bytes,
                &[
                    (word.as_slice(), ".doc"),
                    (workbook.as_slice(), ".xls"),
                    (book.as_slice(), ".xls"),
                    (powerpoint.as_slice(), ".ppt"),
                ],
                hint.filter(|h| is_ole_office(h)),
                ".doc",
            ))
        }
        // RIFF is also WAV/AVI; only WEBP at offset 8 counts.
        Signature::Webp => (bytes.get(8..12) == Some(&b"WEBP"[..])).then(|| ".webp".to_string()),
    }
}

/// Pick the extension whose marker occurs earliest in `bytes`; fall back to
/// the hint, then to `default`.
fn disambiguate(
    bytes: &[u8],
    markers: &[(&[u8], &str)],
    hint: Option<&str>,
    default: &str,
) -> String {
    markers
        .iter()
        .filter_map(|(marker, ext)| find(bytes, marker).map(|pos| (pos, *ext)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, ext)| ext)
        .or(hint)
        .unwrap_or(default)
        .to_string()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

fn hint_extension(hint: &str) -> Option<String> {
    Path::new(hint.trim())
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}

/// More than 95% of the first 1000 bytes are printable ASCII, TAB, LF or CR.
pub fn looks_like_text(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(TEXT_SAMPLE_LEN)];
    if sample.is_empty() {
        return false;
    }
    let text = sample
        .iter()
        .filter(|&&b| (0x20..=0x7E).contains(&b) || matches!(b, b'\t' | b'\n' | b'\r'))
        .count();
    text as f64 / sample.len() as f64 > TEXT_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zip_with_entry(name: &str) -> Vec<u8> {
        let mut v = b"PK\x03\x04\x14\x00\x06\x00\x08\x00\x00\x00!\x00".to_vec();
        v.extend_from_slice(b"[Content_Types].xml");
        v.extend_from_slice(&[0u8; 16]);
        v.extend_from_slice(b"PK\x03\x04");
        v.extend_from_slice(name.as_bytes());
        v
    }

    fn ole_with_stream(name: &str) -> Vec<u8> {
        let mut v = OLE_MAGIC.to_vec();
        v.extend_from_slice(&[0u8; 504]);
        v.extend_from_slice(&utf16le("Root Entry"));
        v.extend_from_slice(&[0u8; 32]);
        v.extend_from_slice(&utf16le(name));
        v
    }

    #[test]
    fn signatures_without_hint() {
        assert_eq!(detect(b"%PDF-1.7\n%\xE2\xE3", None).as_deref(), Some(".pdf"));
        assert_eq!(detect(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F'], None).as_deref(), Some(".jpg"));
        assert_eq!(detect(&PNG_MAGIC, None).as_deref(), Some(".png"));
        assert_eq!(detect(b"GIF89a\x01\x00", None).as_deref(), Some(".gif"));
        assert_eq!(detect(b"MM\x00*\x00\x00\x00\x08", None).as_deref(), Some(".tif"));
        assert_eq!(detect(b"RIFF\x24\x00\x00\x00WEBPVP8 ", None).as_deref(), Some(".webp"));
    }

    #[test]
    fn short_buffers_still_match() {
        assert_eq!(detect(b"%PDF", None).as_deref(), Some(".pdf"));
        assert_eq!(detect(b"BM", None).as_deref(), Some(".bmp"));
    }

    #[test]
    fn riff_without_webp_is_not_an_image() {
        let wav = b"RIFF\x24\x00\x00\x00WAVEfmt \x10\x00\x00\x00\x01\x00";
        assert_eq!(detect(wav, Some("sound.wav")).as_deref(), Some(".wav"));
    }

    #[test]
    fn zip_entry_names_pick_office_flavour() {
        assert_eq!(detect(&zip_with_entry("word/document.xml"), None).as_deref(), Some(".docx"));
        assert_eq!(detect(&zip_with_entry("xl/workbook.xml"), None).as_deref(), Some(".xlsx"));
        assert_eq!(detect(&zip_with_entry("ppt/presentation.xml"), Some("x.docx")).as_deref(), Some(".pptx"));
    }

    #[test]
    fn zip_without_markers_uses_hint_then_docx() {
        let bare = b"PK\x03\x04\x14\x00\x00\x00\x00\x00";
        assert_eq!(detect(bare, Some("deck.PPSX")).as_deref(), Some(".ppsx"));
        assert_eq!(detect(bare, Some("notes.txt")).as_deref(), Some(".docx"));
        assert_eq!(detect(bare, None).as_deref(), Some(".docx"));
    }

    #[test]
    fn ole_stream_names_pick_legacy_flavour() {
        assert_eq!(detect(&ole_with_stream("WordDocument"), None).as_deref(), Some(".doc"));
        assert_eq!(detect(&ole_with_stream("Workbook"), None).as_deref(), Some(".xls"));
        assert_eq!(detect(&ole_with_stream("PowerPoint Document"), None).as_deref(), Some(".ppt"));
        assert_eq!(detect(&OLE_MAGIC, Some("old.xlt")).as_deref(), Some(".xlt"));
        assert_eq!(detect(&OLE_MAGIC, None).as_deref(), Some(".doc"));
    }

    #[test]
    fn hint_used_when_no_signature() {
        assert_eq!(detect(&[0u8, 1, 2, 3], Some("Report.DOCX")).as_deref(), Some(".docx"));
        assert_eq!(detect(&[0u8, 1, 2, 3], Some("  ")), None);
    }

    #[test]
    fn text_heuristic() {
        assert_eq!(detect(b"hello world\r\nsecond line\tend", None).as_deref(), Some(".txt"));

        let mut mostly = vec![b'a'; 96];
        mostly.extend_from_slice(&[0u8; 4]);
        assert!(looks_like_text(&mostly));

        let mut borderline = vec![b'a'; 95];
        borderline.extend_from_slice(&[0u8; 5]);
        assert!(!looks_like_text(&borderline));
    }

    #[test]
    fn text_sample_only_reads_first_kilobyte() {
        let mut v = vec![b'x'; TEXT_SAMPLE_LEN];
        v.extend(std::iter::repeat(0u8).take(5000));
        assert!(looks_like_text(&v));
    }

    #[test]
    fn empty_and_binary_are_undetected() {
        assert_eq!(detect(&[], None), None);
        assert_eq!(detect(&[0u8, 0xFE, 0x01, 0x9A, 0x00, 0x00], None), None);
    }
}
