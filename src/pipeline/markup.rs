//! HTML preparation before it reaches the HTML renderer.
//!
//! Renderers guess the encoding of documents without a charset
//! declaration and garble non-ASCII text. Markup is therefore decoded to a
//! Rust string, given an explicit UTF-8 declaration, and written back as
//! BOM-prefixed UTF-8 whenever it has to go through a file.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

const CHARSET_META: &str = "\n    <meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\">\n    <meta charset=\"UTF-8\">";

static RE_HEAD_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<head(?:\s[^>]*)?>").unwrap());

static RE_HTML_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<html(?:\s[^>]*)?>").unwrap());

/// Decode markup bytes: UTF-8 BOM, UTF-16 LE/BE BOM, else lossy UTF-8.
pub fn decode(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&UTF8_BOM) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    String::from_utf8_lossy(bytes).into_owned()
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Add a UTF-8 charset declaration unless the text already mentions
/// `charset`.
///
/// The meta tags go right after the first `<head …>` tag. Without a head, a
/// `<head>` holding them is placed right after the `<html …>` tag. Text with
/// neither is returned unchanged.
pub fn ensure_charset(html: &str) -> Cow<'_, str> {
    if html.to_ascii_lowercase().contains("charset") {
        return Cow::Borrowed(html);
    }

    if let Some(m) = RE_HEAD_OPEN.find(html) {
        let mut out = String::with_capacity(html.len() + CHARSET_META.len());
        out.push_str(&html[..m.end()]);
        out.push_str(CHARSET_META);
        out.push_str(&html[m.end()..]);
        return Cow::Owned(out);
    }

    if let Some(m) = RE_HTML_OPEN.find(html) {
        let mut out = String::with_capacity(html.len() + CHARSET_META.len() + 16);
        out.push_str(&html[..m.end()]);
        out.push_str("\n<head>");
        out.push_str(CHARSET_META);
        out.push_str("\n</head>");
        out.push_str(&html[m.end()..]);
        return Cow::Owned(out);
    }

    Cow::Borrowed(html)
}

/// Decode, then add the charset declaration.
pub fn prepare(bytes: &[u8]) -> String {
    let text = decode(bytes);
    if let Cow::Owned(repaired) = ensure_charset(&text) {
        return repaired;
    }
    text
}

/// BOM-prefixed UTF-8 bytes.
pub fn encode_with_bom(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(UTF8_BOM.len() + text.len());
    out.extend_from_slice(&UTF8_BOM);
    out.extend_from_slice(text.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_boms() {
        assert_eq!(decode(b"\xEF\xBB\xBFh\xC3\xA9"), "hé");

        let le: Vec<u8> = [0xFF, 0xFE].into_iter().chain("hé".encode_utf16().flat_map(u16::to_le_bytes)).collect();
        assert_eq!(decode(&le), "hé");

        let be: Vec<u8> = [0xFE, 0xFF].into_iter().chain("hé".encode_utf16().flat_map(u16::to_be_bytes)).collect();
        assert_eq!(decode(&be), "hé");

        assert_eq!(decode(b"plain"), "plain");
    }

    #[test]
    fn injects_after_head_with_attributes() {
        let out = ensure_charset("<html><HEAD lang=\"fr\"><title>t</title></HEAD></html>");
        assert!(out.starts_with("<html><HEAD lang=\"fr\">\n    <meta http-equiv"));
        assert!(out.contains("<meta charset=\"UTF-8\"><title>"));
    }

    #[test]
    fn header_tag_is_not_head() {
        let out = ensure_charset("<html><body><header>x</header></body></html>");
        assert!(out.starts_with("<html>\n<head>\n    <meta http-equiv"));
        assert!(out.contains("</head><body><header>"));
    }

    #[test]
    fn existing_charset_untouched() {
        let html = "<html><head><meta charset=\"latin1\"></head></html>";
        assert!(matches!(ensure_charset(html), Cow::Borrowed(_)));
    }

    #[test]
    fn fragment_without_html_untouched() {
        assert!(matches!(ensure_charset("<p>just a fragment</p>"), Cow::Borrowed(_)));
    }

    #[test]
    fn bom_prefix() {
        assert_eq!(encode_with_bom("a"), vec![0xEF, 0xBB, 0xBF, b'a']);
    }

    #[test]
    fn prepare_decodes_and_repairs() {
        let out = prepare(b"\xEF\xBB\xBF<html><head></head><body>\xC3\xBC</body></html>");
        assert!(out.contains("charset=UTF-8"));
        assert!(out.contains('ü'));
        assert!(!out.starts_with('\u{FEFF}'));
    }
}
