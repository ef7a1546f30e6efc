//! Output path resolution.
//!
//! A returned output path never names an existing file. The first
//! candidate is `<base>.pdf`; on collision a local timestamp
//! `_yyyyMMdd_HHmmss` is appended, then `_N` until the name is free.
//! Two requests resolving in the same instant can still pick the same
//! name; the window is the gap between resolution and the backend's save.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Default base name for merge outputs.
pub const MERGE_BASE: &str = "mergePDF";

/// Default base name for URL conversions.
pub const URL_BASE: &str = "url_conversion";

pub fn timestamp(now: DateTime<Local>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// Reduce a caller-supplied base name to a bare file stem: trimmed, final
/// path component only, a trailing `.pdf` dropped.
pub fn sanitize_base(base: &str) -> Option<String> {
    let last = base
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let stem = match last.len().checked_sub(4) {
        Some(cut) if last.is_char_boundary(cut) && last[cut..].eq_ignore_ascii_case(".pdf") => {
            &last[..cut]
        }
        _ => last,
    };
    match stem {
        "" | "." | ".." => None,
        s => Some(s.to_string()),
    }
}

/// Stem of a source file name (`/in/report.docx` → `report`).
pub fn source_stem(source_name: &str) -> String {
    Path::new(source_name.trim())
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("converted")
        .to_string()
}

/// Resolve the output path for a single conversion.
pub fn resolve_output_path(base: Option<&str>, source_name: &str, output_dir: &Path) -> PathBuf {
    resolve_output_path_at(base, source_name, output_dir, Local::now())
}

pub fn resolve_output_path_at(
    base: Option<&str>,
    source_name: &str,
    output_dir: &Path,
    now: DateTime<Local>,
) -> PathBuf {
    let stem = base
        .and_then(sanitize_base)
        .unwrap_or_else(|| source_stem(source_name));

    let plain = output_dir.join(format!("{stem}.pdf"));
    if !plain.exists() {
        return plain;
    }
    first_free(output_dir, &format!("{stem}_{}", timestamp(now)))
}

/// Merge outputs are always timestamped: `<base or mergePDF>_<ts>.pdf`.
pub fn resolve_merge_path(base: Option<&str>, output_dir: &Path) -> PathBuf {
    resolve_merge_path_at(base, output_dir, Local::now())
}

pub fn resolve_merge_path_at(base: Option<&str>, output_dir: &Path, now: DateTime<Local>) -> PathBuf {
    let stem = base
        .and_then(sanitize_base)
        .unwrap_or_else(|| MERGE_BASE.to_string());
    first_free(output_dir, &format!("{stem}_{}", timestamp(now)))
}

/// Base name used for URL conversions without an explicit one.
pub fn url_base(now: DateTime<Local>) -> String {
    format!("{URL_BASE}_{}", timestamp(now))
}

fn first_free(output_dir: &Path, stem: &str) -> PathBuf {
    let candidate = output_dir.join(format!("{stem}.pdf"));
    if !candidate.exists() {
        return candidate;
    }
    (1u32..)
        .map(|n| output_dir.join(format!("{stem}_{n}.pdf")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn plain_name_when_free() {
        let dir = tempfile::tempdir().unwrap();
        let p = resolve_output_path_at(None, "/in/report.docx", dir.path(), fixed_now());
        assert_eq!(p, dir.path().join("report.pdf"));
    }

    #[test]
    fn explicit_base_wins_over_source() {
        let dir = tempfile::tempdir().unwrap();
        let p = resolve_output_path_at(Some("  final  "), "report.docx", dir.path(), fixed_now());
        assert_eq!(p, dir.path().join("final.pdf"));
    }

    #[test]
    fn collision_gets_timestamp_then_counter() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("report.pdf"), b"x").unwrap();

        let first = resolve_output_path_at(Some("report"), "a.docx", dir.path(), fixed_now());
        assert_eq!(first, dir.path().join("report_20240309_140507.pdf"));

        fs::write(&first, b"x").unwrap();
        let second = resolve_output_path_at(Some("report"), "a.docx", dir.path(), fixed_now());
        assert_eq!(second, dir.path().join("report_20240309_140507_1.pdf"));
        assert!(!second.exists());
    }

    #[test]
    fn base_cannot_escape_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let p = resolve_output_path_at(Some("../../etc/passwd"), "a.docx", dir.path(), fixed_now());
        assert_eq!(p, dir.path().join("passwd.pdf"));

        let p = resolve_output_path_at(Some(".."), "a.docx", dir.path(), fixed_now());
        assert_eq!(p, dir.path().join("a.pdf"));
    }

    #[test]
    fn trailing_pdf_is_not_doubled() {
        assert_eq!(sanitize_base("out.PDF").as_deref(), Some("out"));
        assert_eq!(sanitize_base("   ").as_deref(), None);
        assert_eq!(sanitize_base(r"C:\x\y\z").as_deref(), Some("z"));
    }

    #[test]
    fn merge_always_timestamped() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_merge_path_at(None, dir.path(), fixed_now()),
            dir.path().join("mergePDF_20240309_140507.pdf")
        );
        assert_eq!(
            resolve_merge_path_at(Some("bundle"), dir.path(), fixed_now()),
            dir.path().join("bundle_20240309_140507.pdf")
        );
    }

    #[test]
    fn url_default_base() {
        assert_eq!(url_base(fixed_now()), "url_conversion_20240309_140507");
    }
}
