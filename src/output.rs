//! Result types returned by the engine.
//!
//! Results are immutable once built: fields are private, construction goes
//! through `success` / `error` factories, and reads go through accessors.
//! Every result serializes to JSON for the CLI's `--json` mode; durations
//! become milliseconds and PDF bytes become base64.

use crate::error::ConvertError;
use base64::Engine as _;
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

fn as_base64<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(b) => s.serialize_some(&base64::engine::general_purpose::STANDARD.encode(b)),
        None => s.serialize_none(),
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ── Single conversion ────────────────────────────────────────────────────

/// Outcome of a conversion that writes a PDF into the output directory.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    success: bool,
    output_path: Option<PathBuf>,
    output_file_name: Option<String>,
    size_bytes: Option<u64>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    duration: Duration,
    error_message: Option<String>,
    error_detail: Option<String>,
}

impl ConversionResult {
    pub fn success(output_path: PathBuf, size_bytes: u64, duration: Duration) -> Self {
        Self {
            success: true,
            output_file_name: Some(file_name_of(&output_path)),
            output_path: Some(output_path),
            size_bytes: Some(size_bytes),
            duration,
            error_message: None,
            error_detail: None,
        }
    }

    pub fn error(err: &ConvertError, duration: Duration) -> Self {
        Self {
            success: false,
            output_path: None,
            output_file_name: None,
            size_bytes: None,
            duration,
            error_message: Some(err.title().to_string()),
            error_detail: Some(err.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn output_file_name(&self) -> Option<&str> {
        self.output_file_name.as_deref()
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size_bytes
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }
}

// ── Byte-array conversion ────────────────────────────────────────────────

/// Outcome of an in-memory conversion; the PDF travels back as bytes.
#[derive(Debug, Clone, Serialize)]
pub struct ByteConversionResult {
    success: bool,
    #[serde(serialize_with = "as_base64")]
    pdf_bytes: Option<Vec<u8>>,
    output_file_name: Option<String>,
    size_bytes: u64,
    detected_type: Option<String>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    duration: Duration,
    error_message: Option<String>,
    error_detail: Option<String>,
}

impl ByteConversionResult {
    pub fn success(
        pdf_bytes: Vec<u8>,
        output_file_name: String,
        detected_type: String,
        duration: Duration,
    ) -> Self {
        Self {
            success: true,
            size_bytes: pdf_bytes.len() as u64,
            pdf_bytes: Some(pdf_bytes),
            output_file_name: Some(output_file_name),
            detected_type: Some(detected_type),
            duration,
            error_message: None,
            error_detail: None,
        }
    }

    pub fn error(err: &ConvertError, detected_type: Option<String>, duration: Duration) -> Self {
        Self {
            success: false,
            pdf_bytes: None,
            output_file_name: None,
            size_bytes: 0,
            detected_type,
            duration,
            error_message: Some(err.title().to_string()),
            error_detail: Some(err.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn pdf_bytes(&self) -> Option<&[u8]> {
        self.pdf_bytes.as_deref()
    }

    pub fn into_pdf_bytes(self) -> Option<Vec<u8>> {
        self.pdf_bytes
    }

    pub fn output_file_name(&self) -> Option<&str> {
        self.output_file_name.as_deref()
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn detected_type(&self) -> Option<&str> {
        self.detected_type.as_deref()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }
}

// ── Merge ────────────────────────────────────────────────────────────────

/// A merge item that was skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub file_name: String,
    pub reason: String,
}

/// Per-item record of a merge, in caller order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeLedger {
    total_requested: usize,
    succeeded: Vec<String>,
    failed: Vec<FileFailure>,
}

impl MergeLedger {
    pub fn new(total_requested: usize) -> Self {
        Self {
            total_requested,
            succeeded: Vec::with_capacity(total_requested),
            failed: Vec::new(),
        }
    }

    pub fn record_success(&mut self, file_name: impl Into<String>) {
        self.succeeded.push(file_name.into());
    }

    pub fn record_failure(&mut self, file_name: impl Into<String>, reason: impl Into<String>) {
        self.failed.push(FileFailure {
            file_name: file_name.into(),
            reason: reason.into(),
        });
    }

    pub fn total_requested(&self) -> usize {
        self.total_requested
    }

    pub fn succeeded(&self) -> &[String] {
        &self.succeeded
    }

    pub fn failed(&self) -> &[FileFailure] {
        &self.failed
    }

    /// Every requested item is accounted for exactly once.
    pub fn is_complete(&self) -> bool {
        self.succeeded.len() + self.failed.len() == self.total_requested
    }
}

/// Outcome of a merge request.
#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    success: bool,
    output_path: Option<PathBuf>,
    output_file_name: Option<String>,
    total_files: usize,
    files_processed: usize,
    page_count: usize,
    succeeded_files: Vec<String>,
    failed_files: Vec<FileFailure>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    duration: Duration,
    error_message: Option<String>,
    error_detail: Option<String>,
}

impl MergeResult {
    pub fn success(
        output_path: PathBuf,
        page_count: usize,
        ledger: MergeLedger,
        duration: Duration,
    ) -> Self {
        Self {
            success: true,
            output_file_name: Some(file_name_of(&output_path)),
            output_path: Some(output_path),
            total_files: ledger.total_requested,
            files_processed: ledger.succeeded.len(),
            page_count,
            succeeded_files: ledger.succeeded,
            failed_files: ledger.failed,
            duration,
            error_message: None,
            error_detail: None,
        }
    }

    /// Failed merge; the ledger collected so far is kept.
    pub fn error(err: &ConvertError, ledger: MergeLedger, duration: Duration) -> Self {
        Self {
            success: false,
            output_path: None,
            output_file_name: None,
            total_files: ledger.total_requested,
            files_processed: 0,
            page_count: 0,
            succeeded_files: ledger.succeeded,
            failed_files: ledger.failed,
            duration,
            error_message: Some(err.title().to_string()),
            error_detail: Some(err.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn output_file_name(&self) -> Option<&str> {
        self.output_file_name.as_deref()
    }

    pub fn total_files(&self) -> usize {
        self.total_files
    }

    pub fn files_processed(&self) -> usize {
        self.files_processed
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn succeeded_files(&self) -> &[String] {
        &self.succeeded_files
    }

    pub fn failed_files(&self) -> &[FileFailure] {
        &self.failed_files
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationFailure;

    #[test]
    fn conversion_error_splits_title_and_detail() {
        let err = ConvertError::from(ValidationFailure::Locked);
        let r = ConversionResult::error(&err, Duration::from_millis(3));
        assert!(!r.is_success());
        assert_eq!(r.error_message(), Some("File validation failed"));
        assert_eq!(r.error_detail(), Some("File is locked or in use by another process"));
        assert_eq!(r.output_path(), None);
    }

    #[test]
    fn conversion_success_derives_file_name() {
        let r = ConversionResult::success(PathBuf::from("/out/report.pdf"), 1234, Duration::from_millis(7));
        assert_eq!(r.output_file_name(), Some("report.pdf"));
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["duration_ms"], 7);
        assert_eq!(json["size_bytes"], 1234);
    }

    #[test]
    fn byte_result_serializes_base64() {
        let r = ByteConversionResult::success(b"%PDF".to_vec(), "x.pdf".into(), ".pdf".into(), Duration::ZERO);
        assert_eq!(r.size_bytes(), 4);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["pdf_bytes"], "JVBERg==");
        assert_eq!(json["detected_type"], ".pdf");
    }

    #[test]
    fn ledger_accounting() {
        let mut ledger = MergeLedger::new(3);
        ledger.record_success("a.pdf");
        ledger.record_success("b.docx");
        assert!(!ledger.is_complete());
        ledger.record_failure("missing.txt", "File not found: missing.txt");
        assert!(ledger.is_complete());

        let r = MergeResult::success(PathBuf::from("/out/mergePDF_1.pdf"), 4, ledger, Duration::ZERO);
        assert_eq!(r.total_files(), 3);
        assert_eq!(r.files_processed(), 2);
        assert_eq!(r.succeeded_files(), ["a.pdf", "b.docx"]);
        assert_eq!(r.failed_files()[0].file_name, "missing.txt");
    }

    #[test]
    fn merge_error_keeps_failures() {
        let mut ledger = MergeLedger::new(1);
        ledger.record_failure("x.exe", "File extension not allowed. Allowed extensions: .pdf");
        let r = MergeResult::error(&ConvertError::AllItemsFailed { failed: 1 }, ledger, Duration::ZERO);
        assert!(!r.is_success());
        assert_eq!(r.failed_files().len(), 1);
        assert_eq!(r.error_message(), Some("No files were successfully prepared for merging"));
    }
}
