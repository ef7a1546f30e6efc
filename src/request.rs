//! Request and outcome envelopes for [`crate::Converter::execute`].

use crate::output::{ByteConversionResult, ConversionResult, MergeResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One conversion job. `output_base` overrides the output file stem.
#[derive(Debug, Clone)]
pub enum ConversionRequest {
    /// A file the caller names; validated strictly against the input root.
    Path {
        path: PathBuf,
        output_base: Option<String>,
    },
    /// A file the host already staged; containment is not enforced.
    StagedUpload {
        path: PathBuf,
        output_base: Option<String>,
    },
    /// Uploaded content plus its original file name.
    Upload {
        file_name: String,
        bytes: Vec<u8>,
        output_base: Option<String>,
    },
    /// An `http`/`https` page to download and render.
    Url {
        url: String,
        output_base: Option<String>,
    },
    /// Raw bytes, type sniffed from content. The PDF comes back in memory.
    Bytes {
        bytes: Vec<u8>,
        file_name_hint: Option<String>,
        output_base: Option<String>,
    },
    /// Several input-root files combined into one PDF.
    Merge {
        file_names: Vec<String>,
        output_base: Option<String>,
    },
}

impl ConversionRequest {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionRequest::Path { .. } => "path",
            ConversionRequest::StagedUpload { .. } => "staged-upload",
            ConversionRequest::Upload { .. } => "upload",
            ConversionRequest::Url { .. } => "url",
            ConversionRequest::Bytes { .. } => "bytes",
            ConversionRequest::Merge { .. } => "merge",
        }
    }
}

/// The result of [`crate::Converter::execute`], shaped by request kind.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ConversionOutcome {
    Stored(ConversionResult),
    Bytes(ByteConversionResult),
    Merged(MergeResult),
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            ConversionOutcome::Stored(r) => r.is_success(),
            ConversionOutcome::Bytes(r) => r.is_success(),
            ConversionOutcome::Merged(r) => r.is_success(),
        }
    }

    /// Where the PDF was stored. `None` for failures and byte conversions.
    pub fn output_path(&self) -> Option<&Path> {
        match self {
            ConversionOutcome::Stored(r) => r.output_path(),
            ConversionOutcome::Bytes(_) => None,
            ConversionOutcome::Merged(r) => r.output_path(),
        }
    }

    /// `(title, detail)` when the conversion failed.
    pub fn error(&self) -> Option<(&str, &str)> {
        let (title, detail) = match self {
            ConversionOutcome::Stored(r) => (r.error_message(), r.error_detail()),
            ConversionOutcome::Bytes(r) => (r.error_message(), r.error_detail()),
            ConversionOutcome::Merged(r) => (r.error_message(), r.error_detail()),
        };
        Some((title?, detail.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;
    use std::time::Duration;

    #[test]
    fn outcome_serializes_without_tag() {
        let outcome = ConversionOutcome::Stored(ConversionResult::success(
            PathBuf::from("/out/a.pdf"),
            10,
            Duration::ZERO,
        ));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["output_file_name"], "a.pdf");
        assert!(outcome.error().is_none());
        assert_eq!(outcome.output_path(), Some(Path::new("/out/a.pdf")));
    }

    #[test]
    fn outcome_error_pair() {
        let outcome = ConversionOutcome::Bytes(ByteConversionResult::error(
            &ConvertError::UndetectableType,
            None,
            Duration::ZERO,
        ));
        let (title, detail) = outcome.error().unwrap();
        assert!(!outcome.is_success());
        assert!(!title.is_empty());
        assert!(detail.starts_with("Could not detect file type"));
        assert!(outcome.output_path().is_none());
    }

    #[test]
    fn kinds() {
        let req = ConversionRequest::Url {
            url: "https://example.com".into(),
            output_base: None,
        };
        assert_eq!(req.kind(), "url");
    }
}
