//! Error types for the pdfconv library.
//!
//! Three layers, each with its own enum:
//!
//! * [`ValidationFailure`]: why an input file was rejected. Carried inside a
//!   [`crate::pipeline::validate::ValidationOutcome`] and recorded per item in
//!   merge ledgers.
//!
//! * [`BackendError`]: the rendering backend could not do what was asked
//!   (not initialised, a helper program is missing, rendering failed).
//!
//! * [`ConvertError`]: every reason a single conversion request fails.
//!   Engine entry points never return it directly; it is folded into the
//!   `error_message` / `error_detail` pair of the result objects in
//!   [`crate::output`].

use std::path::PathBuf;
use thiserror::Error;

/// Why a file did not pass validation.
///
/// The `Display` strings are the user-facing reason strings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationFailure {
    /// Path does not exist or is not a regular file.
    #[error("File not found: {path}")]
    NotFound { path: String },

    /// Strict mode only: the canonical path escapes the input root.
    #[error("File must be within the allowed directory: {root}")]
    OutsideRoot { root: String },

    /// Extension missing from the configured allow-list.
    #[error("File extension not allowed. Allowed extensions: {allowed}")]
    DisallowedExtension { allowed: String },

    /// File exceeds `max_file_size_mb`.
    #[error("File size too large ({size_mb:.2}MB). Maximum allowed: {max_mb}MB")]
    TooLarge { size_mb: f64, max_mb: u64 },

    /// The file could not be opened for reading.
    #[error("File is locked or in use by another process")]
    Locked,

    /// Metadata could not be read at all.
    #[error("Validation error: {0}")]
    Unreadable(String),
}

/// Failures raised by a [`crate::backend::RenderingBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Rendering backend used before initialisation")]
    NotInitialized,

    #[error("Rendering backend initialisation failed: {0}")]
    InitializationFailed(String),

    /// A helper program the backend shells out to is not installed.
    #[error("{module} is not available.\n{hint}")]
    ModuleMissing { module: String, hint: String },

    #[error("Rendering failed: {0}")]
    Rendering(String),

    #[error("Page {index} is out of range (document has {total} pages)")]
    PageOutOfRange { index: usize, total: usize },

    #[error("Backend I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Every reason a conversion or merge request can fail.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    #[error("{0}")]
    Validation(#[from] ValidationFailure),

    #[error("Could not detect file type. Provide the original file name as a hint.")]
    UndetectableType,

    #[error("File type '{extension}' is not supported. Allowed extensions: {allowed}")]
    UnsupportedType { extension: String, allowed: String },

    #[error("No file provided")]
    EmptyUpload,

    #[error("No files provided for merging")]
    NothingToMerge,

    #[error("No files were successfully prepared for merging ({failed} failed)")]
    AllItemsFailed { failed: usize },

    // ── Backend errors ────────────────────────────────────────────────────
    #[error(transparent)]
    Backend(#[from] BackendError),

    // ── Network errors ────────────────────────────────────────────────────
    #[error("Invalid URL '{url}': only http and https URLs are accepted")]
    InvalidUrl { url: String },

    #[error("HTTP Status: {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("Network error: {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    #[error("Network error: download of '{url}' timed out after {secs}s")]
    DownloadTimeout { url: String, secs: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Wraps an I/O error with a short description of what was attempted.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ConvertError::Io {
            context: context.into(),
            source,
        }
    }

    /// Short title reported as a result's `error_message`.
    ///
    /// The full `Display` text becomes `error_detail`.
    pub fn title(&self) -> &'static str {
        match self {
            ConvertError::Validation(_) => "File validation failed",
            ConvertError::UndetectableType => "Could not detect file type",
            ConvertError::UnsupportedType { .. } => "File type not supported",
            ConvertError::EmptyUpload => "No file provided",
            ConvertError::NothingToMerge => "No files provided for merging",
            ConvertError::AllItemsFailed { .. } => {
                "No files were successfully prepared for merging"
            }
            ConvertError::Backend(BackendError::ModuleMissing { .. }) => {
                "Required rendering module is missing"
            }
            ConvertError::Backend(BackendError::NotInitialized)
            | ConvertError::Backend(BackendError::InitializationFailed(_)) => {
                "Rendering backend is not available"
            }
            ConvertError::Backend(_) => "File conversion failed",
            ConvertError::InvalidUrl { .. } => "Invalid URL",
            ConvertError::DownloadStatus { .. }
            | ConvertError::DownloadFailed { .. }
            | ConvertError::DownloadTimeout { .. } => "Failed to download HTML from URL",
            ConvertError::Io { .. } => "File system error",
            ConvertError::InvalidConfig(_) => "Invalid configuration",
            ConvertError::Internal(_) => "Internal error",
        }
    }

    /// Returns true for failures caused by the caller's input rather than
    /// the environment.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ConvertError::Validation(_)
                | ConvertError::UndetectableType
                | ConvertError::UnsupportedType { .. }
                | ConvertError::EmptyUpload
                | ConvertError::NothingToMerge
                | ConvertError::InvalidUrl { .. }
        )
    }
}

impl From<pdfium_loader::LoaderError> for BackendError {
    fn from(e: pdfium_loader::LoaderError) -> Self {
        BackendError::InitializationFailed(e.to_string())
    }
}
