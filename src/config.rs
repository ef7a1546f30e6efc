//! Engine configuration.
//!
//! All engine behaviour is controlled through [`EngineConfig`], built via
//! [`EngineConfig::builder()`] or loaded from a JSON file with
//! [`EngineConfig::from_json_file`]. Missing JSON keys fall back to the
//! defaults documented on each field.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Extensions accepted by default: 21 Office, 12 image, 2 markup, 4 text,
/// PDF, and 3 print formats.
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 43] = [
    // Office
    ".doc", ".docx", ".docm", ".dot", ".dotx", ".dotm",
    ".xls", ".xlsx", ".xlsm", ".xlt", ".xltx", ".xltm",
    ".ppt", ".pptx", ".pptm", ".pot", ".potx", ".potm", ".pps", ".ppsx", ".ppsm",
    // Images
    ".jpg", ".jpeg", ".png", ".bmp", ".gif", ".tif", ".tiff", ".webp",
    ".svg", ".emf", ".wmf", ".eps",
    // Markup
    ".html", ".htm",
    // Text
    ".txt", ".rtf", ".xml", ".md",
    // PDF
    ".pdf",
    // Other
    ".xps", ".oxps", ".pcl",
];

/// Configuration for a conversion engine.
///
/// # Example
/// ```rust
/// use pdfconv::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .input_dir("/srv/pdf/in")
///     .output_dir("/srv/pdf/out")
///     .max_file_size_mb(20)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_file_size_mb, 20);
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory for path-based inputs. Strict validation rejects
    /// anything outside it. Default: `./input`.
    pub input_dir: PathBuf,

    /// Where converted and merged PDFs are written. Default: `./output`.
    pub output_dir: PathBuf,

    /// Directory for per-request temp artifacts. Default: `<system temp>/pdfconv`.
    pub temp_dir: PathBuf,

    /// Dot-prefixed, lower-case extensions accepted by validation.
    pub allowed_extensions: Vec<String>,

    /// Size ceiling in megabytes. Default: 50.
    pub max_file_size_mb: u64,

    /// Licence key handed to backends that need one. Never logged.
    pub license_key: Option<String>,

    /// Path of the HTML rendering executable (`wkhtmltopdf`-compatible).
    /// If None, `wkhtmltopdf` is looked up on `PATH`.
    pub html_module_path: Option<PathBuf>,

    /// Office converter command. Default: `soffice`.
    pub office_command: String,

    /// Explicit libpdfium location (file or directory).
    pub pdfium_library_path: Option<PathBuf>,

    /// Allow fetching libpdfium when no local copy is found. Default: true.
    pub allow_pdfium_download: bool,

    /// Timeout for URL downloads in seconds. Default: 30.
    pub download_timeout_secs: u64,

    /// Number of merge items prepared concurrently. Default: 4.
    pub merge_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            temp_dir: std::env::temp_dir().join("pdfconv"),
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            max_file_size_mb: 50,
            license_key: None,
            html_module_path: None,
            office_command: "soffice".to_string(),
            pdfium_library_path: None,
            allow_pdfium_download: true,
            download_timeout_secs: 30,
            merge_concurrency: 4,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir)
            .field("temp_dir", &self.temp_dir)
            .field("allowed_extensions", &self.allowed_extensions.len())
            .field("max_file_size_mb", &self.max_file_size_mb)
            .field("license_key", &self.license_key.as_ref().map(|_| "<redacted>"))
            .field("html_module_path", &self.html_module_path)
            .field("office_command", &self.office_command)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("allow_pdfium_download", &self.allow_pdfium_download)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("merge_concurrency", &self.merge_concurrency)
            .finish()
    }
}

impl EngineConfig {
    /// Create a new builder for `EngineConfig`.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Reopen a configuration for overrides, e.g. CLI flags on top of a
    /// JSON file.
    pub fn into_builder(self) -> EngineConfigBuilder {
        EngineConfigBuilder { config: self }
    }

    /// Load a configuration from a JSON file. Missing keys take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::io(format!("Failed to read config '{}'", path.display()), e)
        })?;
        let config: EngineConfig = serde_json::from_str(&raw).map_err(|e| {
            ConvertError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        config.validated()
    }

    /// Whether `extension` (dot-prefixed, any case) is on the allow-list.
    pub fn is_allowed(&self, extension: &str) -> bool {
        let ext = extension.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|a| *a == ext)
    }

    /// Allow-list joined for reason strings.
    pub fn allowed_list(&self) -> String {
        self.allowed_extensions.join(", ")
    }

    /// Size ceiling in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    /// Create the input, output and temp directories if they are missing.
    pub fn ensure_directories(&self) -> Result<(), ConvertError> {
        for dir in [&self.input_dir, &self.output_dir, &self.temp_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                ConvertError::io(format!("Failed to create directory '{}'", dir.display()), e)
            })?;
        }
        Ok(())
    }

    fn validated(mut self) -> Result<Self, ConvertError> {
        self.allowed_extensions = self
            .allowed_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| e.len() > 1)
            .collect();

        if self.allowed_extensions.is_empty() {
            return Err(ConvertError::InvalidConfig(
                "allowed_extensions must not be empty".into(),
            ));
        }
        if self.max_file_size_mb == 0 {
            return Err(ConvertError::InvalidConfig(
                "max_file_size_mb must be ≥ 1".into(),
            ));
        }
        if self.merge_concurrency == 0 {
            return Err(ConvertError::InvalidConfig(
                "merge_concurrency must be ≥ 1".into(),
            ));
        }
        if self.download_timeout_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "download_timeout_secs must be ≥ 1".into(),
            ));
        }
        if self.office_command.trim().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "office_command must not be empty".into(),
            ));
        }
        Ok(self)
    }
}

/// Lower-case and dot-prefix an extension (`"PDF"` → `".pdf"`).
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.');
    format!(".{}", trimmed.to_ascii_lowercase())
}

/// Builder for [`EngineConfig`].
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = dir.into();
        self
    }

    pub fn allowed_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_extensions = exts.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.max_file_size_mb = mb;
        self
    }

    pub fn license_key(mut self, key: impl Into<String>) -> Self {
        self.config.license_key = Some(key.into());
        self
    }

    pub fn html_module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.html_module_path = Some(path.into());
        self
    }

    pub fn office_command(mut self, cmd: impl Into<String>) -> Self {
        self.config.office_command = cmd.into();
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn allow_pdfium_download(mut self, v: bool) -> Self {
        self.config.allow_pdfium_download = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn merge_concurrency(mut self, n: usize) -> Self {
        self.config.merge_concurrency = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EngineConfig, ConvertError> {
        self.config.validated()
    }
}
