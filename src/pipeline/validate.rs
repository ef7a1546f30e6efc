//! Input validation.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. the path is an existing regular file
//! 2. (strict only) its canonical form lies inside the input root
//! 3. its extension is on the allow-list
//! 4. its size is within `max_file_size_mb`
//! 5. it can be opened for reading
//!
//! Staged uploads live in the temp directory, not the input root, so they
//! go through the relaxed variant that skips step 2.

use crate::config::{normalize_extension, EngineConfig};
use crate::error::ValidationFailure;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Result of one validation call. Never cached.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationOutcome {
    failure: Option<ValidationFailure>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self { failure: None }
    }

    pub fn invalid(failure: ValidationFailure) -> Self {
        Self {
            failure: Some(failure),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.failure.is_none()
    }

    /// User-facing reason, `None` when valid.
    pub fn reason(&self) -> Option<String> {
        self.failure.as_ref().map(|f| f.to_string())
    }

    pub fn failure(&self) -> Option<&ValidationFailure> {
        self.failure.as_ref()
    }

    pub fn into_result(self) -> Result<(), ValidationFailure> {
        match self.failure {
            None => Ok(()),
            Some(f) => Err(f),
        }
    }
}

impl Serialize for ValidationOutcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("ValidationOutcome", 2)?;
        s.serialize_field("valid", &self.is_valid())?;
        s.serialize_field("reason", &self.reason())?;
        s.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Path-based inputs: containment enforced.
    Strict,
    /// Engine-staged uploads: containment skipped.
    Relaxed,
}

/// Strict validation for caller-named paths.
pub fn validate_strict(path: &Path, config: &EngineConfig) -> ValidationOutcome {
    validate(path, config, Mode::Strict)
}

/// Relaxed validation for files the engine staged itself.
pub fn validate_relaxed(path: &Path, config: &EngineConfig) -> ValidationOutcome {
    validate(path, config, Mode::Relaxed)
}

pub fn validate(path: &Path, config: &EngineConfig, mode: Mode) -> ValidationOutcome {
    match run_checks(path, config, mode) {
        Ok(()) => {
            debug!("Validation passed: {}", path.display());
            ValidationOutcome::valid()
        }
        Err(failure) => {
            warn!("Validation failed for {}: {}", path.display(), failure);
            ValidationOutcome::invalid(failure)
        }
    }
}

fn run_checks(path: &Path, config: &EngineConfig, mode: Mode) -> Result<(), ValidationFailure> {
    let not_found = || ValidationFailure::NotFound {
        path: path.display().to_string(),
    };

    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(ValidationFailure::Unreadable(e.to_string())),
    };
    if !meta.is_file() {
        return Err(not_found());
    }

    if mode == Mode::Strict && !is_within(path, &config.input_dir) {
        return Err(ValidationFailure::OutsideRoot {
            root: config.input_dir.display().to_string(),
        });
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(normalize_extension)
        .unwrap_or_default();
    if !config.is_allowed(&ext) {
        return Err(ValidationFailure::DisallowedExtension {
            allowed: config.allowed_list(),
        });
    }

    if meta.len() > config.max_file_size_bytes() {
        return Err(ValidationFailure::TooLarge {
            size_mb: meta.len() as f64 / (1024.0 * 1024.0),
            max_mb: config.max_file_size_mb,
        });
    }

    std::fs::File::open(path).map_err(|_| ValidationFailure::Locked)?;
    Ok(())
}

/// Component-wise, case-insensitive prefix test on canonical paths.
pub fn is_within(path: &Path, root: &Path) -> bool {
    let Ok(path) = path.canonicalize() else {
        return false;
    };
    let root = canonical_or_absolute(root);

    let mut path_parts = path.components();
    for root_part in root.components() {
        match path_parts.next() {
            Some(p) if component_eq(p, root_part) => {}
            _ => return false,
        }
    }
    true
}

fn canonical_or_absolute(p: &Path) -> PathBuf {
    p.canonicalize()
        .or_else(|_| std::path::absolute(p))
        .unwrap_or_else(|_| p.to_path_buf())
}

fn component_eq(a: Component<'_>, b: Component<'_>) -> bool {
    a.as_os_str()
        .to_string_lossy()
        .eq_ignore_ascii_case(&b.as_os_str().to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup() -> (tempfile::TempDir, EngineConfig) {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("input");
        fs::create_dir_all(&input).unwrap();
        let config = EngineConfig::builder()
            .input_dir(&input)
            .output_dir(root.path().join("output"))
            .temp_dir(root.path().join("tmp"))
            .max_file_size_mb(1)
            .build()
            .unwrap();
        (root, config)
    }

    #[test]
    fn accepts_small_allowed_file_inside_root() {
        let (_root, config) = setup();
        let file = config.input_dir.join("a.docx");
        fs::write(&file, b"PK\x03\x04").unwrap();

        let outcome = validate_strict(&file, &config);
        assert!(outcome.is_valid());
        assert_eq!(outcome.reason(), None);
    }

    #[test]
    fn missing_file() {
        let (_root, config) = setup();
        let file = config.input_dir.join("missing.txt");
        let outcome = validate_strict(&file, &config);
        assert_eq!(
            outcome.reason().unwrap(),
            format!("File not found: {}", file.display())
        );
    }

    #[test]
    fn directory_counts_as_missing() {
        let (_root, config) = setup();
        let dir = config.input_dir.join("sub.pdf");
        fs::create_dir_all(&dir).unwrap();
        assert!(matches!(
            validate_strict(&dir, &config).failure(),
            Some(ValidationFailure::NotFound { .. })
        ));
    }

    #[test]
    fn outside_root_wins_over_extension_and_size() {
        let (root, config) = setup();
        let outside = root.path().join("evil.exe");
        fs::write(&outside, vec![0u8; 2 * 1024 * 1024]).unwrap();

        let outcome = validate_strict(&outside, &config);
        assert_eq!(
            outcome.reason().unwrap(),
            format!(
                "File must be within the allowed directory: {}",
                config.input_dir.display()
            )
        );

        // Relaxed mode skips containment and reports the next check.
        let relaxed = validate_relaxed(&outside, &config);
        assert!(matches!(
            relaxed.failure(),
            Some(ValidationFailure::DisallowedExtension { .. })
        ));
    }

    #[test]
    fn dot_dot_escape_is_rejected() {
        let (root, config) = setup();
        fs::write(root.path().join("secret.pdf"), b"%PDF").unwrap();
        let sneaky = config.input_dir.join("..").join("secret.pdf");
        assert!(matches!(
            validate_strict(&sneaky, &config).failure(),
            Some(ValidationFailure::OutsideRoot { .. })
        ));
    }

    #[test]
    fn sibling_with_common_prefix_is_outside() {
        let (root, config) = setup();
        let sibling = root.path().join("input2");
        fs::create_dir_all(&sibling).unwrap();
        let file = sibling.join("a.pdf");
        fs::write(&file, b"%PDF").unwrap();
        assert!(!is_within(&file, &config.input_dir));
    }

    #[test]
    fn disallowed_extension_lists_allow_list() {
        let (_root, config) = setup();
        let file = config.input_dir.join("tool.exe");
        fs::write(&file, b"MZ").unwrap();
        let reason = validate_strict(&file, &config).reason().unwrap();
        assert!(reason.starts_with("File extension not allowed. Allowed extensions: .doc, .docx"));
    }

    #[test]
    fn oversized_file() {
        let (_root, config) = setup();
        let file = config.input_dir.join("big.pdf");
        fs::write(&file, vec![0u8; 1024 * 1024 + 1]).unwrap();
        assert_eq!(
            validate_strict(&file, &config).reason().unwrap(),
            "File size too large (1.00MB). Maximum allowed: 1MB"
        );
    }

    #[test]
    fn serializes_as_valid_and_reason() {
        let json = serde_json::to_value(ValidationOutcome::invalid(ValidationFailure::Locked)).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["reason"], "File is locked or in use by another process");
    }
}
