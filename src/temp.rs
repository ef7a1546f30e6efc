//! Temporary artifacts owned by a single request.
//!
//! Every intermediate file the engine creates (staged uploads, byte-array
//! inputs, rendered merge items, HTML fallbacks) is a [`TempArtifact`]. The
//! artifact deletes its file when dropped, so early returns, `?` and task
//! cancellation all clean up the same way. [`TempSpace`] hands out
//! artifacts inside the configured temp directory and counts the ones
//! still alive.

use crate::error::ConvertError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Factory for [`TempArtifact`]s rooted in one directory.
#[derive(Debug, Clone)]
pub struct TempSpace {
    dir: PathBuf,
    live: Arc<AtomicUsize>,
}

impl TempSpace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of artifacts created and not yet released.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Create an empty file with a unique name `<prefix><random><suffix>`.
    pub fn create(&self, prefix: &str, suffix: &str) -> Result<TempArtifact, ConvertError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            ConvertError::io(
                format!("Failed to create temp directory '{}'", self.dir.display()),
                e,
            )
        })?;

        let path = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&self.dir)
            .map_err(|e| ConvertError::io("Failed to create temp file", e))?
            .into_temp_path()
            .keep()
            .map_err(|e| ConvertError::io("Failed to keep temp file", e.error))?;

        self.live.fetch_add(1, Ordering::SeqCst);
        debug!("Temp artifact created: {}", path.display());
        Ok(TempArtifact {
            path,
            live: Arc::clone(&self.live),
            released: false,
        })
    }

    /// Create an artifact and fill it with `bytes`.
    pub fn write(
        &self,
        prefix: &str,
        suffix: &str,
        bytes: &[u8],
    ) -> Result<TempArtifact, ConvertError> {
        let artifact = self.create(prefix, suffix)?;
        std::fs::write(artifact.path(), bytes).map_err(|e| {
            ConvertError::io(
                format!("Failed to write temp file '{}'", artifact.path().display()),
                e,
            )
        })?;
        Ok(artifact)
    }
}

/// A file path owned by exactly one request; deleted on drop.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    live: Arc<AtomicUsize>,
    released: bool,
}

impl TempArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now. Failures are logged, never returned.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.live.fetch_sub(1, Ordering::SeqCst);

        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Temp artifact removed: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove temp artifact {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        self.remove();
    }
}
