//! # pdfium-loader
//!
//! Finds a usable PDFium shared library for the `pdfconv` rendering backend
//! and binds `pdfium-render` to it.
//!
//! ## Resolution order
//!
//! 1. An explicit path handed to [`resolve_library`] (from the engine
//!    configuration). A directory is searched for the platform library name.
//! 2. `PDFIUM_LIB_PATH`, when it points to an existing file.
//! 3. The per-version cache directory (see [`cache_dir`]).
//! 4. A download of the platform archive from
//!    [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries),
//!    extracted into the cache directory. Skipped when downloads are disabled.
//!
//! Binding happens once per process in practice: the engine guards the call
//! behind its readiness gate.

use std::io::Read;
use std::path::{Path, PathBuf};

use pdfium_render::prelude::Pdfium;
use thiserror::Error;
use tracing::{debug, info, warn};

/// The pdfium-binaries release tag used for downloads.
pub const PDFIUM_VERSION: &str = "7690";

const BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

/// Errors returned while locating or binding PDFium.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// The current OS/architecture combination has no published binary.
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    /// Nothing usable was found and downloading is disabled.
    #[error(
        "PDFium library not found (looked in: {searched}).\n\
Set PDFIUM_LIB_PATH or `pdfium_library_path` to an existing libpdfium, \
or enable automatic download."
    )]
    NotFound { searched: String },

    /// Could not create the local cache directory.
    #[error("Cache directory error: {0}")]
    CacheDir(#[source] std::io::Error),

    /// Network download failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// gzip/tar extraction failed.
    #[error("Archive extraction failed: {0}")]
    Extract(String),

    /// `pdfium-render` could not load the library.
    #[error("Failed to bind PDFium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },
}

struct Platform {
    archive_name: &'static str,
    lib_path_in_archive: &'static str,
    lib_name: &'static str,
}

fn detect_platform() -> Result<Platform, LoaderError> {
    let unix = |archive_name, lib_name: &'static str, in_archive| Platform {
        archive_name,
        lib_path_in_archive: in_archive,
        lib_name,
    };

    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("macos", "aarch64") => Ok(unix("pdfium-mac-arm64.tgz", "libpdfium.dylib", "lib/libpdfium.dylib")),
        ("macos", "x86_64") => Ok(unix("pdfium-mac-x64.tgz", "libpdfium.dylib", "lib/libpdfium.dylib")),
        ("linux", "x86_64") => Ok(unix("pdfium-linux-x64.tgz", "libpdfium.so", "lib/libpdfium.so")),
        ("linux", "aarch64") => Ok(unix("pdfium-linux-arm64.tgz", "libpdfium.so", "lib/libpdfium.so")),
        ("windows", "x86_64") => Ok(unix("pdfium-win-x64.tgz", "pdfium.dll", "bin/pdfium.dll")),
        ("windows", "aarch64") => Ok(unix("pdfium-win-arm64.tgz", "pdfium.dll", "bin/pdfium.dll")),
        (os, arch) => Err(LoaderError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        }),
    }
}

/// Platform file name of the PDFium shared library (`libpdfium.so`, …).
pub fn library_file_name() -> Result<&'static str, LoaderError> {
    detect_platform().map(|p| p.lib_name)
}

/// Per-version cache directory for the downloaded library.
///
/// `PDFCONV_PDFIUM_CACHE` overrides the base directory; otherwise the
/// platform cache dir (`~/.cache` on Linux) is used.
pub fn cache_dir() -> PathBuf {
    let base = std::env::var_os("PDFCONV_PDFIUM_CACHE")
        .map(PathBuf::from)
        .or_else(|| dirs::cache_dir().map(|d| d.join("pdfconv")))
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache").join("pdfconv")))
        .unwrap_or_else(|| std::env::temp_dir().join("pdfconv"));

    base.join(format!("pdfium-{PDFIUM_VERSION}"))
}

/// Returns the path of a usable PDFium library, downloading it into the
/// cache when `allow_download` is set and nothing local was found.
pub fn resolve_library(
    configured: Option<&Path>,
    allow_download: bool,
) -> Result<PathBuf, LoaderError> {
    let platform = detect_platform()?;
    let mut searched = Vec::new();

    if let Some(path) = configured {
        let candidate = if path.is_dir() {
            path.join(platform.lib_name)
        } else {
            path.to_path_buf()
        };
        if candidate.is_file() {
            debug!("Using configured PDFium library: {}", candidate.display());
            return Ok(candidate);
        }
        warn!("Configured PDFium library not found: {}", candidate.display());
        searched.push(candidate);
    }

    if let Some(env_path) = std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from) {
        if env_path.is_file() {
            debug!("Using PDFIUM_LIB_PATH: {}", env_path.display());
            return Ok(env_path);
        }
        searched.push(env_path);
    }

    let cache = cache_dir();
    let cached = cache.join(platform.lib_name);
    if cached.is_file() {
        return Ok(cached);
    }
    searched.push(cached.clone());

    if !allow_download {
        return Err(LoaderError::NotFound {
            searched: searched
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    let url = format!(
        "{}/chromium%2F{}/{}",
        BASE_URL, PDFIUM_VERSION, platform.archive_name
    );
    info!("Downloading PDFium {} from {}", PDFIUM_VERSION, url);

    std::fs::create_dir_all(&cache).map_err(LoaderError::CacheDir)?;
    let archive = download_bytes(&url)?;
    extract_entry(&archive, platform.lib_path_in_archive, &cached)?;

    info!("PDFium cached at {}", cached.display());
    Ok(cached)
}

/// Binds `pdfium-render` to the library at `path`.
pub fn bind(path: &Path) -> Result<Pdfium, LoaderError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| LoaderError::Bind {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn download_bytes(url: &str) -> Result<Vec<u8>, LoaderError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pdfium-loader/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| LoaderError::Download(e.to_string()))?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| LoaderError::Download(format!("GET {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(LoaderError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let mut buf = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
    response
        .read_to_end(&mut buf)
        .map_err(|e| LoaderError::Download(format!("Read error: {e}")))?;
    Ok(buf)
}

fn extract_entry(archive_bytes: &[u8], entry_name: &str, dest: &Path) -> Result<(), LoaderError> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let mut archive = Archive::new(GzDecoder::new(archive_bytes));
    let entries = archive
        .entries()
        .map_err(|e| LoaderError::Extract(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| LoaderError::Extract(e.to_string()))?;
        let matches = entry
            .path()
            .map_err(|e| LoaderError::Extract(e.to_string()))?
            .to_string_lossy()
            == entry_name;
        if matches {
            entry
                .unpack(dest)
                .map_err(|e| LoaderError::Extract(format!("Unpack failed: {e}")))?;
            return Ok(());
        }
    }

    Err(LoaderError::Extract(format!(
        "'{entry_name}' not found in archive"
    )))
}
