//! Conversion entry points.
//!
//! [`Converter`] owns the configuration, the rendering backend, its
//! readiness gate and the temp space. Every public method returns a result
//! object rather than `Err`: failures are folded into `error_message` (a
//! short title) and `error_detail` (the full reason).
//!
//! ## Threading
//!
//! Validation, file I/O and backend calls block, so each request runs its
//! blocking part inside one `tokio::task::spawn_blocking` closure. Temp
//! artifacts are created and dropped inside that closure: if the caller
//! drops the request future, the task still runs to completion and its
//! artifacts are deleted when it returns.

use crate::backend::{PdfiumBackend, ReadyGate, RenderingBackend};
use crate::config::{normalize_extension, EngineConfig};
use crate::error::{BackendError, ConvertError, ValidationFailure};
use crate::output::{ByteConversionResult, ConversionResult};
use crate::pipeline::classify::{classify, classify_path, ConversionCategory};
use crate::pipeline::validate::{self, Mode, ValidationOutcome};
use crate::pipeline::{download, markup, paths, sniff};
use crate::request::{ConversionOutcome, ConversionRequest};
use crate::temp::TempSpace;
use chrono::Local;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Shared state behind a [`Converter`].
pub(crate) struct Engine<B> {
    pub(crate) config: EngineConfig,
    pub(crate) backend: B,
    pub(crate) temp: TempSpace,
    gate: ReadyGate,
}

impl<B: RenderingBackend> Engine<B> {
    /// Run `f` on the blocking pool with access to the engine.
    pub(crate) async fn blocking<T, F>(self: &Arc<Self>, what: &str, f: F) -> Result<T, ConvertError>
    where
        T: Send + 'static,
        F: FnOnce(&Engine<B>) -> Result<T, ConvertError> + Send + 'static,
    {
        let engine = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&engine))
            .await
            .map_err(|e| ConvertError::Internal(format!("{} task panicked: {}", what, e)))?
    }

    fn ensure_ready(&self) -> Result<(), ConvertError> {
        self.gate.ensure(|| {
            info!("Initializing {} backend", self.backend.name());
            self.backend.initialize(self.config.license_key.as_deref())
        })?;
        Ok(())
    }

    /// Relative names are looked up inside the input root.
    pub(crate) fn resolve_input(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.input_dir.join(path)
        }
    }

    fn convert_path(
        &self,
        path: &Path,
        output_base: Option<&str>,
        mode: Mode,
    ) -> Result<(PathBuf, u64), ConvertError> {
        validate::validate(path, &self.config, mode).into_result()?;

        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = paths::resolve_output_path(output_base, &source_name, &self.config.output_dir);
        self.render_stored(path, classify_path(path), &target)
    }

    fn render_stored(
        &self,
        source: &Path,
        category: ConversionCategory,
        target: &Path,
    ) -> Result<(PathBuf, u64), ConvertError> {
        render_to_pdf(&self.backend, &self.temp, source, category, target)?;
        let size = std::fs::metadata(target)
            .map_err(|e| ConvertError::io(format!("Failed to stat '{}'", target.display()), e))?
            .len();
        Ok((target.to_path_buf(), size))
    }
}

/// Render `source` as `category` and save the PDF at `target`.
///
/// A failed save removes whatever was written at `target`.
pub fn render_to_pdf<B: RenderingBackend>(
    backend: &B,
    temp: &TempSpace,
    source: &Path,
    category: ConversionCategory,
    target: &Path,
) -> Result<(), ConvertError> {
    debug!("Rendering {} as {:?}", source.display(), category);
    let mut doc = match category {
        ConversionCategory::Office => backend.render_office_to_pdf(source)?,
        ConversionCategory::Markup => render_markup(backend, temp, source)?,
        ConversionCategory::Image | ConversionCategory::PdfNative | ConversionCategory::Generic => {
            backend.render_generic_to_pdf(source)?
        }
    };
    debug!(
        "Rendered {} page(s) from {}",
        backend.page_count(&doc),
        source.display()
    );

    if let Err(e) = backend.save(&mut doc, target, true) {
        remove_partial(target);
        return Err(e.into());
    }
    Ok(())
}

/// In-memory rendering first; on failure the repaired markup is written to
/// a temp `.html` file and rendered by URL. A missing module is final.
fn render_markup<'a, B: RenderingBackend>(
    backend: &'a B,
    temp: &TempSpace,
    source: &Path,
) -> Result<B::Document<'a>, ConvertError> {
    let bytes = std::fs::read(source)
        .map_err(|e| ConvertError::io(format!("Failed to read '{}'", source.display()), e))?;
    let html = markup::prepare(&bytes);

    match backend.render_html_string_to_pdf(&html) {
        Ok(doc) => Ok(doc),
        Err(e @ BackendError::ModuleMissing { .. }) => Err(e.into()),
        Err(e) => {
            warn!("In-memory HTML rendering failed ({}); retrying from a file", e);
            let page = temp.write("html_", ".html", &markup::encode_with_bom(&html))?;
            let absolute = std::path::absolute(page.path())
                .map_err(|e| ConvertError::io("Failed to resolve temp HTML path", e))?;
            let url = Url::from_file_path(&absolute).map_err(|_| {
                ConvertError::Internal(format!("Cannot build a file URL for {}", absolute.display()))
            })?;
            let doc = backend.render_html_url_to_pdf(&url)?;
            page.release();
            Ok(doc)
        }
    }
}

pub(crate) fn remove_partial(target: &Path) {
    match std::fs::remove_file(target) {
        Ok(()) => debug!("Removed partial output {}", target.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", target.display(), e),
    }
}

pub(crate) fn log_failure(what: &str, err: &ConvertError) {
    if err.is_input_error() {
        warn!("{} rejected: {}", what, err);
    } else {
        error!("{} failed: {}: {}", what, err.title(), err);
    }
}

fn byte_output_name(output_base: Option<&str>, file_name_hint: Option<&str>) -> String {
    output_base
        .and_then(paths::sanitize_base)
        .or_else(|| file_name_hint.map(paths::source_stem))
        .map(|stem| format!("{stem}.pdf"))
        .unwrap_or_else(|| "converted.pdf".to_string())
}

/// The conversion engine.
///
/// Cheap to clone; clones share the backend, its readiness state and the
/// temp space.
///
/// ```rust,no_run
/// use pdfconv::{Converter, EngineConfig};
///
/// # async fn run() -> Result<(), pdfconv::ConvertError> {
/// let config = EngineConfig::builder().input_dir("in").output_dir("out").build()?;
/// let converter = Converter::with_pdfium(config)?;
/// let result = converter.convert_file("report.docx", None).await;
/// println!("{:?}", result.output_path());
/// # Ok(())
/// # }
/// ```
pub struct Converter<B: RenderingBackend> {
    pub(crate) engine: Arc<Engine<B>>,
}

impl<B: RenderingBackend> Clone for Converter<B> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl Converter<PdfiumBackend> {
    /// Engine backed by pdfium and the external office / HTML renderers.
    pub fn with_pdfium(config: EngineConfig) -> Result<Self, ConvertError> {
        let backend = PdfiumBackend::from_config(&config);
        Self::new(config, backend)
    }
}

impl<B: RenderingBackend> Converter<B> {
    /// Creates the configured directories. The backend is initialised
    /// lazily by the first request, or eagerly by [`Self::ensure_ready`].
    pub fn new(config: EngineConfig, backend: B) -> Result<Self, ConvertError> {
        config.ensure_directories()?;
        let temp = TempSpace::new(config.temp_dir.clone());
        info!(
            "Engine ready to accept requests (backend: {}, input: {}, output: {})",
            backend.name(),
            config.input_dir.display(),
            config.output_dir.display()
        );
        Ok(Self {
            engine: Arc::new(Engine {
                config,
                backend,
                temp,
                gate: ReadyGate::new(),
            }),
        })
    }

    pub fn backend(&self) -> &B {
        &self.engine.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.engine.config
    }

    pub fn is_ready(&self) -> bool {
        self.engine.gate.is_ready()
    }

    /// Temp artifacts created by this engine and not yet deleted.
    pub fn live_temp_artifacts(&self) -> usize {
        self.engine.temp.live()
    }

    /// Initialise the backend once. Concurrent callers wait for the same
    /// initialisation; a failure is returned and retried on the next call.
    pub async fn ensure_ready(&self) -> Result<(), ConvertError> {
        if self.is_ready() {
            return Ok(());
        }
        self.engine
            .blocking("Initialization", |engine| engine.ensure_ready())
            .await
    }

    /// Strict validation, without converting. Relative paths resolve
    /// against the input root.
    pub async fn validate(&self, path: impl AsRef<Path>) -> ValidationOutcome {
        let path = self.engine.resolve_input(path.as_ref());
        self.engine
            .blocking("Validation", move |engine| {
                Ok(validate::validate_strict(&path, &engine.config))
            })
            .await
            .unwrap_or_else(|e| ValidationOutcome::invalid(ValidationFailure::Unreadable(e.to_string())))
    }

    /// Convert a caller-named file and store the PDF in the output directory.
    ///
    /// # Arguments
    /// * `path`: Absolute path, or a path relative to the input root. Either
    ///   way the file must live under the input root.
    /// * `output_base`: Stem of the output file; defaults to the source stem.
    ///   A timestamp (then a counter) is appended if the name is taken.
    ///
    /// # Returns
    /// A [`ConversionResult`] with the output path and size on success.
    ///
    /// # Errors
    /// Failures are folded into the result rather than returned:
    /// - Strict validation: missing, outside the input root, extension not
    ///   allowed, too large, locked
    /// - Backend initialisation or rendering failed
    /// - The PDF could not be saved (any partial output is removed)
    pub async fn convert_file(&self, path: impl AsRef<Path>, output_base: Option<&str>) -> ConversionResult {
        let path = self.engine.resolve_input(path.as_ref());
        self.convert_path(path, output_base, Mode::Strict).await
    }

    /// Convert a file the host staged itself. Containment is not checked.
    pub async fn convert_staged_upload(
        &self,
        path: impl AsRef<Path>,
        output_base: Option<&str>,
    ) -> ConversionResult {
        self.convert_path(path.as_ref().to_path_buf(), output_base, Mode::Relaxed)
            .await
    }

    async fn convert_path(&self, path: PathBuf, output_base: Option<&str>, mode: Mode) -> ConversionResult {
        let start = Instant::now();
        info!("Converting {}", path.display());
        let result = self.try_convert_path(path, output_base, mode).await;
        stored("Conversion", result, start)
    }

    async fn try_convert_path(
        &self,
        path: PathBuf,
        output_base: Option<&str>,
        mode: Mode,
    ) -> Result<(PathBuf, u64), ConvertError> {
        self.ensure_ready().await?;
        let base = output_base.map(str::to_string);
        self.engine
            .blocking("Conversion", move |engine| {
                engine.convert_path(&path, base.as_deref(), mode)
            })
            .await
    }

    /// Convert uploaded content. The output name defaults to the upload's
    /// stem.
    pub async fn convert_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        output_base: Option<&str>,
    ) -> ConversionResult {
        let start = Instant::now();
        info!("Converting upload '{}' ({} bytes)", file_name, bytes.len());
        let result = self.try_convert_upload(file_name, bytes, output_base).await;
        stored("Upload conversion", result, start)
    }

    async fn try_convert_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        output_base: Option<&str>,
    ) -> Result<(PathBuf, u64), ConvertError> {
        if bytes.is_empty() {
            return Err(ConvertError::EmptyUpload);
        }
        self.ensure_ready().await?;

        let extension = Path::new(file_name.trim())
            .extension()
            .map(|e| normalize_extension(&e.to_string_lossy()))
            .unwrap_or_default();
        let base = output_base
            .map(str::to_string)
            .unwrap_or_else(|| paths::source_stem(file_name));

        self.engine
            .blocking("Upload conversion", move |engine| {
                let content = if classify(&extension) == ConversionCategory::Markup {
                    markup::encode_with_bom(&markup::decode(&bytes))
                } else {
                    bytes
                };
                let staged = engine.temp.write("upload_", &extension, &content)?;
                let result = engine.convert_path(staged.path(), Some(&base), Mode::Relaxed);
                staged.release();
                result
            })
            .await
    }

    /// Convert an in-memory buffer and return the PDF bytes.
    ///
    /// Nothing is written to the output directory: the input and the PDF
    /// pass through two temp artifacts that are deleted before returning,
    /// whether the conversion succeeds or not.
    ///
    /// # Arguments
    /// * `bytes`: Raw file content; the type is sniffed from it.
    /// * `file_name_hint`: Original file name, consulted when the content
    ///   has no recognisable signature.
    /// * `output_base`: Name reported for the PDF.
    ///
    /// # Returns
    /// A [`ByteConversionResult`] with the PDF bytes, the detected type and
    /// the output file name (`<output_base>.pdf`, else `<hint stem>.pdf`,
    /// else `converted.pdf`).
    ///
    /// # Errors
    /// Failures are folded into the result rather than returned:
    /// - Buffer larger than the configured ceiling
    /// - Type could not be detected, or is not on the allow-list
    /// - Backend initialisation, rendering or save failed
    pub async fn convert_bytes(
        &self,
        bytes: Vec<u8>,
        file_name_hint: Option<&str>,
        output_base: Option<&str>,
    ) -> ByteConversionResult {
        let start = Instant::now();
        info!(
            "Converting {} bytes (hint: {})",
            bytes.len(),
            file_name_hint.unwrap_or("none")
        );

        let mut detected = None;
        match self.try_convert_bytes(bytes, file_name_hint, &mut detected).await {
            Ok(pdf) => {
                let name = byte_output_name(output_base, file_name_hint);
                info!("Converted {} bytes to {} in {:?}", pdf.len(), name, start.elapsed());
                ByteConversionResult::success(pdf, name, detected.unwrap_or_default(), start.elapsed())
            }
            Err(e) => {
                log_failure("Byte conversion", &e);
                ByteConversionResult::error(&e, detected, start.elapsed())
            }
        }
    }

    async fn try_convert_bytes(
        &self,
        bytes: Vec<u8>,
        file_name_hint: Option<&str>,
        detected: &mut Option<String>,
    ) -> Result<Vec<u8>, ConvertError> {
        // ── Step 1: Size ceiling ─────────────────────────────────────────
        let config = &self.engine.config;
        let size = bytes.len() as u64;
        if size > config.max_file_size_bytes() {
            return Err(ValidationFailure::TooLarge {
                size_mb: size as f64 / (1024.0 * 1024.0),
                max_mb: config.max_file_size_mb,
            }
            .into());
        }

        // ── Step 2: Sniff and allow-list ─────────────────────────────────
        let extension = sniff::detect(&bytes, file_name_hint).ok_or(ConvertError::UndetectableType)?;
        debug!("Detected type {}", extension);
        *detected = Some(extension.clone());
        if !config.is_allowed(&extension) {
            return Err(ConvertError::UnsupportedType {
                extension,
                allowed: config.allowed_list(),
            });
        }

        // ── Step 3: Render through temp artifacts ────────────────────────
        self.ensure_ready().await?;
        self.engine
            .blocking("Byte conversion", move |engine| {
                let input = engine.temp.write("input_", &extension, &bytes)?;
                let output = engine.temp.create("output_", ".pdf")?;
                render_to_pdf(
                    &engine.backend,
                    &engine.temp,
                    input.path(),
                    classify(&extension),
                    output.path(),
                )?;
                let pdf = std::fs::read(output.path())
                    .map_err(|e| ConvertError::io("Failed to read converted PDF", e))?;
                input.release();
                output.release();
                Ok(pdf)
            })
            .await
    }

    /// Download an `http`/`https` page and convert it as HTML.
    ///
    /// # Arguments
    /// * `url`: Page to fetch. Other schemes are rejected before any
    ///   network access.
    /// * `output_base`: Stem of the output file; defaults to
    ///   `url_conversion_<timestamp>`.
    ///
    /// # Returns
    /// A [`ConversionResult`] with the output path and size on success.
    ///
    /// # Errors
    /// Failures are folded into the result rather than returned:
    /// - "Invalid URL" for anything but `http`/`https`
    /// - "Failed to download HTML from URL" for a non-2xx status
    ///   (`HTTP Status: <code>`), a transport error or a timeout
    /// - Backend initialisation or rendering failed
    ///
    /// The downloaded page is staged as a temp `.html` artifact that is
    /// deleted on every path.
    pub async fn convert_url(&self, url: &str, output_base: Option<&str>) -> ConversionResult {
        let start = Instant::now();
        info!("Converting URL {}", url);
        let result = self.try_convert_url(url, output_base).await;
        stored("URL conversion", result, start)
    }

    async fn try_convert_url(&self, url: &str, output_base: Option<&str>) -> Result<(PathBuf, u64), ConvertError> {
        // ── Step 1: Check the URL ────────────────────────────────────────
        let url = download::parse_http_url(url)?;
        self.ensure_ready().await?;

        // ── Step 2: Download ─────────────────────────────────────────────
        let html = download::fetch_html(&url, self.engine.config.download_timeout_secs).await?;
        debug!("Downloaded {} chars from {}", html.len(), url);
        let base = output_base
            .and_then(paths::sanitize_base)
            .unwrap_or_else(|| paths::url_base(Local::now()));

        // ── Step 3: Stage and render ─────────────────────────────────────
        self.engine
            .blocking("URL conversion", move |engine| {
                let page = engine.temp.write("url_", ".html", &markup::encode_with_bom(&html))?;
                let target = paths::resolve_output_path(Some(&base), "", &engine.config.output_dir);
                let result = engine.render_stored(page.path(), ConversionCategory::Markup, &target);
                page.release();
                result
            })
            .await
    }

    /// Dispatch any [`ConversionRequest`].
    pub async fn execute(&self, request: ConversionRequest) -> ConversionOutcome {
        debug!("Executing {} request", request.kind());
        match request {
            ConversionRequest::Path { path, output_base } => {
                ConversionOutcome::Stored(self.convert_file(path, output_base.as_deref()).await)
            }
            ConversionRequest::StagedUpload { path, output_base } => ConversionOutcome::Stored(
                self.convert_staged_upload(path, output_base.as_deref()).await,
            ),
            ConversionRequest::Upload {
                file_name,
                bytes,
                output_base,
            } => ConversionOutcome::Stored(
                self.convert_upload(&file_name, bytes, output_base.as_deref()).await,
            ),
            ConversionRequest::Url { url, output_base } => {
                ConversionOutcome::Stored(self.convert_url(&url, output_base.as_deref()).await)
            }
            ConversionRequest::Bytes {
                bytes,
                file_name_hint,
                output_base,
            } => ConversionOutcome::Bytes(
                self.convert_bytes(bytes, file_name_hint.as_deref(), output_base.as_deref())
                    .await,
            ),
            ConversionRequest::Merge {
                file_names,
                output_base,
            } => ConversionOutcome::Merged(self.merge(&file_names, output_base.as_deref()).await),
        }
    }
}

fn stored(what: &str, result: Result<(PathBuf, u64), ConvertError>, start: Instant) -> ConversionResult {
    match result {
        Ok((path, size)) => {
            info!(
                "{} complete: {} ({} bytes) in {:?}",
                what,
                path.display(),
                size,
                start.elapsed()
            );
            ConversionResult::success(path, size, start.elapsed())
        }
        Err(e) => {
            log_failure(what, &e);
            ConversionResult::error(&e, start.elapsed())
        }
    }
}
