//! Merge several input files into one A4-normalised PDF.
//!
//! Items go through three stages:
//!
//! 1. **Validate**: each name is trimmed (blank ones are dropped), resolved
//!    against the input root and strictly validated.
//! 2. **Prepare**: PDFs are copied into a temp artifact, everything else is
//!    rendered into one. Up to `merge_concurrency` items are prepared at
//!    once; results keep caller order.
//! 3. **Assemble**: prepared PDFs are opened in order, their pages
//!    normalised against A4 and appended to a single document, which is
//!    saved under an always-timestamped name.
//!
//! A failing item is recorded in the [`MergeLedger`] and skipped; the merge
//! only fails when no item survives or the final document cannot be built.

use crate::backend::RenderingBackend;
use crate::convert::{log_failure, remove_partial, render_to_pdf, Converter, Engine};
use crate::error::ConvertError;
use crate::output::{MergeLedger, MergeResult};
use crate::pipeline::classify::{classify_path, ConversionCategory};
use crate::pipeline::normalize::normalize_document;
use crate::pipeline::{paths, validate};
use crate::temp::TempArtifact;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A merge item after preparation: its label and either a temp PDF or the
/// reason it was skipped.
type Prepared = (String, Result<TempArtifact, String>);

struct Assembled {
    output_path: PathBuf,
    page_count: usize,
}

impl<B: RenderingBackend> Converter<B> {
    /// Merge `file_names` (relative to the input root) into one PDF.
    ///
    /// # Arguments
    /// * `file_names`: Input names in merge order. Surrounding whitespace
    ///   is trimmed and blank entries are dropped before anything is counted.
    /// * `output_base`: Stem of the merged file; defaults to `mergePDF`.
    ///   A timestamp is always appended.
    ///
    /// # Returns
    /// A [`MergeResult`] carrying the per-item ledger. It is a success when
    /// at least one item made it into the saved document, even if others
    /// were skipped (check `failed_files()`).
    ///
    /// # Errors
    /// Failures are folded into the result rather than returned:
    /// - No (non-blank) names: "No files provided for merging"
    /// - Backend initialisation failed
    /// - Every item failed validation, preparation or appending
    /// - The merged document could not be saved (no output is left behind)
    ///
    /// # Example
    /// ```rust,no_run
    /// # async fn run(converter: pdfconv::Converter<pdfconv::MockBackend>) {
    /// let names = vec!["a.pdf".to_string(), "b.docx".to_string()];
    /// let merged = converter.merge(&names, Some("bundle")).await;
    /// for failure in merged.failed_files() {
    ///     eprintln!("skipped {}: {}", failure.file_name, failure.reason);
    /// }
    /// # }
    /// ```
    pub async fn merge(&self, file_names: &[String], output_base: Option<&str>) -> MergeResult {
        let start = Instant::now();

        // ── Step 1: Drop blank names ─────────────────────────────────────
        let file_names: Vec<String> = file_names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        info!("Merging {} file(s)", file_names.len());

        if file_names.is_empty() {
            let err = ConvertError::NothingToMerge;
            log_failure("Merge", &err);
            return MergeResult::error(&err, MergeLedger::new(0), start.elapsed());
        }

        // ── Step 2: Initialise the backend ───────────────────────────────
        if let Err(e) = self.ensure_ready().await {
            log_failure("Merge", &e);
            return MergeResult::error(&e, MergeLedger::new(file_names.len()), start.elapsed());
        }

        // ── Step 3: Validate and prepare every item ──────────────────────
        let prepared = self.prepare_all(&file_names).await;
        if prepared.iter().all(|(_, item)| item.is_err()) {
            let mut ledger = MergeLedger::new(file_names.len());
            for (label, item) in prepared {
                if let Err(reason) = item {
                    ledger.record_failure(label, reason);
                }
            }
            let err = ConvertError::AllItemsFailed {
                failed: ledger.failed().len(),
            };
            log_failure("Merge", &err);
            return MergeResult::error(&err, ledger, start.elapsed());
        }

        // ── Step 4: Assemble and save ────────────────────────────────────
        let base = output_base.map(str::to_string);
        let outcome = self
            .engine
            .blocking("Merge", move |engine| {
                let target = paths::resolve_merge_path(base.as_deref(), &engine.config.output_dir);
                Ok(engine.assemble(prepared, &target))
            })
            .await;

        match outcome {
            Ok((ledger, Ok(assembled))) => {
                info!(
                    "Merge complete: {} ({} pages, {}/{} files) in {:?}",
                    assembled.output_path.display(),
                    assembled.page_count,
                    ledger.succeeded().len(),
                    ledger.total_requested(),
                    start.elapsed()
                );
                MergeResult::success(
                    assembled.output_path,
                    assembled.page_count,
                    ledger,
                    start.elapsed(),
                )
            }
            Ok((ledger, Err(e))) => {
                log_failure("Merge", &e);
                MergeResult::error(&e, ledger, start.elapsed())
            }
            Err(e) => {
                log_failure("Merge", &e);
                MergeResult::error(&e, MergeLedger::new(file_names.len()), start.elapsed())
            }
        }
    }

    async fn prepare_all(&self, file_names: &[String]) -> Vec<Prepared> {
        let concurrency = self.engine.config.merge_concurrency;
        stream::iter(file_names.iter().map(|name| {
            let engine = Arc::clone(&self.engine);
            let label = name.clone();
            async move {
                let name = label.clone();
                let item = engine
                    .blocking("Merge item", move |engine| engine.prepare_item(&name))
                    .await
                    .map_err(|e| {
                        warn!("Skipping '{}' in merge: {}", label, e);
                        e.to_string()
                    });
                (label, item)
            }
        }))
        .buffered(concurrency)
        .collect()
        .await
    }
}

impl<B: RenderingBackend> Engine<B> {
    fn prepare_item(&self, name: &str) -> Result<TempArtifact, ConvertError> {
        let path = self.resolve_input(Path::new(name));
        validate::validate_strict(&path, &self.config).into_result()?;

        let artifact = self.temp.create("merge_", ".pdf")?;
        match classify_path(&path) {
            ConversionCategory::PdfNative => {
                std::fs::copy(&path, artifact.path()).map_err(|e| {
                    ConvertError::io(format!("Failed to copy '{}'", path.display()), e)
                })?;
            }
            category => render_to_pdf(&self.backend, &self.temp, &path, category, artifact.path())?,
        }
        debug!("Prepared merge item {} → {}", name, artifact.path().display());
        Ok(artifact)
    }

    /// Append every prepared item to one document and save it at `target`.
    ///
    /// Items that fail to open or normalise are moved to the failed list.
    /// Temp artifacts are dropped on every path.
    fn assemble(&self, items: Vec<Prepared>, target: &Path) -> (MergeLedger, Result<Assembled, ConvertError>) {
        let mut ledger = MergeLedger::new(items.len());
        let backend = &self.backend;

        let mut merged = match backend.new_document() {
            Ok(doc) => doc,
            Err(e) => {
                for (label, item) in items {
                    match item {
                        Ok(_) => ledger.record_success(label),
                        Err(reason) => ledger.record_failure(label, reason),
                    }
                }
                return (ledger, Err(e.into()));
            }
        };

        for (label, item) in items {
            let appended = item.and_then(|artifact| {
                let result = self.append_item(&mut merged, artifact.path());
                artifact.release();
                result.map_err(|e| e.to_string())
            });
            match appended {
                Ok(()) => ledger.record_success(label),
                Err(reason) => {
                    warn!("Skipping '{}' in merge: {}", label, reason);
                    ledger.record_failure(label, reason);
                }
            }
        }

        if ledger.succeeded().is_empty() {
            let failed = ledger.failed().len();
            return (ledger, Err(ConvertError::AllItemsFailed { failed }));
        }

        let page_count = backend.page_count(&merged);
        if let Err(e) = backend.save(&mut merged, target, true) {
            remove_partial(target);
            return (ledger, Err(e.into()));
        }
        (
            ledger,
            Ok(Assembled {
                output_path: target.to_path_buf(),
                page_count,
            }),
        )
    }

    fn append_item<'a>(
        &'a self,
        merged: &mut B::Document<'a>,
        path: &Path,
    ) -> Result<(), ConvertError> {
        let mut doc = self.backend.open_pdf(path)?;
        let normalized = normalize_document(&self.backend, &mut doc)?;
        if normalized > 0 {
            debug!("Normalised {} page(s) of {}", normalized, path.display());
        }
        self.backend.append_pages(merged, &doc)?;
        Ok(())
    }
}
