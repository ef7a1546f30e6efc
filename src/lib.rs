//! # pdfconv
//!
//! Convert Office documents, images, HTML pages, text files and PDFs to
//! PDF, and merge mixed inputs into one A4-normalised PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! request (path | staged upload | upload | bytes | URL | merge list)
//!  │
//!  ├─ 1. Identify  sniff bytes, or take the file extension
//!  ├─ 2. Validate  exists, inside the input root, allow-listed, size, not locked
//!  ├─ 3. Classify  office | image | markup | pdf | generic
//!  ├─ 4. Render    backend call (spawn_blocking), HTML falls back to a temp file
//!  ├─ 5. Merge     per-item ledger, A4 normalisation, page append
//!  └─ 6. Output    collision-free name in the output directory, or bytes
//! ```
//!
//! Rendering sits behind the [`RenderingBackend`] trait. The production
//! [`PdfiumBackend`] edits PDFs with pdfium and delegates layout to
//! LibreOffice and a `wkhtmltopdf`-compatible HTML renderer;
//! [`MockBackend`] keeps everything in memory for tests.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfconv::{Converter, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::builder()
//!         .input_dir("input")
//!         .output_dir("output")
//!         .build()?;
//!     let converter = Converter::with_pdfium(config)?;
//!
//!     let result = converter.convert_file("report.docx", None).await;
//!     match result.output_path() {
//!         Some(path) => println!("wrote {}", path.display()),
//!         None => eprintln!("{}: {}", result.error_message().unwrap_or_default(),
//!             result.error_detail().unwrap_or_default()),
//!     }
//!
//!     let merged = converter
//!         .merge(&["a.pdf".into(), "b.docx".into()], Some("bundle"))
//!         .await;
//!     println!("{} pages", merged.page_count());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfconv` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdfconv = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod convert;
pub mod error;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod request;
pub mod temp;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{MockBackend, PageGeometry, PageRect, PdfiumBackend, ReadyGate, RenderingBackend};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use convert::{render_to_pdf, Converter};
pub use error::{BackendError, ConvertError, ValidationFailure};
pub use output::{ByteConversionResult, ConversionResult, FileFailure, MergeLedger, MergeResult};
pub use pipeline::classify::{classify, ConversionCategory};
pub use pipeline::sniff::detect;
pub use pipeline::validate::ValidationOutcome;
pub use request::{ConversionOutcome, ConversionRequest};
pub use temp::{TempArtifact, TempSpace};
