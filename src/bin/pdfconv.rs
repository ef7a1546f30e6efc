//! CLI binary for pdfconv.
//!
//! A thin shim over the library crate: flags become an `EngineConfig`,
//! subcommands become `ConversionRequest`s, results are printed as a short
//! summary or as JSON.

use anyhow::{Context, Result};
use base64::Engine as _;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdfconv::{
    ConversionOutcome, ConversionRequest, Converter, EngineConfig, MockBackend, PdfiumBackend,
    RenderingBackend,
};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a file from the input directory
  pdfconv --input-dir in --output-dir out convert report.docx

  # Pick the output name, and keep a copy elsewhere
  pdfconv convert slides.pptx --base quarterly --write ~/Desktop/quarterly.pdf

  # Convert a file from anywhere, as an upload
  pdfconv upload ~/Downloads/photo.jpg

  # Raw bytes from stdin, type sniffed from content
  cat scan.tif | pdfconv bytes - --write scan.pdf

  # Download a page and convert it
  pdfconv url https://example.com --base example

  # Merge mixed inputs into one A4 PDF
  pdfconv merge a.pdf b.docx c.png --base bundle

  # Check a file without converting
  pdfconv validate contract.pdf

  # Initialise the backend and print the effective settings
  pdfconv --json ready

  # Machine-readable output
  pdfconv --json merge a.pdf b.pdf > result.json

ENVIRONMENT VARIABLES:
  PDFCONV_INPUT_DIR        Input root for path-based conversions
  PDFCONV_OUTPUT_DIR       Where PDFs are written
  PDFCONV_TEMP_DIR         Directory for temp artifacts
  PDFCONV_HTML_MODULE      wkhtmltopdf-compatible executable
  PDFCONV_OFFICE_COMMAND   LibreOffice command (default: soffice)
  PDFCONV_LICENSE_KEY      Licence key for backends that need one
  PDFIUM_LIB_PATH          Path to an existing libpdfium, skips the download
  PDFCONV_PDFIUM_CACHE     Override the pdfium cache directory

SETUP:
  pdfium (~30 MB) is downloaded on first use and cached under
  ~/.cache/pdfconv/pdfium-7690/. Office and text formats need LibreOffice;
  HTML and URL conversions need wkhtmltopdf.
"#;

/// Convert documents, images, HTML and URLs to PDF, or merge them.
#[derive(Parser, Debug)]
#[command(
    name = "pdfconv",
    version,
    about = "Convert documents, images, HTML and URLs to PDF",
    long_about = "Convert Office documents, images, HTML pages, text files and PDFs to PDF, \
and merge mixed inputs into one A4-normalised PDF. Office formats are rendered by LibreOffice, \
HTML by a wkhtmltopdf-compatible executable, and PDF editing is done with pdfium.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    engine: EngineArgs,

    /// Output the result as JSON.
    #[arg(long, global = true, env = "PDFCONV_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFCONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFCONV_QUIET")]
    quiet: bool,
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// JSON configuration file; flags below override its values.
    #[arg(long, global = true, env = "PDFCONV_CONFIG")]
    config: Option<PathBuf>,

    /// Input root for path-based conversions.
    #[arg(long, global = true, env = "PDFCONV_INPUT_DIR")]
    input_dir: Option<PathBuf>,

    /// Directory converted PDFs are written to.
    #[arg(long, global = true, env = "PDFCONV_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Directory for temp artifacts.
    #[arg(long, global = true, env = "PDFCONV_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Maximum input size in megabytes.
    #[arg(long, global = true, env = "PDFCONV_MAX_SIZE_MB")]
    max_size_mb: Option<u64>,

    /// Comma-separated extension allow-list (e.g. ".pdf,.docx").
    #[arg(long, global = true, value_delimiter = ',', env = "PDFCONV_ALLOWED_EXTENSIONS")]
    allowed_extensions: Option<Vec<String>>,

    /// Licence key handed to the backend.
    #[arg(long, global = true, env = "PDFCONV_LICENSE_KEY", hide_env_values = true)]
    license_key: Option<String>,

    /// wkhtmltopdf-compatible executable used for HTML.
    #[arg(long, global = true, env = "PDFCONV_HTML_MODULE")]
    html_module: Option<PathBuf>,

    /// LibreOffice command used for Office and text formats.
    #[arg(long, global = true, env = "PDFCONV_OFFICE_COMMAND")]
    office_command: Option<String>,

    /// libpdfium file or directory.
    #[arg(long, global = true, env = "PDFCONV_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Never download libpdfium.
    #[arg(long, global = true)]
    no_pdfium_download: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "PDFCONV_DOWNLOAD_TIMEOUT")]
    download_timeout: Option<u64>,

    /// Merge items prepared concurrently.
    #[arg(long, global = true, env = "PDFCONV_MERGE_CONCURRENCY")]
    merge_concurrency: Option<usize>,

    /// Use the in-memory backend: nothing is rendered for real.
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a file inside the input directory.
    Convert {
        /// Path, absolute or relative to the input directory.
        path: PathBuf,
        /// Output file stem.
        #[arg(long)]
        base: Option<String>,
        /// Treat the path as an already staged upload (no containment check).
        #[arg(long)]
        staged: bool,
        /// Also copy the finished PDF to this path.
        #[arg(long)]
        write: Option<PathBuf>,
    },
    /// Convert any local file as an upload.
    Upload {
        file: PathBuf,
        /// File name to report instead of the local one.
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        base: Option<String>,
        /// Also copy the finished PDF to this path.
        #[arg(long)]
        write: Option<PathBuf>,
    },
    /// Convert raw bytes from a file or stdin (`-`); the type is sniffed.
    Bytes {
        source: String,
        /// Original file name, used when the content is ambiguous.
        #[arg(long)]
        hint: Option<String>,
        #[arg(long)]
        base: Option<String>,
        /// Write the PDF here.
        #[arg(long)]
        write: Option<PathBuf>,
        /// Print the PDF to stdout as base64.
        #[arg(long)]
        base64: bool,
    },
    /// Download an http(s) page and convert it.
    Url {
        url: String,
        #[arg(long)]
        base: Option<String>,
        /// Also copy the finished PDF to this path.
        #[arg(long)]
        write: Option<PathBuf>,
    },
    /// Merge input-directory files into one A4 PDF.
    Merge {
        #[arg(required = true)]
        files: Vec<String>,
        #[arg(long)]
        base: Option<String>,
        /// Also copy the finished PDF to this path.
        #[arg(long)]
        write: Option<PathBuf>,
    },
    /// Validate a file without converting it.
    Validate { path: PathBuf },
    /// Initialise the rendering backend and report the effective settings.
    Ready,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || !cli.json {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli.engine)?;

    if cli.engine.dry_run {
        run(Converter::new(config, MockBackend::new())?, &cli).await
    } else {
        run(Converter::<PdfiumBackend>::with_pdfium(config)?, &cli).await
    }
}

/// Map CLI args onto `EngineConfig`.
fn build_config(args: &EngineArgs) -> Result<EngineConfig> {
    let mut builder = match args.config {
        Some(ref path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?
            .into_builder(),
        None => EngineConfig::builder(),
    };

    if let Some(ref dir) = args.input_dir {
        builder = builder.input_dir(dir);
    }
    if let Some(ref dir) = args.output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(ref dir) = args.temp_dir {
        builder = builder.temp_dir(dir);
    }
    if let Some(mb) = args.max_size_mb {
        builder = builder.max_file_size_mb(mb);
    }
    if let Some(ref exts) = args.allowed_extensions {
        builder = builder.allowed_extensions(exts.iter().cloned());
    }
    if let Some(ref key) = args.license_key {
        builder = builder.license_key(key);
    }
    if let Some(ref path) = args.html_module {
        builder = builder.html_module_path(path);
    }
    if let Some(ref cmd) = args.office_command {
        builder = builder.office_command(cmd);
    }
    if let Some(ref path) = args.pdfium_lib {
        builder = builder.pdfium_library_path(path);
    }
    if args.no_pdfium_download {
        builder = builder.allow_pdfium_download(false);
    }
    if let Some(secs) = args.download_timeout {
        builder = builder.download_timeout_secs(secs);
    }
    if let Some(n) = args.merge_concurrency {
        builder = builder.merge_concurrency(n);
    }

    builder.build().context("Invalid configuration")
}

async fn run<B: RenderingBackend>(converter: Converter<B>, cli: &Cli) -> Result<()> {
    let request = match cli.command {
        Command::Validate { ref path } => {
            let outcome = converter.validate(path).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else if !cli.quiet {
                match outcome.reason() {
                    None => eprintln!("{} {} is valid", green("✔"), bold(&path.display().to_string())),
                    Some(ref reason) => eprintln!("{} {}", red("✘"), reason),
                }
            }
            if !outcome.is_valid() {
                anyhow::bail!("Validation failed");
            }
            return Ok(());
        }
        Command::Ready => {
            let spinner = spinner(cli, "Initialising backend…");
            let ready = converter.ensure_ready().await;
            finish(spinner);
            ready.context("Backend initialisation failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&settings_json(&converter)?)?);
            } else if !cli.quiet {
                eprintln!("{} {} backend ready", green("✔"), converter.backend().name());
                print_settings(converter.config());
            }
            return Ok(());
        }
        Command::Convert {
            ref path,
            ref base,
            staged,
            ..
        } => {
            if staged {
                ConversionRequest::StagedUpload {
                    path: path.clone(),
                    output_base: base.clone(),
                }
            } else {
                ConversionRequest::Path {
                    path: path.clone(),
                    output_base: base.clone(),
                }
            }
        }
        Command::Upload {
            ref file,
            ref name,
            ref base,
            ..
        } => {
            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("Failed to read {:?}", file))?;
            let file_name = name.clone().unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            ConversionRequest::Upload {
                file_name,
                bytes,
                output_base: base.clone(),
            }
        }
        Command::Bytes {
            ref source,
            ref hint,
            ref base,
            ..
        } => ConversionRequest::Bytes {
            bytes: read_source(source).await?,
            file_name_hint: hint.clone(),
            output_base: base.clone(),
        },
        Command::Url {
            ref url, ref base, ..
        } => ConversionRequest::Url {
            url: url.clone(),
            output_base: base.clone(),
        },
        Command::Merge {
            ref files,
            ref base,
            ..
        } => ConversionRequest::Merge {
            file_names: files.clone(),
            output_base: base.clone(),
        },
    };

    let spinner = spinner(cli, &format!("Running {} conversion…", request.kind()));
    let outcome = converter.execute(request).await;
    finish(spinner);

    if let (ConversionOutcome::Bytes(result), Command::Bytes { write, base64: as_base64, .. }) =
        (&outcome, &cli.command)
    {
        if let Some(pdf) = result.pdf_bytes() {
            if let Some(path) = write {
                tokio::fs::write(path, pdf)
                    .await
                    .with_context(|| format!("Failed to write {:?}", path))?;
            } else if *as_base64 && !cli.json {
                println!("{}", base64::engine::general_purpose::STANDARD.encode(pdf));
            }
        }
    }

    if let (Some(dest), Some(stored)) = (copy_target(&cli.command), outcome.output_path()) {
        tokio::fs::copy(stored, dest)
            .await
            .with_context(|| format!("Failed to copy {:?} to {:?}", stored, dest))?;
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialise result")?
        );
    } else if !cli.quiet {
        print_summary(&outcome);
    }

    match outcome.error() {
        Some((title, detail)) => anyhow::bail!("{title}: {detail}"),
        None => Ok(()),
    }
}

/// `--write` destination of commands that store their PDF in the output
/// directory.
fn copy_target(command: &Command) -> Option<&PathBuf> {
    match command {
        Command::Convert { write, .. }
        | Command::Upload { write, .. }
        | Command::Url { write, .. }
        | Command::Merge { write, .. } => write.as_ref(),
        _ => None,
    }
}

/// Readiness plus the effective configuration. The licence key is never
/// echoed.
fn settings_json<B: RenderingBackend>(converter: &Converter<B>) -> Result<serde_json::Value> {
    let mut config =
        serde_json::to_value(converter.config()).context("Failed to serialise configuration")?;
    if let Some(key) = config.get_mut("license_key").filter(|k| !k.is_null()) {
        *key = serde_json::Value::from("<redacted>");
    }
    Ok(serde_json::json!({
        "ready": converter.is_ready(),
        "backend": converter.backend().name(),
        "config": config,
    }))
}

fn print_settings(config: &EngineConfig) {
    let row = |label: &str, value: String| eprintln!("  {:<18} {}", dim(label), value);
    row("input dir", config.input_dir.display().to_string());
    row("output dir", config.output_dir.display().to_string());
    row("temp dir", config.temp_dir.display().to_string());
    row("max size", format!("{} MB", config.max_file_size_mb));
    row("allowed", config.allowed_list());
}

async fn read_source(source: &str) -> Result<Vec<u8>> {
    if source == "-" {
        return tokio::task::spawn_blocking(|| {
            let mut buf = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        })
        .await
        .context("stdin reader panicked")?;
    }
    tokio::fs::read(source)
        .await
        .with_context(|| format!("Failed to read {:?}", source))
}

fn spinner(cli: &Cli, message: &str) -> Option<ProgressBar> {
    if cli.quiet || cli.json {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("pdfconv");
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    Some(bar)
}

fn finish(spinner: Option<ProgressBar>) {
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
}

fn print_summary(outcome: &ConversionOutcome) {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    let _ = match outcome {
        ConversionOutcome::Stored(r) if r.is_success() => writeln!(
            out,
            "{}  {}  {}  →  {}",
            green("✔"),
            dim(&format!("{} bytes", r.size_bytes().unwrap_or_default())),
            dim(&format!("{}ms", r.duration().as_millis())),
            bold(&r.output_path().map(|p| p.display().to_string()).unwrap_or_default()),
        ),
        ConversionOutcome::Bytes(r) if r.is_success() => writeln!(
            out,
            "{}  {} ({})  {}  {}",
            green("✔"),
            bold(r.output_file_name().unwrap_or_default()),
            r.detected_type().unwrap_or_default(),
            dim(&format!("{} bytes", r.size_bytes())),
            dim(&format!("{}ms", r.duration().as_millis())),
        ),
        ConversionOutcome::Merged(r) => {
            for failure in r.failed_files() {
                let _ = writeln!(out, "  {} {}  {}", red("✗"), failure.file_name, dim(&failure.reason));
            }
            if r.is_success() {
                writeln!(
                    out,
                    "{}  {}/{} files  {} pages  {}  →  {}",
                    if r.failed_files().is_empty() { green("✔") } else { cyan("⚠") },
                    r.files_processed(),
                    r.total_files(),
                    r.page_count(),
                    dim(&format!("{}ms", r.duration().as_millis())),
                    bold(&r.output_path().map(|p| p.display().to_string()).unwrap_or_default()),
                )
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_flag_applies_to_stored_outputs() {
        let cli = Cli::try_parse_from(["pdfconv", "convert", "a.docx", "--write", "copy.pdf"]).unwrap();
        assert_eq!(copy_target(&cli.command), Some(&PathBuf::from("copy.pdf")));

        let cli = Cli::try_parse_from(["pdfconv", "merge", "a.pdf", "b.pdf", "--write", "m.pdf"]).unwrap();
        assert_eq!(copy_target(&cli.command), Some(&PathBuf::from("m.pdf")));

        let cli = Cli::try_parse_from(["pdfconv", "validate", "a.pdf"]).unwrap();
        assert_eq!(copy_target(&cli.command), None);
    }

    #[test]
    fn engine_flags_map_onto_config() {
        let cli = Cli::try_parse_from([
            "pdfconv",
            "--max-size-mb",
            "5",
            "--allowed-extensions",
            ".pdf,.docx",
            "--no-pdfium-download",
            "ready",
        ])
        .unwrap();
        let config = build_config(&cli.engine).unwrap();
        assert_eq!(config.max_file_size_mb, 5);
        assert!(config.is_allowed(".docx"));
        assert!(!config.is_allowed(".png"));
        assert!(!config.allow_pdfium_download);
    }

    #[tokio::test]
    async fn settings_report_config_without_licence_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::builder()
            .input_dir(dir.path().join("in"))
            .output_dir(dir.path().join("out"))
            .temp_dir(dir.path().join("tmp"))
            .max_file_size_mb(7)
            .license_key("s3cret")
            .build()
            .unwrap();
        let converter = Converter::new(config, MockBackend::new()).unwrap();
        converter.ensure_ready().await.unwrap();

        let settings = settings_json(&converter).unwrap();
        assert_eq!(settings["ready"], true);
        assert_eq!(settings["config"]["max_file_size_mb"], 7);
        assert_eq!(settings["config"]["license_key"], "<redacted>");
        assert!(settings["config"]["allowed_extensions"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e == ".pdf"));
        assert!(!settings.to_string().contains("s3cret"));
    }
}
