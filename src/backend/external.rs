//! External renderers used by [`super::PdfiumBackend`].
//!
//! pdfium can edit PDFs and place images, but it cannot lay out Office
//! documents or HTML. Those go through helper programs:
//!
//! * Office and plain-text formats: LibreOffice in headless mode
//!   (`soffice --headless --convert-to pdf`)
//! * HTML: a `wkhtmltopdf`-compatible executable, the HTML rendering module
//!
//! Both write a PDF into a scratch directory that the caller owns.

use crate::error::BackendError;
use reqwest::Url;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::debug;

/// Runs LibreOffice to convert a document to PDF.
#[derive(Debug, Clone)]
pub struct OfficeConverter {
    command: String,
}

impl OfficeConverter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Convert `source` into `<work_dir>/<stem>.pdf` and return that path.
    ///
    /// Each call gets its own LibreOffice profile under `work_dir`, so
    /// concurrent conversions do not fight over the user installation lock.
    pub fn convert(&self, source: &Path, work_dir: &Path) -> Result<PathBuf, BackendError> {
        let profile = work_dir.join("profile");
        let profile_url = Url::from_directory_path(&profile)
            .map_err(|_| BackendError::Rendering(format!("Bad profile path: {}", profile.display())))?;

        debug!("{} --convert-to pdf {}", self.command, source.display());
        let output = Command::new(&self.command)
            .arg("--headless")
            .arg("--norestore")
            .arg(format!("-env:UserInstallation={profile_url}"))
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(work_dir)
            .arg(source)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(e, "Office converter", &self.command, office_hint()))?;

        check_status(&output, &self.command)?;

        let stem = source
            .file_stem()
            .ok_or_else(|| BackendError::Rendering(format!("No file name in {}", source.display())))?;
        let pdf = work_dir.join(format!("{}.pdf", stem.to_string_lossy()));
        if !pdf.is_file() {
            return Err(BackendError::Rendering(format!(
                "{} finished but produced no PDF for {}",
                self.command,
                source.display()
            )));
        }
        Ok(pdf)
    }
}

/// Runs the HTML rendering module.
#[derive(Debug, Clone)]
pub struct HtmlRenderer {
    program: PathBuf,
}

impl HtmlRenderer {
    /// Use the configured executable, or find `wkhtmltopdf` on `PATH`.
    pub fn locate(configured: Option<&Path>) -> Result<Self, BackendError> {
        let program = match configured {
            Some(path) if path.is_file() => Some(path.to_path_buf()),
            Some(_) => None,
            None => find_on_path("wkhtmltopdf"),
        };
        program
            .map(|program| Self { program })
            .ok_or_else(|| BackendError::ModuleMissing {
                module: "HTML rendering module".into(),
                hint: html_hint(configured),
            })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Render markup fed through stdin.
    pub fn render_string(&self, html: &str, out: &Path) -> Result<(), BackendError> {
        let mut child = self
            .base_command()
            .arg("-")
            .arg(out)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(html.as_bytes())
                .map_err(|e| BackendError::Rendering(format!("Failed to feed HTML renderer: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| BackendError::Rendering(format!("HTML renderer did not finish: {e}")))?;
        self.finish(&output, out)
    }

    /// Render a page by URL (`file://` URLs need local file access).
    pub fn render_url(&self, url: &Url, out: &Path) -> Result<(), BackendError> {
        let mut cmd = self.base_command();
        if url.scheme() == "file" {
            cmd.arg("--enable-local-file-access");
        }
        let output = cmd
            .arg(url.as_str())
            .arg(out)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(e))?;
        self.finish(&output, out)
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--quiet").arg("--encoding").arg("utf-8");
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> BackendError {
        spawn_error(
            e,
            "HTML rendering module",
            &self.program.display().to_string(),
            html_hint(Some(&self.program)),
        )
    }

    fn finish(&self, output: &Output, out: &Path) -> Result<(), BackendError> {
        check_status(output, &self.program.display().to_string())?;
        if !out.is_file() {
            return Err(BackendError::Rendering(
                "HTML renderer produced no output".into(),
            ));
        }
        Ok(())
    }
}

fn spawn_error(e: std::io::Error, module: &str, program: &str, hint: String) -> BackendError {
    if e.kind() == std::io::ErrorKind::NotFound {
        BackendError::ModuleMissing {
            module: module.to_string(),
            hint,
        }
    } else {
        BackendError::Rendering(format!("Failed to start {program}: {e}"))
    }
}

fn check_status(output: &Output, program: &str) -> Result<(), BackendError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(BackendError::Rendering(format!(
        "{program} exited with {}: {}",
        output.status,
        stderr.trim()
    )))
}

fn office_hint() -> String {
    "Office and text documents are rendered by LibreOffice.\n\
To fix:\n\
  • Install LibreOffice (e.g. `apt install libreoffice-core`).\n\
  • Or set `office_command` to the full path of `soffice`."
        .to_string()
}

fn html_hint(configured: Option<&Path>) -> String {
    let configured = configured
        .map(|p| format!("Configured path '{}' was not found.\n", p.display()))
        .unwrap_or_default();
    format!(
        "{configured}HTML documents are rendered by a wkhtmltopdf-compatible executable.\n\
To fix:\n\
  • Install wkhtmltopdf and make sure it is on PATH.\n\
  • Or set `html_module_path` to the executable."
    )
}

/// Search `PATH` for an executable.
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .flat_map(|dir| {
            let plain = dir.join(name);
            let exe = dir.join(format!("{name}.exe"));
            [plain, exe]
        })
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_configured_html_module() {
        let err = HtmlRenderer::locate(Some(Path::new("/definitely/not/here/wkhtmltopdf"))).unwrap_err();
        match err {
            BackendError::ModuleMissing { module, hint } => {
                assert_eq!(module, "HTML rendering module");
                assert!(hint.contains("/definitely/not/here/wkhtmltopdf"));
                assert!(hint.contains("html_module_path"));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn missing_office_command_is_module_missing() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.docx");
        std::fs::write(&src, b"PK\x03\x04").unwrap();

        let err = OfficeConverter::new("pdfconv-no-such-soffice")
            .convert(&src, dir.path())
            .unwrap_err();
        assert!(matches!(err, BackendError::ModuleMissing { .. }));
    }

    #[test]
    fn path_lookup_misses_unknown_program() {
        assert!(find_on_path("pdfconv-no-such-program").is_none());
    }
}
