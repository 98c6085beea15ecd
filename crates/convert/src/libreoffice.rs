//! PDF conversion through a headless LibreOffice and `pdfunite`.
//!
//! Every merge runs inside a [`ConversionSession`]: a scratch directory
//! holding the intermediate PDFs and a private LibreOffice profile. The
//! session is released when it goes out of scope, on success and failure
//! alike.

use certgen_core::{DocumentConverter, Error, Result};
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use url::Url;

/// Converts filled documents to PDF and merges them into one file.
#[derive(Debug, Clone)]
pub struct LibreOfficeConverter {
    soffice: OsString,
    pdfunite: OsString,
}

impl Default for LibreOfficeConverter {
    fn default() -> Self {
        Self {
            soffice: "soffice".into(),
            pdfunite: "pdfunite".into(),
        }
    }
}

impl LibreOfficeConverter {
    /// Use `soffice` and `pdfunite` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the LibreOffice executable.
    pub fn with_soffice(mut self, program: impl Into<OsString>) -> Self {
        self.soffice = program.into();
        self
    }

    /// Override the `pdfunite` executable.
    pub fn with_pdfunite(mut self, program: impl Into<OsString>) -> Self {
        self.pdfunite = program.into();
        self
    }

    /// Acquire a conversion session.
    pub fn open_session(&self) -> Result<ConversionSession<'_>> {
        let scratch = tempfile::Builder::new()
            .prefix("certgen-convert-")
            .tempdir()
            .map_err(|e| Error::ConversionError(format!("Failed to create scratch directory: {}", e)))?;
        fs::create_dir_all(scratch.path().join("pdf"))?;
        log::debug!("Opened conversion session in {}", scratch.path().display());

        Ok(ConversionSession {
            converter: self,
            scratch: Some(scratch),
        })
    }
}

impl DocumentConverter for LibreOfficeConverter {
    fn output_extension(&self) -> &str {
        "pdf"
    }

    fn merge(&self, documents: &[PathBuf], output: &Path) -> Result<()> {
        if documents.is_empty() {
            return Err(Error::ConversionError("No documents to merge".into()));
        }

        let session = self.open_session()?;
        let pdfs = session.convert_all(documents)?;
        session.unite(&pdfs, output)?;
        session.close()
    }
}

/// A scoped conversion host: scratch space plus a private LibreOffice profile.
pub struct ConversionSession<'a> {
    converter: &'a LibreOfficeConverter,
    scratch: Option<TempDir>,
}

impl ConversionSession<'_> {
    /// Root of the session's scratch space.
    pub fn path(&self) -> Option<&Path> {
        self.scratch.as_ref().map(TempDir::path)
    }

    fn scratch_path(&self) -> Result<&Path> {
        self.path()
            .ok_or_else(|| Error::ConversionError("Conversion session already closed".into()))
    }

    /// Convert every document to PDF in one LibreOffice invocation, returning
    /// the PDFs in input order.
    pub fn convert_all(&self, documents: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let scratch = self.scratch_path()?;
        let outdir = scratch.join("pdf");
        let profile = scratch.join("profile");

        let mut command = Command::new(&self.converter.soffice);
        command
            .arg("--headless")
            .arg("--norestore")
            .arg(format!("-env:UserInstallation={}", file_url(&profile)?))
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(&outdir)
            .args(documents);
        run(&mut command, &self.converter.soffice)?;

        documents
            .iter()
            .map(|doc| {
                let stem = doc.file_stem().ok_or_else(|| {
                    Error::ConversionError(format!("Document has no file name: {}", doc.display()))
                })?;
                let mut name = stem.to_os_string();
                name.push(".pdf");
                let pdf = outdir.join(name);
                if pdf.exists() {
                    Ok(pdf)
                } else {
                    Err(Error::ConversionError(format!(
                        "LibreOffice did not produce a PDF for {}",
                        doc.display()
                    )))
                }
            })
            .collect()
    }

    /// Merge `pdfs` in order into `output`.
    pub fn unite(&self, pdfs: &[PathBuf], output: &Path) -> Result<()> {
        match pdfs {
            [] => Err(Error::ConversionError("No PDFs to merge".into())),
            [single] => {
                fs::copy(single, output)?;
                Ok(())
            }
            _ => {
                let mut command = Command::new(&self.converter.pdfunite);
                command.args(pdfs).arg(output);
                run(&mut command, &self.converter.pdfunite)
            }
        }
    }

    /// Release the session, reporting any failure to remove scratch space.
    pub fn close(mut self) -> Result<()> {
        match self.scratch.take() {
            Some(dir) => dir.close().map_err(|e| {
                Error::ConversionError(format!("Failed to release conversion session: {}", e))
            }),
            None => Ok(()),
        }
    }
}

impl Drop for ConversionSession<'_> {
    fn drop(&mut self) {
        if let Some(dir) = self.scratch.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                log::warn!("Failed to remove conversion scratch {}: {}", path.display(), e);
            } else {
                log::debug!("Released conversion session {}", path.display());
            }
        }
    }
}

/// Run an external program, turning spawn failures and non-zero exits into
/// conversion errors.
fn run(command: &mut Command, program: &OsString) -> Result<()> {
    log::debug!("Running {:?}", command);
    let output = command.output().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            Error::ConversionError(format!("{} not found", program.to_string_lossy()))
        } else {
            Error::ConversionError(format!("Failed to run {}: {}", program.to_string_lossy(), e))
        }
    })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(Error::ConversionError(format!(
            "{} exited with {}: {}",
            program.to_string_lossy(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// `file://` URL for a local path, as LibreOffice expects for its profile.
fn file_url(path: &Path) -> Result<String> {
    Url::from_file_path(path)
        .map(String::from)
        .map_err(|_| Error::ConversionError(format!("Cannot express {} as a file URL", path.display())))
}
