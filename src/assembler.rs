//! Turns the document model into files on disk.
//!
//! A [`DocumentAssembler`] drives one primary [`DocumentRenderer`] whose
//! failure fails the run, and optionally a secondary one whose failure is only
//! logged.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{info, warn};
use tempfile::NamedTempFile;

use crate::builder::PdfBuilder;
use crate::config::RenderSettings;
use crate::error::ReportError;
use crate::latex::{self, LatexCompiler, LATEX_SOURCE_FILE};
use crate::model::ReportDocument;

/// File name of the primary report.
pub const REPORT_FILE_NAME: &str = "report.pdf";

/// A strategy that writes a [`ReportDocument`] into an output directory.
#[async_trait(?Send)]
pub trait DocumentRenderer {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Renders `document` into `output_dir` and returns the written file.
    async fn render(
        &self,
        document: &ReportDocument,
        output_dir: &Path,
    ) -> Result<PathBuf, ReportError>;
}

/// Writes `bytes` to a temporary file next to `target` and renames it into place.
pub fn write_atomically(target: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    let directory = target
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut file =
        NamedTempFile::new_in(directory).map_err(|err| ReportError::io(directory, err))?;
    file.write_all(bytes)
        .and_then(|()| file.as_file().sync_all())
        .map_err(|err| ReportError::io(file.path(), err))?;
    file.persist(target)
        .map_err(|err| ReportError::io(target, err.error))?;
    Ok(())
}

/// Deletes a `report.pdf` left in `output_dir` by an earlier run.
pub(crate) fn remove_stale_report(output_dir: &Path) {
    remove_stale(&output_dir.join(REPORT_FILE_NAME));
}

fn remove_stale(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => warn!("Removed stale {}", path.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!("Could not remove stale {}: {}", path.display(), err),
    }
}

/// Primary renderer: lays the document out with `genpdf`.
#[derive(Clone, Debug, Default)]
pub struct PdfRenderer;

impl PdfRenderer {
    fn render_to(&self, document: &ReportDocument, target: &Path) -> Result<(), ReportError> {
        let rendered = PdfBuilder::for_report(document).render(document)?;
        log::debug!("Section start pages: {:?}", rendered.section_pages);
        write_atomically(target, &rendered.bytes)
    }
}

#[async_trait(?Send)]
impl DocumentRenderer for PdfRenderer {
    fn name(&self) -> &'static str {
        "pdf"
    }

    async fn render(
        &self,
        document: &ReportDocument,
        output_dir: &Path,
    ) -> Result<PathBuf, ReportError> {
        let target = output_dir.join(REPORT_FILE_NAME);
        match self.render_to(document, &target) {
            Ok(()) => Ok(target),
            Err(err) => {
                remove_stale(&target);
                Err(err)
            }
        }
    }
}

/// Secondary renderer: writes LaTeX source and compiles it externally.
#[derive(Clone, Debug)]
pub struct LatexRenderer {
    compiler: LatexCompiler,
}

impl LatexRenderer {
    pub fn new(compiler: LatexCompiler) -> Self {
        Self { compiler }
    }
}

#[async_trait(?Send)]
impl DocumentRenderer for LatexRenderer {
    fn name(&self) -> &'static str {
        "latex"
    }

    async fn render(
        &self,
        document: &ReportDocument,
        output_dir: &Path,
    ) -> Result<PathBuf, ReportError> {
        let tex_path = output_dir.join(LATEX_SOURCE_FILE);
        let source = latex::render_source(document, output_dir);
        tokio::fs::write(&tex_path, source)
            .await
            .map_err(|err| ReportError::io(&tex_path, err))?;

        self.compiler.compile(&tex_path).await
    }
}

/// Runs the configured renderers in order.
pub struct DocumentAssembler {
    primary: Box<dyn DocumentRenderer>,
    secondary: Option<Box<dyn DocumentRenderer>>,
}

impl DocumentAssembler {
    pub fn new(primary: impl DocumentRenderer + 'static) -> Self {
        Self {
            primary: Box::new(primary),
            secondary: None,
        }
    }

    pub fn with_secondary(mut self, secondary: impl DocumentRenderer + 'static) -> Self {
        self.secondary = Some(Box::new(secondary));
        self
    }

    /// PDF renderer, plus the LaTeX renderer when enabled in `settings`.
    pub fn from_settings(settings: &RenderSettings) -> Self {
        let assembler = Self::new(PdfRenderer);
        if settings.latex {
            assembler.with_secondary(LatexRenderer::new(LatexCompiler::new(
                settings.latex_compiler.clone(),
                settings.compiler_timeout(),
            )))
        } else {
            assembler
        }
    }

    /// Renders `document` and returns the primary output path.
    ///
    /// Errors from the secondary renderer are logged and dropped.
    pub async fn assemble(
        &self,
        document: &ReportDocument,
        output_dir: &Path,
    ) -> Result<PathBuf, ReportError> {
        let path = self.primary.render(document, output_dir).await?;
        info!("{} renderer wrote {}", self.primary.name(), path.display());

        if let Some(secondary) = &self.secondary {
            match secondary.render(document, output_dir).await {
                Ok(extra) => info!("{} renderer wrote {}", secondary.name(), extra.display()),
                Err(err) => warn!("{} renderer failed: {}", secondary.name(), err),
            }
        }

        Ok(path)
    }
}
