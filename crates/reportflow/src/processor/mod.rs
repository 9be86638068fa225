//! Text extraction from uploaded reports.
//!
//! PDFs go through a fallback chain: embedded text, structural repair and a
//! second native attempt, then rasterization and per-page OCR. Images are
//! OCR'd directly.

pub mod ocr;
pub mod pdf;
pub mod raster;
pub mod repair;
pub mod tools;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::Instrument;

use crate::error::ExtractionError;
use crate::sanitize::redact_path;
use ocr::OcrEngine;
use tools::ToolRunner;

/// Text returned in offline mode wherever external tools would have run.
pub const MOCK_OCR_TEXT: &str = "MOCK OCR TEXT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
}

impl DocumentKind {
    /// Classifies a file by extension.
    pub fn detect(path: &Path) -> Result<Self, ExtractionError> {
        let mime = mime_guess::from_path(path).first();
        match mime {
            Some(m) if m == mime_guess::mime::APPLICATION_PDF => Ok(DocumentKind::Pdf),
            Some(m) if m.type_() == mime_guess::mime::IMAGE => Ok(DocumentKind::Image),
            Some(m) => Err(ExtractionError::UnsupportedFormat(m.essence_str().to_string())),
            None => Err(ExtractionError::UnsupportedFormat(
                path.extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "<none>".to_string()),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    pub dpi: u32,
    /// Parent for scratch directories; the system temp dir when unset.
    pub scratch_root: Option<PathBuf>,
    /// Never invoke external tools; see [`MOCK_OCR_TEXT`].
    pub offline: bool,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            dpi: 300,
            scratch_root: None,
            offline: false,
        }
    }
}

/// Stored file to plain text.
#[derive(Clone)]
pub struct TextExtractor {
    runner: Arc<dyn ToolRunner>,
    ocr: Arc<dyn OcrEngine>,
    options: ExtractorOptions,
}

impl TextExtractor {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        ocr: Arc<dyn OcrEngine>,
        options: ExtractorOptions,
    ) -> Self {
        Self {
            runner,
            ocr,
            options,
        }
    }

    pub fn options(&self) -> &ExtractorOptions {
        &self.options
    }

    pub fn runner(&self) -> &Arc<dyn ToolRunner> {
        &self.runner
    }

    pub async fn extract_text(&self, path: &Path) -> Result<String, ExtractionError> {
        let span = tracing::info_span!("processor.extract", file = %redact_path(path));
        self.extract_inner(path).instrument(span).await
    }

    async fn extract_inner(&self, path: &Path) -> Result<String, ExtractionError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ExtractionError::SourceUnreadable {
                path: path.to_path_buf(),
                source: e,
            })?;

        match DocumentKind::detect(path)? {
            DocumentKind::Pdf => self.extract_pdf(path, &bytes).await,
            DocumentKind::Image => {
                if self.options.offline {
                    log::info!("Offline mode: skipping OCR for image");
                    return Ok(MOCK_OCR_TEXT.to_string());
                }
                ocr::ocr_pages(self.ocr.as_ref(), &[path.to_path_buf()]).await
            }
        }
    }

    async fn extract_pdf(&self, path: &Path, bytes: &[u8]) -> Result<String, ExtractionError> {
        if let Some(text) = pdf::usable_native_text(bytes) {
            log::debug!("Using embedded PDF text ({} chars)", text.len());
            return Ok(text);
        }

        if self.options.offline {
            log::info!("Offline mode: skipping repair and OCR for scanned PDF");
            return Ok(MOCK_OCR_TEXT.to_string());
        }

        let repair_dir = self.scratch_dir("pdf_repair_")?;
        let mut target = path.to_path_buf();
        if let Some(repaired) =
            repair::repair(self.runner.as_ref(), path, repair_dir.path()).await
        {
            match tokio::fs::read(&repaired).await {
                Ok(repaired_bytes) => {
                    if let Some(text) = pdf::usable_native_text(&repaired_bytes) {
                        log::info!("Embedded text recovered after repair");
                        return Ok(text);
                    }
                }
                Err(e) => log::warn!("Could not read repaired PDF: {}", e),
            }
            target = repaired;
        }

        let pages_dir = self.scratch_dir("pdf_pages_")?;
        let pages = raster::rasterize(
            self.runner.as_ref(),
            &target,
            pages_dir.path(),
            self.options.dpi,
        )
        .await?;

        let span = tracing::info_span!("processor.ocr", pages = pages.len());
        ocr::ocr_pages(self.ocr.as_ref(), &pages)
            .instrument(span)
            .await
    }

    /// A directory that is removed when the guard drops.
    fn scratch_dir(&self, prefix: &str) -> Result<TempDir, ExtractionError> {
        let root = self
            .options
            .scratch_root
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&root)
            .map_err(|e| ExtractionError::Scratch {
                path: root,
                source: e,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_kinds() {
        assert_eq!(
            DocumentKind::detect(Path::new("labs.pdf")).unwrap(),
            DocumentKind::Pdf
        );
        assert_eq!(
            DocumentKind::detect(Path::new("scan.PNG")).unwrap(),
            DocumentKind::Image
        );
        assert_eq!(
            DocumentKind::detect(Path::new("photo.jpeg")).unwrap(),
            DocumentKind::Image
        );
        assert_eq!(
            DocumentKind::detect(Path::new("scan.tiff")).unwrap(),
            DocumentKind::Image
        );
    }

    #[test]
    fn test_detect_unsupported() {
        match DocumentKind::detect(Path::new("notes.docx")) {
            Err(ExtractionError::UnsupportedFormat(_)) => {}
            other => panic!("expected UnsupportedFormat, got {:?}", other),
        }
        match DocumentKind::detect(Path::new("no_extension")) {
            Err(ExtractionError::UnsupportedFormat(ext)) => assert_eq!(ext, "<none>"),
            other => panic!("expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_default_options() {
        let options = ExtractorOptions::default();
        assert_eq!(options.dpi, 300);
        assert!(!options.offline);
        assert!(options.scratch_root.is_none());
    }
}
