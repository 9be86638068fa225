use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::tools::{args, ToolRunner};
use crate::error::ExtractionError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct OcrError(pub String);

/// Recognizes text in a single page image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &Path) -> Result<String, OcrError>;
}

/// Joins configured languages the way tesseract expects (`eng+deu`).
pub fn language_spec(languages: &[String]) -> String {
    if languages.is_empty() {
        "eng".to_string()
    } else {
        languages.join("+")
    }
}

/// Makes sure the page is a decodable image before handing it to tesseract.
fn check_image(image: &Path) -> Result<(), OcrError> {
    image::image_dimensions(image)
        .map(|_| ())
        .map_err(|e| OcrError(format!("Failed to load image: {}", e)))
}

/// Runs the `tesseract` command line tool: `tesseract <image> stdout -l <langs>`.
#[derive(Clone)]
pub struct TesseractCli {
    runner: Arc<dyn ToolRunner>,
    languages: String,
}

impl TesseractCli {
    pub fn new(runner: Arc<dyn ToolRunner>, languages: &[String]) -> Self {
        Self {
            runner,
            languages: language_spec(languages),
        }
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(&self, image: &Path) -> Result<String, OcrError> {
        check_image(image)?;

        let tool_args = args([
            image.as_os_str(),
            OsStr::new("stdout"),
            OsStr::new("-l"),
            OsStr::new(&self.languages),
        ]);
        let output = self
            .runner
            .run("tesseract", &tool_args)
            .await
            .and_then(|o| o.require_success("tesseract"))
            .map_err(|e| OcrError(e.to_string()))?;

        Ok(output.stdout_lossy())
    }
}

/// In-process OCR through libtesseract.
#[cfg(feature = "leptess")]
#[derive(Clone)]
pub struct LeptessEngine {
    languages: String,
}

#[cfg(feature = "leptess")]
impl LeptessEngine {
    pub fn new(languages: &[String]) -> Self {
        Self {
            languages: language_spec(languages),
        }
    }

    fn recognize_blocking(languages: &str, image_data: &[u8]) -> Result<String, OcrError> {
        let img = image::load_from_memory(image_data)
            .map_err(|e| OcrError(format!("Failed to load image: {}", e)))?;

        let mut png_data = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut png_data),
            image::ImageFormat::Png,
        )
        .map_err(|e| OcrError(format!("Failed to convert image: {}", e)))?;

        let mut lt = leptess::LepTess::new(None, languages)
            .map_err(|e| OcrError(format!("Failed to initialize Tesseract: {}", e)))?;
        lt.set_image_from_mem(&png_data)
            .map_err(|e| OcrError(format!("Failed to set image for OCR: {}", e)))?;
        lt.get_utf8_text()
            .map_err(|e| OcrError(format!("OCR failed: {}", e)))
    }
}

#[cfg(feature = "leptess")]
#[async_trait]
impl OcrEngine for LeptessEngine {
    async fn recognize(&self, image: &Path) -> Result<String, OcrError> {
        let image_data = tokio::fs::read(image)
            .await
            .map_err(|e| OcrError(format!("Failed to read image: {}", e)))?;
        let languages = self.languages.clone();
        tokio::task::spawn_blocking(move || Self::recognize_blocking(&languages, &image_data))
            .await
            .map_err(|e| OcrError(format!("OCR task panicked: {}", e)))?
    }
}

/// OCRs pages one at a time, in order. Each page's text is followed by a
/// newline; the first failing page aborts the whole document.
pub async fn ocr_pages(engine: &dyn OcrEngine, pages: &[PathBuf]) -> Result<String, ExtractionError> {
    let mut all_text = String::new();

    for (index, page) in pages.iter().enumerate() {
        let page_num = index + 1;
        let text = engine
            .recognize(page)
            .await
            .map_err(|e| ExtractionError::OcrFailed {
                page: page_num,
                message: e.0,
            })?;
        log::debug!("OCR page {}: {} chars", page_num, text.len());
        all_text.push_str(&text);
        all_text.push('\n');
    }

    Ok(all_text)
}
