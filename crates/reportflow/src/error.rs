use std::path::PathBuf;
use thiserror::Error;

use crate::processor::tools::ToolError;

#[derive(Error, Debug)]
pub enum ReportflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Extraction service error: {0}")]
    Service(#[from] crate::analysis::ExtractionServiceError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Store error: {0}")]
    Store(#[from] crate::job::StoreError),

    #[error("Admission error: {0}")]
    Admission(#[from] crate::admission::AdmissionError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting '{name}': {hint}")]
    MissingSetting { name: &'static str, hint: String },

    #[error("Invalid value '{value}' for setting '{name}': {reason}")]
    InvalidSetting {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to resolve secret '{name}': {source}")]
    Secret {
        name: &'static str,
        #[source]
        source: crate::secrets::SecretError,
    },
}

/// Stage of the extraction chain that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStage {
    Read,
    Native,
    Repair,
    Rasterize,
    Ocr,
}

impl ExtractionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStage::Read => "read",
            ExtractionStage::Native => "native",
            ExtractionStage::Repair => "repair",
            ExtractionStage::Rasterize => "rasterize",
            ExtractionStage::Ocr => "ocr",
        }
    }
}

impl std::fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to read document '{path}': {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse PDF: {0}")]
    NativeParse(String),

    #[error("Required binary `pdftoppm` not found. {hint}")]
    RasterizerMissing { hint: String },

    #[error("PDF conversion failed: {0}")]
    RasterizeFailed(#[source] ToolError),

    #[error("PDF conversion produced no images")]
    NoPagesProduced,

    #[error("OCR failed for page {page}: {message}")]
    OcrFailed { page: usize, message: String },

    #[error("Failed to prepare scratch directory under '{path}': {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractionError {
    /// Stable machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            ExtractionError::SourceUnreadable { .. } => "source_unreadable",
            ExtractionError::UnsupportedFormat(_) => "unsupported_format",
            ExtractionError::NativeParse(_) => "native_parse_failed",
            ExtractionError::RasterizerMissing { .. } => "rasterizer_missing",
            ExtractionError::RasterizeFailed(_) => "rasterize_failed",
            ExtractionError::NoPagesProduced => "no_pages_produced",
            ExtractionError::OcrFailed { .. } => "ocr_failed",
            ExtractionError::Scratch { .. } => "scratch_unavailable",
        }
    }

    pub fn stage(&self) -> ExtractionStage {
        match self {
            ExtractionError::SourceUnreadable { .. } | ExtractionError::UnsupportedFormat(_) => {
                ExtractionStage::Read
            }
            ExtractionError::NativeParse(_) => ExtractionStage::Native,
            ExtractionError::Scratch { .. } => ExtractionStage::Repair,
            ExtractionError::RasterizerMissing { .. }
            | ExtractionError::RasterizeFailed(_)
            | ExtractionError::NoPagesProduced => ExtractionStage::Rasterize,
            ExtractionError::OcrFailed { .. } => ExtractionStage::Ocr,
        }
    }

    /// Page number for per-page OCR failures.
    pub fn page(&self) -> Option<usize> {
        match self {
            ExtractionError::OcrFailed { page, .. } => Some(*page),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue not started: call start() or attach() before enqueueing")]
    NotStarted,

    #[error("Queue already started")]
    AlreadyStarted,

    #[error("Queue has been shut down")]
    Stopped,

    #[error("Queue storage failed: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

pub type Result<T> = std::result::Result<T, ReportflowError>;
