//! Accepting new reports into the pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::job::{JobRecord, JobStore, StoreError};
use crate::processor::tools::ToolRunner;
use crate::processor::{pdf, raster, DocumentKind};
use crate::queue::TaskQueue;
use crate::sanitize::redact_path;

#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("'{filename}' is a scanned PDF with no embedded text and `pdftoppm` is not installed. {hint}")]
    ScannedPdfWithoutRasterizer { filename: String, hint: String },

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Admission {
    store: JobStore,
    queue: TaskQueue,
    runner: Arc<dyn ToolRunner>,
    offline: bool,
}

impl Admission {
    pub fn new(store: JobStore, queue: TaskQueue, runner: Arc<dyn ToolRunner>, offline: bool) -> Self {
        Self {
            store,
            queue,
            runner,
            offline,
        }
    }

    /// Registers an already stored file as a `PENDING` job and enqueues it.
    ///
    /// A scanned PDF that could never be processed here (no embedded text,
    /// no rasterizer) is rejected up front and its stored file removed.
    /// Enqueue failures leave the job `PENDING` and are not returned.
    pub async fn admit(&self, path: &Path) -> Result<JobRecord, AdmissionError> {
        if !self.offline && matches!(DocumentKind::detect(path), Ok(DocumentKind::Pdf)) {
            self.check_processable_pdf(path).await?;
        }

        let record = self.store.create(path)?;
        log::info!(
            "Admitted report {} ({})",
            record.id,
            redact_path(&record.source_path)
        );

        if let Err(e) = self.queue.enqueue(&record.id) {
            log::warn!(
                "Report {} stays PENDING, could not enqueue it: {}",
                record.id,
                e
            );
        }

        Ok(record)
    }

    async fn check_processable_pdf(&self, path: &Path) -> Result<(), AdmissionError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| io_error(path, e))?;

        if pdf::usable_native_text(&bytes).is_some() {
            return Ok(());
        }
        if self.runner.is_available(raster::RASTERIZER, "-v").await {
            return Ok(());
        }

        log::warn!(
            "Rejecting scanned PDF {}: {} is not available",
            redact_path(path),
            raster::RASTERIZER
        );
        if let Err(e) = tokio::fs::remove_file(path).await {
            log::warn!("Could not remove rejected upload {}: {}", redact_path(path), e);
        }

        Err(AdmissionError::ScannedPdfWithoutRasterizer {
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            hint: raster::install_hint(),
        })
    }
}

/// Copies `source` into `upload_dir` under a timestamp-prefixed name and
/// returns the stored path.
pub async fn stage_upload(source: &Path, upload_dir: &Path) -> Result<PathBuf, AdmissionError> {
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| io_error(upload_dir, e))?;

    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let target = upload_dir.join(format!("{}-{}", Utc::now().timestamp_millis(), name));

    tokio::fs::copy(source, &target)
        .await
        .map_err(|e| io_error(source, e))?;
    log::debug!("Stored upload as {}", redact_path(&target));
    Ok(target)
}

fn io_error(path: &Path, source: std::io::Error) -> AdmissionError {
    AdmissionError::Io {
        path: path.to_path_buf(),
        source,
    }
}
