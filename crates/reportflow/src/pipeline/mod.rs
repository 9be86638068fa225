//! Drives one report job from `PENDING` to `COMPLETED` or `FAILED`.

pub mod error;

pub use error::{PipelineError, StageError};

use async_trait::async_trait;
use tracing::Instrument;

use crate::analysis::{ExtractionClient, LabReport};
use crate::job::{JobRecord, JobStatus, JobStore};
use crate::processor::TextExtractor;
use crate::queue::{HandlerError, Task, TaskHandler};
use crate::redact;
use crate::sanitize::{hash_path, redact_path};

/// Message stored on a job whose previous worker died mid-run.
pub const INTERRUPTED_MESSAGE: &str = "processing was interrupted before completion";

/// What [`ReportPipeline::process`] did with a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No record with that id; it was removed before dispatch.
    Missing,
    /// Record was already `DELETED`, `COMPLETED` or `FAILED`.
    Skipped(JobStatus),
    Completed,
    Failed(String),
    /// Found `PROCESSING` at dispatch and marked `FAILED`.
    Interrupted,
    /// Another worker moved the record on while this run was in flight;
    /// this run's result was dropped.
    Superseded,
}

pub struct ReportPipeline {
    store: JobStore,
    extractor: TextExtractor,
    client: ExtractionClient,
}

impl ReportPipeline {
    pub fn new(store: JobStore, extractor: TextExtractor, client: ExtractionClient) -> Self {
        Self {
            store,
            extractor,
            client,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Runs the job identified by `job_id`.
    ///
    /// Stage failures end up on the record; only store failures are
    /// returned as errors.
    pub async fn process(&self, job_id: &str) -> Result<Outcome, PipelineError> {
        let Some(mut record) = self.store.find_by_id(job_id)? else {
            log::debug!("Report {} no longer exists, nothing to do", job_id);
            return Ok(Outcome::Missing);
        };

        match record.status {
            JobStatus::Pending => {}
            JobStatus::Processing => {
                log::warn!(
                    "Report {} was left PROCESSING by an earlier worker, marking it failed",
                    job_id
                );
                record.fail(INTERRUPTED_MESSAGE)?;
                return Ok(if self.finish(&record)? {
                    Outcome::Interrupted
                } else {
                    Outcome::Superseded
                });
            }
            status => {
                log::info!("Skipping report {} in state {}", job_id, status);
                return Ok(Outcome::Skipped(status));
            }
        }

        record.start_processing()?;
        if !self.store.save_if_status(&record, JobStatus::Pending)? {
            log::warn!("Report {} was picked up by another worker", job_id);
            return Ok(Outcome::Superseded);
        }

        let span = tracing::info_span!(
            "pipeline",
            job_id = %record.id,
            file = %redact_path(&record.source_path),
            path_hash = %hash_path(&record.source_path),
        );
        let result = self.run_stages(&record).instrument(span).await;

        let outcome = match result {
            Ok(report) => {
                record.complete(report)?;
                log::info!("Report {} completed", record.id);
                Outcome::Completed
            }
            Err(e) => {
                let message = e.to_string();
                log::error!("Report {} failed at {}: {}", record.id, e.stage(), message);
                record.fail(message.clone())?;
                Outcome::Failed(message)
            }
        };
        if !self.finish(&record)? {
            log::warn!(
                "Report {} was finished by another worker, dropping this run's result",
                record.id
            );
            return Ok(Outcome::Superseded);
        }

        Ok(outcome)
    }

    /// Writes the final state of a `PROCESSING` record, retrying once on a
    /// store failure. Returns `false` if the record had already left
    /// `PROCESSING`.
    fn finish(&self, record: &JobRecord) -> Result<bool, PipelineError> {
        match self.store.save_if_status(record, JobStatus::Processing) {
            Ok(saved) => Ok(saved),
            Err(first) => {
                log::warn!(
                    "Saving final state of report {} failed, retrying: {}",
                    record.id,
                    first
                );
                self.store
                    .save_if_status(record, JobStatus::Processing)
                    .map_err(|source| PipelineError::Unfinished {
                        job_id: record.id.clone(),
                        source,
                    })
            }
        }
    }

    async fn run_stages(&self, record: &JobRecord) -> Result<LabReport, StageError> {
        let text = self
            .extractor
            .extract_text(&record.source_path)
            .instrument(tracing::info_span!("extract"))
            .await?;
        log::debug!("Extracted {} chars from {}", text.len(), record.filename);

        let redacted = {
            let _step = tracing::info_span!("redact").entered();
            let (redacted, stats) = redact::redact_with_stats(&text);
            log::debug!(
                "Redacted {} item(s): {} email(s), {} phone(s), {} name(s)",
                stats.total(),
                stats.emails,
                stats.phones,
                stats.names
            );
            redacted
        };

        let report = self
            .client
            .extract(&redacted)
            .instrument(tracing::info_span!("analyze"))
            .await?;
        Ok(report)
    }
}

#[async_trait]
impl TaskHandler for ReportPipeline {
    async fn handle(&self, task: &Task) -> Result<(), HandlerError> {
        self.process(&task.job_id).await?;
        Ok(())
    }
}
