use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::status::{JobStatus, TransitionError};
use crate::analysis::LabReport;

/// A tracked report job.
///
/// State changes go through the methods below so that `result` and
/// `error_message` stay mutually exclusive and are only set on entry into
/// `COMPLETED` or `FAILED`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub filename: String,
    pub source_path: PathBuf,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<LabReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// A fresh `PENDING` job for the given stored file.
    pub fn new(source_path: &Path) -> Self {
        let now = Utc::now();
        let filename = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            filename,
            source_path: source_path.to_path_buf(),
            status: JobStatus::Pending,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn start_processing(&mut self) -> Result<(), TransitionError> {
        self.status = self.status.transition(JobStatus::Processing)?;
        self.result = None;
        self.error_message = None;
        self.touch();
        Ok(())
    }

    pub fn complete(&mut self, result: LabReport) -> Result<(), TransitionError> {
        self.status = self.status.transition(JobStatus::Completed)?;
        self.result = Some(result);
        self.error_message = None;
        self.touch();
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.status = self.status.transition(JobStatus::Failed)?;
        self.result = None;
        self.error_message = Some(message.into());
        self.touch();
        Ok(())
    }

    pub fn mark_deleted(&mut self) -> Result<(), TransitionError> {
        self.status = self.status.transition(JobStatus::Deleted)?;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
