//! Persistent job record store backed by the `reports` table.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use super::record::JobRecord;
use super::status::JobStatus;
use crate::analysis::LabReport;
use crate::db::report_repo::{self, ReportRow};
use crate::db::{Database, DatabaseError};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Report not found: {0}")]
    NotFound(String),

    #[error("Report not ready (status {status})")]
    NotReady { id: String, status: JobStatus },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub(crate) fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &'static str, s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::InvalidColumn {
            column,
            reason: format!("'{}': {}", s, e),
        })
}

fn to_row(record: &JobRecord) -> Result<ReportRow, DatabaseError> {
    let result = record
        .result
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DatabaseError::InvalidColumn {
            column: "result",
            reason: e.to_string(),
        })?;

    Ok(ReportRow {
        id: record.id.clone(),
        filename: record.filename.clone(),
        source_path: record.source_path.to_string_lossy().into_owned(),
        status: record.status.as_str().to_string(),
        result,
        error_message: record.error_message.clone(),
        created_at: format_timestamp(record.created_at),
        updated_at: format_timestamp(record.updated_at),
    })
}

fn from_row(row: ReportRow) -> Result<JobRecord, DatabaseError> {
    let status = row
        .status
        .parse::<JobStatus>()
        .map_err(|e| DatabaseError::InvalidColumn {
            column: "status",
            reason: e.to_string(),
        })?;
    let result = row
        .result
        .as_deref()
        .map(serde_json::from_str::<LabReport>)
        .transpose()
        .map_err(|e| DatabaseError::InvalidColumn {
            column: "result",
            reason: e.to_string(),
        })?;

    Ok(JobRecord {
        created_at: parse_timestamp("created_at", &row.created_at)?,
        updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        id: row.id,
        filename: row.filename,
        source_path: PathBuf::from(row.source_path),
        status,
        result,
        error_message: row.error_message,
    })
}

/// Job records persisted in SQLite. Cloning is cheap.
#[derive(Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Creates and persists a new `PENDING` record.
    pub fn create(&self, source_path: &Path) -> Result<JobRecord, StoreError> {
        let record = JobRecord::new(source_path);
        report_repo::insert(&self.db, &to_row(&record)?)?;
        log::debug!("Created report {} for {}", record.id, record.filename);
        Ok(record)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<JobRecord>, StoreError> {
        report_repo::find_by_id(&self.db, id)?
            .map(from_row)
            .transpose()
            .map_err(StoreError::from)
    }

    /// Writes the full record. Last writer wins.
    pub fn save(&self, record: &JobRecord) -> Result<(), StoreError> {
        report_repo::upsert(&self.db, &to_row(record)?)?;
        Ok(())
    }

    /// Writes the record only if the stored status is still `expected`.
    /// Returns `false` when another writer moved the record on first.
    pub fn save_if_status(
        &self,
        record: &JobRecord,
        expected: JobStatus,
    ) -> Result<bool, StoreError> {
        Ok(report_repo::update_if_status(
            &self.db,
            &to_row(record)?,
            expected.as_str(),
        )?)
    }

    /// Current status; deleted reports count as missing.
    pub fn status_of(&self, id: &str) -> Result<JobRecord, StoreError> {
        match self.find_by_id(id)? {
            Some(record) if record.status != JobStatus::Deleted => Ok(record),
            _ => Err(StoreError::NotFound(id.to_string())),
        }
    }

    /// The extracted values of a completed report.
    pub fn result_of(&self, id: &str) -> Result<LabReport, StoreError> {
        let record = self.status_of(id)?;
        match (record.status, record.result) {
            (JobStatus::Completed, Some(result)) => Ok(result),
            (status, _) => Err(StoreError::NotReady {
                id: id.to_string(),
                status,
            }),
        }
    }

    pub fn count_by_status(&self, status: JobStatus) -> Result<u64, StoreError> {
        Ok(report_repo::count_by_status(&self.db, status.as_str())?)
    }

    pub fn list_recent(&self, limit: u64) -> Result<Vec<JobRecord>, StoreError> {
        report_repo::list_recent(&self.db, limit)?
            .into_iter()
            .map(|row| from_row(row).map_err(StoreError::from))
            .collect()
    }
}
