pub mod admission;
pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod processor;
pub mod queue;
pub mod redact;
pub mod sanitize;
pub mod secrets;

pub use admission::{Admission, AdmissionError};
pub use analysis::{ExtractionClient, ExtractionServiceError, LabReport, ServiceErrorKind};
pub use config::Settings;
pub use db::{Database, DatabaseError, DatabaseLocation};
pub use error::{ConfigError, ExtractionError, QueueError, ReportflowError, Result};
pub use job::{JobRecord, JobStatus, JobStore, StoreError};
pub use pipeline::{Outcome, PipelineError, ReportPipeline};
pub use processor::{ExtractorOptions, TextExtractor};
pub use queue::{QueueOptions, QueueState, Task, TaskHandler, TaskQueue};
pub use redact::redact;
pub use secrets::{SecretError, SecretSource};
