//! Isolated environment for integration tests: temp directories, an
//! in-memory database and the fakes from [`super::fakes`] wired into the
//! real components.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tempfile::TempDir;

use reportflow::analysis::{ClientConfig, CompletionTransport, RetryPolicy};
use reportflow::processor::ocr::OcrEngine;
use reportflow::processor::tools::ToolRunner;
use reportflow::{
    Admission, Database, ExtractionClient, ExtractorOptions, JobStore, QueueOptions,
    ReportPipeline, TaskQueue, TextExtractor,
};

use super::fakes::{FakeOcr, FakeTools, ScriptedTransport};

pub struct TestHarness {
    temp_dir: TempDir,
    pub input_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub db: Database,
    pub store: JobStore,
    pub tools: Arc<FakeTools>,
    pub ocr: Arc<FakeOcr>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_fakes(FakeTools::all(2), FakeOcr::default())
    }

    pub fn with_fakes(tools: FakeTools, ocr: FakeOcr) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let input_dir = temp_dir.path().join("uploads");
        let scratch_dir = temp_dir.path().join("scratch");
        std::fs::create_dir_all(&input_dir).expect("Failed to create upload dir");
        std::fs::create_dir_all(&scratch_dir).expect("Failed to create scratch dir");

        let db = Database::open_in_memory().expect("Failed to open database");
        let store = JobStore::new(db.clone());

        Self {
            temp_dir,
            input_dir,
            scratch_dir,
            db,
            store,
            tools: Arc::new(tools),
            ocr: Arc::new(ocr),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn write_input(&self, filename: &str, content: &[u8]) -> PathBuf {
        let path = self.input_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write input file");
        path
    }

    pub fn runner(&self) -> Arc<dyn ToolRunner> {
        self.tools.clone()
    }

    pub fn extractor(&self, offline: bool) -> TextExtractor {
        let ocr: Arc<dyn OcrEngine> = self.ocr.clone();
        TextExtractor::new(
            self.runner(),
            ocr,
            ExtractorOptions {
                dpi: 150,
                scratch_root: Some(self.scratch_dir.clone()),
                offline,
            },
        )
    }

    /// Online client with immediate retries.
    pub fn client(&self, transport: Arc<ScriptedTransport>) -> ExtractionClient {
        let transport: Arc<dyn CompletionTransport> = transport;
        ExtractionClient::new(
            transport,
            ClientConfig {
                api_key: Some(SecretString::from("sk-test".to_string())),
                retry: RetryPolicy::immediate(3),
                ..Default::default()
            },
        )
    }

    pub fn offline_client(&self) -> ExtractionClient {
        ExtractionClient::new(
            Arc::new(ScriptedTransport::always(500, "offline clients never call out")),
            ClientConfig {
                offline: true,
                offline_delay: Duration::ZERO,
                ..Default::default()
            },
        )
    }

    pub fn pipeline(&self, transport: Arc<ScriptedTransport>) -> ReportPipeline {
        ReportPipeline::new(self.store.clone(), self.extractor(false), self.client(transport))
    }

    pub fn offline_pipeline(&self) -> ReportPipeline {
        ReportPipeline::new(self.store.clone(), self.extractor(true), self.offline_client())
    }

    pub fn queue(&self) -> TaskQueue {
        TaskQueue::new(
            self.db.clone(),
            QueueOptions {
                poll_interval: Duration::from_millis(20),
                lock_lifetime: Duration::from_secs(600),
            },
        )
    }

    pub fn admission(&self, queue: &TaskQueue, offline: bool) -> Admission {
        Admission::new(self.store.clone(), queue.clone(), self.runner(), offline)
    }

    /// Whatever is left behind in the scratch root.
    pub fn scratch_entries(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.scratch_dir)
            .expect("Failed to list scratch dir")
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect()
    }
}
