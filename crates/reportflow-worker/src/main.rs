//! reportflow-worker: background worker and operator CLI.
//!
//! Settings come from the environment (see `reportflow::config`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::Notify;

use reportflow::admission::stage_upload;
use reportflow::analysis::{CompletionTransport, ReqwestTransport};
use reportflow::processor::ocr::OcrEngine;
use reportflow::processor::raster;
use reportflow::processor::tools::{SystemToolRunner, ToolRunner};
use reportflow::{
    logging, Admission, Database, ExtractionClient, JobStore, ReportPipeline, Settings, TaskQueue,
    TextExtractor,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "reportflow-worker")]
#[command(about = "Processes uploaded lab reports: OCR, redaction and value extraction")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the queue worker until interrupted
    Run,
    /// Store a report and queue it for processing
    Submit {
        /// PDF or image file
        file: PathBuf,
    },
    /// Print a job's status
    Status { id: String },
    /// Print a completed job's extracted values
    Result { id: String },
    /// List the most recently submitted jobs
    List {
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
    /// Process every due task once, then exit
    Drain,
    /// Report which external tools are installed
    CheckTools,
}

/// Probes for the external programs, with the argument each accepts.
const TOOLS: &[(&str, &str, &str)] = &[
    ("pdftoppm", "-v", "rasterizes scanned PDFs (required for OCR of PDFs)"),
    ("qpdf", "--version", "light PDF repair"),
    ("gs", "--version", "heavy PDF repair"),
    ("tesseract", "--version", "OCR engine"),
];

struct App {
    settings: Settings,
    store: JobStore,
    queue: TaskQueue,
    runner: Arc<dyn ToolRunner>,
    db: Database,
}

impl App {
    fn open(settings: Settings) -> CliResult<Self> {
        log::debug!("Opening database at {}", settings.database);
        let db = Database::open_location(&settings.database)?;
        let store = JobStore::new(db.clone());
        let queue = TaskQueue::new(db.clone(), settings.queue.clone());
        let runner: Arc<dyn ToolRunner> = Arc::new(SystemToolRunner);
        Ok(Self {
            settings,
            store,
            queue,
            runner,
            db,
        })
    }

    fn pipeline(&self) -> CliResult<ReportPipeline> {
        let transport: Arc<dyn CompletionTransport> = Arc::new(ReqwestTransport::new(
            self.settings.http_connect_timeout,
            self.settings.http_request_timeout,
        )?);
        let client = ExtractionClient::new(transport, self.settings.client.clone());
        let extractor = TextExtractor::new(
            self.runner.clone(),
            self.ocr_engine(),
            self.settings.extractor.clone(),
        );
        Ok(ReportPipeline::new(
            JobStore::new(self.db.clone()),
            extractor,
            client,
        ))
    }

    #[cfg(feature = "leptess")]
    fn ocr_engine(&self) -> Arc<dyn OcrEngine> {
        Arc::new(reportflow::processor::ocr::LeptessEngine::new(
            &self.settings.ocr_languages,
        ))
    }

    #[cfg(not(feature = "leptess"))]
    fn ocr_engine(&self) -> Arc<dyn OcrEngine> {
        Arc::new(reportflow::processor::ocr::TesseractCli::new(
            self.runner.clone(),
            &self.settings.ocr_languages,
        ))
    }

    fn admission(&self) -> Admission {
        Admission::new(
            self.store.clone(),
            self.queue.clone(),
            self.runner.clone(),
            self.settings.client.offline,
        )
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_tracing(settings.log_format) {
        eprintln!("Warning: {}", e);
    }

    let outcome = match App::open(settings) {
        Ok(app) => run_command(&app, cli.command).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_command(app: &App, command: Command) -> CliResult<()> {
    match command {
        Command::Run => run_worker(app).await,
        Command::Submit { file } => submit(app, &file).await,
        Command::Status { id } => {
            let record = app.store.status_of(&id)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Command::Result { id } => {
            let report = app.store.result_of(&id)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::List { limit } => {
            for record in app.store.list_recent(limit)? {
                println!(
                    "{}  {:<10}  {}  {}",
                    record.id,
                    record.status.as_str(),
                    record.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    record.filename
                );
            }
            Ok(())
        }
        Command::Drain => {
            let pipeline = app.pipeline()?;
            app.queue.attach()?;
            let processed = app.queue.run_pending(&pipeline).await?;
            println!("Processed {} task(s)", processed);
            Ok(())
        }
        Command::CheckTools => {
            check_tools(app).await;
            Ok(())
        }
    }
}

async fn run_worker(app: &App) -> CliResult<()> {
    if app.settings.client.offline {
        log::warn!("USE_MOCK_AI is set: no external tools or network calls will be made");
    } else if !app.runner.is_available(raster::RASTERIZER, "-v").await {
        log::warn!(
            "`{}` not found; scanned PDFs will fail. {}",
            raster::RASTERIZER,
            raster::install_hint()
        );
    }

    let stop = Arc::new(Notify::new());
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.notify_one())?;

    app.queue.start(Arc::new(app.pipeline()?))?;
    log::info!("Worker running, press Ctrl-C to stop");

    stop.notified().await;
    log::info!("Shutting down, waiting for the current job to finish");
    app.queue.shutdown().await;
    Ok(())
}

async fn submit(app: &App, file: &std::path::Path) -> CliResult<()> {
    let stored = stage_upload(file, &app.settings.upload_dir).await?;
    app.queue.attach()?;
    let record = app.admission().admit(&stored).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn check_tools(app: &App) {
    for (program, probe, purpose) in TOOLS {
        let found = app.runner.is_available(program, probe).await;
        println!(
            "{:<10} {:<8} {}",
            program,
            if found { "found" } else { "MISSING" },
            purpose
        );
        if !found && *program == raster::RASTERIZER {
            println!("           {}", raster::install_hint());
        }
    }
}
