//! In-process stand-ins for the external tools, the OCR engine and the
//! upstream service.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::SecretString;

use reportflow::analysis::{CompletionTransport, HttpResponse, TransportError};
use reportflow::processor::ocr::{OcrEngine, OcrError};
use reportflow::processor::tools::{ToolError, ToolOutput, ToolRunner};

/// Pretends to be qpdf, gs and pdftoppm.
///
/// Programs not marked installed fail with "not found". Repair tools copy
/// their input unchanged; the rasterizer writes `pages` blank PNG files.
pub struct FakeTools {
    installed: HashSet<String>,
    pages: usize,
    calls: Mutex<Vec<String>>,
    raster_dirs: Mutex<Vec<PathBuf>>,
}

impl FakeTools {
    pub fn with(installed: &[&str], pages: usize) -> Self {
        Self {
            installed: installed.iter().map(|s| s.to_string()).collect(),
            pages,
            calls: Mutex::new(Vec::new()),
            raster_dirs: Mutex::new(Vec::new()),
        }
    }

    pub fn none() -> Self {
        Self::with(&[], 0)
    }

    pub fn all(pages: usize) -> Self {
        Self::with(&["qpdf", "gs", "pdftoppm"], pages)
    }

    /// Program names in invocation order, probes included.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Directories the rasterizer wrote into.
    pub fn raster_dirs(&self) -> Vec<PathBuf> {
        self.raster_dirs.lock().unwrap().clone()
    }

    fn rasterize(&self, args: &[OsString]) -> ToolOutput {
        let prefix = PathBuf::from(args.last().unwrap());
        let dir = prefix.parent().unwrap().to_path_buf();
        for page in 1..=self.pages {
            let file = dir.join(format!("page-{}.png", page));
            std::fs::write(&file, b"png").unwrap();
        }
        self.raster_dirs.lock().unwrap().push(dir);
        ToolOutput {
            status: Some(0),
            ..Default::default()
        }
    }

    fn copy(&self, input: &OsString, output: &OsString) -> ToolOutput {
        std::fs::copy(input, output).unwrap();
        ToolOutput {
            status: Some(0),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ToolRunner for FakeTools {
    async fn run(&self, program: &str, args: &[OsString]) -> Result<ToolOutput, ToolError> {
        self.calls.lock().unwrap().push(program.to_string());
        if !self.installed.contains(program) {
            return Err(ToolError::NotFound {
                program: program.to_string(),
            });
        }

        let is_probe = args.len() == 1;
        if is_probe {
            return Ok(ToolOutput {
                status: Some(0),
                ..Default::default()
            });
        }

        Ok(match program {
            "pdftoppm" => self.rasterize(args),
            "qpdf" => self.copy(&args[0], &args[1]),
            "gs" => self.copy(args.last().unwrap(), &args[1]),
            _ => ToolOutput {
                status: Some(1),
                ..Default::default()
            },
        })
    }
}

/// Returns `OCR <file stem>` for each image; can be told to fail on a page.
#[derive(Default)]
pub struct FakeOcr {
    fail_on: Option<String>,
    seen: Mutex<Vec<PathBuf>>,
}

impl FakeOcr {
    pub fn failing_on(stem: &str) -> Self {
        Self {
            fail_on: Some(stem.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl OcrEngine for FakeOcr {
    async fn recognize(&self, image: &Path) -> Result<String, OcrError> {
        self.seen.lock().unwrap().push(image.to_path_buf());
        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_on.as_deref() == Some(stem.as_str()) {
            return Err(OcrError(format!("unreadable image {}", stem)));
        }
        Ok(format!("OCR {}", stem))
    }
}

/// Plays back canned responses in order; the last one repeats.
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<serde_json::Value>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Result<HttpResponse, TransportError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(status: u16, body: &str) -> Self {
        Self::new(vec![Ok(response(status, body))])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<serde_json::Value> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn post_json(
        &self,
        _url: &str,
        _api_key: &SecretString,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(body.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            responses.front().cloned().unwrap()
        }
    }
}

pub fn response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        body: body.to_string(),
    }
}

/// A successful chat completion whose message content is `content`.
pub fn completion(content: &str) -> HttpResponse {
    response(
        200,
        &serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
        .to_string(),
    )
}
