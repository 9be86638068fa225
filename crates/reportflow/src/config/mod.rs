//! Runtime settings, read from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::analysis::{ClientConfig, RetryPolicy};
use crate::db::{default_database_path, DatabaseLocation};
use crate::error::ConfigError;
use crate::logging::LogFormat;
use crate::processor::ExtractorOptions;
use crate::queue::QueueOptions;
use crate::secrets::SecretSource;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseLocation,
    /// Where `submit` stores incoming files before admission.
    pub upload_dir: PathBuf,
    pub client: ClientConfig,
    pub http_connect_timeout: Duration,
    pub http_request_timeout: Duration,
    pub extractor: ExtractorOptions,
    pub ocr_languages: Vec<String>,
    pub queue: QueueOptions,
    pub log_format: LogFormat,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let offline = get("USE_MOCK_AI")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let key_value = get("OPENAI_API_KEY");
        let key_file = get("OPENAI_API_KEY_FILE");
        let key_env = get("OPENAI_API_KEY_ENV");
        let source = SecretSource {
            value: key_value.as_deref(),
            file: key_file.as_deref(),
            env_var: key_env.as_deref(),
        };
        let api_key = if offline {
            source.resolve_optional()
        } else {
            source.resolve().map(Some)
        }
        .map_err(|e| match e {
            crate::secrets::SecretError::NoSourceProvided => ConfigError::MissingSetting {
                name: "OPENAI_API_KEY",
                hint: "set OPENAI_API_KEY, OPENAI_API_KEY_FILE or OPENAI_API_KEY_ENV, \
                       or USE_MOCK_AI=true for offline runs"
                    .to_string(),
            },
            other => ConfigError::Secret {
                name: "OPENAI_API_KEY",
                source: other,
            },
        })?;

        let client = ClientConfig {
            base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key,
            retry: RetryPolicy::default(),
            offline,
            offline_delay: Duration::from_millis(parse_u64(
                "MOCK_AI_DELAY_MS",
                get("MOCK_AI_DELAY_MS"),
                5000,
            )?),
        };

        let database = match get("DATABASE_URL") {
            Some(url) => DatabaseLocation::parse(&url),
            None => DatabaseLocation::File(default_database_path().ok_or_else(|| {
                ConfigError::MissingSetting {
                    name: "DATABASE_URL",
                    hint: "no home directory found for the default database path".to_string(),
                }
            })?),
        };

        let upload_dir = match get("UPLOAD_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .map(|h| h.join(".reportflow").join("uploads"))
                .ok_or_else(|| ConfigError::MissingSetting {
                    name: "UPLOAD_DIR",
                    hint: "no home directory found for the default upload directory".to_string(),
                })?,
        };

        let dpi = parse_u64("OCR_DPI", get("OCR_DPI"), 300)?;
        let dpi = u32::try_from(dpi)
            .ok()
            .filter(|d| (50..=1200).contains(d))
            .ok_or_else(|| ConfigError::InvalidSetting {
                name: "OCR_DPI",
                value: dpi.to_string(),
                reason: "must be between 50 and 1200".to_string(),
            })?;

        let extractor = ExtractorOptions {
            dpi,
            scratch_root: get("SCRATCH_DIR").map(PathBuf::from),
            offline,
        };

        let poll = parse_u64("QUEUE_POLL_INTERVAL_SECS", get("QUEUE_POLL_INTERVAL_SECS"), 5)?;
        if poll == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "QUEUE_POLL_INTERVAL_SECS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let queue = QueueOptions {
            poll_interval: Duration::from_secs(poll),
            lock_lifetime: Duration::from_secs(parse_u64(
                "QUEUE_LOCK_LIFETIME_SECS",
                get("QUEUE_LOCK_LIFETIME_SECS"),
                600,
            )?),
        };

        let log_format = match get("LOG_FORMAT") {
            Some(v) => v.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            database,
            upload_dir,
            client,
            http_connect_timeout: Duration::from_secs(10),
            http_request_timeout: Duration::from_secs(120),
            extractor,
            ocr_languages: parse_languages(get("OCR_LANGUAGES").as_deref()),
            queue,
            log_format,
        })
    }
}

fn parse_u64(name: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| ConfigError::InvalidSetting {
            name,
            value: v,
            reason: "expected a non-negative integer".to_string(),
        }),
    }
}

/// Splits `eng+deu` or `eng, deu` into language codes.
pub fn parse_languages(value: Option<&str>) -> Vec<String> {
    let langs: Vec<String> = value
        .unwrap_or_default()
        .split(['+', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if langs.is_empty() {
        vec!["eng".to_string()]
    } else {
        langs
    }
}
