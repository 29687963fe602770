//! Runtime configuration
//!
//! All knobs are read from environment variables with a `DOCSORT_` prefix
//! (a local `.env` is loaded at startup via dotenvy). Every setting has a
//! default so the pipeline can be constructed in tests with no environment
//! at all.

use crate::domain::DomainSet;
use crate::fusion::FusionConfig;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Top-level settings for the pipeline and its collaborators.
#[derive(Debug, Clone)]
pub struct Settings {
    pub inference: InferenceSettings,
    pub fileops: FileOpsSettings,
    pub persist: PersistSettings,
    pub intake: IntakeSettings,
    pub workflow: WorkflowSettings,
    pub fusion: FusionConfig,
    pub domains: DomainSet,
}

/// Inference collaborator (chat-completions endpoint) settings.
#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub vision_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub requests_per_second: f32,
    pub max_concurrent_requests: usize,
    pub max_retries: u32,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.groq.com/openai".to_string(),
            text_model: "llama-3.3-70b-versatile".to_string(),
            vision_model: "meta-llama/llama-4-scout-17b-16e-instruct".to_string(),
            max_tokens: 2048,
            temperature: 0.1,
            requests_per_second: 5.0,
            max_concurrent_requests: 10,
            max_retries: 2,
        }
    }
}

/// File-operations collaborator (remote placement protocol) settings.
#[derive(Debug, Clone)]
pub struct FileOpsSettings {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for FileOpsSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Persistence collaborator settings. `base_url` empty means disabled.
#[derive(Debug, Clone)]
pub struct PersistSettings {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for PersistSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Document intake and representation limits.
#[derive(Debug, Clone)]
pub struct IntakeSettings {
    pub input_folder: PathBuf,
    /// Pages considered for text extraction and page counting.
    pub max_pages: usize,
    /// Pages rendered as previews for the vision classifier.
    pub max_preview_pages: usize,
    /// Extracted text is truncated to this many chars.
    pub max_text_chars: usize,
    /// Documents over this size are rejected at representation time.
    pub max_file_size_bytes: u64,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            input_folder: PathBuf::from("./input_pdfs"),
            max_pages: 100,
            max_preview_pages: 3,
            max_text_chars: 50_000,
            max_file_size_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Workflow engine timing, retry, and concurrency settings.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Timeout for building the document representation.
    pub representation_timeout: Duration,
    /// Per-call timeout for the vision classifier.
    pub vision_timeout: Duration,
    /// Per-call timeout for the text classifier.
    pub text_timeout: Duration,
    /// Overall per-document deadline.
    pub document_deadline: Duration,
    /// Bounded retries for transient stage failures.
    pub max_retries: u32,
    /// Initial backoff between retries (doubles per attempt).
    pub retry_backoff: Duration,
    /// Maximum documents processed concurrently.
    pub max_concurrency: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            representation_timeout: Duration::from_secs(60),
            vision_timeout: Duration::from_secs(30),
            text_timeout: Duration::from_secs(30),
            document_deadline: Duration::from_secs(180),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            max_concurrency: 5,
        }
    }
}

impl Settings {
    /// Load settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let inference = InferenceSettings {
            api_key: env_str("DOCSORT_API_KEY", ""),
            base_url: env_str("DOCSORT_INFERENCE_URL", &InferenceSettings::default().base_url),
            text_model: env_str("DOCSORT_TEXT_MODEL", &InferenceSettings::default().text_model),
            vision_model: env_str(
                "DOCSORT_VISION_MODEL",
                &InferenceSettings::default().vision_model,
            ),
            max_tokens: env_parse("DOCSORT_MAX_TOKENS", 2048),
            temperature: env_parse("DOCSORT_TEMPERATURE", 0.1),
            requests_per_second: env_parse("DOCSORT_REQUESTS_PER_SECOND", 5.0),
            max_concurrent_requests: env_parse("DOCSORT_MAX_CONCURRENT_REQUESTS", 10),
            max_retries: env_parse("DOCSORT_INFERENCE_RETRIES", 2),
        };

        let fileops = FileOpsSettings {
            base_url: env_str("DOCSORT_FILEOPS_URL", &FileOpsSettings::default().base_url),
            timeout: env_millis("DOCSORT_FILEOPS_TIMEOUT_MS", 30_000),
        };

        let persist = PersistSettings {
            base_url: env_str("DOCSORT_PERSIST_URL", ""),
            timeout: env_millis("DOCSORT_PERSIST_TIMEOUT_MS", 10_000),
        };

        let intake = IntakeSettings {
            input_folder: PathBuf::from(env_str("DOCSORT_INPUT_FOLDER", "./input_pdfs")),
            max_pages: env_parse("DOCSORT_MAX_PAGES", 100),
            max_preview_pages: env_parse("DOCSORT_MAX_PREVIEW_PAGES", 3),
            max_text_chars: env_parse("DOCSORT_MAX_TEXT_CHARS", 50_000),
            max_file_size_bytes: env_parse("DOCSORT_MAX_FILE_SIZE_BYTES", 100 * 1024 * 1024),
        };

        let workflow = WorkflowSettings {
            representation_timeout: env_millis("DOCSORT_REPRESENTATION_TIMEOUT_MS", 60_000),
            vision_timeout: env_millis("DOCSORT_VISION_TIMEOUT_MS", 30_000),
            text_timeout: env_millis("DOCSORT_TEXT_TIMEOUT_MS", 30_000),
            document_deadline: env_millis("DOCSORT_DOCUMENT_DEADLINE_MS", 180_000),
            max_retries: env_parse("DOCSORT_MAX_RETRIES", 2),
            retry_backoff: env_millis("DOCSORT_RETRY_BACKOFF_MS", 500),
            max_concurrency: env_parse("DOCSORT_MAX_CONCURRENCY", 5),
        };

        let fusion = FusionConfig {
            vision_weight: env_parse("DOCSORT_VISION_WEIGHT", 0.5),
            text_weight: env_parse("DOCSORT_TEXT_WEIGHT", 0.5),
            tie_epsilon: env_parse("DOCSORT_TIE_EPSILON", 0.05),
            tie_break_penalty: env_parse("DOCSORT_TIE_BREAK_PENALTY", 0.85),
        };

        let domains = match env::var("DOCSORT_DOMAINS") {
            Ok(csv) if !csv.trim().is_empty() => DomainSet::from_csv(&csv),
            _ => DomainSet::default(),
        };

        Self {
            inference,
            fileops,
            persist,
            intake,
            workflow,
            fusion,
            domains,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inference: InferenceSettings::default(),
            fileops: FileOpsSettings::default(),
            persist: PersistSettings::default(),
            intake: IntakeSettings::default(),
            workflow: WorkflowSettings::default(),
            fusion: FusionConfig::default(),
            domains: DomainSet::default(),
        }
    }
}

fn env_str(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_parse(key, default_ms))
}
