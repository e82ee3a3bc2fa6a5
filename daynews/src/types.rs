use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;
// Use the interfaces crate for types shared with the mail transport
pub use interfaces::defs::{Article, MailAttachment, MailTransport, OutgoingMail};

/// One configured feed and its selection rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(rename = "name")]
    pub label: String,
    pub url: String,
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
    #[serde(default)]
    pub max_age_hours: Option<u32>,
}

fn default_max_articles() -> usize {
    10
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "DayNews/0.1".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_seconds: 2,
            max_feed_size_mb: 10,
            max_redirects: 5,
        }
    }
}

impl FetchConfig {
    /// Longest backoff interval between attempts.
    pub fn max_retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds.max(1) * 32)
    }

    /// Upper bound for one feed across every attempt: each attempt may use
    /// the full client timeout, plus the jittered backoff sleeps between them.
    pub fn total_budget(&self) -> Duration {
        let attempts = self.max_retries + 1;
        let mut budget = Duration::from_secs(self.timeout_seconds).saturating_mul(attempts);
        let mut interval = Duration::from_secs(self.retry_delay_seconds);
        for _ in 0..self.max_retries {
            // Backoff randomizes each interval by up to 50%
            budget = budget.saturating_add(interval.min(self.max_retry_interval()).mul_f64(1.5));
            interval = interval.saturating_mul(2);
        }
        budget
    }
}

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    pub fetch_time: DateTime<Utc>,
    pub response_time_ms: u64,
    pub http_status: Option<u16>,
    pub content: String,
}

#[derive(Debug)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<RawEntry>,
    pub skipped_without_link: usize,
}

/// A feed entry as parsed, before selection rules are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub link: String,
    pub title: String,
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// The merged edition handed to the conversion step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledDocument {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<FeedSection>,
}

impl CompiledDocument {
    pub fn article_count(&self) -> usize {
        self.sections.iter().map(|s| s.articles.len()).sum()
    }

    pub fn articles(&self) -> impl Iterator<Item = &Article> {
        self.sections.iter().flat_map(|s| s.articles.iter())
    }
}

/// One feed's group of articles inside a compiled document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedSection {
    pub label: String,
    pub articles: Vec<Article>,
    pub fetch_error: Option<String>,
}

/// Lightweight summary written next to the intermediate document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentManifest {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub article_counts: Vec<(String, usize)>,
}

#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub document: CompiledDocument,
    pub manifest: DocumentManifest,
    pub document_path: PathBuf,
    pub manifest_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub artifact_path: PathBuf,
    pub tool_exit_code: Option<i32>,
    pub tool_output: String,
}

impl ConversionResult {
    pub fn succeeded(&self) -> bool {
        self.tool_exit_code == Some(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Live,
    DryRun,
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryMode::Live => write!(f, "live"),
            DeliveryMode::DryRun => write!(f, "dry-run"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub recipients: Vec<String>,
    pub attachment_name: String,
    pub attachment_size: usize,
    pub mode: DeliveryMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    PartialFailure,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "Success"),
            RunStatus::PartialFailure => write!(f, "PartialFailure"),
            RunStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedOutcome {
    ArticleCount(usize),
    FetchError(String),
}

impl std::fmt::Display for FeedOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedOutcome::ArticleCount(count) => write!(f, "{} articles", count),
            FeedOutcome::FetchError(reason) => write!(f, "error ({})", reason),
        }
    }
}

/// Accumulated record of one run, owned by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: Option<RunStatus>,
    pub feed_order: Vec<String>,
    pub per_feed_outcomes: BTreeMap<String, FeedOutcome>,
    pub artifact_path: Option<PathBuf>,
    pub failure_reason: Option<String>,
}

impl RunRecord {
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: None,
            status: None,
            feed_order: Vec::new(),
            per_feed_outcomes: BTreeMap::new(),
            artifact_path: None,
            failure_reason: None,
        }
    }

    pub fn record_feed(&mut self, label: &str, outcome: FeedOutcome) {
        if !self.per_feed_outcomes.contains_key(label) {
            self.feed_order.push(label.to_string());
        }
        self.per_feed_outcomes.insert(label.to_string(), outcome);
    }

    /// Feed outcomes in configured order.
    pub fn outcomes_in_order(&self) -> Vec<(&str, &FeedOutcome)> {
        self.feed_order
            .iter()
            .filter_map(|label| {
                self.per_feed_outcomes
                    .get(label)
                    .map(|outcome| (label.as_str(), outcome))
            })
            .collect()
    }

    pub fn failed_feed_count(&self) -> usize {
        self.per_feed_outcomes
            .values()
            .filter(|o| matches!(o, FeedOutcome::FetchError(_)))
            .count()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DayNewsError {
    #[error("Feed '{label}' unavailable: {reason}")]
    FeedUnavailable { label: String, reason: String },

    #[error("Conversion failed (exit code {exit_code:?}): {reason}")]
    ConversionFailed {
        exit_code: Option<i32>,
        reason: String,
        output: String,
    },

    #[error("Delivery failed via {transport}: {reason}")]
    DeliveryFailed { transport: String, reason: String },

    #[error("Run lock {path:?} is held by pid {holder_pid:?} (run {holder_run:?})")]
    LockContended {
        path: PathBuf,
        holder_pid: Option<u32>,
        holder_run: Option<String>,
    },

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Run exceeded its {seconds}s budget")]
    RunTimedOut { seconds: u64 },

    #[error("Run interrupted by {0}")]
    Interrupted(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, DayNewsError>;
