//! Run configuration.
//!
//! Everything lives in one directory of JSON files:
//! - `feeds.json`: the ordered feed list with per-feed selection rules
//! - `email_config.json`: SMTP credentials, sender and recipients
//! - `pipeline.json`: optional tunables, every field defaulted
//!
//! Loading is all-or-nothing. Any problem surfaces as
//! [`DayNewsError::ConfigInvalid`] before the run touches anything.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use email_delivery::{parse_mailbox, SmtpMailerConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::rss_utils;
use crate::types::{DayNewsError, FeedConfig, FetchConfig, Result};

pub const FEEDS_FILE: &str = "feeds.json";
pub const EMAIL_FILE: &str = "email_config.json";
pub const PIPELINE_FILE: &str = "pipeline.json";

/// Environment variable that overrides the SMTP password from the file.
pub const PASSWORD_ENV: &str = "DAYNEWS_SMTP_PASSWORD";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Recipients {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Recipients::One(address) => vec![address.clone()],
            Recipients::Many(addresses) => addresses.clone(),
        }
    }
}

/// `email_config.json`.
#[derive(Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub from_email: String,
    pub to_email: Recipients,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_message_body")]
    pub message_body: String,
    #[serde(default = "default_true")]
    pub use_tls: bool,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("from_email", &self.from_email)
            .field("to_email", &self.to_email)
            .field("subject", &self.subject)
            .field("use_tls", &self.use_tls)
            .finish()
    }
}

fn default_subject() -> String {
    "Your DayNews Digest".into()
}
fn default_message_body() -> String {
    "Here is your daily news digest.".into()
}
fn default_true() -> bool {
    true
}
fn default_smtp_timeout() -> u64 {
    60
}

impl EmailConfig {
    pub fn recipients(&self) -> Vec<String> {
        self.to_email.to_vec()
    }

    pub fn smtp_config(&self) -> SmtpMailerConfig {
        SmtpMailerConfig {
            server: self.smtp_server.clone(),
            port: self.smtp_port,
            username: self.username.clone(),
            password: self.password.clone(),
            use_tls: self.use_tls,
            timeout_secs: self.timeout_secs,
        }
    }
}

/// `pipeline.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    pub lock_path: PathBuf,
    pub digest_title: String,
    pub feed_timeout_secs: u64,
    pub fetch_retries: u32,
    pub retry_delay_secs: u64,
    pub user_agent: String,
    pub max_feed_size_mb: usize,
    pub concurrent_fetch: bool,
    pub converter_program: String,
    pub converter_flags: Vec<String>,
    pub conversion_timeout_secs: u64,
    pub output_format: String,
    pub run_budget_secs: u64,
    pub stale_lock_max_age_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            log_dir: PathBuf::from("logs"),
            lock_path: PathBuf::from("daynews.lock"),
            digest_title: "DayNews Daily Digest".into(),
            feed_timeout_secs: 30,
            fetch_retries: 2,
            retry_delay_secs: 2,
            user_agent: "DayNews/0.1".into(),
            max_feed_size_mb: 10,
            concurrent_fetch: true,
            converter_program: "ebook-convert".into(),
            converter_flags: vec!["--output-profile=tablet".into()],
            conversion_timeout_secs: 600,
            output_format: "epub".into(),
            run_budget_secs: 1800,
            stale_lock_max_age_secs: 6 * 3600,
        }
    }
}

impl PipelineSettings {
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            user_agent: self.user_agent.clone(),
            timeout_seconds: self.feed_timeout_secs,
            max_retries: self.fetch_retries,
            retry_delay_seconds: self.retry_delay_secs,
            max_feed_size_mb: self.max_feed_size_mb,
            ..FetchConfig::default()
        }
    }

    /// `<output_dir>/DayNews_<date>.<format>`
    pub fn artifact_path(&self, date: NaiveDate) -> PathBuf {
        self.output_dir.join(format!(
            "DayNews_{}.{}",
            date.format("%Y-%m-%d"),
            self.output_format
        ))
    }
}

/// Fully loaded and validated configuration for one run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_dir: PathBuf,
    pub feeds: Vec<FeedConfig>,
    pub email: EmailConfig,
    pub pipeline: PipelineSettings,
}

impl AppConfig {
    /// Load from `config_dir`, honouring the password environment override.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let password_override = std::env::var(PASSWORD_ENV).ok().filter(|p| !p.is_empty());
        Self::load_with_password(config_dir, password_override)
    }

    pub fn load_with_password(config_dir: &Path, password_override: Option<String>) -> Result<Self> {
        info!("Loading configuration from {}", config_dir.display());

        let feeds: Vec<FeedConfig> = read_json(&config_dir.join(FEEDS_FILE))?
            .ok_or_else(|| missing(config_dir, FEEDS_FILE))?;
        let mut email: EmailConfig = read_json(&config_dir.join(EMAIL_FILE))?
            .ok_or_else(|| missing(config_dir, EMAIL_FILE))?;
        let pipeline: PipelineSettings =
            read_json(&config_dir.join(PIPELINE_FILE))?.unwrap_or_default();

        if let Some(password) = password_override {
            debug!("Using SMTP password from {}", PASSWORD_ENV);
            email.password = password;
        }

        let config = Self {
            config_dir: config_dir.to_path_buf(),
            feeds,
            email,
            pipeline,
        };
        config.validate()?;

        info!(
            "Loaded {} feeds, {} recipients",
            config.feeds.len(),
            config.email.recipients().len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut labels = HashSet::new();
        for feed in &self.feeds {
            if feed.label.trim().is_empty() {
                return Err(invalid(format!("feed with url '{}' has an empty name", feed.url)));
            }
            if !labels.insert(feed.label.as_str()) {
                return Err(invalid(format!("duplicate feed name '{}'", feed.label)));
            }
            if !rss_utils::url::is_valid_feed_url(&feed.url) {
                return Err(invalid(format!(
                    "feed '{}' has an invalid url '{}'",
                    feed.label, feed.url
                )));
            }
            if feed.max_articles == 0 {
                return Err(invalid(format!("feed '{}' has max_articles = 0", feed.label)));
            }
            if feed.max_age_hours == Some(0) {
                return Err(invalid(format!("feed '{}' has max_age_hours = 0", feed.label)));
            }
        }

        let email = &self.email;
        if email.smtp_server.trim().is_empty() {
            return Err(invalid("smtp_server is empty"));
        }
        if let Err(e) = parse_mailbox(&email.from_email) {
            return Err(invalid(format!("from_email: {}", e)));
        }
        let recipients = email.recipients();
        if recipients.is_empty() {
            return Err(invalid("to_email lists no recipients"));
        }
        for recipient in &recipients {
            if let Err(e) = parse_mailbox(recipient) {
                return Err(invalid(format!("to_email: {}", e)));
            }
        }

        let pipeline = &self.pipeline;
        if pipeline.feed_timeout_secs == 0
            || pipeline.conversion_timeout_secs == 0
            || pipeline.run_budget_secs == 0
        {
            return Err(invalid("timeouts must be greater than zero"));
        }
        if pipeline.converter_program.trim().is_empty() {
            return Err(invalid("converter_program is empty"));
        }
        if pipeline.output_format.trim().is_empty() {
            return Err(invalid("output_format is empty"));
        }

        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(invalid(format!("failed to read {}: {}", path.display(), e))),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| invalid(format!("failed to parse {}: {}", path.display(), e)))
}

fn missing(config_dir: &Path, file: &str) -> DayNewsError {
    invalid(format!("missing {}", config_dir.join(file).display()))
}

fn invalid(message: impl Into<String>) -> DayNewsError {
    DayNewsError::ConfigInvalid(message.into())
}
