#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use daynews::config::AppConfig;
use daynews::traits::{ConversionRequest, ConversionTool, FeedSource, ToolRun};
use daynews::types::{DayNewsError, FeedConfig, MailTransport, OutgoingMail, RawEntry, Result};
use daynews::{Collaborators, DeliveryMode, Orchestrator};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use tracing_subscriber::fmt::MakeWriter;

static INIT: Once = Once::new();

/// In-memory log sink shared with a thread-local subscriber.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl std::io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: self.buffer.clone(),
        }
    }
}

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }

    /// Lines that start a new event; continuation lines of multi-line
    /// messages are folded into the event before them.
    pub fn events(&self) -> Vec<String> {
        let mut events: Vec<String> = Vec::new();
        for line in self.contents().lines() {
            // fmt pads the level to five columns
            let starts_event = ["TRACE", "DEBUG", " INFO", " WARN", "ERROR"]
                .iter()
                .any(|level| line.starts_with(level));
            match events.last_mut() {
                Some(last) if !starts_event => {
                    last.push('\n');
                    last.push_str(line);
                }
                _ => events.push(line.to_string()),
            }
        }
        events
    }
}

/// Capture every event on the current thread until the guard drops.
/// Tokio tests run on a current-thread runtime, so the whole run is seen.
pub fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .with_writer(capture.clone())
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// `count` dated entries for `label`, one hour apart, newest first.
pub fn entries(label: &str, count: usize, newest: DateTime<Utc>) -> Vec<RawEntry> {
    (0..count)
        .map(|i| RawEntry {
            link: format!("https://{}.example.com/story/{}", label.to_lowercase(), i),
            title: format!("{} story {}", label, i),
            body: format!("<p>Body of {} story {}</p>", label, i),
            published_at: Some(newest - Duration::hours(i as i64)),
        })
        .collect()
}

#[derive(Clone)]
pub enum FakeFeed {
    Entries(Vec<RawEntry>),
    Fail(String),
    Hang,
}

/// Feed source serving canned answers keyed by feed label.
pub struct FakeFeedSource {
    feeds: HashMap<String, FakeFeed>,
    pub calls: AtomicUsize,
}

impl FakeFeedSource {
    pub fn new(feeds: Vec<(&str, FakeFeed)>) -> Self {
        Self {
            feeds: feeds.into_iter().map(|(l, f)| (l.to_string(), f)).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl FeedSource for FakeFeedSource {
    fn source_name(&self) -> String {
        "fake".to_string()
    }

    async fn fetch_entries(&self, feed: &FeedConfig) -> Result<Vec<RawEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.feeds.get(&feed.label) {
            Some(FakeFeed::Entries(entries)) => Ok(entries.clone()),
            Some(FakeFeed::Fail(reason)) => Err(DayNewsError::General(reason.clone())),
            Some(FakeFeed::Hang) => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            None => Err(DayNewsError::General("no such feed".to_string())),
        }
    }
}

#[derive(Clone, Copy)]
pub enum FakeConversion {
    Succeed,
    Exit(i32),
    Hang,
}

/// Converter that copies the intermediate document to the artifact path.
pub struct FakeConverter {
    behaviour: FakeConversion,
    pub calls: AtomicUsize,
    pub last_input: Mutex<Option<String>>,
}

impl FakeConverter {
    pub fn new(behaviour: FakeConversion) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
            last_input: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ConversionTool for FakeConverter {
    fn tool_name(&self) -> String {
        "fake-convert".to_string()
    }

    async fn run(&self, request: &ConversionRequest) -> Result<ToolRun> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let input = tokio::fs::read_to_string(&request.input_path).await?;
        *self.last_input.lock().unwrap() = Some(input);

        match self.behaviour {
            FakeConversion::Succeed => {
                tokio::fs::copy(&request.input_path, &request.output_path).await?;
                Ok(ToolRun {
                    exit_code: Some(0),
                    output: "Conversion successful".to_string(),
                })
            }
            FakeConversion::Exit(code) => Ok(ToolRun {
                exit_code: Some(code),
                output: "ValueError: no TOC found".to_string(),
            }),
            FakeConversion::Hang => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(ToolRun {
                    exit_code: Some(0),
                    output: String::new(),
                })
            }
        }
    }
}

/// Transport that records what it was asked to send.
pub struct RecordingTransport {
    fail_with: Option<String>,
    pub sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            fail_with: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl MailTransport for RecordingTransport {
    fn transport_name(&self) -> String {
        "recording".to_string()
    }

    fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(mail.clone());
        match &self.fail_with {
            Some(reason) => Err(anyhow::anyhow!("{}", reason)),
            None => Ok(()),
        }
    }
}

/// Write a config directory under `root` and load it.
/// `feeds` is `(name, max_articles)`; urls are synthesized.
pub fn write_config(root: &Path, feeds: &[(&str, usize)], pipeline_overrides: serde_json::Value) -> AppConfig {
    let config_dir = root.join("config");
    std::fs::create_dir_all(&config_dir).unwrap();

    let feeds_json: Vec<_> = feeds
        .iter()
        .map(|(name, max)| {
            json!({
                "name": name,
                "url": format!("https://{}.example.com/rss.xml", name.to_lowercase()),
                "max_articles": max,
            })
        })
        .collect();
    std::fs::write(config_dir.join("feeds.json"), serde_json::to_vec_pretty(&feeds_json).unwrap()).unwrap();

    let email = json!({
        "smtp_server": "smtp.example.com",
        "smtp_port": 587,
        "username": "daynews@example.com",
        "password": "testpassword",
        "from_email": "daynews@example.com",
        "to_email": "reader@kindle.example.com",
        "subject": "Test Subject",
        "message_body": "Test message body",
        "use_tls": true
    });
    std::fs::write(config_dir.join("email_config.json"), serde_json::to_vec_pretty(&email).unwrap()).unwrap();

    let mut pipeline = json!({
        "output_dir": root.join("output"),
        "log_dir": root.join("logs"),
        "lock_path": root.join("daynews.lock"),
        "feed_timeout_secs": 5,
        "run_budget_secs": 30,
    });
    if let (Some(base), Some(extra)) = (pipeline.as_object_mut(), pipeline_overrides.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    std::fs::write(config_dir.join("pipeline.json"), serde_json::to_vec_pretty(&pipeline).unwrap()).unwrap();

    AppConfig::load_with_password(&config_dir, None).expect("fixture config should load")
}

pub struct Harness {
    pub feeds: Arc<FakeFeedSource>,
    pub converter: Arc<FakeConverter>,
    pub transport: Arc<RecordingTransport>,
    pub orchestrator: Orchestrator,
}

pub fn harness(
    config: AppConfig,
    mode: DeliveryMode,
    feeds: FakeFeedSource,
    converter: FakeConverter,
    transport: RecordingTransport,
) -> Harness {
    let feeds = Arc::new(feeds);
    let converter = Arc::new(converter);
    let transport = Arc::new(transport);
    let orchestrator = Orchestrator::new(
        config,
        mode,
        Collaborators {
            feed_source: feeds.clone(),
            conversion_tool: converter.clone(),
            mail_transport: transport.clone(),
        },
    );
    Harness {
        feeds,
        converter,
        transport,
        orchestrator,
    }
}
