use crate::types::{FeedConfig, RawEntry, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Trait for retrieving one configured feed (RSS, Atom, ...)
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Human-readable name for log lines
    fn source_name(&self) -> String;

    /// Fetch and parse the feed into raw entries in document order.
    /// Any failure is reported as an error for this feed only.
    async fn fetch_entries(&self, feed: &FeedConfig) -> Result<Vec<RawEntry>>;
}

/// What the conversion step asks of the external tool
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub title: String,
    pub format_flags: Vec<String>,
    pub timeout: Duration,
}

/// Exit status and combined output of one tool invocation
#[derive(Debug, Clone)]
pub struct ToolRun {
    /// `None` when the tool was killed by a signal
    pub exit_code: Option<i32>,
    pub output: String,
}

/// Out-of-process converter boundary
#[async_trait]
pub trait ConversionTool: Send + Sync {
    fn tool_name(&self) -> String;

    /// Run the tool once. Errors are reserved for failing to run it at all
    /// (missing program, timeout); a non-zero exit is a normal `ToolRun`.
    async fn run(&self, request: &ConversionRequest) -> Result<ToolRun>;
}
