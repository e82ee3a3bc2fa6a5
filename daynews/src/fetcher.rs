use crate::types::{DayNewsError, FetchConfig, FetchResult, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use chrono::Utc;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch the raw feed body, retrying transport errors and non-success
    /// statuses with exponential backoff.
    pub async fn fetch_feed(&self, url: &str) -> Result<FetchResult> {
        let start_time = Instant::now();
        let fetch_time = Utc::now();

        debug!("Fetching feed: {}", url);

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: self.config.max_retry_interval(),
            multiplier: 2.0,
            max_elapsed_time: Some(self.config.total_budget()),
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.fetch_once(url).await {
                Ok((status, content)) => {
                    debug!("Fetched feed: {} ({} bytes)", url, content.len());
                    return Ok(FetchResult {
                        url: url.to_string(),
                        fetch_time,
                        response_time_ms: start_time.elapsed().as_millis() as u64,
                        http_status: Some(status),
                        content,
                    });
                }
                // An oversized feed will not shrink on retry
                Err(e @ DayNewsError::FeedTooLarge { .. }) => return Err(e),
                Err(e) => {
                    last_error = Some(e);
                }
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!(
                        "Attempt {} failed for {}, retrying in {:?}: {}",
                        attempt + 1,
                        url,
                        delay,
                        last_error.as_ref().map(|e| e.to_string()).unwrap_or_default()
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break;
        }

        Err(last_error.unwrap_or_else(|| DayNewsError::General("Unknown fetch error".to_string())))
    }

    async fn fetch_once(&self, url: &str) -> Result<(u16, String)> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(DayNewsError::General(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let limit = self.config.max_feed_size_mb * 1024 * 1024;
        if let Some(content_length) = response.content_length() {
            if content_length as usize > limit {
                return Err(too_large(content_length as usize));
            }
        }

        let bytes = response.bytes().await?;
        if bytes.len() > limit {
            return Err(too_large(bytes.len()));
        }

        Ok((status.as_u16(), String::from_utf8_lossy(&bytes).into_owned()))
    }
}

fn too_large(size: usize) -> DayNewsError {
    DayNewsError::FeedTooLarge {
        size_mb: size / (1024 * 1024),
    }
}
