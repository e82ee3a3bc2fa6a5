use crate::traits::FeedSource;
use crate::types::{DayNewsError, FeedConfig, RawEntry, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Tagged outcome of fetching one configured feed
#[derive(Debug)]
pub struct FeedFetch {
    pub feed: FeedConfig,
    pub result: Result<Vec<RawEntry>>,
}

/// Runs the feed source over every configured feed with per-feed isolation.
pub struct FeedManager {
    source: Arc<dyn FeedSource>,
    feed_timeout: Duration,
    concurrent: bool,
}

impl FeedManager {
    pub fn new(source: Arc<dyn FeedSource>, feed_timeout: Duration, concurrent: bool) -> Self {
        Self {
            source,
            feed_timeout,
            concurrent,
        }
    }

    /// Fetch every feed. The returned outcomes follow `feeds` order no matter
    /// which fetch finished first, and no failure escapes as an `Err`.
    pub async fn fetch_all(&self, feeds: &[FeedConfig]) -> Vec<FeedFetch> {
        info!(
            "Fetching {} feeds via {} ({})",
            feeds.len(),
            self.source.source_name(),
            if self.concurrent { "concurrent" } else { "sequential" }
        );

        if self.concurrent {
            join_all(feeds.iter().map(|feed| self.fetch_one(feed))).await
        } else {
            let mut outcomes = Vec::with_capacity(feeds.len());
            for feed in feeds {
                outcomes.push(self.fetch_one(feed).await);
            }
            outcomes
        }
    }

    async fn fetch_one(&self, feed: &FeedConfig) -> FeedFetch {
        let started = Instant::now();
        let result =
            match tokio::time::timeout(self.feed_timeout, self.source.fetch_entries(feed)).await {
                Ok(Ok(entries)) => Ok(entries),
                Ok(Err(e)) => Err(unavailable(feed, e.to_string())),
                Err(_) => Err(unavailable(
                    feed,
                    format!("timed out after {}s", self.feed_timeout.as_secs()),
                )),
            };

        match &result {
            Ok(entries) => info!(
                "Fetched feed '{}': {} entries in {}ms",
                feed.label,
                entries.len(),
                started.elapsed().as_millis()
            ),
            Err(e) => error!("Error fetching feed '{}' from {}: {}", feed.label, feed.url, e),
        }

        FeedFetch {
            feed: feed.clone(),
            result,
        }
    }
}

fn unavailable(feed: &FeedConfig, reason: String) -> DayNewsError {
    DayNewsError::FeedUnavailable {
        label: feed.label.clone(),
        reason,
    }
}
