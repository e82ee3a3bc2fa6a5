use crate::traits::FeedSource;
use crate::types::{FeedConfig, FetchConfig, RawEntry, Result};
use crate::{FeedParser, Fetcher};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Feed source that downloads over HTTP(S) and parses with feed-rs
pub struct HttpFeedSource {
    fetcher: Fetcher,
}

impl HttpFeedSource {
    pub fn new(fetch_config: FetchConfig) -> Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new(fetch_config)?,
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    fn source_name(&self) -> String {
        format!("http ({})", self.fetcher.config().user_agent)
    }

    async fn fetch_entries(&self, feed: &FeedConfig) -> Result<Vec<RawEntry>> {
        debug!("Pulling feed '{}': {}", feed.label, feed.url);

        let fetch_result = self.fetcher.fetch_feed(&feed.url).await?;
        let parsed_feed = FeedParser::parse_feed(&fetch_result.content)?;

        if parsed_feed.skipped_without_link > 0 {
            warn!(
                "Feed '{}' had {} entries without a link; they were skipped",
                feed.label, parsed_feed.skipped_without_link
            );
        }

        debug!(
            "Feed '{}' ({}) answered HTTP {:?} in {}ms with {} entries",
            feed.label,
            parsed_feed.title.as_deref().unwrap_or("untitled"),
            fetch_result.http_status,
            fetch_result.response_time_ms,
            parsed_feed.entries.len()
        );

        Ok(parsed_feed.entries)
    }
}
