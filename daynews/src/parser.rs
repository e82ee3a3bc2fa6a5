use crate::types::{DayNewsError, ParsedFeed, RawEntry, Result};
use feed_rs::parser;
use tracing::debug;

pub struct FeedParser;

impl FeedParser {
    /// Parse RSS, Atom or JSON Feed content into raw entries in document order.
    pub fn parse_feed(content: &str) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let normalized = Self::normalize_encoding(content)?;
        let feed = parser::parse(normalized.as_bytes())
            .map_err(|e| DayNewsError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| t.content);

        let mut entries = Vec::new();
        let mut skipped_without_link = 0;

        for entry in feed.entries {
            match Self::parse_entry(entry) {
                Some(parsed_entry) => entries.push(parsed_entry),
                None => skipped_without_link += 1,
            }
        }

        debug!(
            "Parsed feed with {} entries ({} without a link)",
            entries.len(),
            skipped_without_link
        );

        Ok(ParsedFeed {
            title,
            entries,
            skipped_without_link,
        })
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> Option<RawEntry> {
        // Get the primary link; it is the entry's identity within a run
        let link = entry.links.first()?.href.trim().to_string();
        if link.is_empty() {
            return None;
        }

        let title = entry
            .title
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        let summary = entry.summary.map(|s| s.content);

        // Prefer full content over summary
        let body = entry
            .content
            .and_then(|c| c.body)
            .or(summary)
            .unwrap_or_default();

        // Fall back to the update time when no publication time is given
        let published_at = entry.published.or(entry.updated);

        Some(RawEntry {
            link,
            title,
            body,
            published_at,
        })
    }

    pub fn normalize_encoding(content: &str) -> Result<String> {
        // Strip a leading BOM and stray whitespace before the XML declaration
        let normalized = content.trim_start_matches('\u{feff}').trim();

        if normalized.is_empty() {
            return Err(DayNewsError::Parse("Empty feed document".to_string()));
        }

        Ok(normalized.to_string())
    }
}
