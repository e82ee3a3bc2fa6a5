//! Per-feed selection rules.
//!
//! Turns raw entries into [`Article`]s: duplicate links are dropped (first
//! occurrence wins), entries older than `max_age_hours` are dropped, the rest
//! are ordered newest first and cut to `max_articles`. An entry without a
//! timestamp counts as the newest and is never dropped by the age rule.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::types::{Article, FeedConfig, RawEntry};

pub fn normalize(feed: &FeedConfig, entries: Vec<RawEntry>, run_started_at: DateTime<Utc>) -> Vec<Article> {
    let total = entries.len();

    let unique = deduplicate(entries);
    let duplicates = total - unique.len();

    let cutoff = feed
        .max_age_hours
        .map(|hours| run_started_at - Duration::hours(i64::from(hours)));
    let mut fresh: Vec<RawEntry> = unique
        .into_iter()
        .filter(|entry| match (cutoff, entry.published_at) {
            (Some(cutoff), Some(published)) => published >= cutoff,
            _ => true,
        })
        .collect();
    let too_old = total - duplicates - fresh.len();

    // Stable: equal timestamps keep feed order
    fresh.sort_by(|a, b| newest_first(a.published_at, b.published_at));
    fresh.truncate(feed.max_articles);

    debug!(
        "Feed '{}': {} raw, {} duplicate, {} too old, {} selected",
        feed.label,
        total,
        duplicates,
        too_old,
        fresh.len()
    );

    fresh
        .into_iter()
        .map(|entry| Article {
            title: entry.title,
            link: entry.link,
            published_at: entry.published_at,
            body: entry.body,
            source_label: feed.label.clone(),
        })
        .collect()
}

fn deduplicate(entries: Vec<RawEntry>) -> Vec<RawEntry> {
    let mut seen_links = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen_links.insert(entry.link.clone()))
        .collect()
}

/// Undated entries sort before dated ones; dated ones newest first.
fn newest_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => b.cmp(&a),
    }
}
