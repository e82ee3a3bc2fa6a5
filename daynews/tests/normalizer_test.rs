use chrono::{DateTime, Duration, TimeZone, Utc};
use daynews::normalizer::normalize;
use daynews::types::{FeedConfig, RawEntry};

fn feed(max_articles: usize, max_age_hours: Option<u32>) -> FeedConfig {
    FeedConfig {
        label: "World".to_string(),
        url: "https://world.example.com/rss.xml".to_string(),
        max_articles,
        max_age_hours,
    }
}

fn entry(link: &str, title: &str, published_at: Option<DateTime<Utc>>) -> RawEntry {
    RawEntry {
        link: link.to_string(),
        title: title.to_string(),
        body: format!("<p>{}</p>", title),
        published_at,
    }
}

fn run_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 6, 0, 0).unwrap()
}

#[test]
fn test_sorts_newest_first_and_truncates() {
    let now = run_start();
    let entries = vec![
        entry("https://w/1", "old", Some(now - Duration::hours(10))),
        entry("https://w/2", "newest", Some(now - Duration::hours(1))),
        entry("https://w/3", "middle", Some(now - Duration::hours(5))),
    ];

    let articles = normalize(&feed(2, None), entries, now);

    let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["newest", "middle"]);
    assert!(articles.iter().all(|a| a.source_label == "World"));
}

#[test]
fn test_duplicate_links_keep_first_occurrence() {
    let now = run_start();
    let entries = vec![
        entry("https://w/same", "first copy", Some(now - Duration::hours(3))),
        entry("https://w/other", "other", Some(now - Duration::hours(2))),
        entry("https://w/same", "second copy", Some(now - Duration::hours(1))),
    ];

    let articles = normalize(&feed(10, None), entries, now);

    assert_eq!(articles.len(), 2);
    assert!(articles.iter().any(|a| a.title == "first copy"));
    assert!(!articles.iter().any(|a| a.title == "second copy"));
}

#[test]
fn test_max_age_drops_old_entries_but_keeps_undated() {
    let now = run_start();
    let entries = vec![
        entry("https://w/1", "fresh", Some(now - Duration::hours(2))),
        entry("https://w/2", "stale", Some(now - Duration::hours(30))),
        entry("https://w/3", "undated", None),
        entry("https://w/4", "boundary", Some(now - Duration::hours(24))),
    ];

    let articles = normalize(&feed(10, Some(24)), entries, now);

    let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["undated", "fresh", "boundary"]);
}

#[test]
fn test_undated_entries_sort_before_dated_in_feed_order() {
    let now = run_start();
    let entries = vec![
        entry("https://w/1", "dated", Some(now)),
        entry("https://w/2", "undated a", None),
        entry("https://w/3", "undated b", None),
    ];

    let articles = normalize(&feed(10, None), entries, now);

    let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["undated a", "undated b", "dated"]);
}

#[test]
fn test_equal_timestamps_keep_feed_order() {
    let now = run_start();
    let at = Some(now - Duration::hours(1));
    let entries = vec![
        entry("https://w/1", "b", at),
        entry("https://w/2", "a", at),
        entry("https://w/3", "c", at),
    ];

    let articles = normalize(&feed(10, None), entries, now);

    let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["b", "a", "c"]);
}

#[test]
fn test_empty_feed_yields_no_articles() {
    assert!(normalize(&feed(5, Some(12)), Vec::new(), run_start()).is_empty());
}

#[test]
fn test_same_input_same_output() {
    let now = run_start();
    let entries: Vec<_> = (0..8)
        .map(|i| {
            entry(
                &format!("https://w/{}", i % 6),
                &format!("story {}", i),
                Some(now - Duration::minutes(17 * i as i64)),
            )
        })
        .collect();

    let first = normalize(&feed(4, Some(2)), entries.clone(), now);
    let second = normalize(&feed(4, Some(2)), entries, now);
    assert_eq!(first, second);
    assert!(first.len() <= 4);
}
