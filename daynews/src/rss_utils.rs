/// Small helpers shared by the pipeline stages

/// URL utilities for feed configuration
pub mod url {
    use url::Url;

    /// Validate feed URL format: must parse and use http or https
    pub fn is_valid_feed_url(url_str: &str) -> bool {
        match Url::parse(url_str) {
            Ok(url) => (url.scheme() == "http" || url.scheme() == "https") && url.host_str().is_some(),
            Err(_) => false,
        }
    }
}

/// HTML helpers for the intermediate document
pub mod html {
    /// Escape text for use in element content and attribute values
    pub fn escape(text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => escaped.push_str("&amp;"),
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                '"' => escaped.push_str("&quot;"),
                '\'' => escaped.push_str("&#39;"),
                _ => escaped.push(c),
            }
        }
        escaped
    }

    /// Stable anchor id for a TOC target, e.g. `feed-2-article-3`
    pub fn anchor_id(feed_index: usize, article_index: Option<usize>) -> String {
        match article_index {
            Some(article_index) => format!("feed-{}-article-{}", feed_index + 1, article_index + 1),
            None => format!("feed-{}", feed_index + 1),
        }
    }
}

/// Time formatting for log lines
pub mod time {
    use std::time::Duration;

    /// Format duration in human-readable form
    pub fn format_duration(duration: Duration) -> String {
        let total_millis = duration.as_millis();
        let total_seconds = duration.as_secs();

        if total_seconds < 1 {
            format!("{}ms", total_millis)
        } else if total_seconds < 60 {
            format!("{:.1}s", duration.as_secs_f64())
        } else if total_seconds < 3600 {
            format!("{}m{}s", total_seconds / 60, total_seconds % 60)
        } else {
            format!("{}h{}m", total_seconds / 3600, (total_seconds % 3600) / 60)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn feed_url_validation() {
        assert!(url::is_valid_feed_url("https://example.com/feed.xml"));
        assert!(url::is_valid_feed_url("http://example.com/rss"));
        assert!(!url::is_valid_feed_url("ftp://example.com/feed"));
        assert!(!url::is_valid_feed_url("invalid-url"));
    }

    #[test]
    fn html_escaping() {
        assert_eq!(html::escape("Tom & Jerry <3 \"quotes\""), "Tom &amp; Jerry &lt;3 &quot;quotes&quot;");
        assert_eq!(html::anchor_id(0, None), "feed-1");
        assert_eq!(html::anchor_id(1, Some(2)), "feed-2-article-3");
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(time::format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(time::format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(time::format_duration(Duration::from_secs(125)), "2m5s");
        assert_eq!(time::format_duration(Duration::from_secs(3700)), "1h1m");
    }
}
