//! Intermediate document assembly.
//!
//! Merges the per-feed article groups into one [`CompiledDocument`], renders
//! it as a single HTML file with a generated table of contents, and writes a
//! small JSON manifest next to it. The conversion tool builds the e-book TOC
//! from the `<h1>` (feed) and `<h2>` (article) headings.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::rss_utils::html::{anchor_id, escape};
use crate::types::{AssembledDocument, CompiledDocument, DocumentManifest, FeedSection, Result};

pub const DOCUMENT_FILE: &str = "digest.html";
pub const MANIFEST_FILE: &str = "manifest.json";

const EMPTY_EDITION_NOTICE: &str =
    "No articles were available for this edition. Check the run log for feed errors.";

/// Group sections into a document. Sections must already be in configured
/// feed order; articles inside them keep the order they arrive in.
pub fn compile(title: &str, generated_at: DateTime<Utc>, sections: Vec<FeedSection>) -> CompiledDocument {
    CompiledDocument {
        title: title.to_string(),
        generated_at,
        sections,
    }
}

pub fn manifest(document: &CompiledDocument) -> DocumentManifest {
    DocumentManifest {
        title: document.title.clone(),
        generated_at: document.generated_at,
        article_counts: document
            .sections
            .iter()
            .map(|s| (s.label.clone(), s.articles.len()))
            .collect(),
    }
}

/// Write the document and its manifest into `work_dir`.
pub fn assemble(document: CompiledDocument, work_dir: &Path) -> Result<AssembledDocument> {
    std::fs::create_dir_all(work_dir)?;

    let document_path = work_dir.join(DOCUMENT_FILE);
    let manifest_path = work_dir.join(MANIFEST_FILE);

    if document.article_count() == 0 {
        warn!("Assembling an empty edition: no feed produced articles");
    }

    std::fs::write(&document_path, render_html(&document))?;

    let manifest = manifest(&document);
    std::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)?;

    info!(
        "Assembled '{}' with {} articles from {} feeds at {}",
        document.title,
        document.article_count(),
        document.sections.len(),
        document_path.display()
    );

    Ok(AssembledDocument {
        document,
        manifest,
        document_path,
        manifest_path,
    })
}

pub fn render_html(document: &CompiledDocument) -> String {
    let mut html = String::new();
    let title = escape(&document.title);
    let generated = document.generated_at.format("%A, %B %-d, %Y %H:%M UTC");

    // write! into a String cannot fail
    let _ = write!(
        html,
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <!DOCTYPE html>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\" lang=\"en\">\n\
         <head>\n<meta charset=\"utf-8\"/>\n<title>{title}</title>\n\
         <meta name=\"generator\" content=\"daynews\"/>\n\
         <meta name=\"date\" content=\"{date}\"/>\n</head>\n<body>\n\
         <div class=\"title-page\">\n<p class=\"edition-title\">{title}</p>\n\
         <p class=\"edition-date\">{generated}</p>\n</div>\n",
        title = title,
        date = document.generated_at.to_rfc3339(),
        generated = generated,
    );

    render_toc(&mut html, document);

    if document.article_count() == 0 {
        let _ = writeln!(html, "<p class=\"notice\">{}</p>", escape(EMPTY_EDITION_NOTICE));
    }

    for (feed_index, section) in document.sections.iter().enumerate() {
        let _ = writeln!(
            html,
            "<h1 id=\"{}\">{}</h1>",
            anchor_id(feed_index, None),
            escape(&section.label)
        );

        if section.articles.is_empty() {
            let _ = writeln!(html, "<p class=\"notice\">{}</p>", escape(&section_notice(section)));
            continue;
        }

        for (article_index, article) in section.articles.iter().enumerate() {
            let published = article
                .published_at
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "undated".to_string());

            let _ = write!(
                html,
                "<div class=\"article\">\n<h2 id=\"{id}\">{title}</h2>\n\
                 <p class=\"meta\">{published} &#183; <a href=\"{link}\">{link_text}</a></p>\n\
                 <div class=\"body\">\n{body}\n</div>\n</div>\n",
                id = anchor_id(feed_index, Some(article_index)),
                title = escape(&article.title),
                published = published,
                link = escape(&article.link),
                link_text = escape(&article.link),
                body = article.body,
            );
        }
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn render_toc(html: &mut String, document: &CompiledDocument) {
    html.push_str("<div class=\"toc\">\n<p class=\"toc-title\">Contents</p>\n<ul>\n");

    for (feed_index, section) in document.sections.iter().enumerate() {
        let _ = write!(
            html,
            "<li><a href=\"#{}\">{}</a> ({})",
            anchor_id(feed_index, None),
            escape(&section.label),
            section.articles.len()
        );

        if !section.articles.is_empty() {
            html.push_str("\n<ul>\n");
            for (article_index, article) in section.articles.iter().enumerate() {
                let _ = writeln!(
                    html,
                    "<li><a href=\"#{}\">{}</a></li>",
                    anchor_id(feed_index, Some(article_index)),
                    escape(&article.title)
                );
            }
            html.push_str("</ul>\n");
        }

        html.push_str("</li>\n");
    }

    html.push_str("</ul>\n</div>\n");
}

fn section_notice(section: &FeedSection) -> String {
    match &section.fetch_error {
        Some(reason) => format!("This feed could not be retrieved: {}", reason),
        None => "No new articles in this feed.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Article;
    use chrono::TimeZone;

    fn article(label: &str, n: usize) -> Article {
        Article {
            title: format!("{} story {}", label, n),
            link: format!("https://{}.example.com/{}", label.to_lowercase(), n),
            published_at: Some(Utc.with_ymd_and_hms(2026, 10, 19, 6, n as u32, 0).unwrap()),
            body: "<p>Body</p>".to_string(),
            source_label: label.to_string(),
        }
    }

    #[test]
    fn toc_and_sections_follow_feed_order() {
        let generated_at = Utc.with_ymd_and_hms(2026, 10, 19, 7, 0, 0).unwrap();
        let document = compile(
            "DayNews Daily Digest",
            generated_at,
            vec![
                FeedSection {
                    label: "Beta".to_string(),
                    articles: vec![article("Beta", 1)],
                    fetch_error: None,
                },
                FeedSection {
                    label: "Alpha".to_string(),
                    articles: vec![],
                    fetch_error: Some("HTTP 503".to_string()),
                },
            ],
        );

        let html = render_html(&document);
        let beta = html.find("<h1 id=\"feed-1\">Beta</h1>").unwrap();
        let alpha = html.find("<h1 id=\"feed-2\">Alpha</h1>").unwrap();
        assert!(beta < alpha);
        assert!(html.contains("href=\"#feed-1-article-1\""));
        assert!(html.contains("could not be retrieved: HTTP 503"));
        assert!(!html.contains(EMPTY_EDITION_NOTICE));
    }

    #[test]
    fn empty_document_carries_notice() {
        let document = compile("Digest <Daily>", Utc::now(), vec![]);
        let html = render_html(&document);
        assert!(html.contains(EMPTY_EDITION_NOTICE));
        assert!(html.contains("Digest &lt;Daily&gt;"));
        assert_eq!(manifest(&document).article_counts.len(), 0);
    }
}
