//! Client-side search index (`search.json`).
//!
//! A static host has no query endpoint, so the search page downloads this
//! file and filters it in the browser. Entries follow publication order
//! (newest first) and carry a plain-text excerpt of the body.

use crate::paths;
use crate::types::{Article, ItemId, Tag};
use serde::Serialize;
use std::collections::HashMap;

/// Maximum characters of body text kept per entry.
pub const CONTENT_LIMIT: usize = 1500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchEntry {
    pub title: String,
    pub url: String,
    pub description: String,
    pub tags: Vec<String>,
    /// RFC 3339, second precision.
    pub created_at: String,
    pub content: String,
}

/// Build entries for `articles`, which must already be the published set in
/// display order.
pub fn build_index(articles: &[&Article], tags: &[Tag], prefix: Option<&str>) -> Vec<SearchEntry> {
    let names: HashMap<ItemId, &str> = tags.iter().map(|t| (t.id, t.name.as_str())).collect();
    articles
        .iter()
        .map(|article| SearchEntry {
            title: article.title.clone(),
            url: paths::article_url(&article.slug, prefix),
            description: article.description.clone(),
            tags: article
                .tag_ids
                .iter()
                .filter_map(|id| names.get(id).map(|n| n.to_string()))
                .collect(),
            created_at: article
                .created_at
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            content: truncate_chars(&plain_text(&article.body), CONTENT_LIMIT),
        })
        .collect()
}

/// Serialize entries the way they are published.
pub fn to_json(entries: &[SearchEntry]) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string_pretty(entries)?;
    json.push('\n');
    Ok(json)
}

/// Strip markup, decode the common entities and squish whitespace.
pub fn plain_text(markup: &str) -> String {
    let mut text = String::with_capacity(markup.len());
    let mut in_tag = false;
    for c in markup.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                // Tags separate words.
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PublishStatus;
    use chrono::{TimeZone, Utc};

    fn article(body: &str) -> Article {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Article {
            id: 1,
            slug: "hello".into(),
            title: "Hello".into(),
            description: "First post".into(),
            status: PublishStatus::Publish,
            body: body.into(),
            blob_ids: vec![],
            tag_ids: vec![2, 99],
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn plain_text_strips_tags_and_entities() {
        assert_eq!(
            plain_text("<p>Fish &amp; chips</p>\n<p>and   <b>more</b></p>"),
            "Fish & chips and more"
        );
        assert_eq!(plain_text("a&lt;b&gt;"), "a<b>");
    }

    #[test]
    fn entry_fields() {
        let a = article("<p>Body text</p>");
        let tags = vec![Tag {
            id: 2,
            slug: "rust".into(),
            name: "Rust".into(),
        }];
        let entries = build_index(&[&a], &tags, None);
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.url, "/hello.html");
        assert_eq!(e.tags, vec!["Rust".to_string()]);
        assert_eq!(e.created_at, "2024-03-01T12:00:00Z");
        assert_eq!(e.content, "Body text");
    }

    #[test]
    fn url_honors_prefix() {
        let a = article("");
        let entries = build_index(&[&a], &[], Some("posts"));
        assert_eq!(entries[0].url, "/posts/hello.html");
    }

    #[test]
    fn content_truncated_on_char_boundary() {
        let body = "é".repeat(CONTENT_LIMIT + 10);
        let a = article(&body);
        let entries = build_index(&[&a], &[], None);
        assert_eq!(entries[0].content.chars().count(), CONTENT_LIMIT);
    }

    #[test]
    fn json_is_pretty_array() {
        let a = article("x");
        let json = to_json(&build_index(&[&a], &[], None)).unwrap();
        assert!(json.starts_with("[\n"));
        assert!(json.contains(r#""url": "/hello.html""#));
        assert_eq!(to_json(&[]).unwrap(), "[]\n");
    }
}
