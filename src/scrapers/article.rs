//! Publisher page download and text extraction.
//!
//! Extraction is heuristic and works on plain HTML:
//! - **Title**: `og:title`, then `<title>`, then the first `<h1>`
//! - **Body**: paragraphs under `<article>`, else `<main>`, else `<body>`
//! - **Publish date**: meta tags, `itemprop=datePublished`, JSON-LD, `<time>`

use super::ArticleSource;
use crate::error::{NewsError, Result};
use crate::models::ExtractedArticle;
use crate::utils::collapse_whitespace;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, instrument};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static OG_TITLE: Lazy<Selector> = Lazy::new(|| selector(r#"meta[property="og:title"]"#));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static H1: Lazy<Selector> = Lazy::new(|| selector("h1"));
static BODY_CONTAINERS: Lazy<Vec<Selector>> =
    Lazy::new(|| vec![selector("article p"), selector("main p"), selector("body p")]);
static DATE_META: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        r#"meta[property="article:published_time"]"#,
        r#"meta[name="article:published_time"]"#,
        r#"meta[property="og:published_time"]"#,
        r#"meta[name="pubdate"]"#,
        r#"meta[name="publishdate"]"#,
        r#"meta[name="publish-date"]"#,
        r#"meta[name="parsely-pub-date"]"#,
        r#"meta[name="sailthru.date"]"#,
        r#"meta[name="DC.date.issued"]"#,
        r#"meta[name="date"]"#,
    ]
    .into_iter()
    .map(selector)
    .collect()
});
static ITEMPROP_DATE: Lazy<Selector> = Lazy::new(|| selector(r#"[itemprop="datePublished"]"#));
static JSON_LD: Lazy<Selector> =
    Lazy::new(|| selector(r#"script[type="application/ld+json"]"#));
static TIME: Lazy<Selector> = Lazy::new(|| selector("time[datetime]"));

/// Downloads publisher pages and extracts their text.
#[derive(Debug, Clone)]
pub struct ArticleExtractor {
    client: Client,
}

impl ArticleExtractor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ArticleSource for ArticleExtractor {
    #[instrument(level = "debug", skip(self))]
    async fn download(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(NewsError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        let html = response.text().await?;
        debug!(bytes = html.len(), "Downloaded article");
        Ok(html)
    }

    fn parse(&self, url: &str, html: &str) -> Result<ExtractedArticle> {
        if html.trim().is_empty() {
            return Err(NewsError::Extract(format!("empty document from {url}")));
        }
        Ok(extract(html))
    }
}

/// Extract title, body and publish time from an HTML document.
pub fn extract(html: &str) -> ExtractedArticle {
    let document = Html::parse_document(html);
    ExtractedArticle {
        title: extract_title(&document),
        body: extract_body(&document),
        published: extract_published(&document),
    }
}

fn extract_title(document: &Html) -> String {
    if let Some(content) = document
        .select(&OG_TITLE)
        .filter_map(|e| e.value().attr("content"))
        .map(collapse_whitespace)
        .find(|t| !t.is_empty())
    {
        return content;
    }
    document
        .select(&TITLE)
        .chain(document.select(&H1))
        .map(|e| collapse_whitespace(&e.text().collect::<String>()))
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

fn extract_body(document: &Html) -> String {
    for container in BODY_CONTAINERS.iter() {
        let paragraphs: Vec<String> = document
            .select(container)
            .map(|p| collapse_whitespace(&p.text().collect::<Vec<_>>().join(" ")))
            .filter(|p| !p.is_empty())
            .collect();
        if !paragraphs.is_empty() {
            return paragraphs.join("\n\n");
        }
    }
    String::new()
}

fn extract_published(document: &Html) -> Option<NaiveDateTime> {
    let from_meta = DATE_META.iter().find_map(|sel| {
        document
            .select(sel)
            .filter_map(|e| e.value().attr("content"))
            .find_map(parse_date)
    });
    if from_meta.is_some() {
        return from_meta;
    }

    let from_itemprop = document.select(&ITEMPROP_DATE).find_map(|e| {
        let value = e.value();
        value
            .attr("datetime")
            .or_else(|| value.attr("content"))
            .and_then(parse_date)
    });
    if from_itemprop.is_some() {
        return from_itemprop;
    }

    let from_json_ld = document.select(&JSON_LD).find_map(|script| {
        let raw = script.text().collect::<String>();
        let value: Value = serde_json::from_str(raw.trim()).ok()?;
        find_string_key(&value, "datePublished").and_then(parse_date)
    });
    if from_json_ld.is_some() {
        return from_json_ld;
    }

    document
        .select(&TIME)
        .filter_map(|e| e.value().attr("datetime"))
        .find_map(parse_date)
}

/// Depth-first search for a string value under `key` (handles `@graph` and arrays).
fn find_string_key<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(key).and_then(Value::as_str) {
                return Some(found);
            }
            map.values().find_map(|v| find_string_key(v, key))
        }
        Value::Array(items) => items.iter().find_map(|v| find_string_key(v, key)),
        _ => None,
    }
}

/// Parse the date formats publishers put in their markup.
///
/// Offsets are dropped after parsing; the wall-clock time is kept.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
