//! Google News redirect link decoding.
//!
//! Aggregator links look like `https://news.google.com/rss/articles/<id>`.
//! Old ids embed the publisher URL directly in a base64 protobuf blob and
//! can be decoded offline. Newer ids need two requests: the article page
//! carries a signature and timestamp, which are posted back to the
//! `batchexecute` endpoint to obtain the publisher URL.

use super::{AGGREGATOR_HOST, LinkResolver};
use crate::error::{NewsError, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};
use url::Url;

const BASE_URL: &str = "https://news.google.com";

static PARAMS_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("c-wiz > div[jscontroller]").expect("static selector"));

/// Resolves aggregator links to publisher URLs.
#[derive(Debug, Clone)]
pub struct GoogleNewsDecoder {
    client: Client,
    base_url: String,
}

impl GoogleNewsDecoder {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, BASE_URL)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Read the `data-n-a-sg` / `data-n-a-ts` pair from the article page.
    async fn fetch_params(&self, id: &str) -> Result<(String, i64)> {
        let candidates = [
            format!("{}/rss/articles/{}", self.base_url, id),
            format!("{}/articles/{}", self.base_url, id),
        ];
        let mut last_error = None;
        for url in candidates {
            let response = match self.client.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(NewsError::from(e));
                    continue;
                }
            };
            if !response.status().is_success() {
                last_error = Some(NewsError::Status {
                    status: response.status().as_u16(),
                    url,
                });
                continue;
            }
            let html = response.text().await?;
            match parse_decoding_params(&html) {
                Ok(params) => return Ok(params),
                Err(e) => {
                    debug!(%url, error = %e, "No decoding params on page");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| NewsError::Decode("no article page".into())))
    }

    async fn batch_execute(&self, id: &str, timestamp: i64, signature: &str) -> Result<String> {
        let url = format!("{}/_/DotsSplashUi/data/batchexecute", self.base_url);
        let request = json!([
            "garturlreq",
            [
                ["X", "X", ["X", "X"], null, null, 1, 1, "US:en", null, 1, null, null, null, null, null, 0, 1],
                "X", "X", 1, [1, 1, 1], 1, 1, null, 0, 0, null, 0
            ],
            id,
            timestamp,
            signature
        ]);
        let payload = json!([[["Fbv4je", request.to_string(), null, "generic"]]]);

        let response = self
            .client
            .post(&url)
            .form(&[("f.req", payload.to_string())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NewsError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        let text = response.text().await?;
        parse_batch_response(&text)
    }
}

impl LinkResolver for GoogleNewsDecoder {
    /// Resolve an aggregator link to the publisher URL.
    ///
    /// Legacy ids are decoded offline; others go through the article page
    /// and `batchexecute`.
    ///
    /// # Arguments
    ///
    /// * `link` - Aggregator link such as `https://news.google.com/rss/articles/<id>`
    ///
    /// # Returns
    ///
    /// The publisher URL. It may be empty if the service returned nothing;
    /// callers treat that as unresolved.
    ///
    /// # Errors
    ///
    /// * [`NewsError::Decode`] if the link has no article id or the page
    ///   carries no decoding parameters
    /// * [`NewsError::Http`] / [`NewsError::Status`] on request failures
    #[instrument(level = "debug", skip(self))]
    async fn resolve(&self, link: &str) -> Result<String> {
        let id = article_id(link)?;
        if let Some(url) = decode_offline(&id) {
            debug!(%url, "Decoded link offline");
            return Ok(url);
        }
        let (signature, timestamp) = self.fetch_params(&id).await?;
        let url = self.batch_execute(&id, timestamp, &signature).await?;
        if url.is_empty() {
            warn!(%link, "Decoder returned an empty URL");
        }
        Ok(url)
    }
}

/// Extract the article id from an aggregator link.
pub fn article_id(link: &str) -> Result<String> {
    let url = Url::parse(link)?;
    if url.host_str() != Some(AGGREGATOR_HOST) {
        return Err(NewsError::Decode(format!("not an aggregator link: {link}")));
    }
    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    segments
        .iter()
        .position(|s| *s == "articles" || *s == "read")
        .and_then(|i| segments.get(i + 1))
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
        .ok_or_else(|| NewsError::Decode(format!("no article id in {link}")))
}

/// Decode ids that carry the publisher URL inline.
///
/// Layout: `08 13 22 <varint len> <url bytes> [d2 01 00]`. Returns `None`
/// for ids that need the online flow.
pub fn decode_offline(id: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(id.trim_end_matches('=')).ok()?;
    let rest = bytes.strip_prefix(&[0x08, 0x13, 0x22])?;
    let rest = rest.strip_suffix(&[0xd2, 0x01, 0x00]).unwrap_or(rest);

    let first = *rest.first()?;
    let (len, start) = if first & 0x80 == 0 {
        (first as usize, 1)
    } else {
        let second = *rest.get(1)? as usize;
        (((first & 0x7f) as usize) | (second << 7), 2)
    };
    let url = std::str::from_utf8(rest.get(start..start + len)?).ok()?;
    if url.starts_with("AU_yqL") || !url.starts_with("http") {
        return None;
    }
    Some(url.to_string())
}

/// Pull `(signature, timestamp)` out of an article page.
pub fn parse_decoding_params(html: &str) -> Result<(String, i64)> {
    let document = Html::parse_document(html);
    let element = document
        .select(&PARAMS_SELECTOR)
        .next()
        .ok_or_else(|| NewsError::Decode("decoding params not found".into()))?;
    let signature = element
        .value()
        .attr("data-n-a-sg")
        .ok_or_else(|| NewsError::Decode("missing signature".into()))?;
    let timestamp = element
        .value()
        .attr("data-n-a-ts")
        .and_then(|ts| ts.trim().parse::<i64>().ok())
        .ok_or_else(|| NewsError::Decode("missing or invalid timestamp".into()))?;
    Ok((signature.to_string(), timestamp))
}

/// Pick the publisher URL out of a `batchexecute` response body.
pub fn parse_batch_response(text: &str) -> Result<String> {
    let chunk = text
        .split("\n\n")
        .nth(1)
        .ok_or_else(|| NewsError::Decode("unexpected batchexecute response".into()))?;
    let outer: Value = serde_json::from_str(chunk)
        .map_err(|e| NewsError::Decode(format!("batchexecute body: {e}")))?;
    let inner = outer
        .get(0)
        .and_then(|v| v.get(2))
        .and_then(Value::as_str)
        .ok_or_else(|| NewsError::Decode("batchexecute payload missing".into()))?;
    let inner: Value = serde_json::from_str(inner)
        .map_err(|e| NewsError::Decode(format!("batchexecute payload: {e}")))?;
    inner
        .get(1)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| NewsError::Decode("decoded url missing".into()))
}
