// src/articles/newsapi.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::articles::clean_text;
use crate::articles::types::{ArticleQuery, ArticleRecord, ArticleSource};

pub const DEFAULT_BASE_URL: &str = "https://newsapi.org";

/// Wire shape of `GET /v2/everything`.
#[derive(Debug, Deserialize)]
pub(crate) struct EverythingResponse {
    status: String,
    #[serde(default)]
    articles: Vec<WireArticle>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireSource {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireArticle {
    source: Option<WireSource>,
    author: Option<String>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    url_to_image: Option<String>,
    published_at: Option<String>,
}

impl From<WireArticle> for ArticleRecord {
    fn from(w: WireArticle) -> Self {
        ArticleRecord {
            // Payout key: kept byte-for-byte; blank authors are filtered later.
            author: w.author,
            source_name: w
                .source
                .and_then(|s| s.name)
                .as_deref()
                .and_then(clean_text)
                .unwrap_or_default(),
            title: w.title.as_deref().and_then(clean_text).unwrap_or_default(),
            description: w.description.as_deref().and_then(clean_text),
            url: w.url.unwrap_or_default(),
            image_url: w.url_to_image.filter(|u| !u.trim().is_empty()),
            published_at: w.published_at.as_deref().and_then(parse_published_at),
        }
    }
}

fn parse_published_at(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Decode a NewsAPI JSON document into article records.
/// An `"status": "error"` document is an error, not an empty list.
pub(crate) fn decode_everything(body: &str) -> Result<Vec<ArticleRecord>> {
    let resp: EverythingResponse =
        serde_json::from_str(body).context("parsing newsapi response")?;
    if !resp.status.eq_ignore_ascii_case("ok") {
        return Err(anyhow!(
            "newsapi returned status={} code={} message={}",
            resp.status,
            resp.code.unwrap_or_default(),
            resp.message.unwrap_or_default()
        ));
    }
    Ok(resp.articles.into_iter().map(ArticleRecord::from).collect())
}

/// Live NewsAPI client (`/v2/everything`).
pub struct NewsApiSource {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl NewsApiSource {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait]
impl ArticleSource for NewsApiSource {
    async fn fetch_articles(&self, query: &ArticleQuery) -> Result<Vec<ArticleRecord>> {
        let url = format!("{}/v2/everything", self.base_url);
        let body = self
            .client
            .get(&url)
            .timeout(self.timeout)
            // NewsAPI rejects requests without a User-Agent.
            .header(reqwest::header::USER_AGENT, "news-payout-dashboard/0.1")
            .query(&[("q", query.q.as_str()), ("apiKey", self.api_key.as_str())])
            .send()
            .await
            .context("newsapi request")?
            .error_for_status()
            .context("newsapi non-2xx")?
            .text()
            .await
            .context("newsapi body")?;

        decode_everything(&body)
    }

    fn name(&self) -> &'static str {
        "newsapi"
    }
}
