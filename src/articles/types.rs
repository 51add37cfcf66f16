// src/articles/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One news item as the dashboard sees it. Only `author` matters to the payout engine;
/// the rest is display data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArticleRecord {
    pub author: Option<String>,
    pub source_name: String,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ArticleRecord {
    /// Author name if the article is attributed (present and not blank).
    pub fn attributed_author(&self) -> Option<&str> {
        self.author.as_deref().filter(|a| !a.trim().is_empty())
    }
}

/// Search parameters handed to an [`ArticleSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleQuery {
    pub q: String,
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            q: "technology".to_string(),
        }
    }
}

#[async_trait::async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch_articles(&self, query: &ArticleQuery) -> Result<Vec<ArticleRecord>>;
    fn name(&self) -> &'static str;
}
