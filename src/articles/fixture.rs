// src/articles/fixture.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

use crate::articles::newsapi::decode_everything;
use crate::articles::types::{ArticleQuery, ArticleRecord, ArticleSource};

/// Serves a NewsAPI-shaped JSON document from memory. Used offline and in tests.
pub struct FixtureSource {
    pub content: String,
}

impl FixtureSource {
    pub fn from_fixture(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading article fixture {}", path.display()))?;
        Ok(Self { content })
    }

    /// Fixture built from already-structured records.
    pub fn from_records(records: &[ArticleRecord]) -> Self {
        let articles: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "source": { "id": null, "name": r.source_name },
                    "author": r.author,
                    "title": r.title,
                    "description": r.description,
                    "url": r.url,
                    "urlToImage": r.image_url,
                    "publishedAt": r.published_at.map(|t| t.to_rfc3339()),
                })
            })
            .collect();
        let doc = serde_json::json!({
            "status": "ok",
            "totalResults": articles.len(),
            "articles": articles,
        });
        Self {
            content: doc.to_string(),
        }
    }
}

#[async_trait]
impl ArticleSource for FixtureSource {
    async fn fetch_articles(&self, _query: &ArticleQuery) -> Result<Vec<ArticleRecord>> {
        decode_everything(&self.content)
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_survive_fixture_encoding() {
        let recs = vec![ArticleRecord {
            author: Some("Ada".into()),
            source_name: "Wire".into(),
            title: "Title".into(),
            description: Some("Desc".into()),
            url: "https://example.com/x".into(),
            image_url: None,
            published_at: None,
        }];
        let src = FixtureSource::from_records(&recs);
        let out = src.fetch_articles(&ArticleQuery::default()).await.unwrap();
        assert_eq!(out, recs);
    }
}
