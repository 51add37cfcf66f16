//! Article grid filters: author, source, keyword and publication date range.
//!
//! Filters only narrow what the article grid shows. Payout figures are always
//! computed over the full snapshot.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;

use crate::articles::types::ArticleRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ArticleFilter {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, rename = "q")]
    pub search: Option<String>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub from: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub to: Option<NaiveDate>,
}

/// `YYYY-MM-DD`; empty or unparsable input means no bound.
fn lenient_date<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()))
}

impl ArticleFilter {
    /// Empty strings (as sent by an unselected `<select>`) mean "no filter".
    pub fn normalized(mut self) -> Self {
        fn blank_to_none(v: Option<String>) -> Option<String> {
            v.filter(|s| !s.trim().is_empty())
        }
        self.author = blank_to_none(self.author);
        self.source = blank_to_none(self.source);
        self.search = blank_to_none(self.search).map(|s| s.trim().to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.author.is_none()
            && self.source.is_none()
            && self.search.is_none()
            && self.from.is_none()
            && self.to.is_none()
    }

    pub fn matches(&self, a: &ArticleRecord) -> bool {
        if let Some(author) = &self.author {
            if a.author.as_deref() != Some(author.as_str()) {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if &a.source_name != source {
                return false;
            }
        }
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let in_title = a.title.to_lowercase().contains(&needle);
            let in_desc = a
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !(in_title || in_desc) {
                return false;
            }
        }
        if self.from.is_some() || self.to.is_some() {
            let Some(day) = a.published_at.map(|t| t.date_naive()) else {
                return false;
            };
            if self.from.is_some_and(|from| day < from) {
                return false;
            }
            if self.to.is_some_and(|to| day > to) {
                return false;
            }
        }
        true
    }

    pub fn apply<'a>(&self, articles: &'a [ArticleRecord]) -> Vec<&'a ArticleRecord> {
        articles.iter().filter(|a| self.matches(a)).collect()
    }
}

/// Distinct non-empty source names, first-seen order.
pub fn unique_sources(articles: &[ArticleRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    articles
        .iter()
        .map(|a| a.source_name.as_str())
        .filter(|s| !s.trim().is_empty())
        .filter(|s| seen.insert(*s))
        .map(str::to_string)
        .collect()
}
