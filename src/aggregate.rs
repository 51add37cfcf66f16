//! # Author Aggregation
//!
//! Pure functions that turn an article list and a rate table into per-author counts,
//! payouts and chart data. Every payout figure shown anywhere (stats cards, table,
//! CSV, PDF) comes from here.
//!
//! - Unattributed articles (no author, or a blank one) are skipped.
//! - Author names are matched exactly; no case folding or trimming.
//! - Author order is first-seen order in the input.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::articles::types::ArticleRecord;
use crate::rates::RateTable;

/// Title used by the chart renderer.
pub const CHART_TITLE: &str = "Articles by Author";

/// Distinct attributed authors in first-seen order.
pub fn distinct_authors(articles: &[ArticleRecord]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();
    for a in articles {
        if let Some(author) = a.attributed_author() {
            if seen.insert(author) {
                out.push(author.to_string());
            }
        }
    }
    out
}

/// Number of articles whose author is exactly `author`.
pub fn count_for_author(articles: &[ArticleRecord], author: &str) -> usize {
    articles
        .iter()
        .filter(|a| a.author.as_deref() == Some(author))
        .count()
}

pub fn payout_for_author(articles: &[ArticleRecord], author: &str, rates: &RateTable) -> f64 {
    count_for_author(articles, author) as f64 * rates.get(author)
}

pub fn total_payout(articles: &[ArticleRecord], rates: &RateTable) -> f64 {
    distinct_authors(articles)
        .iter()
        .map(|author| payout_for_author(articles, author, rates))
        .sum()
}

/// Total payout divided by the number of *articles* (not authors), rounded.
/// 0 for an empty list.
pub fn average_rate(articles: &[ArticleRecord], total_payout: f64) -> i64 {
    if articles.is_empty() {
        return 0;
    }
    (total_payout / articles.len() as f64).round() as i64
}

/// `(author, count)` pairs in `distinct_authors` order.
pub fn chart_series(articles: &[ArticleRecord]) -> Vec<(String, usize)> {
    let counts = count_by_author(articles);
    distinct_authors(articles)
        .into_iter()
        .map(|author| {
            let n = counts.get(author.as_str()).copied().unwrap_or(0);
            (author, n)
        })
        .collect()
}

/// Single pass over the list; keys are attributed authors only.
fn count_by_author(articles: &[ArticleRecord]) -> HashMap<&str, usize> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for a in articles {
        if let Some(author) = a.attributed_author() {
            *counts.entry(author).or_insert(0) += 1;
        }
    }
    counts
}

/// One row of the payout table, shared by the HTML table and both exports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayoutRow {
    pub author: String,
    pub articles: usize,
    pub rate: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorStats {
    pub author: String,
    pub count: usize,
    pub rate: f64,
    pub payout: f64,
}

/// Everything the dashboard derives from (articles, rates).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    /// Per-author figures, in first-seen author order.
    pub authors: Vec<AuthorStats>,
    pub total_articles: usize,
    pub unattributed: usize,
    pub total_payout: f64,
    pub average_rate: i64,
}

impl AggregationResult {
    pub fn compute(articles: &[ArticleRecord], rates: &RateTable) -> Self {
        let counts = count_by_author(articles);
        let authors: Vec<AuthorStats> = distinct_authors(articles)
            .into_iter()
            .map(|author| {
                let count = counts.get(author.as_str()).copied().unwrap_or(0);
                let rate = rates.get(&author);
                AuthorStats {
                    payout: count as f64 * rate,
                    author,
                    count,
                    rate,
                }
            })
            .collect();

        let total_payout: f64 = authors.iter().map(|s| s.payout).sum();
        let attributed: usize = authors.iter().map(|s| s.count).sum();

        Self {
            total_articles: articles.len(),
            unattributed: articles.len() - attributed,
            average_rate: average_rate(articles, total_payout),
            total_payout,
            authors,
        }
    }

    pub fn distinct_authors(&self) -> Vec<&str> {
        self.authors.iter().map(|s| s.author.as_str()).collect()
    }

    pub fn count_for(&self, author: &str) -> usize {
        self.find(author).map(|s| s.count).unwrap_or(0)
    }

    pub fn payout_for(&self, author: &str) -> f64 {
        self.find(author).map(|s| s.payout).unwrap_or(0.0)
    }

    pub fn payout_rows(&self) -> Vec<PayoutRow> {
        self.authors
            .iter()
            .map(|s| PayoutRow {
                author: s.author.clone(),
                articles: s.count,
                rate: s.rate,
                total: s.payout,
            })
            .collect()
    }

    pub fn chart_series(&self) -> Vec<(String, usize)> {
        self.authors
            .iter()
            .map(|s| (s.author.clone(), s.count))
            .collect()
    }

    fn find(&self, author: &str) -> Option<&AuthorStats> {
        self.authors.iter().find(|s| s.author == author)
    }
}

/// Caches the last [`AggregationResult`], keyed by a digest of its inputs.
/// Any change to the articles or the rates changes the key.
#[derive(Debug, Default)]
pub struct AggregationMemo {
    last: Mutex<Option<([u8; 32], AggregationResult)>>,
}

impl AggregationMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(&self, articles: &[ArticleRecord], rates: &RateTable) -> AggregationResult {
        let key = input_digest(articles, rates);
        let mut guard = match self.last.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        if let Some((k, cached)) = guard.as_ref() {
            if *k == key {
                return cached.clone();
            }
        }
        let fresh = AggregationResult::compute(articles, rates);
        *guard = Some((key, fresh.clone()));
        fresh
    }
}

/// SHA-256 over the fields that influence aggregation (authors + rates).
fn input_digest(articles: &[ArticleRecord], rates: &RateTable) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update((articles.len() as u64).to_le_bytes());
    for a in articles {
        match a.author.as_deref() {
            Some(author) => {
                h.update([1u8]);
                h.update((author.len() as u64).to_le_bytes());
                h.update(author.as_bytes());
            }
            None => h.update([0u8]),
        }
    }
    h.update((rates.len() as u64).to_le_bytes());
    for (author, rate) in rates.iter() {
        h.update((author.len() as u64).to_le_bytes());
        h.update(author.as_bytes());
        h.update(rate.to_bits().to_le_bytes());
    }
    h.finalize().into()
}
