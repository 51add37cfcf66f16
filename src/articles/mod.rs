// src/articles/mod.rs
pub mod fixture;
pub mod newsapi;
pub mod types;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::task::JoinHandle;

use crate::articles::types::{ArticleQuery, ArticleRecord, ArticleSource};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("articles_fetch_total", "Article fetch attempts.");
        describe_counter!(
            "articles_fetch_errors_total",
            "Article fetches that failed; the previous snapshot was kept."
        );
        describe_gauge!(
            "articles_snapshot_size",
            "Number of articles in the current snapshot."
        );
    });
}

/// Trim, decode HTML entities and collapse inner whitespace.
/// Returns `None` when nothing is left.
pub fn clean_text(s: &str) -> Option<String> {
    let decoded = html_escape::decode_html_entities(s);
    let out = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Latest article snapshot plus the source it is refreshed from.
///
/// Readers get an `Arc` to an immutable list; a refresh swaps the whole list.
pub struct ArticleFeed {
    source: Arc<dyn ArticleSource>,
    query: ArticleQuery,
    snapshot: RwLock<Arc<Vec<ArticleRecord>>>,
    loaded: RwLock<bool>,
}

impl ArticleFeed {
    pub fn new(source: Arc<dyn ArticleSource>, query: ArticleQuery) -> Self {
        ensure_metrics_described();
        Self {
            source,
            query,
            snapshot: RwLock::new(Arc::new(Vec::new())),
            loaded: RwLock::new(false),
        }
    }

    /// Current articles. Cheap: clones the `Arc`, not the list.
    pub fn snapshot(&self) -> Arc<Vec<ArticleRecord>> {
        match self.snapshot.read() {
            Ok(g) => Arc::clone(&*g),
            Err(poison) => Arc::clone(&*poison.into_inner()),
        }
    }

    /// True once at least one fetch attempt has finished (successfully or not).
    pub fn is_loaded(&self) -> bool {
        self.loaded.read().map(|g| *g).unwrap_or(true)
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Fetch once. On failure the previous snapshot stays in place.
    /// Returns the number of articles now held.
    pub async fn refresh(&self) -> usize {
        counter!("articles_fetch_total").increment(1);
        let result = self.source.fetch_articles(&self.query).await;

        let len = match result {
            Ok(articles) => {
                let n = articles.len();
                if let Ok(mut g) = self.snapshot.write() {
                    *g = Arc::new(articles);
                }
                tracing::info!(
                    target: "articles",
                    source = self.source.name(),
                    count = n,
                    "article snapshot refreshed"
                );
                n
            }
            Err(e) => {
                counter!("articles_fetch_errors_total").increment(1);
                tracing::warn!(
                    target: "articles",
                    error = ?e,
                    source = self.source.name(),
                    "failed to fetch articles; keeping previous snapshot"
                );
                self.snapshot().len()
            }
        };

        if let Ok(mut l) = self.loaded.write() {
            *l = true;
        }
        gauge!("articles_snapshot_size").set(len as f64);
        len
    }
}

/// Refresh `feed` every `interval`, starting immediately.
pub fn spawn_refresher(feed: Arc<ArticleFeed>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            feed.refresh().await;
        }
    })
}
