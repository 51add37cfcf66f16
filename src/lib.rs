// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregate;
pub mod api;
pub mod articles;
pub mod auth;
pub mod config;
pub mod error;
pub mod export;
pub mod filters;
pub mod metrics;
pub mod rates;
pub mod views;

pub use crate::api::{router, AppState};

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::articles::fixture::FixtureSource;
use crate::articles::newsapi::NewsApiSource;
use crate::articles::types::{ArticleQuery, ArticleSource};
use crate::articles::ArticleFeed;
use crate::auth::{GoogleIdentityProvider, IdentityProvider, StaticIdentityProvider};
use crate::config::{DashboardConfig, IdentityMode};
use crate::rates::{FileRateStore, RateStore};

/// Install the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
/// Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_payout_dashboard=info,articles=info,warn"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

/// Pick the article source: fixture file, then NewsAPI, then an empty fixture.
pub fn article_source(cfg: &DashboardConfig) -> Result<Arc<dyn ArticleSource>> {
    if let Some(path) = &cfg.articles_fixture_path {
        let src = FixtureSource::from_path(path)
            .with_context(|| format!("loading article fixture {}", path.display()))?;
        return Ok(Arc::new(src));
    }
    match &cfg.news_api_key {
        Some(key) => Ok(Arc::new(
            NewsApiSource::new(key.clone()).with_base_url(cfg.news_api_base_url.clone()),
        )),
        None => {
            tracing::warn!("NEWS_API_KEY not set; the article feed stays empty");
            Ok(Arc::new(FixtureSource::from_records(&[])))
        }
    }
}

pub fn identity_provider(cfg: &DashboardConfig) -> Arc<dyn IdentityProvider> {
    match cfg.identity_mode {
        IdentityMode::Google => Arc::new(GoogleIdentityProvider::new(cfg.google_client_id.clone())),
        IdentityMode::Static => {
            tracing::warn!("static identity mode: any email signs in without verification");
            Arc::new(StaticIdentityProvider)
        }
    }
}

/// Wire state from `cfg`. Does not fetch articles; see [`articles::spawn_refresher`].
pub fn build_state(cfg: DashboardConfig) -> Result<AppState> {
    anyhow::ensure!(
        !cfg.session_secret.trim().is_empty(),
        "session secret must not be empty"
    );
    let source = article_source(&cfg)?;
    let feed = Arc::new(ArticleFeed::new(
        source,
        ArticleQuery {
            q: cfg.news_query.clone(),
        },
    ));
    let store: Arc<dyn RateStore> = Arc::new(FileRateStore::new(cfg.rates_path.clone()));
    let identity = identity_provider(&cfg);
    Ok(AppState::new(cfg, feed, store, identity))
}

/// Full application router (pages, API, exports, `/metrics`) plus its state.
pub fn app_with_config(cfg: DashboardConfig) -> Result<(Router, AppState)> {
    let metrics = crate::metrics::Metrics::init(cfg.refresh_interval_secs)?;
    let state = build_state(cfg)?;
    let router = api::router(state.clone()).merge(metrics.router());
    Ok((router, state))
}

/// Build the app from the default config sources and start the article refresher.
pub async fn app() -> Result<Router> {
    let cfg = DashboardConfig::load_default()?;
    let interval = Duration::from_secs(cfg.refresh_interval_secs.max(1));
    let (router, state) = app_with_config(cfg)?;
    articles::spawn_refresher(Arc::clone(state.feed()), interval);
    Ok(router)
}
