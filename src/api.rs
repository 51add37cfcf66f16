use std::sync::{Arc, RwLock};

use anyhow::Context;
use axum::{
    extract::{Form, Path, Query, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post, put},
    Json, Router,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::aggregate::{AggregationMemo, AggregationResult, PayoutRow, CHART_TITLE};
use crate::articles::types::ArticleRecord;
use crate::articles::ArticleFeed;
use crate::auth::{
    self, clear_session_cookie, identify, session_cookie, ApiSession, IdentityProvider,
    MaybeSession, Session,
};
use crate::config::{DashboardConfig, IdentityMode};
use crate::error::ApiError;
use crate::export;
use crate::filters::{unique_sources, ArticleFilter};
use crate::rates::{parse_rate_input, sanitize_rate, RateStore, RateTable};
use crate::views::{self, DashboardView, Theme, THEME_COOKIE};

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    config: DashboardConfig,
    feed: Arc<ArticleFeed>,
    rates: RwLock<RateTable>,
    // Held across a save so concurrent edits cannot drop each other.
    rate_writer: tokio::sync::Mutex<()>,
    rate_store: Arc<dyn RateStore>,
    identity: Arc<dyn IdentityProvider>,
    memo: AggregationMemo,
}

impl AppState {
    /// Loads the rate table from `rate_store`; a load failure starts with an empty table.
    pub fn new(
        config: DashboardConfig,
        feed: Arc<ArticleFeed>,
        rate_store: Arc<dyn RateStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let rates = rate_store.load_rates().unwrap_or_else(|e| {
            tracing::warn!(error = ?e, "failed to load payout rates; starting empty");
            RateTable::new()
        });
        tracing::info!(
            authors = rates.len(),
            identity = identity.name(),
            source = feed.source_name(),
            "dashboard state ready"
        );
        Self {
            inner: Arc::new(Inner {
                config,
                feed,
                rates: RwLock::new(rates),
                rate_writer: tokio::sync::Mutex::new(()),
                rate_store,
                identity,
                memo: AggregationMemo::new(),
            }),
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.inner.config
    }

    pub fn session_secret(&self) -> &str {
        &self.inner.config.session_secret
    }

    pub fn feed(&self) -> &Arc<ArticleFeed> {
        &self.inner.feed
    }

    /// Copy of the current rate table.
    pub fn rates(&self) -> RateTable {
        match self.inner.rates.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    /// Current articles plus their aggregation, both from the same snapshot.
    pub fn aggregate(&self) -> (Arc<Vec<ArticleRecord>>, AggregationResult) {
        let articles = self.inner.feed.snapshot();
        let rates = self.rates();
        let result = self.inner.memo.get_or_compute(&articles, &rates);
        (articles, result)
    }

    /// Set one author's rate and persist the whole table. The in-memory table only
    /// changes once the save succeeded. The file write runs on the blocking pool;
    /// readers keep seeing the previous table until then.
    pub async fn set_rate(&self, author: &str, rate: f64) -> anyhow::Result<RateTable> {
        let _writer = self.inner.rate_writer.lock().await;
        let mut next = self.rates();
        next.set(author, rate);

        let store = Arc::clone(&self.inner.rate_store);
        let to_save = next.clone();
        tokio::task::spawn_blocking(move || store.save_rates(&to_save))
            .await
            .context("rate save task")?
            .context("saving payout rates")?;

        match self.inner.rates.write() {
            Ok(mut g) => *g = next.clone(),
            Err(poison) => *poison.into_inner() = next.clone(),
        }
        Ok(next)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/", get(login_page))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/theme", post(toggle_theme))
        .route("/dashboard", get(dashboard))
        .route("/api/articles", get(list_articles))
        .route("/api/aggregate", get(aggregate))
        .route("/api/chart", get(chart))
        .route("/api/rates", get(list_rates))
        .route("/api/rates/{author}", put(update_rate))
        .route("/export/payouts.csv", get(export_csv))
        .route("/export/payouts.pdf", get(export_pdf))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn theme_from(headers: &HeaderMap) -> Theme {
    let cookies = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    Theme::from_cookie(auth::parse_cookie(cookies, THEME_COOKIE))
}

// --- pages & auth ------------------------------------------------------

#[derive(Deserialize)]
struct LoginPageQuery {
    #[serde(default)]
    error: Option<String>,
}

async fn login_page(
    State(state): State<AppState>,
    MaybeSession(identity): MaybeSession,
    headers: HeaderMap,
    Query(q): Query<LoginPageQuery>,
) -> Response {
    if identity.is_some() {
        return Redirect::to("/dashboard").into_response();
    }
    let cfg = state.config();
    let client_id = match cfg.identity_mode {
        IdentityMode::Google => cfg.google_client_id.as_deref(),
        IdentityMode::Static => None,
    };
    let error = q.error.as_deref().map(|_| "Sign-in failed. Please try again.");
    Html(views::login_page(theme_from(&headers), client_id, error)).into_response()
}

#[derive(Deserialize)]
struct LoginForm {
    credential: String,
}

async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    match state.inner.identity.verify(&form.credential).await {
        Ok(email) => {
            let identity = identify(&email, &state.config().admin_email);
            counter!("logins_total", "outcome" => "ok").increment(1);
            tracing::info!(role = identity.role.as_str(), "user signed in");
            let cookie = session_cookie(&identity, state.session_secret());
            ([(header::SET_COOKIE, cookie)], Redirect::to("/dashboard")).into_response()
        }
        Err(e) => {
            counter!("logins_total", "outcome" => "rejected").increment(1);
            tracing::warn!(error = ?e, provider = state.inner.identity.name(), "sign-in failed");
            Redirect::to("/?error=signin").into_response()
        }
    }
}

async fn logout() -> Response {
    ([(header::SET_COOKIE, clear_session_cookie())], Redirect::to("/")).into_response()
}

async fn toggle_theme(headers: HeaderMap) -> Response {
    let next = theme_from(&headers).toggled();
    let cookie = format!(
        "{THEME_COOKIE}={}; Path=/; SameSite=Lax; Max-Age=31536000",
        next.as_str()
    );
    ([(header::SET_COOKIE, cookie)], Redirect::to("/dashboard")).into_response()
}

async fn dashboard(
    State(state): State<AppState>,
    Session(identity): Session,
    headers: HeaderMap,
    Query(filter): Query<ArticleFilter>,
) -> Html<String> {
    let filter = filter.normalized();
    let (articles, aggregation) = state.aggregate();
    let visible = filter.apply(&articles);
    let sources = unique_sources(&articles);

    Html(views::dashboard_page(&DashboardView {
        identity: &identity,
        theme: theme_from(&headers),
        loading: !state.feed().is_loaded(),
        filter: &filter,
        sources: &sources,
        aggregation: &aggregation,
        articles: &visible,
    }))
}

// --- JSON API ----------------------------------------------------------

async fn list_articles(
    State(state): State<AppState>,
    ApiSession(_): ApiSession,
    Query(filter): Query<ArticleFilter>,
) -> Json<Vec<ArticleRecord>> {
    let filter = filter.normalized();
    let articles = state.feed().snapshot();
    Json(filter.apply(&articles).into_iter().cloned().collect())
}

async fn aggregate(
    State(state): State<AppState>,
    session: ApiSession,
) -> Result<Json<AggregationResult>, ApiError> {
    session.require_admin()?;
    Ok(Json(state.aggregate().1))
}

#[derive(Serialize)]
struct ChartOut {
    title: &'static str,
    series: Vec<serde_json::Value>,
}

async fn chart(State(state): State<AppState>, ApiSession(_): ApiSession) -> Json<ChartOut> {
    let (_, result) = state.aggregate();
    let mut series = vec![serde_json::json!(["Author", "Articles"])];
    series.extend(
        result
            .chart_series()
            .into_iter()
            .map(|(author, n)| serde_json::json!([author, n])),
    );
    Json(ChartOut {
        title: CHART_TITLE,
        series,
    })
}

async fn list_rates(
    State(state): State<AppState>,
    session: ApiSession,
) -> Result<Json<RateTable>, ApiError> {
    session.require_admin()?;
    Ok(Json(state.rates()))
}

#[derive(Deserialize)]
struct RateUpdate {
    #[serde(default)]
    rate: serde_json::Value,
}

/// Numbers are taken as-is, strings are parsed leniently, anything else is 0.
fn coerce_rate(v: &serde_json::Value) -> f64 {
    match v {
        serde_json::Value::Number(n) => sanitize_rate(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => parse_rate_input(s),
        _ => 0.0,
    }
}

async fn update_rate(
    State(state): State<AppState>,
    session: ApiSession,
    Path(author): Path<String>,
    Json(body): Json<RateUpdate>,
) -> Result<Json<PayoutRow>, ApiError> {
    let who = session.require_admin()?;
    if author.trim().is_empty() {
        return Err(ApiError::BadRequest("author must not be empty".into()));
    }

    let rate = coerce_rate(&body.rate);
    state.set_rate(&author, rate).await?;
    counter!("rates_updates_total").increment(1);
    tracing::info!(%author, rate, by = %who.email, "payout rate updated");

    let (_, result) = state.aggregate();
    let row = result
        .payout_rows()
        .into_iter()
        .find(|r| r.author == author)
        .unwrap_or(PayoutRow {
            articles: 0,
            rate,
            total: 0.0,
            author,
        });
    Ok(Json(row))
}

async fn export_csv(
    State(state): State<AppState>,
    session: ApiSession,
) -> Result<Response, ApiError> {
    session.require_admin()?;
    let rows = state.aggregate().1.payout_rows();
    counter!("exports_total", "format" => "csv").increment(1);
    let disposition = format!("attachment; filename=\"{}\"", export::CSV_FILENAME);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export::to_csv(&rows),
    )
        .into_response())
}

async fn export_pdf(
    State(state): State<AppState>,
    session: ApiSession,
) -> Result<Response, ApiError> {
    session.require_admin()?;
    let (_, result) = state.aggregate();
    let pdf = export::to_pdf(&result, "Payout Report")?;
    counter!("exports_total", "format" => "pdf").increment(1);
    let disposition = format!("attachment; filename=\"{}\"", export::PDF_FILENAME);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    )
        .into_response())
}
