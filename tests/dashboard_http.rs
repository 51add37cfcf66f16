// tests/dashboard_http.rs
//
// HTTP-level tests for the dashboard Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    body::{self, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value as Json};
use tower::ServiceExt as _; // for `oneshot`

use news_payout_dashboard::api::{self, AppState};
use news_payout_dashboard::articles::fixture::FixtureSource;
use news_payout_dashboard::articles::types::{ArticleQuery, ArticleRecord};
use news_payout_dashboard::articles::ArticleFeed;
use news_payout_dashboard::auth::{create_session, identify, StaticIdentityProvider};
use news_payout_dashboard::config::{DashboardConfig, IdentityMode};
use news_payout_dashboard::export;
use news_payout_dashboard::rates::{MemoryRateStore, RateStore, RateTable};

const BODY_LIMIT: usize = 1024 * 1024;
const ADMIN: &str = "boss@example.com";
const SECRET: &str = "test-secret";

fn article(author: Option<&str>, source: &str, title: &str, day: u32) -> ArticleRecord {
    ArticleRecord {
        author: author.map(str::to_string),
        source_name: source.to_string(),
        title: title.to_string(),
        description: Some(format!("{title} in depth")),
        url: format!("https://example.com/{day}"),
        image_url: None,
        published_at: Some(Utc.with_ymd_and_hms(2025, 3, day, 9, 0, 0).unwrap()),
    }
}

/// A, A, B and one unattributed article.
fn sample() -> Vec<ArticleRecord> {
    vec![
        article(Some("A"), "Wired", "Rust on embedded", 1),
        article(Some("A"), "Verge", "Async deep dive", 2),
        article(Some("B"), "Wired", "GPU prices", 3),
        article(None, "Verge", "Wire report", 4),
    ]
}

fn config() -> DashboardConfig {
    DashboardConfig {
        admin_email: ADMIN.to_string(),
        session_secret: SECRET.to_string(),
        identity_mode: IdentityMode::Static,
        ..Default::default()
    }
}

async fn state_with(rates: RateTable, store: Option<Arc<dyn RateStore>>) -> AppState {
    let feed = Arc::new(ArticleFeed::new(
        Arc::new(FixtureSource::from_records(&sample())),
        ArticleQuery::default(),
    ));
    feed.refresh().await;
    let store = store.unwrap_or_else(|| Arc::new(MemoryRateStore::new(rates)));
    AppState::new(config(), feed, store, Arc::new(StaticIdentityProvider))
}

async fn test_router() -> Router {
    let rates: RateTable = [("A", 10.0), ("B", 5.0)].into_iter().collect();
    api::router(state_with(rates, None).await)
}

fn cookie_for(email: &str) -> String {
    format!("auth={}", create_session(&identify(email, ADMIN), SECRET))
}

fn get(uri: &str, email: Option<&str>) -> Request<Body> {
    let mut b = Request::builder().method("GET").uri(uri);
    if let Some(e) = email {
        b = b.header(header::COOKIE, cookie_for(e));
    }
    b.body(Body::empty()).expect("build GET")
}

fn put_rate(author: &str, body: Json, email: &str) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(format!("/api/rates/{author}"))
        .header(header::COOKIE, cookie_for(email))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("build PUT")
}

async fn body_string(resp: axum::response::Response) -> String {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    String::from_utf8(bytes).expect("utf8")
}

async fn body_json(resp: axum::response::Response) -> Json {
    serde_json::from_str(&body_string(resp).await).expect("json body")
}

#[tokio::test]
async fn health_returns_ok() {
    let resp = test_router().await.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "ok");
}

#[tokio::test]
async fn anonymous_dashboard_redirects_to_login() {
    let resp = test_router()
        .await
        .oneshot(get("/dashboard", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/");
}

#[tokio::test]
async fn anonymous_api_calls_are_unauthorized() {
    let app = test_router().await;
    for uri in ["/api/chart", "/api/articles", "/export/payouts.csv"] {
        let resp = app.clone().oneshot(get(uri, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn tampered_session_is_rejected() {
    let forged = cookie_for("someone@example.com").replacen("auth=user|", "auth=admin|", 1);
    let req = Request::builder()
        .uri("/api/aggregate")
        .header(header::COOKIE, forged)
        .body(Body::empty())
        .unwrap();
    let resp = test_router().await.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_sets_session_cookie_and_redirects() {
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("credential=boss%40example.com"))
        .unwrap();
    let resp = test_router().await.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/dashboard");
    let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("auth=admin|boss@example.com|"), "{cookie}");
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn rejected_login_returns_to_login_page() {
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("credential=not-an-email"))
        .unwrap();
    let resp = test_router().await.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/?error=signin");
    assert!(resp.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn logout_clears_cookie() {
    let req = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .body(Body::empty())
        .unwrap();
    let resp = test_router().await.oneshot(req).await.unwrap();
    let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("auth=;"));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn signed_in_login_page_goes_to_dashboard() {
    let resp = test_router()
        .await
        .oneshot(get("/", Some("ada@example.com")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/dashboard");
}

#[tokio::test]
async fn plain_user_cannot_export_or_edit_rates() {
    let app = test_router().await;
    for uri in ["/export/payouts.csv", "/export/payouts.pdf", "/api/aggregate", "/api/rates"] {
        let resp = app.clone().oneshot(get(uri, Some("ada@example.com"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{uri}");
    }
    let resp = app
        .oneshot(put_rate("A", json!({ "rate": 99 }), "ada@example.com"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(resp).await["error"], "admin role required");
}

#[tokio::test]
async fn dashboard_hides_payouts_from_plain_users() {
    let app = test_router().await;

    let user = body_string(app.clone().oneshot(get("/dashboard", Some("ada@example.com"))).await.unwrap()).await;
    assert!(user.contains("Total Articles"));
    assert!(!user.contains("Total Payout"));
    assert!(!user.contains("saveRate"));

    let admin = body_string(app.oneshot(get("/dashboard", Some(ADMIN))).await.unwrap()).await;
    assert!(admin.contains("Total Payout"));
    assert!(admin.contains("₹25"));
    assert!(admin.contains("₹6"));
    assert!(admin.contains("saveRate"));
}

#[tokio::test]
async fn dashboard_filters_narrow_articles_only() {
    let resp = test_router()
        .await
        .oneshot(get("/dashboard?author=A&source=&q=rust", Some(ADMIN)))
        .await
        .unwrap();
    let html = body_string(resp).await;
    assert!(html.contains("Showing 1 of 4 articles"));
    // payouts still cover every article
    assert!(html.contains("₹25"));
}

#[tokio::test]
async fn articles_endpoint_applies_filters() {
    let resp = test_router()
        .await
        .oneshot(get("/api/articles?author=A&from=2025-03-02", Some("ada@example.com")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    let titles: Vec<&str> = v
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Async deep dive"]);
}

#[tokio::test]
async fn chart_lists_authors_with_header_row() {
    let resp = test_router()
        .await
        .oneshot(get("/api/chart", Some("ada@example.com")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    assert_eq!(v["title"], "Articles by Author");
    assert_eq!(
        v["series"],
        json!([["Author", "Articles"], ["A", 2], ["B", 1]])
    );
}

#[tokio::test]
async fn aggregate_reports_totals_for_admin() {
    let resp = test_router()
        .await
        .oneshot(get("/api/aggregate", Some(ADMIN)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    assert_eq!(v["total_articles"], 4);
    assert_eq!(v["unattributed"], 1);
    assert_eq!(v["total_payout"], 25.0);
    assert_eq!(v["average_rate"], 6);
    assert_eq!(v["authors"][0]["author"], "A");
    assert_eq!(v["authors"][0]["payout"], 20.0);
}

#[tokio::test]
async fn admin_csv_export_matches_table() {
    let resp = test_router()
        .await
        .oneshot(get("/export/payouts.csv", Some(ADMIN)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    assert!(resp.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("payouts.csv"));
    assert_eq!(
        body_string(resp).await,
        "Author,Articles,Rate,Total\r\nA,2,10,20\r\nB,1,5,5\r\n"
    );
}

#[tokio::test]
async fn admin_pdf_export_is_a_pdf() {
    let rates: RateTable = [("A", 10.0), ("B", 5.0)].into_iter().collect();
    let state = state_with(rates, None).await;
    let resp = api::router(state.clone())
        .oneshot(get("/export/payouts.pdf", Some(ADMIN)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert!(bytes.starts_with(b"%PDF-"));

    // The printed total is the engine's figure for the same snapshot.
    let (_, result) = state.aggregate();
    assert_eq!(result.total_payout, 25.0);
    let pages = export::report_pages(&result);
    let total = pages.last().and_then(|p| p.total.clone()).unwrap();
    assert_eq!(total[0], "Total");
    assert_eq!(total[1], "3");
    assert_eq!(total[3], export::format_amount(result.total_payout));
}

#[tokio::test]
async fn rate_update_flows_into_aggregate_and_store() {
    let store = Arc::new(MemoryRateStore::new(RateTable::new()));
    let state = state_with(RateTable::new(), Some(store.clone() as Arc<dyn RateStore>)).await;
    let app = api::router(state.clone());

    let resp = app
        .clone()
        .oneshot(put_rate("A", json!({ "rate": "12.5abc" }), ADMIN))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let row = body_json(resp).await;
    assert_eq!(row, json!({ "author": "A", "articles": 2, "rate": 12.5, "total": 25.0 }));

    assert_eq!(store.load_rates().unwrap().get("A"), 12.5);
    assert_eq!(state.aggregate().1.total_payout, 25.0);

    let resp = app
        .oneshot(put_rate("B", json!({ "rate": -3 }), ADMIN))
        .await
        .unwrap();
    let row = body_json(resp).await;
    assert_eq!(row["rate"], 0.0);
    assert_eq!(row["total"], 0.0);
}

#[tokio::test]
async fn rate_for_unknown_author_is_kept() {
    let app = test_router().await;
    let resp = app
        .oneshot(put_rate("Zed%20Q", json!({ "rate": 4 }), ADMIN))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let row = body_json(resp).await;
    assert_eq!(row["author"], "Zed Q");
    assert_eq!(row["articles"], 0);
    assert_eq!(row["total"], 0.0);
}

struct BrokenStore;

impl RateStore for BrokenStore {
    fn load_rates(&self) -> anyhow::Result<RateTable> {
        Err(anyhow!("disk on fire"))
    }
    fn save_rates(&self, _rates: &RateTable) -> anyhow::Result<()> {
        Err(anyhow!("disk on fire"))
    }
}

#[tokio::test]
async fn failed_save_leaves_rates_untouched() {
    let state = state_with(RateTable::new(), Some(Arc::new(BrokenStore) as Arc<dyn RateStore>)).await;
    let app = api::router(state.clone());

    let resp = app
        .oneshot(put_rate("A", json!({ "rate": 10 }), ADMIN))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_string(resp).await;
    assert!(!body.contains("disk on fire"));
    assert_eq!(state.rates().get("A"), 0.0);
}

/// Slow disk: every save takes a while, so overlapping edits really overlap.
struct SlowStore(MemoryRateStore);

impl RateStore for SlowStore {
    fn load_rates(&self) -> anyhow::Result<RateTable> {
        self.0.load_rates()
    }
    fn save_rates(&self, rates: &RateTable) -> anyhow::Result<()> {
        std::thread::sleep(std::time::Duration::from_millis(30));
        self.0.save_rates(rates)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rate_edits_are_all_kept() {
    let store = Arc::new(SlowStore(MemoryRateStore::new(RateTable::new())));
    let state = state_with(RateTable::new(), Some(store.clone() as Arc<dyn RateStore>)).await;
    let app = api::router(state.clone());

    let (a, b) = tokio::join!(
        app.clone().oneshot(put_rate("A", json!({ "rate": 10 }), ADMIN)),
        app.clone().oneshot(put_rate("B", json!({ "rate": 5 }), ADMIN)),
    );
    assert_eq!(a.unwrap().status(), StatusCode::OK);
    assert_eq!(b.unwrap().status(), StatusCode::OK);

    let saved = store.load_rates().unwrap();
    assert_eq!(saved.get("A"), 10.0);
    assert_eq!(saved.get("B"), 5.0);
    assert_eq!(state.aggregate().1.total_payout, 25.0);
}

#[tokio::test]
async fn theme_toggle_flips_cookie() {
    let req = Request::builder()
        .method("POST")
        .uri("/theme")
        .header(header::COOKIE, "theme=dark")
        .body(Body::empty())
        .unwrap();
    let resp = test_router().await.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("theme=light;"), "{cookie}");
}
