//! News payout dashboard: binary entrypoint.
//! Loads config, starts the article refresher and serves the Axum router.

use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    news_payout_dashboard::init_tracing();

    let router = news_payout_dashboard::app()
        .await
        .map_err(shuttle_runtime::Error::Custom)?;

    tracing::info!("news payout dashboard ready");
    Ok(router.into())
}
