use axum::{routing::get, Router};
use metrics::{describe_counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// Process-wide Prometheus recorder. Installed at most once, so building several
/// routers in one process (tests) shares it.
#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

impl Metrics {
    /// Install the recorder (first call only) and register static series.
    pub fn init(refresh_interval_secs: u64) -> anyhow::Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| {
                let handle = PrometheusBuilder::new().install_recorder()?;
                describe_counter!("rates_updates_total", "Author rate edits saved.");
                describe_counter!("exports_total", "Payout reports exported, by format.");
                describe_counter!("logins_total", "Sign-in attempts, by outcome.");
                anyhow::Ok(handle)
            })?
            .clone();

        gauge!("articles_refresh_interval_secs").set(refresh_interval_secs as f64);
        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router<S: Clone + Send + Sync + 'static>(&self) -> Router<S> {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
