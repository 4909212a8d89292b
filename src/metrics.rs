use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<Option<PrometheusHandle>> = OnceCell::new();

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder once per process and describe our series.
    /// Returns `None` when another recorder already owns the global slot.
    pub fn init() -> Option<Self> {
        let handle = HANDLE.get_or_init(|| {
            // Use default buckets to avoid API differences across crate versions.
            match PrometheusBuilder::new().install_recorder() {
                Ok(h) => {
                    describe_series();
                    Some(h)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "prometheus recorder not installed");
                    None
                }
            }
        });
        handle.clone().map(|handle| Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
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

fn describe_series() {
    describe_counter!(
        "locate_requests_total",
        "Model responses turned into locations, by winning strategy."
    );
    describe_counter!(
        "locate_failures_total",
        "Model responses with no usable locations, by failure kind."
    );
    describe_counter!(
        "upstream_errors_total",
        "Failed outbound calls, by service."
    );
    describe_histogram!(
        "upstream_latency_ms",
        "Outbound call latency in milliseconds, by service."
    );
}
