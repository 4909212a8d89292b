// src/lib.rs
// Public library surface for the binary, the demo tool and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod locate;
pub mod metrics;
pub mod upstream;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;
pub use crate::locate::{
    extract, finalize, normalize, CandidateLocation, ExtractionError, NormalizationError,
    RankedLocation,
};

use axum::Router;
use tracing::info;

pub const ENV_DEBUG_ROUTES: &str = "DEBUG_ROUTES";

/// Build the full in-process app: config from disk/env, clients, router.
/// `/metrics` is mounted only when `DEBUG_ROUTES=1`.
pub async fn app() -> anyhow::Result<Router> {
    let cfg = AppConfig::load()?;
    let state = AppState::from_config(cfg)?;
    let mut router = api::router(state);

    if std::env::var(ENV_DEBUG_ROUTES).is_ok_and(|v| v == "1") {
        if let Some(m) = crate::metrics::Metrics::init() {
            router = router.merge(m.router());
            info!("debug routes enabled: /metrics");
        }
    }
    Ok(router)
}
