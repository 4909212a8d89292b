use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::info;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::locate::{locate_from_text, Extractor, ExtractionSource, LocateOutcome, RankedLocation};
use crate::upstream::{
    build_vision_client, plan_mission, DynVisionClient, GeocodeResult, Geocoder, MissionReceipt,
    MissionRequest,
};

/// Shared, read-only per-process state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<AppConfig>,
    pub extractor: Arc<Extractor>,
    pub vision: DynVisionClient,
    pub geocoder: Geocoder,
}

impl AppState {
    /// Build clients from config (vision provider picked by `build_vision_client`).
    pub fn from_config(cfg: AppConfig) -> anyhow::Result<Self> {
        let vision = build_vision_client(&cfg.vision)?;
        Self::with_vision(cfg, vision)
    }

    /// Same as `from_config` but with an explicit vision client (tests, tools).
    pub fn with_vision(cfg: AppConfig, vision: DynVisionClient) -> anyhow::Result<Self> {
        let geocoder = Geocoder::new(&cfg.geocoding)?;
        let extractor = Extractor::new(cfg.locate.extractor_defaults());
        info!(
            "app cfg loaded: vision={}, geocoding_key={}, default_city={}",
            vision.provider_name(),
            geocoder.is_configured(),
            cfg.locate.default_city
        );
        Ok(Self {
            cfg: Arc::new(cfg),
            extractor: Arc::new(extractor),
            vision,
            geocoder,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let upload_limit = state.cfg.server.max_upload_bytes;
    let static_dir = ServeDir::new(&state.cfg.server.static_dir);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/analyze-image", post(analyze_image))
        .route("/api/locate-text", post(locate_text))
        .route("/api/geocode", get(geocode))
        .route("/api/reverse-geocode", get(reverse_geocode))
        .route("/api/drone/mission", post(drone_mission))
        .fallback_service(static_dir)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct LocateResp {
    city: String,
    source: ExtractionSource,
    provider: &'static str,
    locations: Vec<RankedLocation>,
}

/// Short anonymized id for logs: never log uploaded bytes or raw model text.
pub(crate) fn anon_hash(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn run_pipeline(state: &AppState, raw: &str, city: &str) -> Result<LocateOutcome, ApiError> {
    match locate_from_text(&state.extractor, raw, city) {
        Ok(outcome) => {
            counter!("locate_requests_total", "source" => outcome.source.as_str()).increment(1);
            Ok(outcome)
        }
        Err(e) => {
            counter!("locate_failures_total", "kind" => e.kind()).increment(1);
            info!(
                target: "locate",
                id = %anon_hash(raw.as_bytes()),
                kind = e.kind(),
                raw_len = raw.len(),
                "model output not locatable"
            );
            Err(e.into())
        }
    }
}

fn pick_city(state: &AppState, city: Option<String>) -> String {
    city.map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| state.cfg.locate.default_city.clone())
}

async fn analyze_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<LocateResp>, ApiError> {
    let mut image: Option<(Vec<u8>, String)> = None;
    let mut city: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                if !mime.starts_with("image/") {
                    return Err(ApiError::BadRequest(format!(
                        "image field must be an image, got {mime}"
                    )));
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("reading image: {e}")))?;
                image = Some((bytes.to_vec(), mime));
            }
            "city" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("reading city: {e}")))?;
                city = Some(text);
            }
            _ => {}
        }
    }

    let (bytes, mime) = image
        .filter(|(b, _)| !b.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing image field".to_string()))?;
    let city = pick_city(&state, city);

    info!(
        target: "vision",
        id = %anon_hash(&bytes),
        size = bytes.len(),
        %mime,
        %city,
        provider = state.vision.provider_name(),
        "analyzing image"
    );
    let raw = state
        .vision
        .describe(&bytes, &mime, &city)
        .await
        .map_err(ApiError::from_upstream)?;
    drop(bytes);

    let outcome = run_pipeline(&state, &raw, &city)?;
    Ok(Json(LocateResp {
        city,
        source: outcome.source,
        provider: state.vision.provider_name(),
        locations: outcome.locations,
    }))
}

#[derive(Deserialize)]
struct LocateTextReq {
    text: String,
    #[serde(default)]
    city: Option<String>,
}

async fn locate_text(
    State(state): State<AppState>,
    body: Result<Json<LocateTextReq>, JsonRejection>,
) -> Result<Json<LocateResp>, ApiError> {
    let Json(body) = body?;
    let city = pick_city(&state, body.city);
    let outcome = run_pipeline(&state, &body.text, &city)?;
    Ok(Json(LocateResp {
        city,
        source: outcome.source,
        provider: "text",
        locations: outcome.locations,
    }))
}

#[derive(Deserialize)]
struct GeocodeQuery {
    #[serde(default)]
    address: String,
}

async fn geocode(
    State(state): State<AppState>,
    q: Result<Query<GeocodeQuery>, QueryRejection>,
) -> Result<Json<Vec<GeocodeResult>>, ApiError> {
    let Query(q) = q?;
    let address = q.address.trim();
    if address.is_empty() {
        return Err(ApiError::BadRequest("address is required".to_string()));
    }
    ensure_geocoder(&state)?;
    let hits = state
        .geocoder
        .forward(address)
        .await
        .map_err(ApiError::from_upstream)?;
    Ok(Json(hits))
}

#[derive(Deserialize)]
struct ReverseQuery {
    lat: f64,
    lng: f64,
}

async fn reverse_geocode(
    State(state): State<AppState>,
    q: Result<Query<ReverseQuery>, QueryRejection>,
) -> Result<Json<Vec<GeocodeResult>>, ApiError> {
    let Query(q) = q?;
    if !((-90.0..=90.0).contains(&q.lat) && (-180.0..=180.0).contains(&q.lng)) {
        return Err(ApiError::BadRequest("lat/lng out of range".to_string()));
    }
    ensure_geocoder(&state)?;
    let hits = state
        .geocoder
        .reverse(q.lat, q.lng)
        .await
        .map_err(ApiError::from_upstream)?;
    Ok(Json(hits))
}

fn ensure_geocoder(state: &AppState) -> Result<(), ApiError> {
    if state.geocoder.is_configured() {
        Ok(())
    } else {
        Err(ApiError::UpstreamUnavailable(
            "geocoding API key not configured".to_string(),
        ))
    }
}

async fn drone_mission(
    State(state): State<AppState>,
    req: Result<Json<MissionRequest>, JsonRejection>,
) -> Result<Json<MissionReceipt>, ApiError> {
    let Json(req) = req?;
    Ok(Json(plan_mission(&req, &state.cfg.drone)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anon_hash_is_short_and_stable() {
        let a = anon_hash(b"same bytes");
        assert_eq!(a.len(), 12);
        assert_eq!(a, anon_hash(b"same bytes"));
        assert_ne!(a, anon_hash(b"other bytes"));
    }
}
