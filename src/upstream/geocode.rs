// src/upstream/geocode.rs
//! Geocoding passthrough (Google Geocoding JSON API) with response reshaping.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use metrics::{counter, histogram};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::GeocodingConfig;

/// One geocoding hit as the map UI consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub lat: f64,
    pub lng: f64,
    pub formatted_address: String,
    pub place_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeBody {
    pub status: String,
    #[serde(default)]
    pub results: Vec<GeocodeItem>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeItem {
    #[serde(default)]
    formatted_address: String,
    geometry: Geometry,
    #[serde(default)]
    place_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

/// `OK` → hits, `ZERO_RESULTS` → empty, anything else is an upstream error.
pub fn reshape(body: GeocodeBody) -> Result<Vec<GeocodeResult>> {
    match body.status.as_str() {
        "OK" => Ok(body
            .results
            .into_iter()
            .map(|it| GeocodeResult {
                lat: it.geometry.location.lat,
                lng: it.geometry.location.lng,
                formatted_address: it.formatted_address,
                place_id: it.place_id,
            })
            .collect()),
        "ZERO_RESULTS" => Ok(Vec::new()),
        other => Err(anyhow!(
            "geocoding status {other}: {}",
            body.error_message.as_deref().unwrap_or("no message")
        )),
    }
}

#[derive(Clone)]
pub struct Geocoder {
    client: Client,
    api_key: String,
    base_url: String,
}

impl Geocoder {
    pub fn new(cfg: &GeocodingConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("geo-vision-proxy/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .context("building geocoding http client")?;
        Ok(Self {
            client,
            api_key: cfg.api_key.clone(),
            base_url: cfg.base_url.clone(),
        })
    }

    /// No key → callers answer 503 without an outbound call.
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub async fn forward(&self, address: &str) -> Result<Vec<GeocodeResult>> {
        self.query(&[("address", address)]).await
    }

    pub async fn reverse(&self, lat: f64, lng: f64) -> Result<Vec<GeocodeResult>> {
        let latlng = format!("{lat},{lng}");
        self.query(&[("latlng", latlng.as_str())]).await
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<Vec<GeocodeResult>> {
        let t0 = Instant::now();
        let out = self.fetch(params).await;
        histogram!("upstream_latency_ms", "service" => "geocoding")
            .record(t0.elapsed().as_secs_f64() * 1000.0);
        if out.is_err() {
            counter!("upstream_errors_total", "service" => "geocoding").increment(1);
        }
        out
    }

    async fn fetch(&self, params: &[(&str, &str)]) -> Result<Vec<GeocodeResult>> {
        let rsp = self
            .client
            .get(&self.base_url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .context("geocoding request failed")?;
        let rsp = rsp
            .error_for_status()
            .map_err(|e| anyhow!("geocoding HTTP error: {e}"))?;
        let body: GeocodeBody = rsp.json().await.context("decoding geocoding response")?;
        reshape(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OK_BODY: &str = r#"{
        "status": "OK",
        "results": [{
            "formatted_address": "1600 Amphitheatre Pkwy, Mountain View, CA 94043, USA",
            "place_id": "ChIJ2eUgeAK6j4ARbn5u_wAGqWA",
            "geometry": { "location": { "lat": 37.4224, "lng": -122.0842 }, "location_type": "ROOFTOP" },
            "types": ["street_address"]
        }]
    }"#;

    #[test]
    fn ok_body_is_reshaped() {
        let body: GeocodeBody = serde_json::from_str(OK_BODY).unwrap();
        let out = reshape(body).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].lat, 37.4224);
        assert_eq!(out[0].place_id.as_deref(), Some("ChIJ2eUgeAK6j4ARbn5u_wAGqWA"));
    }

    #[test]
    fn zero_results_is_empty() {
        let body: GeocodeBody =
            serde_json::from_str(r#"{"status":"ZERO_RESULTS","results":[]}"#).unwrap();
        assert!(reshape(body).unwrap().is_empty());
    }

    #[test]
    fn denied_status_is_an_error() {
        let body: GeocodeBody = serde_json::from_str(
            r#"{"status":"REQUEST_DENIED","error_message":"The provided API key is invalid."}"#,
        )
        .unwrap();
        let err = reshape(body).unwrap_err().to_string();
        assert!(err.contains("REQUEST_DENIED"));
        assert!(err.contains("invalid"));
    }
}
