//! Vision adapter: provider abstraction for the image-understanding call.
//!
//! Providers only return the raw model text; turning it into locations is the
//! job of `crate::locate`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use base64::Engine as _;
use metrics::{counter, histogram};
use serde::Deserialize;
use serde_json::json;

use crate::config::VisionConfig;

/// Canned answer of the mock provider (three candidates, fenced like real model output).
pub const MOCK_RESPONSE: &str = r#"Here are the most likely spots:
```json
{"locations": [
  {"lat": 37.8199, "lng": -122.4783, "description": "Golden Gate Bridge, south vista point", "confidence": 0.8},
  {"lat": 37.8080, "lng": -122.4177, "description": "Fisherman's Wharf waterfront", "confidence": 0.15},
  {"lat": 37.7694, "lng": -122.4862, "description": "Golden Gate Park", "confidence": 0.05}
]}
```"#;

/// Trait object used by the HTTP handlers.
#[async_trait::async_trait]
pub trait VisionClient: Send + Sync {
    /// Ask the model where `image` was taken; returns its raw text answer.
    async fn describe(&self, image: &[u8], mime: &str, city: &str) -> Result<String>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynVisionClient = Arc<dyn VisionClient>;

/// Factory: build a client according to config.
///
/// * provider `mock` → `MockVision` (canned text, no network)
/// * `enabled == false` or no API key → `DisabledVision`
/// * otherwise `OpenAiVision`
pub fn build_vision_client(cfg: &VisionConfig) -> Result<DynVisionClient> {
    if cfg.provider == "mock" {
        let text = cfg
            .mock_response
            .clone()
            .unwrap_or_else(|| MOCK_RESPONSE.to_string());
        return Ok(Arc::new(MockVision::new(text)));
    }
    if !cfg.enabled {
        return Ok(Arc::new(DisabledVision::new("vision disabled in config")));
    }
    match cfg.provider.as_str() {
        "openai" if cfg.api_key.trim().is_empty() => {
            tracing::warn!(target: "vision", "OPENAI_API_KEY missing; image analysis disabled");
            Ok(Arc::new(DisabledVision::new("vision API key not configured")))
        }
        "openai" => Ok(Arc::new(OpenAiVision::new(cfg)?)),
        other => bail!("Unsupported vision provider in config: {other}"),
    }
}

/// Marker error: the provider is switched off (maps to 503, not 502).
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct VisionUnavailable(pub String);

/// OpenAI provider (Chat Completions with an inline base64 image).
pub struct OpenAiVision {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiVision {
    pub fn new(cfg: &VisionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("geo-vision-proxy/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .context("building vision http client")?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            endpoint: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
        })
    }
}

pub(crate) fn location_prompt(city: &str) -> String {
    format!(
        "This photo was taken somewhere in or near {city}. Identify up to 3 candidate \
         locations where it was most likely taken. Respond with JSON only, shaped as \
         {{\"locations\": [{{\"lat\": number, \"lng\": number, \"description\": string, \
         \"confidence\": number between 0 and 1}}]}}, most likely first."
    )
}

impl OpenAiVision {
    async fn complete(&self, image: &[u8], mime: &str, city: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let data_url = format!(
            "data:{mime};base64,{}",
            base64::engine::general_purpose::STANDARD.encode(image)
        );
        let req = json!({
            "model": self.model,
            "temperature": 0.2,
            "max_tokens": 600,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a geolocation assistant for a map application."
                },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": location_prompt(city) },
                        { "type": "image_url", "image_url": { "url": data_url } }
                    ]
                }
            ]
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| anyhow!("vision request failed: {e}"))?;
        if let Err(e) = resp.error_for_status_ref() {
            bail!("vision API HTTP error: {e}");
        }

        let body: Resp = resp.json().await.context("decoding vision response")?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("vision API returned no content"))
    }
}

#[async_trait::async_trait]
impl VisionClient for OpenAiVision {
    async fn describe(&self, image: &[u8], mime: &str, city: &str) -> Result<String> {
        let t0 = Instant::now();
        let out = self.complete(image, mime, city).await;
        histogram!("upstream_latency_ms", "service" => "vision")
            .record(t0.elapsed().as_secs_f64() * 1000.0);
        if out.is_err() {
            counter!("upstream_errors_total", "service" => "vision").increment(1);
        }
        out
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Always fails with `VisionUnavailable`; used when vision is switched off.
pub struct DisabledVision {
    reason: String,
}

impl DisabledVision {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl VisionClient for DisabledVision {
    async fn describe(&self, _image: &[u8], _mime: &str, _city: &str) -> Result<String> {
        Err(VisionUnavailable(self.reason.clone()).into())
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Simple mock provider for tests/local runs.
#[derive(Clone)]
pub struct MockVision {
    pub fixed: String,
}

impl MockVision {
    pub fn new(fixed: impl Into<String>) -> Self {
        Self {
            fixed: fixed.into(),
        }
    }
}

#[async_trait::async_trait]
impl VisionClient for MockVision {
    async fn describe(&self, _image: &[u8], _mime: &str, _city: &str) -> Result<String> {
        Ok(self.fixed.clone())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_client_reports_unavailable() {
        let client = DisabledVision::new("off");
        let err = client.describe(b"img", "image/png", "X").await.unwrap_err();
        assert!(err.downcast_ref::<VisionUnavailable>().is_some());
    }

    #[test]
    fn factory_picks_mock_and_disabled() {
        let mut cfg = VisionConfig {
            provider: "mock".into(),
            ..VisionConfig::default()
        };
        assert_eq!(build_vision_client(&cfg).unwrap().provider_name(), "mock");

        cfg.provider = "openai".into();
        cfg.api_key = String::new();
        assert_eq!(build_vision_client(&cfg).unwrap().provider_name(), "disabled");

        cfg.provider = "bard".into();
        cfg.api_key = "k".into();
        assert!(build_vision_client(&cfg).is_err());
    }

    /// One-shot HTTP server answering every request with `200` and `body`.
    async fn serve_once(body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().fallback(move || async move { body });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn undecodable_reply_is_counted_as_upstream_error() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let err = metrics::with_local_recorder(&recorder, || {
            rt.block_on(async {
                let cfg = VisionConfig {
                    api_key: "test-key".into(),
                    base_url: serve_once("this is not json").await,
                    ..VisionConfig::default()
                };
                let client = OpenAiVision::new(&cfg).unwrap();
                client.describe(b"img", "image/png", "Rome").await.unwrap_err()
            })
        });

        assert!(err.to_string().contains("decoding vision response"));
        let rendered = handle.render();
        assert!(
            rendered.contains(r#"upstream_errors_total{service="vision"} 1"#),
            "missing vision error count in:\n{rendered}"
        );
    }

    #[test]
    fn prompt_mentions_city_and_shape() {
        let p = location_prompt("Lisbon");
        assert!(p.contains("Lisbon"));
        assert!(p.contains("\"locations\""));
    }

    #[test]
    fn canned_response_is_locatable() {
        let out = crate::locate::extract(MOCK_RESPONSE, "San Francisco").unwrap();
        assert_eq!(out.len(), 3);
    }
}
