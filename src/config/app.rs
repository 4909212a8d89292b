// src/config/app.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

use crate::locate::ExtractorDefaults;

pub const DEFAULT_APP_CONFIG_PATH: &str = "config/app.toml";
pub const ENV_APP_CONFIG_PATH: &str = "APP_CONFIG_PATH";

const ENV_DEFAULT_CITY: &str = "DEFAULT_CITY";
const ENV_VISION_TEST_MODE: &str = "VISION_TEST_MODE";
const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
const ENV_GEOCODING_API_KEY: &str = "GEOCODING_API_KEY";

/// Whole-app configuration, read from `config/app.toml` (every section optional).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub vision: VisionConfig,
    pub geocoding: GeocodingConfig,
    pub locate: LocateConfig,
    pub drone: DroneConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Front-end bundle served at `/`.
    pub static_dir: String,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            static_dir: "public".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub enabled: bool,
    /// "openai" | "mock" (case-insensitive)
    pub provider: String,
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Canned model output used by the mock provider.
    pub mock_response: Option<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: "ENV".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 30,
            mock_response: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    /// "ENV" means: read from GEOCODING_API_KEY
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            api_key: "ENV".to_string(),
            base_url: "https://maps.googleapis.com/maps/api/geocode/json".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocateConfig {
    pub default_city: String,
    pub default_confidence: f64,
    pub description_template: String,
}

impl Default for LocateConfig {
    fn default() -> Self {
        let d = ExtractorDefaults::default();
        Self {
            default_city: "San Francisco".to_string(),
            default_confidence: d.confidence,
            description_template: d.description_template,
        }
    }
}

impl LocateConfig {
    pub fn extractor_defaults(&self) -> ExtractorDefaults {
        ExtractorDefaults {
            confidence: self.default_confidence,
            description_template: self.description_template.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DroneConfig {
    pub max_waypoints: usize,
    pub default_altitude_m: f64,
    pub max_altitude_m: f64,
    pub cruise_speed_mps: f64,
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            max_waypoints: 99,
            default_altitude_m: 50.0,
            max_altitude_m: 120.0,
            cruise_speed_mps: 8.0,
        }
    }
}

impl AppConfig {
    /// Load using env var + fallbacks:
    /// 1) $APP_CONFIG_PATH (must exist)
    /// 2) config/app.toml
    /// 3) built-in defaults
    ///
    /// Env overrides are applied afterwards in every case.
    pub fn load() -> Result<Self> {
        let cfg = match env::var(ENV_APP_CONFIG_PATH) {
            Ok(p) => Self::load_from_file(&p)?,
            Err(_) if Path::new(DEFAULT_APP_CONFIG_PATH).exists() => {
                Self::load_from_file(DEFAULT_APP_CONFIG_PATH)?
            }
            Err(_) => Self::default(),
        };
        Ok(cfg.with_env_overrides())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading app config from {}", path.display()))?;
        Self::from_toml_str(&data)
            .with_context(|| format!("parsing app config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Resolve "ENV" keys and apply DEFAULT_CITY / VISION_TEST_MODE.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(city) = env::var(ENV_DEFAULT_CITY) {
            if !city.trim().is_empty() {
                self.locate.default_city = city.trim().to_string();
            }
        }
        if env::var(ENV_VISION_TEST_MODE).is_ok_and(|v| v.eq_ignore_ascii_case("mock")) {
            self.vision.provider = "mock".to_string();
            self.vision.enabled = true;
        }
        self.vision.api_key = resolve_key(&self.vision.api_key, ENV_OPENAI_API_KEY);
        self.geocoding.api_key = resolve_key(&self.geocoding.api_key, ENV_GEOCODING_API_KEY);
        self
    }

    fn sanitize(&mut self) {
        self.vision.provider = self.vision.provider.trim().to_lowercase();

        let defaults = LocateConfig::default();
        let c = self.locate.default_confidence;
        if !(c.is_finite() && c > 0.0 && c <= 1.0) {
            self.locate.default_confidence = defaults.default_confidence;
        }
        if self.locate.description_template.trim().is_empty() {
            self.locate.description_template = defaults.description_template;
        }

        let drone = DroneConfig::default();
        if self.drone.max_waypoints == 0 {
            self.drone.max_waypoints = drone.max_waypoints;
        }
        if !(self.drone.max_altitude_m > 0.0) {
            self.drone.max_altitude_m = drone.max_altitude_m;
        }
        if !(self.drone.default_altitude_m > 0.0)
            || self.drone.default_altitude_m > self.drone.max_altitude_m
        {
            self.drone.default_altitude_m = drone.default_altitude_m.min(self.drone.max_altitude_m);
        }
        if !(self.drone.cruise_speed_mps > 0.0) {
            self.drone.cruise_speed_mps = drone.cruise_speed_mps;
        }
        if self.server.max_upload_bytes == 0 {
            self.server.max_upload_bytes = ServerConfig::default().max_upload_bytes;
        }
    }
}

/// "ENV" (any case) → value of `var`, or empty when unset. Other values pass through.
fn resolve_key(raw: &str, var: &str) -> String {
    if raw.trim().eq_ignore_ascii_case("env") {
        env::var(var).unwrap_or_default()
    } else {
        raw.to_string()
    }
}
