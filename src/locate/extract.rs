// src/locate/extract.rs
//! Response extractor: recovers candidate locations from free-form model output.
//!
//! Strategies run in a fixed order and the first one that locates anything wins:
//! - `structured`: the whole text is a JSON object
//! - `fenced`:     a ```json ... ``` (or bare ```) block holds the JSON object
//! - `coordinates`: labeled "latitude: <n>" / "longitude: <n>" tokens
//!
//! Each strategy returns `Ok(Some(..))` when it located something, `Ok(None)` to
//! pass to the next one, and `Err(..)` to stop the chain.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::CandidateLocation;

pub const DEFAULT_CONFIDENCE: f64 = 0.7;
pub const DEFAULT_DESCRIPTION_TEMPLATE: &str = "Possible location in {city}";

static RE_FENCED: Lazy<Regex> = Lazy::new(|| {
    // optional language tag after the opening fence, possibly space-separated
    Regex::new(r"(?s)```[ \t]*[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").expect("fenced block regex")
});
static RE_LATITUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\blatitude\**\s*:\s*\**\s*([-+]?\d+(?:\.\d+)?)").expect("latitude regex")
});
static RE_LONGITUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\blongitude\**\s*:\s*\**\s*([-+]?\d+(?:\.\d+)?)").expect("longitude regex")
});

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractionError {
    #[error("no recoverable location data")]
    NoLocationData,
    #[error("malformed delimited payload: {0}")]
    MalformedPayload(String),
}

/// Which strategy produced the candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    Structured,
    Fenced,
    Coordinates,
}

impl ExtractionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionSource::Structured => "structured",
            ExtractionSource::Fenced => "fenced",
            ExtractionSource::Coordinates => "coordinates",
        }
    }
}

/// Values used when the model leaves fields out.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorDefaults {
    pub confidence: f64,
    /// `{city}` is replaced with the request's city.
    pub description_template: String,
}

impl Default for ExtractorDefaults {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            description_template: DEFAULT_DESCRIPTION_TEMPLATE.to_string(),
        }
    }
}

type Strategy = fn(&Extractor, &str, &str) -> Result<Option<Vec<CandidateLocation>>, ExtractionError>;

const STRATEGIES: [(ExtractionSource, Strategy); 3] = [
    (ExtractionSource::Structured, Extractor::from_structured),
    (ExtractionSource::Fenced, Extractor::from_fenced),
    (ExtractionSource::Coordinates, Extractor::from_coordinates),
];

#[derive(Debug, Clone, Default)]
pub struct Extractor {
    defaults: ExtractorDefaults,
}

/// Convenience entry with the stock defaults.
pub fn extract(raw_text: &str, city: &str) -> Result<Vec<CandidateLocation>, ExtractionError> {
    Extractor::default().extract(raw_text, city)
}

impl Extractor {
    pub fn new(defaults: ExtractorDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &ExtractorDefaults {
        &self.defaults
    }

    pub fn extract(
        &self,
        raw_text: &str,
        city: &str,
    ) -> Result<Vec<CandidateLocation>, ExtractionError> {
        self.extract_detailed(raw_text, city).map(|(v, _)| v)
    }

    /// Like `extract`, but also reports which strategy located the candidates.
    pub fn extract_detailed(
        &self,
        raw_text: &str,
        city: &str,
    ) -> Result<(Vec<CandidateLocation>, ExtractionSource), ExtractionError> {
        for (source, strategy) in STRATEGIES {
            if let Some(found) = strategy(self, raw_text, city)? {
                return Ok((found, source));
            }
        }
        Err(ExtractionError::NoLocationData)
    }

    fn from_structured(
        &self,
        raw_text: &str,
        city: &str,
    ) -> Result<Option<Vec<CandidateLocation>>, ExtractionError> {
        match serde_json::from_str::<Value>(raw_text.trim()) {
            Ok(v) => Ok(self.candidates_from_value(&v, city)),
            Err(_) => Ok(None),
        }
    }

    fn from_fenced(
        &self,
        raw_text: &str,
        city: &str,
    ) -> Result<Option<Vec<CandidateLocation>>, ExtractionError> {
        let Some(caps) = RE_FENCED.captures(raw_text) else {
            return Ok(None);
        };
        let inner = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let v: Value = serde_json::from_str(inner)
            .map_err(|e| ExtractionError::MalformedPayload(e.to_string()))?;
        Ok(self.candidates_from_value(&v, city))
    }

    fn from_coordinates(
        &self,
        raw_text: &str,
        city: &str,
    ) -> Result<Option<Vec<CandidateLocation>>, ExtractionError> {
        let lat = capture_number(&RE_LATITUDE, raw_text);
        let lng = capture_number(&RE_LONGITUDE, raw_text);
        match (lat, lng) {
            (Some(lat), Some(lng)) if valid_coords(lat, lng) => Ok(Some(vec![CandidateLocation {
                lat,
                lng,
                description: self.describe(city),
                confidence: self.defaults.confidence,
            }])),
            _ => Err(ExtractionError::NoLocationData),
        }
    }

    /// `{"locations": [...]}` or a flat `{"lat": .., "lng": ..}` object.
    fn candidates_from_value(&self, v: &Value, city: &str) -> Option<Vec<CandidateLocation>> {
        let out: Vec<CandidateLocation> = match v.get("locations").and_then(Value::as_array) {
            Some(list) if !list.is_empty() => list
                .iter()
                .filter_map(|entry| self.candidate_from_entry(entry, city))
                .collect(),
            _ => self.candidate_from_entry(v, city).into_iter().collect(),
        };
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    fn candidate_from_entry(&self, entry: &Value, city: &str) -> Option<CandidateLocation> {
        let obj = entry.as_object()?;
        let lat = obj.get("lat").or_else(|| obj.get("latitude")).and_then(as_number)?;
        let lng = obj
            .get("lng")
            .or_else(|| obj.get("lon"))
            .or_else(|| obj.get("longitude"))
            .and_then(as_number)?;
        if !valid_coords(lat, lng) {
            return None;
        }
        let description = obj
            .get("description")
            .or_else(|| obj.get("location_description"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.describe(city));
        let confidence = obj
            .get("confidence")
            .and_then(as_number)
            .unwrap_or(self.defaults.confidence);
        Some(CandidateLocation {
            lat,
            lng,
            description,
            confidence,
        })
    }

    fn describe(&self, city: &str) -> String {
        self.defaults.description_template.replace("{city}", city)
    }
}

/// JSON number, or a numeric string ("37.7", "85%").
fn as_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|x| x.is_finite())
}

fn capture_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)?.get(1)?.as_str().parse::<f64>().ok()
}

fn valid_coords(lat: f64, lng: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}
