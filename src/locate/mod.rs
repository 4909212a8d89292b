// src/locate/mod.rs
//! Location pipeline: model text → candidate locations → percentages.
//!
//! Order:
//! 1) `extract` recovers candidates from free-form model output
//! 2) `finalize` keeps the first `MAX_CANDIDATES` and normalizes confidences
//!
//! Both steps are pure; the HTTP layer owns all I/O around them.

pub mod extract;
pub mod normalize;

use serde::{Deserialize, Serialize};

pub use crate::locate::extract::{
    extract, ExtractionError, ExtractionSource, Extractor, ExtractorDefaults,
};
pub use crate::locate::normalize::{normalize, NormalizationError};

/// Upper bound of locations returned to the map UI.
pub const MAX_CANDIDATES: usize = 3;

/// A proposed place as recovered from model output (confidence not yet normalized).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateLocation {
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "location_description")]
    pub description: String,
    pub confidence: f64,
}

/// Finalized location: confidence is an integer percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLocation {
    pub lat: f64,
    pub lng: f64,
    pub location_description: String,
    pub confidence: i32,
}

impl RankedLocation {
    pub(crate) fn from_candidate(c: &CandidateLocation, confidence: i32) -> Self {
        Self {
            lat: c.lat,
            lng: c.lng,
            location_description: c.description.clone(),
            confidence,
        }
    }
}

/// Failure of the whole pipeline for one model response.
#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Normalization(#[from] NormalizationError),
}

impl LocateError {
    /// Short label for metrics/logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LocateError::Extraction(ExtractionError::NoLocationData) => "no_location_data",
            LocateError::Extraction(ExtractionError::MalformedPayload(_)) => "malformed_payload",
            LocateError::Normalization(_) => "normalization",
        }
    }
}

/// Result of running the full pipeline on one model response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocateOutcome {
    pub source: ExtractionSource,
    pub locations: Vec<RankedLocation>,
}

/// Truncate to `MAX_CANDIDATES` (input order) and normalize to percentages.
///
/// A zero-sum list (all confidences zero) gets the equal split instead of an error;
/// invalid confidences still fail.
pub fn finalize(
    mut candidates: Vec<CandidateLocation>,
) -> Result<Vec<RankedLocation>, NormalizationError> {
    candidates.truncate(MAX_CANDIDATES);
    match normalize(&candidates) {
        Err(NormalizationError::ZeroSum) => {
            tracing::debug!(
                target: "locate",
                n = candidates.len(),
                "zero-sum confidences, using equal split"
            );
            Ok(equal_split(&candidates))
        }
        other => other,
    }
}

/// `100 / n` each, remainder on the last entry (33/33/34).
pub fn equal_split(candidates: &[CandidateLocation]) -> Vec<RankedLocation> {
    let n = candidates.len() as i32;
    if n == 0 {
        return Vec::new();
    }
    let base = 100 / n;
    let rest = 100 - base * n;
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let extra = if i as i32 == n - 1 { rest } else { 0 };
            RankedLocation::from_candidate(c, base + extra)
        })
        .collect()
}

/// Extract → truncate → normalize.
pub fn locate_from_text(
    extractor: &Extractor,
    raw_text: &str,
    city: &str,
) -> Result<LocateOutcome, LocateError> {
    let (candidates, source) = extractor.extract_detailed(raw_text, city)?;
    let locations = finalize(candidates)?;
    Ok(LocateOutcome { source, locations })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(conf: f64) -> CandidateLocation {
        CandidateLocation {
            lat: 1.0,
            lng: 2.0,
            description: "x".into(),
            confidence: conf,
        }
    }

    #[test]
    fn equal_split_puts_remainder_last() {
        let out = equal_split(&[cand(0.0), cand(0.0), cand(0.0)]);
        let confs: Vec<i32> = out.iter().map(|l| l.confidence).collect();
        assert_eq!(confs, vec![33, 33, 34]);
    }

    #[test]
    fn finalize_truncates_before_normalizing() {
        let five = vec![cand(10.0), cand(20.0), cand(30.0), cand(40.0), cand(50.0)];
        let out = finalize(five).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.iter().map(|l| l.confidence).sum::<i32>(), 100);
        // 10/20/30 of 60 → 17/33/50
        assert_eq!(
            out.iter().map(|l| l.confidence).collect::<Vec<_>>(),
            vec![17, 33, 50]
        );
    }

    #[test]
    fn finalize_zero_sum_uses_equal_split() {
        let out = finalize(vec![cand(0.0), cand(0.0)]).unwrap();
        assert_eq!(
            out.iter().map(|l| l.confidence).collect::<Vec<_>>(),
            vec![50, 50]
        );
    }

    #[test]
    fn finalize_rejects_negative_confidence() {
        let err = finalize(vec![cand(-5.0), cand(10.0)]).unwrap_err();
        assert!(matches!(err, NormalizationError::InvalidConfidence { index: 0, .. }));
    }

    #[test]
    fn single_fallback_candidate_becomes_100() {
        let out = finalize(vec![cand(0.7)]).unwrap();
        assert_eq!(out[0].confidence, 100);
    }
}
