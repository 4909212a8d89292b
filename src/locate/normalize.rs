// src/locate/normalize.rs
//! Confidence normalizer: arbitrary scores → integer percentages summing to 100.
//!
//! Rounding is half-away-from-zero (`f64::round`). Any residual left by rounding
//! goes to the first entry holding the maximum rounded value, so the output is
//! deterministic for identical input. Order is never changed.

use super::{CandidateLocation, RankedLocation};

const TARGET: i32 = 100;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizationError {
    #[error("cannot normalize an empty candidate list")]
    Empty,
    #[error("cannot normalize zero-sum confidences")]
    ZeroSum,
    #[error("confidence at index {index} is not normalizable: {value}")]
    InvalidConfidence { index: usize, value: f64 },
}

/// Rescale confidences to integers summing to exactly 100.
pub fn normalize(
    candidates: &[CandidateLocation],
) -> Result<Vec<RankedLocation>, NormalizationError> {
    if candidates.is_empty() {
        return Err(NormalizationError::Empty);
    }
    if let Some((index, c)) = candidates
        .iter()
        .enumerate()
        .find(|(_, c)| !c.confidence.is_finite() || c.confidence < 0.0)
    {
        return Err(NormalizationError::InvalidConfidence {
            index,
            value: c.confidence,
        });
    }

    // Shares are computed relative to the max so the sum stays finite for huge inputs.
    let max = candidates.iter().map(|c| c.confidence).fold(0.0_f64, f64::max);
    if max == 0.0 {
        return Err(NormalizationError::ZeroSum);
    }
    let sum: f64 = candidates.iter().map(|c| c.confidence).sum();

    let already_percent =
        sum == f64::from(TARGET) && candidates.iter().all(|c| c.confidence.fract() == 0.0);

    let mut rounded: Vec<i32> = if already_percent {
        candidates.iter().map(|c| c.confidence as i32).collect()
    } else {
        let scaled_sum: f64 = candidates.iter().map(|c| c.confidence / max).sum();
        candidates
            .iter()
            .map(|c| (c.confidence / max / scaled_sum * f64::from(TARGET)).round() as i32)
            .collect()
    };

    let residual = TARGET - rounded.iter().sum::<i32>();
    if residual != 0 {
        let idx = first_max_index(&rounded);
        rounded[idx] += residual;
    }

    Ok(candidates
        .iter()
        .zip(rounded)
        .map(|(c, pct)| RankedLocation::from_candidate(c, pct))
        .collect())
}

/// Index of the first maximum (ties → lowest index).
fn first_max_index(values: &[i32]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
