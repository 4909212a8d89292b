// src/upstream/drone.rs
//! Drone waypoint upload. There is no real flight controller behind this: a
//! mission is validated, measured and acknowledged with a simulated receipt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::DroneConfig;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lng: f64,
    /// Meters above takeoff; config default when absent.
    #[serde(default)]
    pub altitude_m: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MissionRequest {
    pub waypoints: Vec<Waypoint>,
    #[serde(default)]
    pub speed_mps: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionReceipt {
    pub mission_id: String,
    pub status: &'static str,
    pub waypoint_count: usize,
    pub total_distance_m: f64,
    pub estimated_duration_s: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MissionError {
    #[error("mission needs at least one waypoint")]
    Empty,
    #[error("mission has {got} waypoints, limit is {max}")]
    TooManyWaypoints { got: usize, max: usize },
    #[error("waypoint {index} has invalid coordinates")]
    InvalidCoordinates { index: usize },
    #[error("waypoint {index} altitude must be in (0, {max}] m")]
    InvalidAltitude { index: usize, max: f64 },
    #[error("speed must be a positive number")]
    InvalidSpeed,
}

/// Validate a mission and produce the simulated upload receipt.
pub fn plan_mission(req: &MissionRequest, cfg: &DroneConfig) -> Result<MissionReceipt, MissionError> {
    let wps = &req.waypoints;
    if wps.is_empty() {
        return Err(MissionError::Empty);
    }
    if wps.len() > cfg.max_waypoints {
        return Err(MissionError::TooManyWaypoints {
            got: wps.len(),
            max: cfg.max_waypoints,
        });
    }

    let mut resolved = Vec::with_capacity(wps.len());
    for (index, wp) in wps.iter().enumerate() {
        if !((-90.0..=90.0).contains(&wp.lat) && (-180.0..=180.0).contains(&wp.lng)) {
            return Err(MissionError::InvalidCoordinates { index });
        }
        let alt = wp.altitude_m.unwrap_or(cfg.default_altitude_m);
        if !(alt > 0.0 && alt <= cfg.max_altitude_m) {
            return Err(MissionError::InvalidAltitude {
                index,
                max: cfg.max_altitude_m,
            });
        }
        resolved.push((wp.lat, wp.lng, alt));
    }

    let speed = match req.speed_mps {
        Some(s) if s.is_finite() && s > 0.0 => s,
        Some(_) => return Err(MissionError::InvalidSpeed),
        None => cfg.cruise_speed_mps,
    };

    let total_distance_m: f64 = resolved
        .windows(2)
        .map(|w| haversine_m(w[0].0, w[0].1, w[1].0, w[1].1))
        .sum();

    let receipt = MissionReceipt {
        mission_id: mission_id(&resolved),
        status: "simulated",
        waypoint_count: resolved.len(),
        total_distance_m: round_to(total_distance_m, 1),
        estimated_duration_s: round_to(total_distance_m / speed, 1),
        created_at: Utc::now(),
    };
    tracing::info!(
        target: "drone",
        mission_id = %receipt.mission_id,
        waypoints = receipt.waypoint_count,
        distance_m = receipt.total_distance_m,
        "simulated mission accepted"
    );
    Ok(receipt)
}

/// Great-circle distance in meters.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
    let dp = (lat2 - lat1).to_radians();
    let dl = (lng2 - lng1).to_radians();
    let a = (dp / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dl / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Deterministic short id: first 6 bytes of SHA-256 over the resolved waypoints.
fn mission_id(resolved: &[(f64, f64, f64)]) -> String {
    let mut hasher = Sha256::new();
    for (lat, lng, alt) in resolved {
        hasher.update(format!("{lat:.7},{lng:.7},{alt:.1};").as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    out.push_str("msn-");
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn round_to(x: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (x * f).round() / f
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wp(lat: f64, lng: f64) -> Waypoint {
        Waypoint {
            lat,
            lng,
            altitude_m: None,
        }
    }

    #[test]
    fn one_degree_of_latitude_is_about_111km() {
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 50.0, "got {d}");
    }

    #[test]
    fn receipt_measures_path_and_duration() {
        let req = MissionRequest {
            waypoints: vec![wp(0.0, 0.0), wp(0.001, 0.0), wp(0.002, 0.0)],
            speed_mps: Some(10.0),
        };
        let r = plan_mission(&req, &DroneConfig::default()).unwrap();
        assert_eq!(r.waypoint_count, 3);
        assert_eq!(r.status, "simulated");
        assert!((r.total_distance_m - 222.4).abs() < 0.5);
        assert!((r.estimated_duration_s - 22.2).abs() < 0.2);
        assert!(r.mission_id.starts_with("msn-"));
        assert_eq!(r.mission_id.len(), 16);
    }

    #[test]
    fn same_waypoints_same_id() {
        let req = MissionRequest {
            waypoints: vec![wp(37.7, -122.4), wp(37.8, -122.5)],
            speed_mps: None,
        };
        let cfg = DroneConfig::default();
        assert_eq!(
            plan_mission(&req, &cfg).unwrap().mission_id,
            plan_mission(&req, &cfg).unwrap().mission_id
        );
    }

    #[test]
    fn validation_errors() {
        let cfg = DroneConfig::default();
        let empty = MissionRequest {
            waypoints: vec![],
            speed_mps: None,
        };
        assert_eq!(plan_mission(&empty, &cfg).unwrap_err(), MissionError::Empty);

        let bad = MissionRequest {
            waypoints: vec![wp(0.0, 0.0), wp(95.0, 0.0)],
            speed_mps: None,
        };
        assert_eq!(
            plan_mission(&bad, &cfg).unwrap_err(),
            MissionError::InvalidCoordinates { index: 1 }
        );

        let high = MissionRequest {
            waypoints: vec![Waypoint {
                lat: 0.0,
                lng: 0.0,
                altitude_m: Some(400.0),
            }],
            speed_mps: None,
        };
        assert!(matches!(
            plan_mission(&high, &cfg).unwrap_err(),
            MissionError::InvalidAltitude { index: 0, .. }
        ));

        let slow = MissionRequest {
            waypoints: vec![wp(0.0, 0.0)],
            speed_mps: Some(0.0),
        };
        assert_eq!(plan_mission(&slow, &cfg).unwrap_err(), MissionError::InvalidSpeed);

        let many = MissionRequest {
            waypoints: (0..100).map(|i| wp(0.0, i as f64 * 0.001)).collect(),
            speed_mps: None,
        };
        assert_eq!(
            plan_mission(&many, &cfg).unwrap_err(),
            MissionError::TooManyWaypoints { got: 100, max: 99 }
        );
    }
}
