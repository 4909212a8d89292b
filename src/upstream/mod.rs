// src/upstream/mod.rs
//! Outbound collaborators: vision model, geocoding, (simulated) drone uploads.

pub mod drone;
pub mod geocode;
pub mod vision;

pub use drone::{plan_mission, MissionError, MissionReceipt, MissionRequest, Waypoint};
pub use geocode::{GeocodeResult, Geocoder};
pub use vision::{build_vision_client, DynVisionClient, MockVision, VisionClient, VisionUnavailable};
