// src/config/mod.rs
pub mod app;

pub use app::{
    AppConfig, DroneConfig, GeocodingConfig, LocateConfig, ServerConfig, VisionConfig,
};
