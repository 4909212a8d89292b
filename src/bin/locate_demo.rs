//! Demo: run the location pipeline over saved model output.
//!
//! Usage: `cargo run --bin locate_demo -- [CITY] < model_output.txt`

use std::io::Read;

use geo_vision_proxy::locate::{locate_from_text, Extractor};
use geo_vision_proxy::AppConfig;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let cfg = AppConfig::load()?;
    let city = std::env::args()
        .nth(1)
        .unwrap_or_else(|| cfg.locate.default_city.clone());

    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;

    let extractor = Extractor::new(cfg.locate.extractor_defaults());
    let outcome = locate_from_text(&extractor, &raw, &city)?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
