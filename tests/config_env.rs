// tests/config_env.rs
//
// Config loading: explicit path, env overrides, "ENV" key resolution, and the
// full `app()` builder with mock vision. Env-mutating tests run serially.

use std::{env, fs};

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serial_test::serial;
use tower::ServiceExt as _;

use geo_vision_proxy::config::app::ENV_APP_CONFIG_PATH;
use geo_vision_proxy::AppConfig;

fn clear_env() {
    for k in [
        ENV_APP_CONFIG_PATH,
        "DEFAULT_CITY",
        "VISION_TEST_MODE",
        "OPENAI_API_KEY",
        "GEOCODING_API_KEY",
        "DEBUG_ROUTES",
    ] {
        env::remove_var(k);
    }
}

#[test]
#[serial]
fn explicit_path_and_env_overrides() {
    clear_env();
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("app.toml");
    fs::write(
        &path,
        r#"
            [vision]
            api_key = "ENV"

            [geocoding]
            api_key = "literal-geo-key"

            [locate]
            default_city = "Berlin"
            default_confidence = 0.55
        "#,
    )
    .unwrap();

    env::set_var(ENV_APP_CONFIG_PATH, path.display().to_string());
    env::set_var("OPENAI_API_KEY", "sk-test");
    let cfg = AppConfig::load().unwrap();
    assert_eq!(cfg.locate.default_city, "Berlin");
    assert_eq!(cfg.locate.default_confidence, 0.55);
    assert_eq!(cfg.vision.api_key, "sk-test");
    assert_eq!(cfg.geocoding.api_key, "literal-geo-key");

    // DEFAULT_CITY wins over the file
    env::set_var("DEFAULT_CITY", "Hamburg");
    let cfg = AppConfig::load().unwrap();
    assert_eq!(cfg.locate.default_city, "Hamburg");

    clear_env();
}

#[test]
#[serial]
fn missing_explicit_path_is_an_error() {
    clear_env();
    env::set_var(ENV_APP_CONFIG_PATH, "/definitely/not/here/app.toml");
    let err = AppConfig::load().unwrap_err();
    assert!(format!("{err:#}").contains("reading app config"));
    clear_env();
}

#[test]
#[serial]
fn invalid_toml_is_an_error() {
    clear_env();
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("broken.toml");
    fs::write(&path, "[locate\ndefault_city = ").unwrap();
    env::set_var(ENV_APP_CONFIG_PATH, path.display().to_string());
    assert!(AppConfig::load().is_err());
    clear_env();
}

#[tokio::test]
#[serial]
async fn app_with_mock_vision_and_metrics_route() {
    clear_env();
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("app.toml");
    fs::write(&path, "[locate]\ndefault_city = \"Lisbon\"\n").unwrap();
    env::set_var(ENV_APP_CONFIG_PATH, path.display().to_string());
    env::set_var("VISION_TEST_MODE", "mock");
    env::set_var("DEBUG_ROUTES", "1");

    let app = geo_vision_proxy::app().await.expect("app() should build");

    let resp = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    clear_env();
}
