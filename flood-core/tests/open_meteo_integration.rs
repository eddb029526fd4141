use flood_core::{
    Coordinate, FeatureSource, FloodRiskError, OpenMeteoConfig, provider::open_meteo::OpenMeteoProvider,
};
use chrono::{Duration as ChronoDuration, Utc};
use httpmock::prelude::*;
use std::time::{Duration, Instant};

fn provider_config(server: &MockServer, retries: u32) -> OpenMeteoConfig {
    OpenMeteoConfig {
        forecast_url: server.url("/v1/forecast"),
        elevation_url: server.url("/v1/elevation"),
        timeout_secs: 5,
        retries,
        retry_delay_ms: 0,
        rainfall_window_days: 7,
    }
}

fn provider_for(server: &MockServer, retries: u32) -> OpenMeteoProvider {
    OpenMeteoProvider::new(provider_config(server, retries)).expect("client builds")
}

fn kochi() -> Coordinate {
    Coordinate::new(9.9312, 76.2673).unwrap()
}

fn hours_from_now(offset: i64) -> String {
    (Utc::now() + ChronoDuration::hours(offset))
        .format("%Y-%m-%dT%H:00")
        .to_string()
}

/// Three observed hours plus one forecast hour that must not count.
fn forecast_body() -> serde_json::Value {
    serde_json::json!({
        "latitude": 9.9375,
        "longitude": 76.25,
        "hourly": {
            "time": [hours_from_now(-3), hours_from_now(-2), hours_from_now(-1), hours_from_now(2)],
            "precipitation": [40.5, null, 79.5, 500.0],
            "soil_moisture_0_to_1cm": [0.38, null, 0.4, 0.9]
        }
    })
}

#[tokio::test]
async fn fetches_all_three_features() {
    let server = MockServer::start_async().await;
    let today = Utc::now().date_naive();
    let start = (today - ChronoDuration::days(6)).format("%Y-%m-%d").to_string();
    let end = today.format("%Y-%m-%d").to_string();

    let forecast = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/forecast")
                .query_param("latitude", "9.9312")
                .query_param("longitude", "76.2673")
                .query_param("hourly", "precipitation,soil_moisture_0_to_1cm")
                .query_param("start_date", start.as_str())
                .query_param("end_date", end.as_str())
                .query_param("timezone", "UTC");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(forecast_body());
        })
        .await;

    let elevation = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/elevation")
                .query_param("latitude", "9.9312")
                .query_param("longitude", "76.2673");
            then.status(200).json_body(serde_json::json!({ "elevation": [5.0] }));
        })
        .await;

    let features = provider_for(&server, 1).fetch_features(&kochi()).await.unwrap();

    forecast.assert_async().await;
    elevation.assert_async().await;
    // The forecast hour (500 mm, 0.9) is excluded from both features.
    assert_eq!(features.rainfall, 120.0);
    assert_eq!(features.soil_moisture, 0.4);
    assert_eq!(features.elevation, 5.0);
}

#[tokio::test]
async fn only_forecast_hours_is_schema_error() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/forecast");
            then.status(200).json_body(serde_json::json!({
                "hourly": {
                    "time": [hours_from_now(2), hours_from_now(3)],
                    "precipitation": [5.0, 6.0],
                    "soil_moisture_0_to_1cm": [0.3, 0.3]
                }
            }));
        })
        .await;

    let err = provider_for(&server, 0).fetch_features(&kochi()).await.unwrap_err();
    assert!(matches!(err, FloodRiskError::UpstreamSchema(_)));
}

#[tokio::test]
async fn slow_provider_times_out_and_is_retried() {
    let server = MockServer::start_async().await;

    let forecast = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/forecast");
            then.status(200)
                .delay(Duration::from_secs(3))
                .json_body(forecast_body());
        })
        .await;

    let config = OpenMeteoConfig {
        timeout_secs: 1,
        ..provider_config(&server, 1)
    };
    let provider = OpenMeteoProvider::new(config).unwrap();

    let started = Instant::now();
    let err = provider.fetch_features(&kochi()).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, FloodRiskError::UpstreamUnavailable(_)));
    forecast.assert_hits_async(2).await;
    // Two 1 s attempts, each cut off well before the 3 s response.
    assert!(elapsed < Duration::from_millis(2900), "took {elapsed:?}");
}

#[tokio::test]
async fn server_error_is_retried_once_then_reported() {
    let server = MockServer::start_async().await;

    let forecast = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/forecast");
            then.status(503).body("maintenance");
        })
        .await;
    let elevation = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/elevation");
            then.status(200).json_body(serde_json::json!({ "elevation": [5.0] }));
        })
        .await;

    let err = provider_for(&server, 1).fetch_features(&kochi()).await.unwrap_err();

    assert!(matches!(err, FloodRiskError::UpstreamUnavailable(_)));
    assert!(err.to_string().contains("503"));
    forecast.assert_hits_async(2).await;
    // Partial failure fails the whole lookup before the second call.
    elevation.assert_hits_async(0).await;
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start_async().await;

    let forecast = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/forecast");
            then.status(400)
                .json_body(serde_json::json!({ "error": true, "reason": "Latitude must be in range" }));
        })
        .await;

    let err = provider_for(&server, 3).fetch_features(&kochi()).await.unwrap_err();

    assert!(matches!(err, FloodRiskError::UpstreamUnavailable(_)));
    forecast.assert_hits_async(1).await;
}

#[tokio::test]
async fn elevation_failure_fails_the_request() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/forecast");
            then.status(200).json_body(forecast_body());
        })
        .await;
    let elevation = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/elevation");
            then.status(500);
        })
        .await;

    let err = provider_for(&server, 0).fetch_features(&kochi()).await.unwrap_err();

    assert!(matches!(err, FloodRiskError::UpstreamUnavailable(_)));
    elevation.assert_hits_async(1).await;
}

#[tokio::test]
async fn missing_fields_are_schema_errors() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/forecast");
            then.status(200).json_body(forecast_body());
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/elevation");
            then.status(200).json_body(serde_json::json!({ "reason": "no data" }));
        })
        .await;

    let err = provider_for(&server, 1).fetch_features(&kochi()).await.unwrap_err();

    assert!(matches!(err, FloodRiskError::UpstreamSchema(_)));
    assert!(err.to_string().contains("elevation"));
}

#[tokio::test]
async fn non_json_body_is_schema_error() {
    let server = MockServer::start_async().await;

    let forecast = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/forecast");
            then.status(200).body("<html>gateway</html>");
        })
        .await;

    let err = provider_for(&server, 1).fetch_features(&kochi()).await.unwrap_err();

    assert!(matches!(err, FloodRiskError::UpstreamSchema(_)));
    // Schema problems are not retried.
    forecast.assert_hits_async(1).await;
}

#[tokio::test]
async fn unreachable_provider_is_unavailable() {
    let config = OpenMeteoConfig {
        forecast_url: "http://127.0.0.1:9/v1/forecast".to_string(),
        elevation_url: "http://127.0.0.1:9/v1/elevation".to_string(),
        timeout_secs: 2,
        retries: 0,
        retry_delay_ms: 0,
        rainfall_window_days: 7,
    };
    let provider = OpenMeteoProvider::new(config).unwrap();

    let err = provider.fetch_features(&kochi()).await.unwrap_err();
    assert!(matches!(err, FloodRiskError::UpstreamUnavailable(_)));
}

#[tokio::test]
async fn connection_failure_is_retried_after_delay() {
    let config = OpenMeteoConfig {
        forecast_url: "http://127.0.0.1:9/v1/forecast".to_string(),
        elevation_url: "http://127.0.0.1:9/v1/elevation".to_string(),
        timeout_secs: 2,
        retries: 1,
        retry_delay_ms: 300,
        rainfall_window_days: 7,
    };
    let provider = OpenMeteoProvider::new(config).unwrap();

    let started = Instant::now();
    let err = provider.fetch_features(&kochi()).await.unwrap_err();

    assert!(matches!(err, FloodRiskError::UpstreamUnavailable(_)));
    // A refused connection returns at once, so the delay shows the retry ran.
    assert!(started.elapsed() >= Duration::from_millis(300));
}
