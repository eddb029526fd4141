//! HTTP API.
//!
//! Endpoints:
//! - POST /predict-by-location - `{"latitude", "longitude"}` -> `{"flood_risk"}`
//! - POST /predict - `{"rainfall", "soil_moisture", "elevation"}` -> `{"flood_risk", "confidence"}`
//! - GET /health - Service health check

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use flood_core::{FeatureVector, FloodRiskError, FloodRiskService, RiskLevel};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const ENDPOINTS: [&str; 3] = ["POST /predict-by-location", "POST /predict", "GET /health"];

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FloodRiskService>,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct LocationResponse {
    pub flood_risk: RiskLevel,
}

#[derive(Debug, Serialize)]
pub struct FeatureResponse {
    pub flood_risk: RiskLevel,
    pub confidence: f64,
}

/// Maps [`FloodRiskError`] onto a status code and `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError(FloodRiskError);

impl From<FloodRiskError> for ApiError {
    fn from(err: FloodRiskError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &FloodRiskError) -> StatusCode {
    match err {
        FloodRiskError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        FloodRiskError::UpstreamUnavailable(_) | FloodRiskError::UpstreamSchema(_) => {
            StatusCode::BAD_GATEWAY
        }
        FloodRiskError::InvalidFeatures(_) | FloodRiskError::ModelUnavailable(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "rejected request");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(service: Arc<FloodRiskService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict-by-location", post(predict_by_location))
        .route("/predict", post(predict_from_features))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { service })
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let service = &state.service;
    Json(json!({
        "status": "ok",
        "service": "flood-risk",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": service.source().id().as_str(),
        "model_trees": service.model().n_trees(),
        "region": service.region(),
    }))
}

async fn predict_by_location(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<LocationResponse>, ApiError> {
    let body = json_body(payload)?;
    let latitude = required_number(&body, "latitude")?;
    let longitude = required_number(&body, "longitude")?;

    let result = state.service.predict_by_location(latitude, longitude).await?;

    Ok(Json(LocationResponse {
        flood_risk: result.prediction.label,
    }))
}

async fn predict_from_features(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<FeatureResponse>, ApiError> {
    let body = json_body(payload)?;
    let rainfall = required_number(&body, "rainfall")?;
    let soil_moisture = required_number(&body, "soil_moisture")?;
    let elevation = required_number(&body, "elevation")?;

    // Caller-supplied features are a client error when invalid.
    let features = FeatureVector::new(rainfall, soil_moisture, elevation).map_err(|e| match e {
        FloodRiskError::InvalidFeatures(msg) => FloodRiskError::InvalidInput(msg),
        other => other,
    })?;

    let prediction = state.service.predict_from_features(&features)?;

    Ok(Json(FeatureResponse {
        flood_risk: prediction.label,
        confidence: prediction.confidence,
    }))
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found",
            "available_endpoints": ENDPOINTS,
        })),
    )
}

fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, FloodRiskError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| FloodRiskError::InvalidInput(rejection.body_text()))
}

fn required_number(body: &Value, field: &str) -> Result<f64, FloodRiskError> {
    let object = body
        .as_object()
        .ok_or_else(|| FloodRiskError::InvalidInput("Request body must be a JSON object".into()))?;

    match object.get(field) {
        None | Some(Value::Null) => Err(FloodRiskError::InvalidInput(format!(
            "Missing field: {field}"
        ))),
        Some(value) => value.as_f64().ok_or_else(|| {
            FloodRiskError::InvalidInput(format!("Field '{field}' must be a number"))
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
