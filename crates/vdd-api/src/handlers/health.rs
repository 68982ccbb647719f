//! Health check and service description handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check endpoint. 503 while no model is loaded.
pub async fn health(State(state): State<AppState>) -> Response {
    if state.model_loaded() {
        let body = HealthResponse {
            status: "healthy".to_string(),
            model_loaded: true,
            timestamp: Some(Utc::now().to_rfc3339()),
            error: None,
        };
        (StatusCode::OK, Json(body)).into_response()
    } else {
        let body = HealthResponse {
            status: "unhealthy".to_string(),
            model_loaded: false,
            timestamp: None,
            error: Some("Model not loaded".to_string()),
        };
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

/// Static description of the service.
pub async fn api_info() -> Json<serde_json::Value> {
    Json(json!({
        "name": "Vehicle Damage Detection API",
        "version": "1.0.0",
        "description": "AI-powered vehicle damage detection system",
        "endpoints": {
            "POST /predict": "Image damage detection",
            "POST /predict_img": "Video damage detection",
            "GET /video_feed": "Live video stream",
            "POST /stop": "Stop live video stream",
            "GET /health": "Health check",
            "GET /api/info": "API information"
        }
    }))
}
