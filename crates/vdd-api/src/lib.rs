//! Axum HTTP API server.
//!
//! This crate provides:
//! - Image and video damage prediction endpoints
//! - A live annotated MJPEG camera stream with explicit stop
//! - Range-capable delivery of processed videos
//! - CORS, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod state;
pub mod stream_registry;
pub mod upload;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
pub use stream_registry::StreamRegistry;
