//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vdd_api::{create_router, metrics, ApiConfig, AppState};
use vdd_media::fs_utils::ensure_dir;
use vdd_media::{check_ffmpeg, check_ffprobe, Annotator, ObjectDetector, SharedDetector};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = match "vdd=info".parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vdd-api");

    // Load configuration
    let config = ApiConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    for check in [check_ffmpeg(), check_ffprobe()] {
        if let Err(e) = check {
            warn!("{}; video prediction and the live stream will fail", e);
        }
    }

    let annotator = match Annotator::from_font_path(config.label_font_path.as_deref()) {
        Ok(annotator) => annotator,
        Err(e) => {
            warn!("Failed to load label font, boxes will be drawn without labels: {}", e);
            Annotator::default()
        }
    };

    // The server keeps running without a model; predictions answer 503
    let detector: Option<SharedDetector> = match ObjectDetector::load(&config.detector) {
        Ok(detector) => {
            info!(
                model = %config.detector.model_path.display(),
                classes = detector.labels().len(),
                "Model loaded"
            );
            Some(Arc::new(detector))
        }
        Err(e) => {
            error!(model = %config.detector.model_path.display(), "Failed to load model: {}", e);
            None
        }
    };

    for dir in [&config.upload_dir, &config.processed_dir] {
        if let Err(e) = ensure_dir(dir).await {
            error!("Failed to create {}: {}", dir.display(), e);
            std::process::exit(1);
        }
    }

    // Initialize metrics
    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    let metrics_handle = if metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                warn!("Failed to install metrics recorder: {}", e);
                None
            }
        }
    } else {
        None
    };

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid bind address {}:{}: {}", config.host, config.port, e);
            std::process::exit(1);
        }
    };

    // Create application state and router
    let state = AppState::new(config, detector, Arc::new(annotator));
    let streams = state.streams.clone();
    let app = create_router(state, metrics_handle);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", addr);

    let shutdown = async move {
        shutdown_signal().await;
        // Live streams never end on their own
        let stopped = streams.stop_all();
        if stopped > 0 {
            info!("Stopped {} live stream(s)", stopped);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
