use axum::{Json, Router, response::IntoResponse, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wsi_tile_server::config::Config;
use wsi_tile_server::slide::OpenSlideReader;
use wsi_tile_server::{MirrorDefaults, SlideAppState, command_routes, slide_routes};

/// Ensure a directory exists, creating it if necessary.
/// Returns true if directory exists and is empty.
fn ensure_directory(path: &Path, name: &str) -> std::io::Result<bool> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        info!("Created {} directory: {:?}", name, path);
        Ok(true)
    } else if path.is_dir() {
        let is_empty = path.read_dir()?.next().is_none();
        Ok(is_empty)
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} path {:?} exists but is not a directory", name, path),
        ))
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus metrics handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Endpoint to expose metrics in Prometheus format
async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize Prometheus metrics recorder (must be done before any metrics are recorded)
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    PROMETHEUS_HANDLE.set(prometheus_handle).ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wsi_tile_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        "Loaded configuration: host={}, port={}",
        config.host, config.port
    );
    info!(
        "Slides: {:?}, macros: {:?}, cache: {:?}, macro cache: {:?}, dicom: {:?}",
        config.storage.slides_dir,
        config.storage.macro_dir,
        config.storage.cache_dir,
        config.storage.macro_cache_dir,
        config.storage.dicom_dir
    );

    for (path, name) in [
        (&config.storage.slides_dir, "slides"),
        (&config.storage.macro_dir, "macro"),
    ] {
        match ensure_directory(path, name) {
            Ok(true) => warn!("{} directory {:?} is empty", name, path),
            Ok(false) => {}
            Err(e) => warn!("Failed to create {} directory {:?}: {}", name, path, e),
        }
    }
    for (path, name) in [
        (&config.storage.cache_dir, "tile cache"),
        (&config.storage.macro_cache_dir, "macro cache"),
    ] {
        if let Err(e) = ensure_directory(path, name) {
            warn!("Failed to create {} directory {:?}: {}", name, path, e);
        }
    }

    // Mirror defaults are loaded before the listener starts and never change
    let mirror = MirrorDefaults::load(&config.metadata_path);

    let slide_state = SlideAppState::new(
        &config.storage,
        Arc::new(OpenSlideReader),
        mirror,
        config.jpeg_quality,
    );

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics/prometheus", get(prometheus_metrics))
        .nest("/api", slide_routes(slide_state.clone()))
        .merge(command_routes(slide_state))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("WSI tile server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
