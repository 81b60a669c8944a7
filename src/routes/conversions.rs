use axum::{
    extract::State,
    routing::post,
    Router,
    Json,
    http::Method,
};
use std::sync::Arc;
use crate::{
    AppState,
    error::AppError,
    models::BatchReport,
    services::batch::{run_batch, BatchManifest},
};
use tower_http::cors::{CorsLayer, Any};

pub fn routes() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/conversions", post(create_conversions))
        .layer(cors)
}

async fn create_conversions(
    State(state): State<Arc<AppState>>,
    Json(manifest): Json<BatchManifest>,
) -> Result<Json<BatchReport>, AppError> {
    let entries = manifest.into_entries();
    if entries.is_empty() {
        return Err(AppError::InvalidInput("Manifest has no entries".to_string()));
    }
    tracing::info!("Received conversion request with {} entries", entries.len());

    let config = state.config.clone();
    let report = tokio::task::spawn_blocking(move || run_batch(&entries, &config))
        .await
        .map_err(|e| AppError::Internal(format!("Conversion task failed: {}", e)))?;

    tracing::info!(
        "Conversion request finished: {} succeeded, {} failed",
        report.succeeded,
        report.failed
    );
    Ok(Json(report))
}
