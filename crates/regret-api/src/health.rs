use axum::{
    Json,
    extract::State,
    http::{StatusCode, Uri},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use regret_types::api::HealthResponse;

use crate::state::AppState;

const ENDPOINT_GROUPS: &[&str] = &[
    "/api/confessions",
    "/api/confessions/nearby",
    "/api/locate",
    "/api/auth",
    "/api/health",
    "/api/socket",
];

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = match state.with_db(|db| Ok(db.ping()?)).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Health check: database unreachable: {:?}", e);
            false
        }
    };

    let status = if db_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(HealthResponse {
            status: if db_ok { "ok" } else { "degraded" }.into(),
            timestamp: Utc::now(),
            database: if db_ok { "connected" } else { "unavailable" }.into(),
            viewers: state.dispatcher.viewer_count().await,
        }),
    )
}

pub async fn index() -> impl IntoResponse {
    Json(json!({
        "name": "Regret Journal API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ENDPOINT_GROUPS,
    }))
}

pub async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Route not found",
            "path": uri.path(),
            "availableEndpoints": ENDPOINT_GROUPS,
        })),
    )
}
