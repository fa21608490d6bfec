//! Static file server
//!
//! Publishes the instance data directory read-only over plain HTTP, next to
//! a JSON status endpoint. Missing files answer 404.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use std::path::Path;
use tower_http::services::ServeDir;

use crate::server::ServerStatus;

pub const STATUS_ROUTE: &str = "/api/status";

/// Builds the HTTP application rooted at `instance_dir`.
pub fn router(instance_dir: &Path, status: ServerStatus) -> Router {
    Router::new()
        .route(STATUS_ROUTE, get(get_status))
        .fallback_service(ServeDir::new(instance_dir))
        .with_state(status)
}

async fn get_status(State(status): State<ServerStatus>) -> Json<ServerStatus> {
    Json(status)
}
