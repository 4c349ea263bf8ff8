//! Admin/Observability Surface (ambient, SPEC_FULL §4.8)
//!
//! A small `axum` router exposing `/health` and a read-only JSON view of
//! the local catalogue, off by default and gated by [`FabricConfig::admin_enabled`].
//! Grounded on the teacher's `server.rs`/`rest_api.rs` health-check routes.
//! This is a local debugging aid, not a replacement for the monitoring
//! event protocol, and is not itself a tested property.

use crate::catalogue::Catalogue;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn catalogue_snapshot(State(catalogue): State<Arc<Catalogue>>) -> Json<Vec<crate::catalogue::FunctionDescriptor>> {
    Json(catalogue.all())
}

/// Builds the admin router bound to `catalogue`. Callers serve this with
/// their own `axum::serve` call against `FabricConfig::admin_bind_address`.
#[must_use]
pub fn router(catalogue: Arc<Catalogue>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/catalogue", get(catalogue_snapshot))
        .with_state(catalogue)
}

/// Starts serving the admin router at `bind_address`, running until the
/// process exits. Intended to be spawned as its own task.
pub async fn serve(catalogue: Arc<Catalogue>, bind_address: &str) -> std::io::Result<()> {
    let app = router(catalogue);
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!(%bind_address, "admin surface listening");
    axum::serve(listener, app).await
}
