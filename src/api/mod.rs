pub mod dto;
pub mod errors;
pub mod handlers;

use std::sync::Arc;

use axum::{routing::{get, post}, Router};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{auth::AuthGate, control::RelayGateway, db::TelemetryStore};
use handlers::ApiDoc;

/// Per-process collaborators shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TelemetryStore>,
    pub auth: Arc<AuthGate>,
    pub relays: Arc<RelayGateway>,
    /// Whether relay commands need a credential.
    pub relay_require_auth: bool,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route(
            "/devices/status",
            get(handlers::get_latest_readings).post(handlers::ingest_reading),
        )
        .route("/devices/status/{device_id}", get(handlers::get_device_latest))
        .route("/devices", post(handlers::write_reading))
        .route("/{device_id}/relay/{relay_id}", post(handlers::control_relay))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
        .layer(CatchPanicLayer::custom(errors::handle_panic))
        .layer(TraceLayer::new_for_http())
}
