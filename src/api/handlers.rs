use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use utoipa::OpenApi;

use super::{
    dto::{
        DeviceReadingResponse, ErrorResponse, FieldErrorDto, HealthResponse, IngestResponse,
        LatestReadingsResponse, ReadingDto, ReadingPayload, RelayControlResponse,
    },
    errors::{AppError, RelayFailure, RelayRejection},
    AppState,
};
use crate::{
    auth,
    control::{RelayControlRequest, RelayState},
    telemetry::{self, InvalidPayload},
};

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// Ingest one reading from a device. Requires the device shared secret via
/// `x-api-key` or `Authorization: Bearer`.
#[utoipa::path(
    post,
    path = "/devices/status",
    request_body = ReadingPayload,
    responses(
        (status = 201, description = "Reading stored", body = IngestResponse),
        (status = 400, description = "Payload failed validation", body = ErrorResponse),
        (status = 401, description = "Missing or wrong device secret", body = ErrorResponse),
        (status = 500, description = "Telemetry store unavailable", body = ErrorResponse),
    ),
    tag = "telemetry"
)]
pub async fn ingest_reading(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    if let Err(e) = state.auth.authorize_device(auth::device_credential(&headers)) {
        warn!("Rejected device ingest: bad or missing API key");
        return Err(e.into());
    }
    store_payload(&state, &body).await
}

/// Write one reading on behalf of a dashboard user. Requires a signed token
/// via `Authorization: Bearer`.
#[utoipa::path(
    post,
    path = "/devices",
    request_body = ReadingPayload,
    responses(
        (status = 201, description = "Reading stored", body = IngestResponse),
        (status = 400, description = "Payload failed validation", body = ErrorResponse),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorResponse),
        (status = 500, description = "Telemetry store unavailable", body = ErrorResponse),
    ),
    tag = "telemetry"
)]
pub async fn write_reading(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    let claims = match state.auth.authorize_user(auth::bearer_token(&headers)) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("Rejected user write: bad or missing token");
            return Err(e.into());
        }
    };
    info!(user = ?claims.sub, "User-originated reading write");
    store_payload(&state, &body).await
}

async fn store_payload(
    state: &AppState,
    body: &[u8],
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| InvalidPayload::single("body", &format!("is not valid JSON: {e}")))?;

    let reading = match telemetry::validate(&payload) {
        Ok(reading) => reading,
        Err(e) => {
            warn!(error = %e, "Rejected reading");
            return Err(e.into());
        }
    };

    let stored = state.store.append(reading).await?;
    info!(
        device_id = %stored.device_id,
        id = %stored.id,
        received_at = %stored.created_at,
        "Reading saved"
    );

    Ok((StatusCode::CREATED, Json(stored.into())))
}

/// Latest reading of every device that has reported, most recent first.
#[utoipa::path(
    get,
    path = "/devices/status",
    responses(
        (status = 200, description = "One reading per device", body = LatestReadingsResponse),
        (status = 500, description = "Telemetry store unavailable", body = ErrorResponse),
    ),
    tag = "telemetry"
)]
pub async fn get_latest_readings(
    State(state): State<AppState>,
) -> Result<Json<LatestReadingsResponse>, AppError> {
    let rows = state.store.latest_all().await?;
    Ok(Json(LatestReadingsResponse {
        success: true,
        data: rows.into_iter().map(Into::into).collect(),
    }))
}

/// Latest reading of one device; `data` is `null` if it never reported.
#[utoipa::path(
    get,
    path = "/devices/status/{device_id}",
    params(
        ("device_id" = String, Path, description = "Device identifier (sensor_id)"),
    ),
    responses(
        (status = 200, description = "Latest reading or null", body = DeviceReadingResponse),
        (status = 500, description = "Telemetry store unavailable", body = ErrorResponse),
    ),
    tag = "telemetry"
)]
pub async fn get_device_latest(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceReadingResponse>, AppError> {
    let row = state.store.latest_by_device(&device_id).await?;
    Ok(Json(DeviceReadingResponse {
        success: true,
        data: row.map(Into::into),
    }))
}

// ---------------------------------------------------------------------------
// Relay control
// ---------------------------------------------------------------------------

/// Request a relay switch. The acknowledgement echoes the requested state;
/// `confirmedState` stays `unknown` because the device does not report back.
#[utoipa::path(
    post,
    path = "/{device_id}/relay/{relay_id}",
    params(
        ("device_id" = String, Path, description = "Device identifier"),
        ("relay_id" = String, Path, description = "Relay identifier, one of the configured set"),
    ),
    request_body = RelayControlRequest,
    responses(
        (status = 200, description = "Command accepted", body = RelayControlResponse),
        (status = 400, description = "Unknown relay id or malformed body", body = RelayControlResponse),
        (status = 401, description = "Credential required and missing or wrong", body = RelayControlResponse),
        (status = 502, description = "Command could not be delivered", body = RelayControlResponse),
    ),
    tag = "relays"
)]
pub async fn control_relay(
    State(state): State<AppState>,
    Path((device_id, relay_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RelayControlResponse>, RelayRejection> {
    if state.relay_require_auth && state.auth.authorize_any_header(&headers).is_err() {
        warn!(device_id = %device_id, relay_id = %relay_id, "Rejected relay command: unauthorized");
        return Err(RelayRejection::new(&device_id, &relay_id, RelayFailure::Unauthorized));
    }

    state
        .relays
        .issue(&device_id, &relay_id, &body)
        .await
        .map(|ack| Json(ack.into()))
        .map_err(|e| RelayRejection::new(&device_id, &relay_id, RelayFailure::Command(e)))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` while the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Device API is running".to_owned(),
        timestamp: Utc::now(),
    })
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        ingest_reading,
        write_reading,
        get_latest_readings,
        get_device_latest,
        control_relay,
        health,
    ),
    components(schemas(
        ReadingPayload,
        ReadingDto,
        IngestResponse,
        LatestReadingsResponse,
        DeviceReadingResponse,
        RelayControlRequest,
        RelayControlResponse,
        RelayState,
        ErrorResponse,
        FieldErrorDto,
        HealthResponse,
    )),
    tags(
        (name = "telemetry", description = "Device readings"),
        (name = "relays",    description = "Relay commands"),
        (name = "system",    description = "System endpoints"),
    ),
    info(
        title = "Lamp Gateway API",
        version = "0.1.0",
        description = "Telemetry ingest and relay control for ESP32 lamp controllers"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
