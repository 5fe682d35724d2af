use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use super::dto::{ErrorResponse, RelayControlResponse};
use crate::{
    auth::Unauthorized,
    control::{CommandError, RelayState},
    db::StoreError,
    telemetry::InvalidPayload,
};

/// Failure of a telemetry endpoint, translated to a status and JSON body at
/// the boundary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unauthorized - invalid or missing credential")]
    Unauthorized(#[from] Unauthorized),

    #[error(transparent)]
    InvalidPayload(#[from] InvalidPayload),

    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::StoreUnavailable(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::InvalidPayload(e) => ErrorResponse {
                success: false,
                message: format!("Bad Request - {e}"),
                errors: e.errors.into_iter().map(Into::into).collect(),
            },
            Self::StoreUnavailable(e) => {
                error!(error = %e, "Telemetry store call failed");
                ErrorResponse {
                    success: false,
                    message: "Telemetry store unavailable".to_owned(),
                    errors: Vec::new(),
                }
            }
            Self::Internal(e) => {
                error!(error = %e, "Unhandled request failure");
                ErrorResponse {
                    success: false,
                    message: "Internal server error".to_owned(),
                    errors: Vec::new(),
                }
            }
            other @ Self::Unauthorized(_) => ErrorResponse {
                success: false,
                message: other.to_string(),
                errors: Vec::new(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Turns a handler panic into a 500 instead of a dropped connection.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned());
    AppError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}

/// Failure of a relay endpoint. The body keeps the requested device and
/// relay ids so the caller can correlate it.
#[derive(Debug)]
pub struct RelayRejection {
    pub device_id: String,
    pub relay_id: String,
    pub kind: RelayFailure,
}

#[derive(Debug)]
pub enum RelayFailure {
    Unauthorized,
    Command(CommandError),
}

impl RelayRejection {
    pub fn new(device_id: &str, relay_id: &str, kind: RelayFailure) -> Self {
        Self {
            device_id: device_id.to_owned(),
            relay_id: relay_id.to_owned(),
            kind,
        }
    }

    pub fn status(&self) -> StatusCode {
        match &self.kind {
            RelayFailure::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayFailure::Command(CommandError::UnknownRelay { .. })
            | RelayFailure::Command(CommandError::MalformedCommand(_)) => StatusCode::BAD_REQUEST,
            RelayFailure::Command(CommandError::Dispatch(_)) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for RelayRejection {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.kind {
            RelayFailure::Unauthorized => "Unauthorized - invalid or missing credential".to_owned(),
            RelayFailure::Command(e) => e.to_string(),
        };
        let body = RelayControlResponse {
            success: false,
            device_id: self.device_id,
            relay: self.relay_id,
            new_state: false,
            confirmed_state: RelayState::Unknown,
            message,
        };
        (status, Json(body)).into_response()
    }
}
