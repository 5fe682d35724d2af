use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    control::{CommandAck, RelayState},
    db::models::StoredReading,
    telemetry::FieldError,
};

/// A stored reading as served to the dashboard.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadingDto {
    pub id: Uuid,
    pub device_id: String,
    /// Device uptime clock; resets on reboot.
    pub timestamp: f64,
    /// 0 or 1
    pub pir1_status: u8,
    /// 0 or 1
    pub pir2_status: u8,
    /// 0 or 1
    pub relay1_status: u8,
    /// 0 or 1
    pub relay2_status: u8,
    /// Volts. `null` when the power meter failed.
    pub voltage: Option<f64>,
    /// Amperes
    pub current: Option<f64>,
    /// Watts
    pub power: Option<f64>,
    /// Kilowatt-hours
    pub energy: Option<f64>,
    /// Server time at ingest.
    pub created_at: DateTime<Utc>,
}

impl From<StoredReading> for ReadingDto {
    fn from(r: StoredReading) -> Self {
        Self {
            id: r.id,
            device_id: r.device_id,
            timestamp: r.timestamp,
            pir1_status: r.pir1_status.into(),
            pir2_status: r.pir2_status.into(),
            relay1_status: r.relay1_status.into(),
            relay2_status: r.relay2_status.into(),
            voltage: r.voltage,
            current: r.current,
            power: r.power,
            energy: r.energy,
            created_at: r.created_at,
        }
    }
}

/// Device wire format for `POST /devices/status` and `POST /devices`.
///
/// Documentation shape only: the handlers validate the raw JSON so that every
/// offending field can be reported.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReadingPayload {
    pub sensor_id: String,
    pub timestamp: f64,
    pub pir1_status: u8,
    pub pir2_status: u8,
    pub relay1_status: u8,
    pub relay2_status: u8,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub power: Option<f64>,
    pub energy: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    pub message: String,
    pub device_id: String,
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
}

impl From<StoredReading> for IngestResponse {
    fn from(r: StoredReading) -> Self {
        Self {
            success: true,
            message: "Data saved successfully".to_owned(),
            device_id: r.device_id,
            id: r.id,
            received_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LatestReadingsResponse {
    pub success: bool,
    pub data: Vec<ReadingDto>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeviceReadingResponse {
    pub success: bool,
    pub data: Option<ReadingDto>,
}

/// Body of every relay endpoint response, success or failure.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelayControlResponse {
    pub success: bool,
    pub device_id: String,
    pub relay: String,
    /// The requested state. Not a physical confirmation.
    pub new_state: bool,
    /// What the device has confirmed; `unknown` without a feedback channel.
    pub confirmed_state: RelayState,
    pub message: String,
}

impl From<CommandAck> for RelayControlResponse {
    fn from(ack: CommandAck) -> Self {
        Self {
            success: true,
            device_id: ack.device_id,
            relay: ack.relay_id,
            new_state: ack.new_state,
            confirmed_state: ack.confirmed_state,
            message: ack.message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    /// Present for validation failures only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldErrorDto>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FieldErrorDto {
    pub field: String,
    pub reason: String,
}

impl From<FieldError> for FieldErrorDto {
    fn from(e: FieldError) -> Self {
        Self {
            field: e.field,
            reason: e.reason,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}
