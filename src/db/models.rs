use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::telemetry::NewReading;

/// A reading as committed to the store.
///
/// `created_at` is server wall-clock time assigned at ingest. It is
/// non-decreasing in insertion order, unlike the device-supplied `timestamp`.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct StoredReading {
    pub id: Uuid,
    pub device_id: String,
    #[sqlx(rename = "device_timestamp")]
    pub timestamp: f64,
    pub pir1_status: bool,
    pub pir2_status: bool,
    pub relay1_status: bool,
    pub relay2_status: bool,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub power: Option<f64>,
    pub energy: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl StoredReading {
    pub fn from_new(id: Uuid, created_at: DateTime<Utc>, r: NewReading) -> Self {
        Self {
            id,
            device_id: r.device_id,
            timestamp: r.timestamp,
            pir1_status: r.pir1_status,
            pir2_status: r.pir2_status,
            relay1_status: r.relay1_status,
            relay2_status: r.relay2_status,
            voltage: r.voltage,
            current: r.current,
            power: r.power,
            energy: r.energy,
            created_at,
        }
    }

    /// The device-supplied part of the record, without store-assigned fields.
    pub fn reading(&self) -> NewReading {
        NewReading {
            device_id: self.device_id.clone(),
            timestamp: self.timestamp,
            pir1_status: self.pir1_status,
            pir2_status: self.pir2_status,
            relay1_status: self.relay1_status,
            relay2_status: self.relay2_status,
            voltage: self.voltage,
            current: self.current,
            power: self.power,
            energy: self.energy,
        }
    }
}
