pub mod validator;

pub use validator::{validate, FieldError, InvalidPayload};

/// A telemetry sample that has passed validation and is ready to be stored.
///
/// `timestamp` is the device uptime clock, not wall time. It may reset when
/// the device reboots, so it is never used for ordering.
///
/// The four power fields are independently nullable; `None` means the power
/// meter failed to report, which is distinct from a zero reading.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub device_id: String,
    pub timestamp: f64,
    pub pir1_status: bool,
    pub pir2_status: bool,
    pub relay1_status: bool,
    pub relay2_status: bool,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub power: Option<f64>,
    pub energy: Option<f64>,
}
