pub mod gateway;
pub mod transport;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use gateway::{CommandAck, CommandError, RelayGateway};
pub use transport::{DispatchError, HttpRelayTransport, NoopRelayTransport, RelayTransport};

/// What the service knows about a relay's physical position.
///
/// Without a channel that reports back from the device, the answer is always
/// `Unknown`; an echoed command is not evidence of the relay having switched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RelayState {
    On,
    Off,
    Unknown,
}

/// A validated request to switch one relay. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCommand {
    pub device_id: String,
    pub relay_id: String,
    pub desired_state: bool,
}

/// Request body for `POST /{device_id}/relay/{relay_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RelayControlRequest {
    /// `true` switches the relay on, `false` off.
    pub state: bool,
}

pub(crate) fn on_off(state: bool) -> &'static str {
    if state {
        "ON"
    } else {
        "OFF"
    }
}
