use std::{collections::BTreeSet, sync::Arc};

use tracing::{info, warn};

use super::{
    on_off, DispatchError, RelayCommand, RelayControlRequest, RelayState, RelayTransport,
};

/// Result of an accepted command.
///
/// `new_state` echoes the request; `confirmed_state` is what the device has
/// actually reported, which is `Unknown` until a transport can confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAck {
    pub device_id: String,
    pub relay_id: String,
    pub new_state: bool,
    pub confirmed_state: RelayState,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Invalid relay ID '{relay_id}'. Must be one of: {known}.")]
    UnknownRelay { relay_id: String, known: String },

    #[error("Malformed relay command: {0}")]
    MalformedCommand(String),

    #[error("Relay command could not be delivered: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Admission control for relay commands, plus the single hand-off point to
/// whatever transport reaches the device. Holds no per-call state.
#[derive(Clone)]
pub struct RelayGateway {
    relay_ids: BTreeSet<String>,
    transport: Arc<dyn RelayTransport>,
}

impl RelayGateway {
    pub fn new(relay_ids: BTreeSet<String>, transport: Arc<dyn RelayTransport>) -> Self {
        Self {
            relay_ids,
            transport,
        }
    }

    pub fn relay_ids(&self) -> impl Iterator<Item = &str> {
        self.relay_ids.iter().map(String::as_str)
    }

    /// Validate and dispatch one command.
    ///
    /// Checks run in a fixed order: relay id first, then the body. Dispatch
    /// happens before any success is reported, so a transport failure is
    /// never masked by an early acknowledgement.
    pub async fn issue(
        &self,
        device_id: &str,
        relay_id: &str,
        body: &[u8],
    ) -> Result<CommandAck, CommandError> {
        self.admit_relay(relay_id)?;
        let request = parse_request(body)?;

        let command = RelayCommand {
            device_id: device_id.to_owned(),
            relay_id: relay_id.to_owned(),
            desired_state: request.state,
        };

        info!(
            device_id = %command.device_id,
            relay_id = %command.relay_id,
            state = on_off(command.desired_state),
            "Relay command accepted"
        );

        if let Err(e) = self.transport.dispatch(&command).await {
            warn!(
                device_id = %command.device_id,
                relay_id = %command.relay_id,
                error = %e,
                "Relay command dispatch failed"
            );
            return Err(e.into());
        }

        Ok(CommandAck {
            message: format!(
                "Relay {} on device {} requested {}; physical state not confirmed.",
                command.relay_id,
                command.device_id,
                on_off(command.desired_state),
            ),
            device_id: command.device_id,
            relay_id: command.relay_id,
            new_state: command.desired_state,
            confirmed_state: RelayState::Unknown,
        })
    }

    pub fn admit_relay(&self, relay_id: &str) -> Result<(), CommandError> {
        if self.relay_ids.contains(relay_id) {
            Ok(())
        } else {
            Err(CommandError::UnknownRelay {
                relay_id: relay_id.to_owned(),
                known: self.relay_ids().collect::<Vec<_>>().join(", "),
            })
        }
    }
}

fn parse_request(body: &[u8]) -> Result<RelayControlRequest, CommandError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(CommandError::MalformedCommand("request body is empty".to_owned()));
    }
    serde_json::from_slice(body).map_err(|e| CommandError::MalformedCommand(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::control::NoopRelayTransport;

    #[derive(Default)]
    struct Recording {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl RelayTransport for Recording {
        async fn dispatch(&self, _command: &RelayCommand) -> Result<(), DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DispatchError::Transport("link down".to_owned()))
            } else {
                Ok(())
            }
        }
    }

    fn ids() -> BTreeSet<String> {
        ["1", "2"].into_iter().map(str::to_owned).collect()
    }

    fn gateway_with(transport: Arc<dyn RelayTransport>) -> RelayGateway {
        RelayGateway::new(ids(), transport)
    }

    #[tokio::test]
    async fn accepted_command_echoes_request() {
        let gw = gateway_with(Arc::new(NoopRelayTransport));
        let ack = gw.issue("esp32-a", "1", br#"{"state":true}"#).await.unwrap();
        assert_eq!(ack.device_id, "esp32-a");
        assert_eq!(ack.relay_id, "1");
        assert!(ack.new_state);
        assert_eq!(ack.confirmed_state, RelayState::Unknown);
        assert!(ack.message.contains("not confirmed"));
    }

    #[tokio::test]
    async fn unknown_relay_wins_over_bad_body() {
        let gw = gateway_with(Arc::new(NoopRelayTransport));
        for body in [&br#"{"state":true}"#[..], b"", b"garbage"] {
            let err = gw.issue("esp32-a", "3", body).await.unwrap_err();
            match err {
                CommandError::UnknownRelay { relay_id, .. } => assert_eq!(relay_id, "3"),
                other => panic!("expected UnknownRelay, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn unknown_relay_message_names_the_id() {
        let gw = gateway_with(Arc::new(NoopRelayTransport));
        let err = gw.issue("esp32-a", "3", b"{}").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid relay ID '3'. Must be one of: 1, 2.");
    }

    #[tokio::test]
    async fn malformed_bodies_are_rejected() {
        let gw = gateway_with(Arc::new(NoopRelayTransport));
        for body in [&b""[..], b"  ", b"not json", br#"{}"#, br#"{"state":1}"#, br#"{"state":"on"}"#] {
            let err = gw.issue("esp32-a", "2", body).await.unwrap_err();
            assert!(
                matches!(err, CommandError::MalformedCommand(_)),
                "body {:?} gave {err:?}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[tokio::test]
    async fn rejected_commands_never_reach_transport() {
        let transport = Arc::new(Recording::default());
        let gw = gateway_with(transport.clone());
        let _ = gw.issue("d", "9", br#"{"state":true}"#).await;
        let _ = gw.issue("d", "1", b"nope").await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

        gw.issue("d", "1", br#"{"state":false}"#).await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatch_failure_is_not_acknowledged() {
        let transport = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let gw = gateway_with(transport.clone());
        let err = gw.issue("d", "2", br#"{"state":true}"#).await.unwrap_err();
        assert!(matches!(err, CommandError::Dispatch(DispatchError::Transport(_))));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn relay_ids_are_listed_sorted() {
        let gw = gateway_with(Arc::new(NoopRelayTransport));
        assert_eq!(gw.relay_ids().collect::<Vec<_>>(), vec!["1", "2"]);
    }
}
