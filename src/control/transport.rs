use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, Url,
};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{on_off, RelayCommand, RelayControlRequest};
use crate::config::Secret;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-lamp-timestamp";
pub const SIGNATURE_HEADER: &str = "x-lamp-signature";
pub const SIGN_METHOD_HEADER: &str = "x-lamp-sign-method";

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("device endpoint rejected the command with HTTP {status}")]
    Rejected { status: u16 },
}

/// Delivery of a validated command toward the physical device.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn dispatch(&self, command: &RelayCommand) -> Result<(), DispatchError>;
}

// ---------------------------------------------------------------------------
// No-op
// ---------------------------------------------------------------------------

/// Accepts every command without delivering it anywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRelayTransport;

#[async_trait]
impl RelayTransport for NoopRelayTransport {
    async fn dispatch(&self, command: &RelayCommand) -> Result<(), DispatchError> {
        info!(
            device_id = %command.device_id,
            relay_id = %command.relay_id,
            state = on_off(command.desired_state),
            "No relay transport configured; command not delivered"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Forwards commands as signed JSON `POST`s to
/// `{base}/devices/{device_id}/relays/{relay_id}`.
#[derive(Debug, Clone)]
pub struct HttpRelayTransport {
    http: Client,
    base_url: Url,
    secret: Secret,
}

impl HttpRelayTransport {
    pub fn new(base_url: &str, secret: Secret, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("RELAY_TRANSPORT_URL is not a valid URL: {base_url:?}"))?;
        anyhow::ensure!(
            !base_url.cannot_be_a_base(),
            "RELAY_TRANSPORT_URL must be a hierarchical http(s) URL"
        );
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build relay transport HTTP client")?;
        Ok(Self {
            http,
            base_url,
            secret,
        })
    }

    fn command_url(&self, command: &RelayCommand) -> Result<Url, DispatchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DispatchError::Transport("base URL cannot carry a path".to_owned()))?
            .pop_if_empty()
            .extend(["devices", command.device_id.as_str(), "relays", command.relay_id.as_str()]);
        Ok(url)
    }
}

#[async_trait]
impl RelayTransport for HttpRelayTransport {
    async fn dispatch(&self, command: &RelayCommand) -> Result<(), DispatchError> {
        let url = self.command_url(command)?;
        let body = serde_json::to_vec(&RelayControlRequest {
            state: command.desired_state,
        })
        .map_err(|e| DispatchError::Transport(format!("failed to encode command: {e}")))?;

        let t = chrono::Utc::now().timestamp_millis().to_string();
        let ctx = SigningContext {
            path: url.path(),
            body: &body,
            t: &t,
        };
        let headers = signed_headers(self.secret.expose(), &ctx)?;

        debug!(url = %url, device_id = %command.device_id, "Dispatching relay command");

        let resp = self
            .http
            .post(url.clone())
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
            });
        }

        info!(
            device_id = %command.device_id,
            relay_id = %command.relay_id,
            state = on_off(command.desired_state),
            "Relay command delivered to transport"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Signing helpers
// ---------------------------------------------------------------------------

/// Deterministic signing inputs, split out so tests can fix the timestamp.
#[derive(Debug)]
pub(crate) struct SigningContext<'a> {
    pub path: &'a str,
    pub body: &'a [u8],
    /// 13-digit Unix timestamp in milliseconds
    pub t: &'a str,
}

/// `HMAC-SHA256(secret, t \n hex(sha256(body)) \n path)`, uppercase hex.
pub(crate) fn sign(secret: &str, ctx: &SigningContext<'_>) -> String {
    let content_sha256 = hex::encode(Sha256::digest(ctx.body));
    let string_to_sign = format!("{}\n{}\n{}", ctx.t, content_sha256, ctx.path);

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(string_to_sign.as_bytes());
    hex::encode(mac.finalize().into_bytes()).to_uppercase()
}

fn signed_headers(secret: &str, ctx: &SigningContext<'_>) -> Result<HeaderMap, DispatchError> {
    let value = |v: &str| {
        HeaderValue::from_str(v)
            .map_err(|e| DispatchError::Transport(format!("invalid header value: {e}")))
    };

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(TIMESTAMP_HEADER, value(ctx.t)?);
    headers.insert(SIGN_METHOD_HEADER, HeaderValue::from_static("HMAC-SHA256"));
    headers.insert(SIGNATURE_HEADER, value(&sign(secret, ctx))?);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "device-secret";
    const T: &str = "1588925778000";
    const PATH: &str = "/devices/esp32-a/relays/1";

    fn ctx<'a>(path: &'a str, body: &'a [u8]) -> SigningContext<'a> {
        SigningContext { path, body, t: T }
    }

    fn manual_sign(s: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(s.as_bytes());
        hex::encode(mac.finalize().into_bytes()).to_uppercase()
    }

    fn command(device_id: &str) -> RelayCommand {
        RelayCommand {
            device_id: device_id.to_owned(),
            relay_id: "1".to_owned(),
            desired_state: true,
        }
    }

    fn transport(base: &str) -> HttpRelayTransport {
        HttpRelayTransport::new(base, Secret::new(SECRET), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn sign_matches_manual_computation() {
        let body = br#"{"state":true}"#;
        let body_sha = hex::encode(Sha256::digest(body));
        let expected = manual_sign(&format!("{T}\n{body_sha}\n{PATH}"));
        assert_eq!(sign(SECRET, &ctx(PATH, body)), expected);
    }

    #[test]
    fn sign_is_uppercase_hex() {
        let s = sign(SECRET, &ctx(PATH, b"{}"));
        assert_eq!(s.to_uppercase(), s);
        assert_eq!(s.len(), 64, "HMAC-SHA256 hex is always 64 chars");
    }

    #[test]
    fn body_and_path_affect_signature() {
        let base = sign(SECRET, &ctx(PATH, br#"{"state":true}"#));
        assert_ne!(base, sign(SECRET, &ctx(PATH, br#"{"state":false}"#)));
        assert_ne!(base, sign(SECRET, &ctx("/devices/esp32-a/relays/2", br#"{"state":true}"#)));
    }

    #[test]
    fn signed_headers_never_carry_secret() {
        let h = signed_headers(SECRET, &ctx(PATH, b"{}")).unwrap();
        assert_eq!(h[TIMESTAMP_HEADER], T);
        assert_eq!(h[SIGN_METHOD_HEADER], "HMAC-SHA256");
        assert_eq!(h[CONTENT_TYPE], "application/json");
        assert!(h.values().all(|v| v.to_str().unwrap() != SECRET));
    }

    #[test]
    fn command_url_appends_segments() {
        let t = transport("http://relay.local:9000/api/");
        let url = t.command_url(&command("esp32-a")).unwrap();
        assert_eq!(url.as_str(), "http://relay.local:9000/api/devices/esp32-a/relays/1");
    }

    #[test]
    fn command_url_escapes_device_id() {
        let t = transport("http://relay.local");
        let url = t.command_url(&command("a/b c")).unwrap();
        assert_eq!(url.path(), "/devices/a%2Fb%20c/relays/1");
    }

    #[test]
    fn rejects_non_hierarchical_base() {
        assert!(HttpRelayTransport::new("mailto:x@y", Secret::new(SECRET), Duration::from_secs(1)).is_err());
        assert!(HttpRelayTransport::new("not a url", Secret::new(SECRET), Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let t = transport("http://127.0.0.1:1");
        let err = t.dispatch(&command("esp32-a")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }

    #[tokio::test]
    async fn noop_always_succeeds() {
        assert!(NoopRelayTransport.dispatch(&command("x")).await.is_ok());
    }
}
