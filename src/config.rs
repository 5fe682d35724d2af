use std::{collections::BTreeSet, fmt, time::Duration};

use anyhow::{Context, Result};

pub const DEFAULT_DEVICE_SECRET: &str = "your_device_secret_key_here";
pub const DEFAULT_JWT_SECRET: &str = "your-secret-key";

// ---------------------------------------------------------------------------
// Secret
// ---------------------------------------------------------------------------

/// A configured secret value. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    value: String,
    /// `true` when the env var was absent and the built-in fallback is in use.
    insecure_default: bool,
}

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            insecure_default: false,
        }
    }

    fn fallback(value: &str) -> Self {
        Self {
            value: value.to_owned(),
            insecure_default: true,
        }
    }

    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn is_insecure_default(&self) -> bool {
        self.insecure_default
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("value", &"<redacted>")
            .field("insecure_default", &self.insecure_default)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Upper bound on a single store call, including pool acquisition.
    pub store_timeout: Duration,
    pub device_secret: Secret,
    pub jwt_secret: Secret,
    pub server_host: String,
    pub server_port: u16,
    /// Known relay identifiers, format: `"1,2"`.
    pub relay_ids: BTreeSet<String>,
    pub relay_require_auth: bool,
    /// `None` selects the no-op relay transport.
    pub relay_transport_url: Option<String>,
    pub relay_transport_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: optional("DATABASE_MAX_CONNECTIONS", "10")
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?,
            store_timeout: Duration::from_secs(
                optional("STORE_TIMEOUT_SECS", "5")
                    .parse()
                    .context("STORE_TIMEOUT_SECS must be a positive integer")?,
            ),
            device_secret: secret("DEVICE_SECRET", DEFAULT_DEVICE_SECRET),
            jwt_secret: secret("JWT_SECRET", DEFAULT_JWT_SECRET),
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            relay_ids: parse_relay_ids(&optional("RELAY_IDS", "1,2"))?,
            relay_require_auth: parse_flag(&optional("RELAY_REQUIRE_AUTH", "false"))
                .context("RELAY_REQUIRE_AUTH must be true or false")?,
            relay_transport_url: non_empty("RELAY_TRANSPORT_URL"),
            relay_transport_timeout: Duration::from_secs(
                optional("RELAY_TRANSPORT_TIMEOUT_SECS", "5")
                    .parse()
                    .context("RELAY_TRANSPORT_TIMEOUT_SECS must be a positive integer")?,
            ),
        })
    }
}

/// Parse `"1,2"` into the set of known relay identifiers.
///
/// An empty list is rejected: a gateway with no relays could never accept a
/// command.
fn parse_relay_ids(raw: &str) -> Result<BTreeSet<String>> {
    let ids: BTreeSet<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    anyhow::ensure!(!ids.is_empty(), "RELAY_IDS must name at least one relay");
    Ok(ids)
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("not a boolean flag: {other:?}")),
    }
}

fn secret(key: &str, fallback: &str) -> Secret {
    match non_empty(key) {
        Some(v) => Secret::new(v),
        None => Secret::fallback(fallback),
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_relay_ids_default() {
        let ids = parse_relay_ids("1,2").unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("1"));
        assert!(ids.contains("2"));
    }

    #[test]
    fn parse_relay_ids_trims_and_dedups() {
        let ids = parse_relay_ids(" 1 , 2,2,, 3").unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["1", "2", "3"]);
    }

    #[test]
    fn parse_relay_ids_empty_errors() {
        let err = parse_relay_ids(" , ").unwrap_err();
        assert!(err.to_string().contains("at least one relay"));
    }

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert!(parse_flag("true").unwrap());
        assert!(parse_flag("ON").unwrap());
        assert!(!parse_flag("0").unwrap());
        assert!(!parse_flag("no").unwrap());
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let s = Secret::new("hunter2");
        let printed = format!("{s:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("redacted"));
    }

    #[test]
    fn fallback_secret_is_flagged() {
        let s = Secret::fallback(DEFAULT_DEVICE_SECRET);
        assert!(s.is_insecure_default());
        assert_eq!(s.expose(), DEFAULT_DEVICE_SECRET);
        assert!(!Secret::new("x").is_insecure_default());
    }
}
