//! Credential checks for the HTTP boundary.
//!
//! Two schemes are accepted:
//! - a static device secret, sent as `x-api-key` or `Authorization: Bearer`;
//! - an HS256 JWT for user-originated writes, sent as `Authorization: Bearer`.
//!
//! Both are pure predicates over the presented credential and the configured
//! secrets. Neither performs I/O.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::Secret;

type HmacSha256 = Hmac<Sha256>;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Rejected credential. Carries no detail: callers always answer 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unauthorized")]
pub struct Unauthorized;

/// Claims carried by a user token. Only `exp` and `nbf` are enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JwtHeader {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthGate {
    device_secret: Secret,
    jwt_secret: Secret,
}

impl AuthGate {
    pub fn new(device_secret: Secret, jwt_secret: Secret) -> Self {
        Self {
            device_secret,
            jwt_secret,
        }
    }

    /// Shared-secret check for device-originated telemetry.
    pub fn authorize_device(&self, credential: Option<&str>) -> Result<(), Unauthorized> {
        let presented = credential.ok_or(Unauthorized)?;
        if secrets_match(presented, self.device_secret.expose()) {
            Ok(())
        } else {
            Err(Unauthorized)
        }
    }

    /// Signed-token check for user-originated writes.
    pub fn authorize_user(&self, credential: Option<&str>) -> Result<Claims, Unauthorized> {
        let token = credential.ok_or(Unauthorized)?;
        verify_token(token, self.jwt_secret.expose(), Utc::now().timestamp())
    }

    /// Accepts either scheme. Used where both devices and users may write.
    pub fn authorize_any(&self, credential: Option<&str>) -> Result<(), Unauthorized> {
        self.authorize_device(credential)
            .or_else(|_| self.authorize_user(credential).map(|_| ()))
    }

    /// [`authorize_any`](Self::authorize_any) over every credential header.
    /// Passes if `x-api-key` or the bearer token is accepted on its own.
    pub fn authorize_any_header(&self, headers: &HeaderMap) -> Result<(), Unauthorized> {
        [api_key(headers), bearer_token(headers)]
            .into_iter()
            .flatten()
            .any(|c| self.authorize_any(Some(c)).is_ok())
            .then_some(())
            .ok_or(Unauthorized)
    }
}

/// Extract the device credential: `x-api-key` wins over `Authorization`.
pub fn device_credential(headers: &HeaderMap) -> Option<&str> {
    api_key(headers).or_else(|| bearer_token(headers))
}

fn api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Compare fixed-length digests so neither content nor length leaks through
/// timing.
fn secrets_match(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.as_slice().ct_eq(b.as_slice()).into()
}

// ---------------------------------------------------------------------------
// HS256 tokens
// ---------------------------------------------------------------------------

/// Mint an HS256 token for `claims`.
pub fn sign_token(claims: &Claims, secret: &str) -> anyhow::Result<String> {
    let header = JwtHeader {
        alg: "HS256".to_owned(),
        typ: Some("JWT".to_owned()),
    };
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?),
    );
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(signing_input.as_bytes());
    let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{signing_input}.{sig}"))
}

/// Verify an HS256 token at time `now` (Unix seconds).
pub fn verify_token(token: &str, secret: &str, now: i64) -> Result<Claims, Unauthorized> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(Unauthorized);
    };

    let header: JwtHeader = decode_segment(header_b64)?;
    if header.alg != "HS256" {
        return Err(Unauthorized);
    }

    let sig = URL_SAFE_NO_PAD.decode(sig_b64).map_err(|_| Unauthorized)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| Unauthorized)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(claims_b64.as_bytes());
    mac.verify_slice(&sig).map_err(|_| Unauthorized)?;

    let claims: Claims = decode_segment(claims_b64)?;
    if claims.exp.is_some_and(|exp| now >= exp) {
        return Err(Unauthorized);
    }
    if claims.nbf.is_some_and(|nbf| now < nbf) {
        return Err(Unauthorized);
    }
    Ok(claims)
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, Unauthorized> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|_| Unauthorized)?;
    serde_json::from_slice(&bytes).map_err(|_| Unauthorized)
}
