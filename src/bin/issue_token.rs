//! Mints a user token signed with `JWT_SECRET` for dashboard writes.
//!
//! Usage:
//!   cargo run --bin issue_token -- --sub alice --ttl-secs 3600

use std::env;

use anyhow::{Context, Result};
use chrono::Utc;
use lamp_gateway::{
    auth::{sign_token, Claims},
    config::Config,
};

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let config = Config::from_env()?;
    if config.jwt_secret.is_insecure_default() {
        eprintln!("warning: JWT_SECRET is not set; signing with the built-in default");
    }

    let args: Vec<String> = env::args().collect();
    let arg = |name: &str| {
        args.windows(2)
            .find(|w| w[0] == name)
            .map(|w| w[1].clone())
    };

    let ttl_secs: i64 = arg("--ttl-secs")
        .as_deref()
        .unwrap_or("3600")
        .parse()
        .context("--ttl-secs must be an integer")?;
    anyhow::ensure!(ttl_secs > 0, "--ttl-secs must be positive");

    let now = Utc::now().timestamp();
    let exp = expiry(now, ttl_secs)?;
    let claims = Claims {
        sub: arg("--sub"),
        iat: Some(now),
        nbf: None,
        exp: Some(exp),
    };

    println!("{}", sign_token(&claims, config.jwt_secret.expose())?);
    Ok(())
}

fn expiry(now: i64, ttl_secs: i64) -> Result<i64> {
    now.checked_add(ttl_secs).context("--ttl-secs is too large")
}
