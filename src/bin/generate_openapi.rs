//! Writes the gateway's OpenAPI document.
//!
//! Usage:
//!   cargo run --bin generate_openapi > openapi.json
//!   cargo run --bin generate_openapi -- --output openapi.json

use std::{
    env, fs,
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use lamp_gateway::api::handlers::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<()> {
    let json = ApiDoc::openapi()
        .to_pretty_json()
        .context("Failed to serialise OpenAPI spec")?;

    let args: Vec<String> = env::args().collect();
    let output_path: Option<PathBuf> = args
        .windows(2)
        .find(|w| w[0] == "--output")
        .map(|w| PathBuf::from(&w[1]));

    match output_path {
        Some(path) => {
            fs::write(&path, &json)
                .with_context(|| format!("Error writing to {}", path.display()))?;
            eprintln!("OpenAPI spec written to {}", path.display());
        }
        None => io::stdout()
            .write_all(json.as_bytes())
            .context("Failed to write to stdout")?,
    }
    Ok(())
}
