pub mod memory;
pub mod models;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::telemetry::NewReading;

pub use memory::MemoryTelemetryStore;
pub use models::StoredReading;
pub use postgres::PgTelemetryStore;

/// The persistence layer could not serve the call. Never retried in-request.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("telemetry store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::Unavailable(format!("migration failed: {e}"))
    }
}

impl From<tokio::time::error::Elapsed> for StoreError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Unavailable("store call timed out".to_owned())
    }
}

/// Append-only store of telemetry readings.
///
/// Appends are not idempotent: resubmitting the same reading stores it twice.
/// Reads only ever observe committed appends.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Prepare the backing resource. Safe to call repeatedly and concurrently;
    /// only the first successful call does any work.
    async fn open(&self) -> Result<(), StoreError>;

    async fn append(&self, reading: NewReading) -> Result<StoredReading, StoreError>;

    async fn latest_by_device(&self, device_id: &str) -> Result<Option<StoredReading>, StoreError>;

    /// One reading per distinct device, most recently stored first.
    async fn latest_all(&self) -> Result<Vec<StoredReading>, StoreError>;
}

pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
