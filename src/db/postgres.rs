use std::{future::Future, time::Duration};

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::{sync::OnceCell, time};
use tracing::info;
use uuid::Uuid;

use super::{create_pool, run_migrations, StoreError, StoredReading, TelemetryStore};
use crate::telemetry::NewReading;

const COLUMNS: &str = r#"
    id,
    device_id,
    device_timestamp,
    pir1_status,
    pir2_status,
    relay1_status,
    relay2_status,
    voltage,
    "current",
    power,
    energy,
    created_at
"#;

/// Postgres-backed store. The pool is created on first use and shared by
/// every request afterwards.
#[derive(Debug)]
pub struct PgTelemetryStore {
    database_url: String,
    max_connections: u32,
    timeout: Duration,
    pool: OnceCell<PgPool>,
}

impl PgTelemetryStore {
    pub fn new(database_url: impl Into<String>, max_connections: u32, timeout: Duration) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections,
            timeout,
            pool: OnceCell::new(),
        }
    }

    /// Wrap an already migrated pool.
    pub fn from_pool(pool: PgPool, timeout: Duration) -> Self {
        Self {
            database_url: String::new(),
            max_connections: 0,
            timeout,
            pool: OnceCell::new_with(Some(pool)),
        }
    }

    async fn pool(&self) -> Result<&PgPool, StoreError> {
        self.pool
            .get_or_try_init(|| {
                self.bounded(async {
                    let pool =
                        create_pool(&self.database_url, self.max_connections, self.timeout).await?;
                    run_migrations(&pool).await?;
                    info!(max_connections = self.max_connections, "Database ready");
                    Ok::<_, StoreError>(pool)
                })
            })
            .await
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        time::timeout(self.timeout, fut).await?
    }
}

#[async_trait]
impl TelemetryStore for PgTelemetryStore {
    async fn open(&self) -> Result<(), StoreError> {
        self.pool().await.map(|_| ())
    }

    async fn append(&self, r: NewReading) -> Result<StoredReading, StoreError> {
        let pool = self.pool().await?;
        let sql = format!(
            r#"
            INSERT INTO readings (
                id, device_id, device_timestamp,
                pir1_status, pir2_status, relay1_status, relay2_status,
                voltage, "current", power, energy
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {COLUMNS}
            "#
        );
        let query = sqlx::query_as::<_, StoredReading>(&sql)
            .bind(Uuid::new_v4())
            .bind(r.device_id)
            .bind(r.timestamp)
            .bind(r.pir1_status)
            .bind(r.pir2_status)
            .bind(r.relay1_status)
            .bind(r.relay2_status)
            .bind(r.voltage)
            .bind(r.current)
            .bind(r.power)
            .bind(r.energy);

        self.bounded(async { query.fetch_one(pool).await.map_err(StoreError::from) })
            .await
    }

    async fn latest_by_device(&self, device_id: &str) -> Result<Option<StoredReading>, StoreError> {
        let pool = self.pool().await?;
        let sql = format!(
            r#"
            SELECT {COLUMNS}
            FROM readings
            WHERE device_id = $1
            ORDER BY seq DESC
            LIMIT 1
            "#
        );
        let query = sqlx::query_as::<_, StoredReading>(&sql).bind(device_id);

        self.bounded(async { query.fetch_optional(pool).await.map_err(StoreError::from) })
            .await
    }

    async fn latest_all(&self) -> Result<Vec<StoredReading>, StoreError> {
        let pool = self.pool().await?;
        let sql = format!(
            r#"
            SELECT {COLUMNS}
            FROM (
                SELECT DISTINCT ON (device_id) *
                FROM readings
                ORDER BY device_id, seq DESC
            ) latest
            ORDER BY seq DESC
            "#
        );
        let query = sqlx::query_as::<_, StoredReading>(&sql);

        self.bounded(async { query.fetch_all(pool).await.map_err(StoreError::from) })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(device_id: &str, timestamp: u32) -> NewReading {
        NewReading {
            device_id: device_id.to_owned(),
            timestamp: f64::from(timestamp),
            pir1_status: false,
            pir2_status: true,
            relay1_status: true,
            relay2_status: false,
            voltage: Some(220.5),
            current: None,
            power: Some(110.2),
            energy: Some(3.4),
        }
    }

    fn store(pool: PgPool) -> PgTelemetryStore {
        PgTelemetryStore::from_pool(pool, Duration::from_secs(5))
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn append_then_latest_roundtrips(pool: PgPool) {
        let store = store(pool);
        let stored = store.append(reading("dev1", 1000)).await.unwrap();

        let got = store.latest_by_device("dev1").await.unwrap().unwrap();
        assert_eq!(got, stored);
        assert_eq!(got.reading(), reading("dev1", 1000));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn latest_ignores_device_clock(pool: PgPool) {
        let store = store(pool);
        store.append(reading("dev1", 9000)).await.unwrap();
        // device rebooted: uptime clock restarted
        store.append(reading("dev1", 5)).await.unwrap();

        let got = store.latest_by_device("dev1").await.unwrap().unwrap();
        assert_eq!(got.timestamp, 5.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn latest_all_is_one_per_device_newest_first(pool: PgPool) {
        let store = store(pool);
        store.append(reading("dev1", 1)).await.unwrap();
        store.append(reading("dev2", 1)).await.unwrap();
        store.append(reading("dev1", 2)).await.unwrap();

        let all = store.latest_all().await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| (r.device_id.as_str(), r.timestamp)).collect();
        assert_eq!(ids, vec![("dev1", 2.0), ("dev2", 1.0)]);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn duplicates_are_kept(pool: PgPool) {
        let store = store(pool.clone());
        let a = store.append(reading("dev1", 1)).await.unwrap();
        let b = store.append(reading("dev1", 1)).await.unwrap();
        assert_ne!(a.id, b.id);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM readings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn unreachable_database_is_unavailable() {
        let store = PgTelemetryStore::new(
            "postgres://nobody@127.0.0.1:1/none",
            1,
            Duration::from_millis(500),
        );
        let err = store.latest_all().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn silent_database_does_not_hang_open() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let store = PgTelemetryStore::new(
            format!("postgres://nobody@{addr}/none"),
            1,
            Duration::from_millis(300),
        );
        let err = time::timeout(Duration::from_secs(5), store.open())
            .await
            .expect("open() must give up on its own")
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
