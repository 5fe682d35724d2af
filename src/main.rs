use std::sync::Arc;

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lamp_gateway::{
    api::{self, AppState},
    auth::AuthGate,
    config::Config,
    control::{HttpRelayTransport, NoopRelayTransport, RelayGateway, RelayTransport},
    db::{MemoryTelemetryStore, PgTelemetryStore, TelemetryStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent; env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    if config.device_secret.is_insecure_default() {
        warn!("DEVICE_SECRET is not set; using the built-in default. Device ingest is effectively unauthenticated.");
    }
    if config.jwt_secret.is_insecure_default() {
        warn!("JWT_SECRET is not set; using the built-in default. Anyone can mint user tokens.");
    }

    let store: Arc<dyn TelemetryStore> = match &config.database_url {
        Some(url) => Arc::new(PgTelemetryStore::new(
            url.clone(),
            config.database_max_connections,
            config.store_timeout,
        )),
        None => {
            warn!("DATABASE_URL is not set; readings are kept in memory and lost on restart");
            Arc::new(MemoryTelemetryStore::new())
        }
    };
    store.open().await?;

    let transport: Arc<dyn RelayTransport> = match &config.relay_transport_url {
        Some(url) => {
            info!(url = %url, "Relay commands forwarded over HTTP");
            Arc::new(HttpRelayTransport::new(
                url,
                config.device_secret.clone(),
                config.relay_transport_timeout,
            )?)
        }
        None => {
            info!("No RELAY_TRANSPORT_URL; relay commands are acknowledged but not delivered");
            Arc::new(NoopRelayTransport)
        }
    };

    let relays = RelayGateway::new(config.relay_ids.clone(), transport);
    info!(
        relay_ids = ?relays.relay_ids().collect::<Vec<_>>(),
        require_auth = config.relay_require_auth,
        "Relay gateway ready"
    );

    let state = AppState {
        store,
        auth: Arc::new(AuthGate::new(
            config.device_secret.clone(),
            config.jwt_secret.clone(),
        )),
        relays: Arc::new(relays),
        relay_require_auth: config.relay_require_auth,
    };

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
