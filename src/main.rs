//! FireWatch server.
//!
//! # Environment
//!
//! - `FIREWATCH_PORT` - Listen port (default 9999)
//! - `FIREWATCH_DATABASE_URL` - SQLite URL (default `sqlite:firewatch.db?mode=rwc`)
//! - `FIREWATCH_ENV` - `development` or `production`
//! - `FIREWATCH_ALLOWED_ORIGINS` - Comma-separated CORS origins
//! - `FIREWATCH_BODY_LIMIT_BYTES` - Request body limit (default 10 MiB)
//!
//! A `.env` file in the working directory is loaded first if present.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use firewatch::api::{self, AppState};
use firewatch::config::Config;
use firewatch::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("firewatch=info".parse()?))
        .init();

    let config = Config::from_env()?;
    info!(
        port = config.port,
        environment = %config.environment,
        db_url = %config.database_url,
        "Starting FireWatch server"
    );

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = api::router(AppState::new(storage.clone(), config));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "FireWatch is listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    storage.close().await;
    info!("Database connection closed");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
