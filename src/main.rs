use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use verifywise::{api, config, files, store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("VERIFYWISE_LOG").unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().json())
        .init();

    let cfg = config::Config::load()?;
    tracing::info!(auth = ?cfg.auth_mode, "configuration loaded");

    // Connect to Postgres and run migrations
    let pool = store::pool::connect(&cfg).await?;

    let blobs = store::blobs::operator(&cfg)?;

    store::bootstrap::run(&pool, &cfg).await?;

    let state = store::AppState {
        pool: pool.clone(),
        files: files::FileStore::new(pool, blobs, cfg.max_upload_bytes),
        config: Arc::new(cfg.clone()),
    };

    let app = api::app(state);

    let addr: SocketAddr = cfg.listen.parse()?;
    tracing::info!(%addr, "starting verifywise");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("verifywise stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
