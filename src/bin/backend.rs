#![forbid(unsafe_code)]

//! HTTP entry point: resolves configuration, opens the database, picks the
//! media backend and serves the API until Ctrl+C.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use vidtube::{
    api::{AppState, router},
    auth::TokenIssuer,
    config::{SettingsOverrides, resolve_settings},
    media::{CloudinaryBackend, LocalMediaBackend, MediaBackend, MediaDelegate},
    security::{ensure_not_root, ensure_token_secrets},
    store::EntityStore,
};

const DEFAULT_LOG_FILTER: &str = "vidtube=info,tower_http=info";

#[derive(Debug, Parser)]
#[command(name = "backend", about = "VidTube API server")]
struct BackendArgs {
    /// `.env` file read before the process environment.
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Directory holding the database file.
    #[arg(long, value_name = "DIR")]
    database_url: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = BackendArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    ensure_not_root("backend")?;

    let settings = resolve_settings(SettingsOverrides {
        host: args.host,
        port: args.port,
        database_url: args.database_url,
        env_path: args.env_file,
    })
    .context("loading configuration")?;
    ensure_token_secrets(&settings.tokens)?;

    let database_path = settings.database_path();
    let store = EntityStore::open(&database_path)
        .await
        .with_context(|| format!("opening database {}", database_path.display()))?;

    let backend: Arc<dyn MediaBackend> = match settings.cloudinary.clone() {
        Some(credentials) => Arc::new(CloudinaryBackend::new(credentials)),
        None => Arc::new(
            LocalMediaBackend::new(&settings.media_root, settings.public_url.as_str())
                .context("preparing local media root")?,
        ),
    };
    let media = MediaDelegate::new(backend, settings.ffprobe_path.clone());
    tracing::info!(
        database = %database_path.display(),
        media = media.backend_name(),
        "storage ready"
    );

    let host: IpAddr = settings
        .host
        .parse()
        .with_context(|| format!("invalid listen host {:?}", settings.host))?;
    let addr = SocketAddr::new(host, settings.port);

    let state = AppState {
        store: Arc::new(store),
        media: Arc::new(media),
        tokens: Arc::new(TokenIssuer::new(&settings.tokens)),
        settings: Arc::new(settings),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(%addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    tracing::info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to install Ctrl+C handler");
    }
}
