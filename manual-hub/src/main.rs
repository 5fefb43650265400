use axum::{routing::get, serve, Router};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use manual_hub_core::auth::{Hs256Verifier, RemoteJwksVerifier, TokenVerifier};
use manual_hub_core::events::EventBus;
use manual_hub_core::storage::HubStore;

use manual_hub::api;

#[derive(Parser)]
#[command(name = "manual-hub", about = "Block-versioned manual management server")]
struct Args {
    /// Directory where workspaces and documents are persisted.
    #[arg(long, default_value = "data", env = "MANUAL_HUB_DATA_DIR")]
    data_dir: PathBuf,

    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:3000", env = "MANUAL_HUB_BIND")]
    bind: SocketAddr,

    /// HS256 secret for bearer token verification.
    #[arg(long, env = "MANUAL_HUB_JWT_SECRET")]
    jwt_secret: Option<String>,

    /// JWKS endpoint for RS256 bearer tokens; takes precedence over the
    /// shared secret.
    #[arg(long, env = "MANUAL_HUB_JWKS_URL")]
    jwks_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let store = Arc::new(RwLock::new(HubStore::new(&args.data_dir)?));
    let events = EventBus::new();
    let verifier: Arc<dyn TokenVerifier> = match (&args.jwks_url, &args.jwt_secret) {
        (Some(url), _) => Arc::new(RemoteJwksVerifier::new(url.clone())),
        (None, Some(secret)) => Arc::new(Hs256Verifier::new(secret.clone())),
        (None, None) => {
            tracing::warn!("no --jwt-secret or --jwks-url given, bearer tokens will not verify");
            Arc::new(Hs256Verifier::new("unconfigured".to_string()))
        }
    };

    let app = Router::new()
        .merge(api::router(store, events, verifier))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(args.bind).await?;
    tracing::info!(addr = %args.bind, "listening");
    serve(listener, app.into_make_service()).await?;
    Ok(())
}
