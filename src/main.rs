use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use todo_server::{
    auth::{AppState, TokenConfig},
    settings::Settings,
    store::Store,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Settings & logging ─────────────────────────────────────
    let settings = Settings::load()?;
    telemetry::init(&settings.log_filter);

    // ── Open the store ─────────────────────────────────────────
    let store = Store::open(&settings.database_path)
        .with_context(|| format!("failed to open store at {}", settings.database_path))?;
    tracing::info!(path = %settings.database_path, "store opened");

    // ── Shared state ───────────────────────────────────────────
    let state = Arc::new(AppState::new(
        store,
        TokenConfig {
            secret: settings.jwt_secret.clone(),
            expiration_in_minutes: settings.jwt_expiration_in_minutes,
        },
    ));

    // ── Router ─────────────────────────────────────────────────
    let app = todo_server::router(state, settings.static_dir.as_deref());

    // ── Start ──────────────────────────────────────────────────
    let addr = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "server listening");
    tracing::info!("  Live WS: ws://{addr}/api/live?token=<jwt>");

    // peer addresses feed the sign-up limiter
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
