//! Auth service binary entry point.

use auth_service::http::{router, AppState};
use auth_service::store::{postgres, PgSessionStore, PgUserDirectory};
use auth_service::{
    AuthServiceConfig, AuthSessionManager, InMemorySessionStore, InMemoryUserDirectory,
    SessionStore, UserDirectory,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auth_service=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting auth-service");

    // Load configuration
    let config = AuthServiceConfig::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", *e);
        AuthServiceConfig::default()
    });

    let (sessions, users) = build_stores(&config).await?;
    let manager = AuthSessionManager::from_config(&config, sessions, users)?;
    let app = router(AppState::new(manager, &config));

    // Build server address
    let addr: SocketAddr = format!("{}:{}", config.service.host, config.service.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn build_stores(
    config: &AuthServiceConfig,
) -> anyhow::Result<(Arc<dyn SessionStore>, Arc<dyn UserDirectory>)> {
    let Some(url) = config.database.url.as_deref() else {
        tracing::warn!("No database configured, sessions and users are held in memory");
        return Ok((
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryUserDirectory::new()),
        ));
    };

    let pool = postgres::connect(
        url,
        config.database.max_connections,
        config.database.acquire_timeout(),
    )
    .await?;
    let sessions = PgSessionStore::new(pool.clone());
    sessions.ensure_schema().await?;
    tracing::info!("Connected to Postgres session store");

    Ok((Arc::new(sessions), Arc::new(PgUserDirectory::new(pool))))
}
