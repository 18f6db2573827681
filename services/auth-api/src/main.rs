//! Gatekeep Auth API server

use std::net::SocketAddr;
use std::sync::Arc;

use gatekeep_auth_api::{router, AppState, Config};
use gatekeep_auth_core::AuthService;
use gatekeep_db::pg::{run_migrations, PgAccountRepository};
use gatekeep_db::{create_pool, AccountRepository, InMemoryAccountRepository};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Gatekeep Auth API");

    let config = Config::from_env()?;

    let accounts: Arc<dyn AccountRepository> = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            run_migrations(&pool).await?;
            Arc::new(PgAccountRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, accounts are kept in memory");
            Arc::new(InMemoryAccountRepository::new())
        }
    };

    let auth = AuthService::new(config.auth.clone(), accounts)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let app = router(AppState::new(auth, config));

    // Start server
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
