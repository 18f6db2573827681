//! PostgreSQL repository implementations

mod account;

pub use account::PgAccountRepository;

use crate::{DbPool, DbResult};

/// Apply the bundled schema migrations
pub async fn run_migrations(pool: &DbPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("database migrations applied");
    Ok(())
}
