use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::db::Database;

/// Apply pending database migrations and exit
///
/// Uses the same connection settings as `serve`, so DATABASE_URL or the
/// POSTGRES_* variables must be set.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let db = Database::new_with_pool_config(&config.database_url, 2, 1)
        .await
        .context("Failed to connect to database")?;

    db.with_retry(|| db.migrate())
        .await
        .context("Failed to run database migrations")?;

    info!("Database migrations applied");
    Ok(())
}
