//! Database setup and initialization

use anyhow::{Context, Result};
use coconut_core::Config;
use coconut_db::{InMemoryTranscodeRepository, PgTranscodeRepository, TranscodeRepository};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Setup database connection pool and run migrations
pub async fn setup_database(database_url: &str, config: &Config) -> Result<PgPool> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds()))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.db_max_connections(),
        "Database connected successfully"
    );

    // Run pending migrations on startup (path: workspace migrations/ from crate root)
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

/// Pick the repository: Postgres when `DATABASE_URL` is set, memory otherwise.
pub async fn setup_repository(
    config: &Config,
) -> Result<(Arc<dyn TranscodeRepository>, Option<PgPool>)> {
    match config.database_url() {
        Some(database_url) => {
            let pool = setup_database(database_url, config).await?;
            Ok((Arc::new(PgTranscodeRepository::new(pool.clone())), Some(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory job store");
            Ok((Arc::new(InMemoryTranscodeRepository::new()), None))
        }
    }
}
