//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront migrations
//! yedek migrate storefront
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string for storefront
//!
//! # Migration Files
//!
//! Storefront migrations: `crates/storefront/migrations/`
//!
//! ```text
//! migrations/
//! ├── 20260101000001_products.sql
//! ├── 20260101000002_carts.sql
//! └── 20260101000003_sessions.sql
//! ```

use secrecy::SecretString;
use thiserror::Error;
use yedek_storefront::db;

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed to apply.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run storefront database migrations.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the database cannot be
/// reached, or a migration fails.
pub async fn storefront() -> Result<(), MigrationError> {
    let _ = dotenvy::dotenv();

    let database_url = std::env::var("STOREFRONT_DATABASE_URL")
        .map(SecretString::from)
        .map_err(|_| MigrationError::MissingEnvVar("STOREFRONT_DATABASE_URL"))?;

    tracing::info!("Connecting to storefront database...");
    let pool = db::create_pool(&database_url).await?;

    tracing::info!("Running storefront migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    tracing::info!("Storefront migrations complete!");
    Ok(())
}
