//! # ident-db
//!
//! Database layer for identd. A single `sqlx::AnyPool` backs three tables:
//! - **threepid_invites**: pending invites, reloaded into memory at startup
//! - **threepid_mappings**: locally established 3PID bindings
//! - **signing_keys**: the server's Ed25519 signing key material
//!
//! SQLite and PostgreSQL both work through the `Any` driver; see [`any_compat`]
//! for the column decoding rules that implies.

pub mod any_compat;
pub mod repository;

use anyhow::Result;
use ident_common::config::DatabaseConfig;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;

/// Shared database handle passed through Axum state and collaborators.
#[derive(Clone)]
pub struct Database {
    pub pool: AnyPool,
}

impl Database {
    /// Connect using the configured URL and pool limits.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();

        tracing::info!("Connecting to database...");
        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;
        tracing::info!("Connected to database");

        Ok(Self { pool })
    }

    /// Private in-memory SQLite database, migrated and ready to use.
    ///
    /// Limited to one connection: every SQLite `:memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Health check: verify the database is reachable.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
