//! SeaORM-based database access
//!
//! SQLite is the supported backend; the schema is created by the migrations
//! in [`migrations`] and accessed through the repositories in
//! [`repositories`].

use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, Database as SeaOrmDatabase, DatabaseConnection};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;

pub mod migrations;
pub mod repositories;

/// Database connection manager
#[derive(Clone)]
pub struct Database {
    pub connection: Arc<DatabaseConnection>,
}

impl Database {
    /// Connect using the configured URL, creating the SQLite file if needed
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        if !config.url.starts_with("sqlite:") {
            anyhow::bail!("Unsupported database URL format: {}", config.url);
        }

        info!("Connecting to SQLite database");
        let connection_url = Self::ensure_sqlite_auto_creation(&config.url)?;

        let mut connect_options = ConnectOptions::new(&connection_url);
        connect_options
            .max_connections(config.max_connections.unwrap_or(10))
            .min_connections(1)
            .connect_timeout(Duration::from_secs(5))
            .acquire_timeout(Duration::from_secs(3))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .sqlx_logging_level(tracing::log::LevelFilter::Debug);

        Self::connect(connect_options, &config.url).await
    }

    /// Private in-memory database, used by tests
    ///
    /// Pinned to one connection so every query sees the same schema.
    pub async fn new_in_memory() -> Result<Self> {
        let mut connect_options = ConnectOptions::new("sqlite::memory:");
        connect_options
            .max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);

        Self::connect(connect_options, "sqlite::memory:").await
    }

    async fn connect(options: ConnectOptions, url: &str) -> Result<Self> {
        let connection = match SeaOrmDatabase::connect(options).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!("Database connection failed: {:?}", e);
                let mut source = e.source();
                let mut level = 0;
                while let Some(err) = source {
                    tracing::error!("  Level {}: {}", level, err);
                    source = err.source();
                    level += 1;
                }
                return Err(anyhow::anyhow!(
                    "Failed to connect to database at '{}': {}",
                    url,
                    e
                ));
            }
        };

        debug!("Database connection established successfully");
        Ok(Self {
            connection: Arc::new(connection),
        })
    }

    /// Ensure SQLite URL includes auto-creation mode if needed
    fn ensure_sqlite_auto_creation(url: &str) -> Result<String> {
        if url.contains("mode=") || url.contains(":memory:") {
            return Ok(url.to_string());
        }

        let file_path = if let Some(path) = url.strip_prefix("sqlite://") {
            path
        } else if let Some(path) = url.strip_prefix("sqlite:") {
            path
        } else {
            anyhow::bail!("Invalid SQLite URL format: {}", url);
        };
        let file_path = file_path.split('?').next().unwrap_or(file_path);

        let path = std::path::Path::new(file_path);
        if path.exists() {
            debug!("SQLite database file already exists: {}", file_path);
            return Ok(url.to_string());
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create directory for SQLite database: {}",
                    parent.display()
                )
            })?;
            info!("Created directory for SQLite database: {}", parent.display());
        }

        let auto_create_url = if url.contains('?') {
            format!("{}&mode=rwc", url)
        } else {
            format!("{}?mode=rwc", url)
        };
        debug!("Enabled SQLite auto-creation: {}", auto_create_url);
        Ok(auto_create_url)
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        use migrations::Migrator;
        use sea_orm_migration::MigratorTrait;

        info!("Running database migrations");
        Migrator::up(&*self.connection, None)
            .await
            .context("Failed to run migrations")?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    pub fn connection(&self) -> Arc<DatabaseConnection> {
        self.connection.clone()
    }
}
