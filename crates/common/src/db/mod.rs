//! Database layer for CiteTree
//!
//! Provides:
//! - SeaORM entity for publication documents
//! - The `PublicationStore` seam used by the resolver
//! - Postgres and in-memory store implementations
//! - Connection pool management

mod memory;
pub mod models;
mod repository;

pub use memory::InMemoryStore;
pub use repository::Repository;

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use crate::models::Publication;
use async_trait::async_trait;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Indexed fields a publication can be looked up by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupField {
    PaperId,
    Doi,
    ArXiv,
}

impl fmt::Display for LookupField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LookupField::PaperId => "paperId",
            LookupField::Doi => "externalIds.DOI",
            LookupField::ArXiv => "externalIds.ArXiv",
        };
        f.write_str(name)
    }
}

/// Persistent publication store
///
/// `find` returns `Ok(None)` when nothing matches; any `Err` is a real
/// persistence failure.
#[async_trait]
pub trait PublicationStore: Send + Sync {
    /// Point lookup on an indexed field
    async fn find(&self, field: LookupField, value: &str) -> Result<Option<Publication>>;

    /// Insert or replace the record keyed by `paper_id`
    async fn insert(&self, publication: &Publication) -> Result<()>;

    /// Connectivity check for the readiness endpoint
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS publications (
    paper_id   TEXT PRIMARY KEY,
    doi        TEXT,
    arxiv      TEXT,
    title      TEXT NOT NULL,
    document   JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS publications_doi_idx ON publications (doi);
CREATE INDEX IF NOT EXISTS publications_arxiv_idx ON publications (arxiv);
"#;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    /// Primary connection (for writes)
    pub primary: DatabaseConnection,

    /// Read replica connection (optional)
    pub replica: Option<DatabaseConnection>,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to primary database...");

        let primary = Self::connect(&config.url, config)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect to primary: {}", e),
            })?;

        let replica = match config.read_url {
            Some(ref read_url) => {
                info!("Connecting to read replica...");
                let conn = Self::connect(read_url, config)
                    .await
                    .map_err(|e| AppError::DatabaseConnection {
                        message: format!("Failed to connect to replica: {}", e),
                    })?;
                Some(conn)
            }
            None => None,
        };

        info!("Database connections established");

        Ok(Self { primary, replica })
    }

    async fn connect(
        url: &str,
        config: &DatabaseConfig,
    ) -> std::result::Result<DatabaseConnection, sea_orm::DbErr> {
        let mut opts = ConnectOptions::new(url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        Database::connect(opts).await
    }

    /// Create the publications table and its lookup indexes if missing
    pub async fn ensure_schema(&self) -> Result<()> {
        self.primary.execute_unprepared(SCHEMA).await?;
        info!("Publication schema ready");
        Ok(())
    }

    /// Get the connection for reads (replica if available, otherwise primary)
    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    /// Get the connection for writes (always primary)
    pub fn write(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.primary
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Primary ping failed: {}", e),
            })?;

        if let Some(ref replica) = self.replica {
            replica
                .execute_unprepared("SELECT 1")
                .await
                .map_err(|e| AppError::DatabaseConnection {
                    message: format!("Replica ping failed: {}", e),
                })?;
        }

        Ok(())
    }
}
