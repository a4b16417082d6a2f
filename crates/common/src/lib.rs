//! CiteTree Common Library
//!
//! Shared code for the CiteTree engine and gateway including:
//! - Publication and tree data model
//! - Publication store (Postgres and in-memory)
//! - Semantic Scholar metadata client
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod scholar;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{LookupField, PublicationStore};
pub use errors::{AppError, Result};
pub use models::{Publication, TreeNode};
pub use scholar::MetadataFetcher;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
