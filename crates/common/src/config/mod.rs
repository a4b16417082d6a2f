//! Configuration management for CiteTree services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Semantic Scholar client configuration
    #[serde(default)]
    pub scholar: ScholarConfig,

    /// Citation tree expansion settings
    #[serde(default)]
    pub tree: TreeConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScholarConfig {
    /// Graph API base URL
    #[serde(default = "default_scholar_base")]
    pub api_base: String,

    /// Optional API key sent as `x-api-key`
    pub api_key: Option<String>,

    /// HTTP client timeout in seconds
    #[serde(default = "default_scholar_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient upstream failures
    #[serde(default = "default_scholar_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TreeConfig {
    /// Shards per expansion step. Unset means twice the logical CPU count.
    pub workers: Option<usize>,

    /// Depth used when the caller does not supply one
    #[serde(default = "default_max_depth")]
    pub default_max_depth: usize,

    /// Hard ceiling on caller-supplied depth
    #[serde(default = "default_max_depth_limit")]
    pub max_depth_limit: usize,

    /// Deadline for a single upstream fetch during expansion
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Reported as the `service` label on every exported metric
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 300 }
fn default_database_url() -> String { "postgres://localhost/citetree".to_string() }
fn default_max_connections() -> u32 { 50 }
fn default_min_connections() -> u32 { 5 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_scholar_base() -> String { "https://api.semanticscholar.org/graph/v1".to_string() }
fn default_scholar_timeout() -> u64 { 30 }
fn default_scholar_retries() -> u32 { 3 }
fn default_max_depth() -> usize { 2 }
fn default_max_depth_limit() -> usize { 5 }
fn default_fetch_timeout() -> u64 { 20 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "citetree".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for ScholarConfig {
    fn default() -> Self {
        Self {
            api_base: default_scholar_base(),
            api_key: None,
            timeout_secs: default_scholar_timeout(),
            max_retries: default_scholar_retries(),
        }
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            workers: None,
            default_max_depth: default_max_depth(),
            max_depth_limit: default_max_depth_limit(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl TreeConfig {
    /// Number of shards per expansion step
    pub fn worker_count(&self) -> usize {
        match self.workers {
            Some(n) if n > 0 => n,
            _ => num_cpus::get() * 2,
        }
    }

    /// Per-fetch deadline as Duration
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Reject settings under which every request would fail
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth_limit == 0 {
            return Err(ConfigError::Message(
                "tree.max_depth_limit must be at least 1".to_string(),
            ));
        }
        if self.default_max_depth == 0 || self.default_max_depth > self.max_depth_limit {
            return Err(ConfigError::Message(format!(
                "tree.default_max_depth must be within 1..={}, got {}",
                self.max_depth_limit, self.default_max_depth
            )));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "tree.fetch_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env is fine; real environment variables still apply
        dotenvy::dotenv().ok();

        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__TREE__WORKERS=8
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.tree.validate()?;
        Ok(config)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.tree.default_max_depth, 2);
        assert!(config.tree.max_depth_limit >= config.tree.default_max_depth);
        assert!(config.scholar.api_base.starts_with("https://"));
    }

    #[test]
    fn test_worker_count() {
        let mut tree = TreeConfig::default();
        assert_eq!(tree.worker_count(), num_cpus::get() * 2);

        tree.workers = Some(3);
        assert_eq!(tree.worker_count(), 3);

        tree.workers = Some(0);
        assert_eq!(tree.worker_count(), num_cpus::get() * 2);
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"tree": {"workers": 4}}"#).unwrap();
        assert_eq!(config.tree.workers, Some(4));
        assert_eq!(config.tree.fetch_timeout_secs, 20);
        assert_eq!(config.observability.service_name, "citetree");
    }

    #[test]
    fn test_tree_validation() {
        assert!(TreeConfig::default().validate().is_ok());

        let above_limit = TreeConfig {
            default_max_depth: 6,
            max_depth_limit: 5,
            ..TreeConfig::default()
        };
        assert!(matches!(above_limit.validate(), Err(ConfigError::Message(_))));

        let zero_depth = TreeConfig {
            default_max_depth: 0,
            ..TreeConfig::default()
        };
        assert!(zero_depth.validate().is_err());

        let no_deadline = TreeConfig {
            fetch_timeout_secs: 0,
            ..TreeConfig::default()
        };
        assert!(matches!(no_deadline.validate(), Err(ConfigError::Message(_))));
    }
}
