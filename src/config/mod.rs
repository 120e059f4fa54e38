//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

use serde::Deserialize;

use crate::bus::MessagingConfig;
use crate::indexing::IndexType;
use crate::search::SearchConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "SOUS_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "SOUS";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "SOUS_LOG";

/// Environment flag that turns the batch jobs into no-ops.
pub const CEASE_OPERATION_ENV_VAR: &str = "CEASE_OPERATION";
/// Environment variable naming the index request topic.
pub const SEARCH_INDEXING_TOPIC_ENV_VAR: &str = "SEARCH_INDEXING_TOPIC_NAME";
/// Environment variable naming the data-changes topic.
pub const DATA_CHANGES_TOPIC_ENV_VAR: &str = "DATA_CHANGES_TOPIC_NAME";
/// Environment variable naming the webhook execution request topic.
pub const WEBHOOK_EXECUTION_TOPIC_ENV_VAR: &str = "WEBHOOK_EXECUTION_REQUESTS_TOPIC_NAME";

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Messaging backend for both fabrics.
    pub messaging: MessagingConfig,
    /// Topic names.
    pub queues: QueuesConfig,
    /// Search index backend.
    pub search: SearchConfig,
    /// System of record.
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub indexer: IndexerConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix and `__`
    ///    separator, e.g. `SOUS__MESSAGING__PROVIDER=redis`
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Topic names used by the pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueuesConfig {
    pub data_changes_topic_name: String,
    pub search_indexing_topic_name: String,
    /// Empty disables webhook fan-out.
    pub webhook_execution_requests_topic_name: String,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            data_changes_topic_name: "data_changes".to_string(),
            search_indexing_topic_name: "search_index_requests".to_string(),
            webhook_execution_requests_topic_name: String::new(),
        }
    }
}

/// PostgreSQL configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    /// Bound on establishing the pool.
    pub connect_timeout_secs: u64,
    pub max_connections: u32,
    /// Most row IDs returned per needs-indexing query.
    pub indexing_batch_size: u64,
    /// Rows indexed longer ago than this are reindexed.
    pub reindex_after_hours: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/sous".to_string(),
            connect_timeout_secs: 15,
            max_connections: 5,
            indexing_batch_size: 1000,
            reindex_after_hours: 24,
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Index types a run may pick from.
    pub enabled_index_types: Vec<IndexType>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled_index_types: IndexType::ALL.to_vec(),
        }
    }
}

/// Indexer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Attempts per index call when the failure is transient.
    pub max_attempts: usize,
    /// Capacity of the consumer error channel.
    pub error_buffer: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            error_buffer: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.messaging.provider, "memory");
        assert_eq!(config.queues.search_indexing_topic_name, "search_index_requests");
        assert!(config.queues.webhook_execution_requests_topic_name.is_empty());
        assert_eq!(config.database.connect_timeout_secs, 15);
        assert_eq!(config.scheduler.enabled_index_types.len(), 13);
        assert_eq!(config.indexer.max_attempts, 3);
        assert!(config.search.provider.is_empty());
    }

    #[test]
    #[serial]
    fn test_load_from_file_keeps_defaults_for_missing_sections() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "messaging:\n  provider: sqs\n  sqs:\n    region: us-east-2\nscheduler:\n  enabled_index_types: [recipes, valid_vessels]\n"
        )
        .unwrap();

        let config = Config::load(file.path().to_str()).unwrap();

        assert_eq!(config.messaging.provider, "sqs");
        assert_eq!(config.messaging.sqs.region.as_deref(), Some("us-east-2"));
        assert_eq!(config.messaging.sqs.wait_time_secs, 20);
        assert_eq!(
            config.scheduler.enabled_index_types,
            vec![IndexType::Recipes, IndexType::ValidVessels]
        );
        assert_eq!(config.database.indexing_batch_size, 1000);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "search:\n  provider: algolia\n").unwrap();

        std::env::set_var("SOUS__SEARCH__PROVIDER", "elasticsearch");
        let config = Config::load(file.path().to_str());
        std::env::remove_var("SOUS__SEARCH__PROVIDER");

        assert_eq!(config.unwrap().search.provider, "elasticsearch");
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Config::load(Some("/nonexistent/sous.yaml")).is_err());
    }
}
