//! Refinement configuration.
//!
//! Values come from defaults, then an optional YAML file, then `REFINE_*`
//! environment variables. Every source is validated the same way.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::classify::Domain;
use crate::dedup::{DedupMethod, DEFAULT_SIMILARITY_THRESHOLD};
use crate::similarity::DEFAULT_DIMENSION;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid YAML for this schema.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Configuration for the refinement pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RefineConfig {
    // Filtering
    /// Items whose aggregate quality is below this are rejected.
    pub quality_threshold: f64,
    /// Minimum cosine similarity for two items to be near-duplicates.
    pub similarity_threshold: f64,
    /// Deduplication method used when a run does not specify one.
    pub dedup_method: DedupMethod,
    /// Domains that earn full relevance credit. Empty means all.
    pub target_domains: Vec<Domain>,

    // Execution
    /// Worker threads for per-item analysis and pair generation.
    pub worker_count: usize,
    /// Items per batch. Cancellation is checked between batches.
    pub batch_size: usize,
    /// Concurrent item reads within a batch.
    pub read_concurrency: usize,
    /// Timeout for analysing a single item.
    pub item_timeout: Duration,
    /// Dimension of hashed embeddings.
    pub embedding_dimension: usize,

    // Storage
    /// SQLite connection URL.
    pub database_url: String,
    /// Root directory of stored dataset items.
    pub storage_root: PathBuf,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 0.5,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            dedup_method: DedupMethod::Hybrid,
            target_domains: Vec::new(),

            worker_count: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            batch_size: 64,
            read_concurrency: 8,
            item_timeout: Duration::from_secs(30),
            embedding_dimension: DEFAULT_DIMENSION,

            database_url: "sqlite://data_broker.db".to_string(),
            storage_root: PathBuf::from("./cold_storage"),
        }
    }
}

/// On-disk shape of the YAML configuration file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    quality_threshold: Option<f64>,
    similarity_threshold: Option<f64>,
    dedup_method: Option<DedupMethod>,
    target_domains: Option<Vec<Domain>>,
    worker_count: Option<usize>,
    batch_size: Option<usize>,
    read_concurrency: Option<usize>,
    item_timeout_secs: Option<u64>,
    embedding_dimension: Option<usize>,
    database_url: Option<String>,
    storage_root: Option<PathBuf>,
}

impl RefineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables over the defaults.
    ///
    /// # Environment Variables
    ///
    /// - `REFINE_QUALITY_THRESHOLD`: Rejection threshold (default: 0.5)
    /// - `REFINE_SIMILARITY_THRESHOLD`: Near-duplicate threshold (default: 0.95)
    /// - `REFINE_DEDUP_METHOD`: `hash`, `semantic` or `hybrid` (default: hybrid)
    /// - `REFINE_TARGET_DOMAINS`: Comma-separated domains (default: all)
    /// - `REFINE_WORKERS`: Worker threads (default: available cores)
    /// - `REFINE_BATCH_SIZE`: Items per batch (default: 64)
    /// - `REFINE_READ_CONCURRENCY`: Concurrent reads (default: 8)
    /// - `REFINE_ITEM_TIMEOUT_SECS`: Per-item timeout (default: 30)
    /// - `REFINE_EMBEDDING_DIMENSION`: Embedding size (default: 128)
    /// - `DATABASE_URL`: SQLite URL (default: sqlite://data_broker.db)
    /// - `REFINE_STORAGE_ROOT`: Item storage root (default: ./cold_storage)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_vars(|key| std::env::var(key).ok())
    }

    /// Loads a YAML file over the defaults, then applies the environment.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)?.merge_vars(|key| std::env::var(key).ok())
    }

    /// Parses YAML over the defaults. The environment is not consulted.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = if raw.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        let mut config = Self::default();
        if let Some(v) = file.quality_threshold {
            config.quality_threshold = v;
        }
        if let Some(v) = file.similarity_threshold {
            config.similarity_threshold = v;
        }
        if let Some(v) = file.dedup_method {
            config.dedup_method = v;
        }
        if let Some(v) = file.target_domains {
            config.target_domains = v;
        }
        if let Some(v) = file.worker_count {
            config.worker_count = v;
        }
        if let Some(v) = file.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = file.read_concurrency {
            config.read_concurrency = v;
        }
        if let Some(v) = file.item_timeout_secs {
            config.item_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.embedding_dimension {
            config.embedding_dimension = v;
        }
        if let Some(v) = file.database_url {
            config.database_url = v;
        }
        if let Some(v) = file.storage_root {
            config.storage_root = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Applies variables from `lookup` over `self` and validates the result.
    pub fn merge_vars<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("REFINE_QUALITY_THRESHOLD") {
            self.quality_threshold = parse_env_value(&val, "REFINE_QUALITY_THRESHOLD")?;
        }

        if let Some(val) = lookup("REFINE_SIMILARITY_THRESHOLD") {
            self.similarity_threshold = parse_env_value(&val, "REFINE_SIMILARITY_THRESHOLD")?;
        }

        if let Some(val) = lookup("REFINE_DEDUP_METHOD") {
            self.dedup_method = parse_env_value(&val, "REFINE_DEDUP_METHOD")?;
        }

        if let Some(val) = lookup("REFINE_TARGET_DOMAINS") {
            self.target_domains = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_env_value(s, "REFINE_TARGET_DOMAINS"))
                .collect::<Result<_, _>>()?;
        }

        if let Some(val) = lookup("REFINE_WORKERS") {
            self.worker_count = parse_env_value(&val, "REFINE_WORKERS")?;
        }

        if let Some(val) = lookup("REFINE_BATCH_SIZE") {
            self.batch_size = parse_env_value(&val, "REFINE_BATCH_SIZE")?;
        }

        if let Some(val) = lookup("REFINE_READ_CONCURRENCY") {
            self.read_concurrency = parse_env_value(&val, "REFINE_READ_CONCURRENCY")?;
        }

        if let Some(val) = lookup("REFINE_ITEM_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "REFINE_ITEM_TIMEOUT_SECS")?;
            self.item_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("REFINE_EMBEDDING_DIMENSION") {
            self.embedding_dimension = parse_env_value(&val, "REFINE_EMBEDDING_DIMENSION")?;
        }

        if let Some(val) = lookup("DATABASE_URL") {
            self.database_url = val;
        }

        if let Some(val) = lookup("REFINE_STORAGE_ROOT") {
            self.storage_root = PathBuf::from(val);
        }

        self.validate()?;
        Ok(self)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(ConfigError::ValidationFailed(
                "quality_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::ValidationFailed(
                "similarity_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.worker_count == 0 {
            return Err(ConfigError::ValidationFailed(
                "worker_count must be greater than 0".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.read_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "read_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.item_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "item_timeout must be greater than 0".to_string(),
            ));
        }

        if self.embedding_dimension == 0 {
            return Err(ConfigError::ValidationFailed(
                "embedding_dimension must be greater than 0".to_string(),
            ));
        }

        if self.database_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_dedup_method(mut self, method: DedupMethod) -> Self {
        self.dedup_method = method;
        self
    }

    pub fn with_target_domains(mut self, domains: Vec<Domain>) -> Self {
        self.target_domains = domains;
        self
    }

    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_read_concurrency(mut self, concurrency: usize) -> Self {
        self.read_concurrency = concurrency;
        self
    }

    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = timeout;
        self
    }

    pub fn with_embedding_dimension(mut self, dimension: usize) -> Self {
        self.embedding_dimension = dimension;
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = RefineConfig::default();
        assert!((config.quality_threshold - 0.5).abs() < f64::EPSILON);
        assert!((config.similarity_threshold - 0.95).abs() < f64::EPSILON);
        assert_eq!(config.dedup_method, DedupMethod::Hybrid);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.item_timeout, Duration::from_secs(30));
        assert_eq!(config.embedding_dimension, 128);
        assert!(config.target_domains.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RefineConfig::new()
            .with_quality_threshold(0.7)
            .with_similarity_threshold(0.9)
            .with_dedup_method(DedupMethod::Hash)
            .with_worker_count(3)
            .with_batch_size(10)
            .with_database_url("sqlite://test.db");

        assert!((config.quality_threshold - 0.7).abs() < f64::EPSILON);
        assert!((config.similarity_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.dedup_method, DedupMethod::Hash);
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.database_url, "sqlite://test.db");
    }

    #[test]
    fn test_env_overrides() {
        let config = RefineConfig::default()
            .merge_vars(vars(&[
                ("REFINE_QUALITY_THRESHOLD", "0.65"),
                ("REFINE_DEDUP_METHOD", "semantic"),
                ("REFINE_TARGET_DOMAINS", "medical, legal"),
                ("REFINE_ITEM_TIMEOUT_SECS", "5"),
                ("DATABASE_URL", "sqlite://other.db"),
            ]))
            .expect("valid");
        assert!((config.quality_threshold - 0.65).abs() < f64::EPSILON);
        assert_eq!(config.dedup_method, DedupMethod::Semantic);
        assert_eq!(config.target_domains, vec![Domain::Medical, Domain::Legal]);
        assert_eq!(config.item_timeout, Duration::from_secs(5));
        assert_eq!(config.database_url, "sqlite://other.db");
    }

    #[test]
    fn test_env_invalid_value() {
        let err = RefineConfig::default()
            .merge_vars(vars(&[("REFINE_BATCH_SIZE", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("REFINE_BATCH_SIZE"));

        let err = RefineConfig::default()
            .merge_vars(vars(&[("REFINE_DEDUP_METHOD", "fuzzy")]))
            .unwrap_err();
        assert!(err.to_string().contains("REFINE_DEDUP_METHOD"));
    }

    #[test]
    fn test_validation_invalid_quality_threshold() {
        let result = RefineConfig::default().with_quality_threshold(1.5).validate();
        assert!(result.unwrap_err().to_string().contains("quality_threshold"));
    }

    #[test]
    fn test_validation_invalid_similarity_threshold() {
        let result = RefineConfig::default()
            .with_similarity_threshold(-0.1)
            .validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("similarity_threshold"));
    }

    #[test]
    fn test_validation_zero_sizes() {
        for config in [
            RefineConfig::default().with_worker_count(0),
            RefineConfig::default().with_batch_size(0),
            RefineConfig::default().with_read_concurrency(0),
            RefineConfig::default().with_embedding_dimension(0),
            RefineConfig::default().with_item_timeout(Duration::ZERO),
            RefineConfig::default().with_database_url(""),
        ] {
            assert!(matches!(
                config.validate(),
                Err(ConfigError::ValidationFailed(_))
            ));
        }
    }

    #[test]
    fn test_yaml_config() {
        let config = RefineConfig::from_yaml_str(
            "quality_threshold: 0.8\ndedup_method: hash\ntarget_domains: [technical]\nitem_timeout_secs: 12\n",
        )
        .expect("valid yaml");
        assert!((config.quality_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.dedup_method, DedupMethod::Hash);
        assert_eq!(config.target_domains, vec![Domain::Technical]);
        assert_eq!(config.item_timeout, Duration::from_secs(12));
        assert_eq!(RefineConfig::from_yaml_str("").expect("empty"), RefineConfig::default());
    }

    #[test]
    fn test_yaml_rejects_unknown_keys_and_bad_values() {
        assert!(matches!(
            RefineConfig::from_yaml_str("budget: 3\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            RefineConfig::from_yaml_str("quality_threshold: 2.0\n"),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_yaml_file() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("refine.yaml");
        std::fs::write(&path, "batch_size: 7\n").expect("write");
        let config = RefineConfig::from_yaml_str(&std::fs::read_to_string(&path).expect("read"))
            .expect("valid");
        assert_eq!(config.batch_size, 7);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            key: "KEY".to_string(),
            message: "bad value".to_string(),
        };
        assert!(err.to_string().contains("KEY"));
        assert!(err.to_string().contains("bad value"));

        let err = ConfigError::ValidationFailed("test failure".to_string());
        assert!(err.to_string().contains("test failure"));
    }
}
