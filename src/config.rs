//! WolfCave Configuration
//!
//! This module provides configuration structures for the WolfCave
//! mock bucket server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest vbucket count a bucket may be configured with
pub const MAX_VBUCKETS: u16 = 1024;

/// Largest replica count a bucket may be configured with
pub const MAX_REPLICAS: usize = 3;

/// Main WolfCave configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WolfCaveConfig {
    /// Bucket layout and replication settings
    #[serde(default)]
    pub bucket: BucketConfig,

    /// Virtual clock configuration
    #[serde(default)]
    pub clock: ClockConfig,

    /// Workload driven by `wolfcave run`
    #[serde(default)]
    pub workload: WorkloadConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Bucket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Bucket name
    #[serde(default = "default_bucket_name")]
    pub name: String,

    /// Number of vbuckets per copy of the bucket
    #[serde(default = "default_num_vbuckets")]
    pub num_vbuckets: u16,

    /// Number of replica copies
    #[serde(default = "default_num_replicas")]
    pub num_replicas: usize,

    /// Delay between a write and its arrival on replicas, in milliseconds
    #[serde(default = "default_replication_latency_ms")]
    pub replication_latency_ms: u64,
}

/// Virtual clock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Virtual time the clock starts at
    #[serde(default = "default_clock_start")]
    pub start: DateTime<Utc>,
}

/// Workload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Number of documents to write
    #[serde(default = "default_documents")]
    pub documents: usize,

    /// Virtual time between writes in milliseconds
    #[serde(default = "default_write_interval_ms")]
    pub write_interval_ms: u64,

    /// Random jitter applied to the write interval in milliseconds
    #[serde(default)]
    pub jitter_ms: u64,

    /// Size of each document body in bytes
    #[serde(default = "default_value_size")]
    pub value_size: usize,

    /// Prefix for generated document keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// RNG seed, so runs are reproducible
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact, full)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_bucket_name() -> String {
    "default".to_string()
}

fn default_num_vbuckets() -> u16 {
    64
}

fn default_num_replicas() -> usize {
    1
}

fn default_replication_latency_ms() -> u64 {
    50
}

fn default_clock_start() -> DateTime<Utc> {
    crate::mocktime::Chrono::new().now()
}

fn default_documents() -> usize {
    100
}

fn default_write_interval_ms() -> u64 {
    10
}

fn default_value_size() -> usize {
    64
}

fn default_key_prefix() -> String {
    "doc-".to_string()
}

fn default_seed() -> u64 {
    42
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "full".to_string()
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            name: default_bucket_name(),
            num_vbuckets: default_num_vbuckets(),
            num_replicas: default_num_replicas(),
            replication_latency_ms: default_replication_latency_ms(),
        }
    }
}

impl BucketConfig {
    /// Replication latency as Duration
    pub fn replication_latency(&self) -> Duration {
        Duration::from_millis(self.replication_latency_ms)
    }

    /// Validate the bucket layout
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.is_empty() {
            return Err(crate::Error::Config("bucket.name cannot be empty".into()));
        }

        if self.num_vbuckets == 0 || self.num_vbuckets > MAX_VBUCKETS {
            return Err(crate::Error::Config(format!(
                "bucket.num_vbuckets must be between 1 and {}",
                MAX_VBUCKETS
            )));
        }

        if self.num_replicas > MAX_REPLICAS {
            return Err(crate::Error::Config(format!(
                "bucket.num_replicas cannot exceed {}",
                MAX_REPLICAS
            )));
        }

        Ok(())
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            start: default_clock_start(),
        }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            documents: default_documents(),
            write_interval_ms: default_write_interval_ms(),
            jitter_ms: 0,
            value_size: default_value_size(),
            key_prefix: default_key_prefix(),
            seed: default_seed(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl WolfCaveConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfCaveConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        self.bucket.validate()?;

        if self.workload.jitter_ms > self.workload.write_interval_ms {
            return Err(crate::Error::Config(
                "workload.jitter_ms cannot exceed workload.write_interval_ms".into(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "compact" | "full") {
            return Err(crate::Error::Config(format!(
                "logging.format must be pretty, compact or full, got {}",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Get the write interval as Duration
    pub fn write_interval(&self) -> Duration {
        Duration::from_millis(self.workload.write_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[bucket]
name = "travel-sample"
num_vbuckets = 16
num_replicas = 2
replication_latency_ms = 250

[clock]
start = "2025-06-01T12:00:00Z"

[workload]
documents = 10
write_interval_ms = 20
jitter_ms = 5

[logging]
level = "debug"
format = "compact"
"#;

        let config = WolfCaveConfig::from_str(toml).unwrap();
        assert_eq!(config.bucket.name, "travel-sample");
        assert_eq!(config.bucket.num_vbuckets, 16);
        assert_eq!(config.bucket.num_replicas, 2);
        assert_eq!(config.bucket.replication_latency(), Duration::from_millis(250));
        assert_eq!(config.clock.start.to_rfc3339(), "2025-06-01T12:00:00+00:00");
        assert_eq!(config.workload.documents, 10);
        assert_eq!(config.workload.key_prefix, "doc-");
        assert_eq!(config.write_interval(), Duration::from_millis(20));
        assert_eq!(config.logging.format, "compact");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = WolfCaveConfig::from_str("").unwrap();
        assert_eq!(config.bucket.name, "default");
        assert_eq!(config.bucket.num_vbuckets, 64);
        assert_eq!(config.bucket.num_replicas, 1);
        assert_eq!(
            config.clock.start.timestamp_millis(),
            crate::mocktime::WOLFCAVE_EPOCH_MS
        );
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            "[bucket]\nnum_vbuckets = 0",
            "[bucket]\nnum_vbuckets = 2048",
            "[bucket]\nnum_replicas = 4",
            "[bucket]\nname = \"\"",
            "[workload]\nwrite_interval_ms = 5\njitter_ms = 10",
            "[logging]\nformat = \"xml\"",
        ];

        for case in cases {
            let err = WolfCaveConfig::from_str(case).unwrap_err();
            assert!(matches!(err, crate::Error::Config(_)), "case {:?}: {}", case, err);
        }
    }

    #[test]
    fn test_invalid_toml() {
        let err = WolfCaveConfig::from_str("[bucket\nname = 1").unwrap_err();
        assert!(matches!(err, crate::Error::ConfigParse(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_toml_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wolfcave.toml");

        let mut config = WolfCaveConfig::default();
        config.bucket.num_vbuckets = 8;
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = WolfCaveConfig::from_file(&path).unwrap();
        assert_eq!(loaded.bucket.num_vbuckets, 8);
        assert_eq!(loaded.clock.start, config.clock.start);
    }
}
