//! Config - 実行時設定
//!
//! TOML から読み込む。全フィールドに既定値があるので、空ファイルも有効。
//! 時間はミリ秒で書く。
//!
//! ```toml
//! enrichment_timeout_ms = 5000
//!
//! [breaker]
//! failure_threshold = 5
//! recovery_timeout_ms = 30000
//! half_open_max_calls = 1
//!
//! [cache]
//! max_bytes = 52428800
//! max_entry_bytes = 1048576
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration of the orchestration core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrellisConfig {
    /// Timeout applied to each enrichment lookup; expiry counts as a breaker failure.
    #[serde(rename = "enrichment_timeout_ms", with = "duration_ms")]
    pub enrichment_timeout: Duration,

    pub breaker: BreakerConfig,
    pub cache: CacheConfig,
}

impl Default for TrellisConfig {
    fn default() -> Self {
        Self {
            enrichment_timeout: Duration::from_secs(5),
            breaker: BreakerConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl TrellisConfig {
    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.breaker.validate()?;
        self.cache.validate()?;
        if self.enrichment_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "enrichment_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Circuit breaker settings, shared by every breaker of a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,

    /// Time spent Open before a probe is let through.
    #[serde(rename = "recovery_timeout_ms", with = "duration_ms")]
    pub recovery_timeout: Duration,

    /// Probes allowed in flight while HalfOpen; also the number of probe
    /// successes needed to close again.
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}

impl BreakerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.half_open_max_calls == 0 {
            return Err(ConfigError::Invalid(
                "breaker.half_open_max_calls must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Byte budget of a cache namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(alias = "cache_max_bytes")]
    pub max_bytes: usize,

    #[serde(alias = "cache_max_entry_bytes", skip_serializing_if = "Option::is_none")]
    pub max_entry_bytes: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 50 * 1024 * 1024,
            max_entry_bytes: None,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid(
                "cache.max_bytes must be greater than zero".to_string(),
            ));
        }
        if let Some(cap) = self.max_entry_bytes
            && cap > self.max_bytes
        {
            return Err(ConfigError::Invalid(format!(
                "cache.max_entry_bytes ({cap}) exceeds cache.max_bytes ({})",
                self.max_bytes
            )));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
