//! Pool configuration.

use super::errors::ConfigError;
use serde::{Deserialize, Serialize};
use shared_types::Address;
use std::time::Duration;

/// Largest accepted encoded transaction (1 MiB).
pub const DEFAULT_MAX_TX_SIZE: usize = 1024 * 1024;
/// Default number of cached objects.
pub const DEFAULT_KNOWN_OBJECTS_CAPACITY: usize = 100_000;
/// Default cache entry lifetime.
pub const DEFAULT_KNOWN_OBJECTS_TTL_SECS: u64 = 600;
/// Default depth of the removal queue.
pub const DEFAULT_JANITOR_QUEUE_DEPTH: usize = 4096;

/// Build-lease pool configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Address of the single authorized builder (`0x`-prefixed hex).
    pub builder: String,
    /// Audience every builder token must name.
    pub audience: String,
    /// Verifier-supplied data covered by token signatures.
    pub token_external_data: String,
    /// Largest accepted encoded transaction.
    pub max_tx_size: usize,
    /// Known-object cache capacity.
    pub known_objects_capacity: usize,
    /// Known-object cache entry lifetime.
    pub known_objects_ttl_secs: u64,
    /// Pending removals before new ones are dropped.
    pub janitor_queue_depth: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            builder: format!("0x{}", "00".repeat(20)),
            audience: "txpool".to_string(),
            token_external_data: String::new(),
            max_tx_size: DEFAULT_MAX_TX_SIZE,
            known_objects_capacity: DEFAULT_KNOWN_OBJECTS_CAPACITY,
            known_objects_ttl_secs: DEFAULT_KNOWN_OBJECTS_TTL_SECS,
            janitor_queue_depth: DEFAULT_JANITOR_QUEUE_DEPTH,
        }
    }
}

impl PoolConfig {
    /// Configuration with small limits for tests.
    pub fn for_testing(builder: Address) -> Self {
        Self {
            builder: shared_types::address_to_string(&builder),
            audience: "txpool-test".to_string(),
            token_external_data: "test-chain".to_string(),
            known_objects_capacity: 1_000,
            known_objects_ttl_secs: 60,
            janitor_queue_depth: 64,
            ..Default::default()
        }
    }

    /// Parses a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.builder_address()?;
        if self.audience.is_empty() {
            return Err(ConfigError::EmptyAudience);
        }
        if self.max_tx_size == 0 {
            return Err(ConfigError::InvalidLimit("max_tx_size must be > 0".into()));
        }
        if self.known_objects_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "known_objects_capacity must be > 0".into(),
            ));
        }
        if self.known_objects_ttl_secs == 0 {
            return Err(ConfigError::InvalidLimit(
                "known_objects_ttl_secs must be > 0".into(),
            ));
        }
        if self.janitor_queue_depth == 0 {
            return Err(ConfigError::InvalidLimit(
                "janitor_queue_depth must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Parsed builder address.
    pub fn builder_address(&self) -> Result<Address, ConfigError> {
        let digits = self
            .builder
            .strip_prefix("0x")
            .unwrap_or(&self.builder);
        let bytes =
            hex::decode(digits).map_err(|e| ConfigError::InvalidBuilder(e.to_string()))?;
        Address::try_from(bytes.as_slice()).map_err(|_| {
            ConfigError::InvalidBuilder(format!("expected 20 bytes, got {}", bytes.len()))
        })
    }

    pub fn known_objects_ttl(&self) -> Duration {
        Duration::from_secs(self.known_objects_ttl_secs)
    }
}
