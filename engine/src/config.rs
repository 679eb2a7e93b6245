//! Session configuration.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};

/// Default number of items requested per index fetch.
pub const DEFAULT_FETCH_CHUNK_SIZE: u64 = 10;

/// Tunables for how eagerly a session fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataSourceConfig {
    /// Minimum number of items requested when an index list needs more data.
    pub fetch_chunk_size: u64,
    /// Accessing an item this close to either edge of the loaded window
    /// fetches the adjacent chunk ahead of time. Zero disables prefetching.
    pub prefetch_distance: u64,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            fetch_chunk_size: DEFAULT_FETCH_CHUNK_SIZE,
            prefetch_distance: 0,
        }
    }
}

impl DataSourceConfig {
    /// Set the fetch chunk size.
    pub fn with_fetch_chunk_size(mut self, size: u64) -> Self {
        self.fetch_chunk_size = size;
        self
    }

    /// Set the prefetch distance.
    pub fn with_prefetch_distance(mut self, distance: u64) -> Self {
        self.prefetch_distance = distance;
        self
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.fetch_chunk_size == 0 {
            return Err(Error::InvalidConfig(
                "fetchChunkSize must be at least 1".into(),
            ));
        }
        if self.fetch_chunk_size > i64::MAX as u64 {
            return Err(Error::InvalidConfig("fetchChunkSize is too large".into()));
        }
        Ok(())
    }

    /// Parse and validate from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DataSourceConfig::default();
        assert_eq!(config.fetch_chunk_size, 10);
        assert_eq!(config.prefetch_distance, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = DataSourceConfig::from_json(r#"{"prefetchDistance": 3}"#).unwrap();
        assert_eq!(config.fetch_chunk_size, 10);
        assert_eq!(config.prefetch_distance, 3);

        let config = DataSourceConfig::from_json("{}").unwrap();
        assert_eq!(config, DataSourceConfig::default());
    }

    #[test]
    fn zero_chunk_rejected() {
        let result = DataSourceConfig::from_json(r#"{"fetchChunkSize": 0}"#);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn builder() {
        let config = DataSourceConfig::default()
            .with_fetch_chunk_size(25)
            .with_prefetch_distance(5);
        assert_eq!(config.fetch_chunk_size, 25);
        assert_eq!(config.prefetch_distance, 5);
    }
}
