//! Configuration for raster access.

use serde::{Deserialize, Serialize};

/// Configuration for opening and reading rasters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridIoConfig {
    /// Memory budget for decoded GeoTIFF chunks, in megabytes.
    pub chunk_cache_size_mb: usize,

    /// Fill value used for boundless reads when the raster has no no-data value.
    pub nodata_sentinel: f64,
}

impl Default for GridIoConfig {
    fn default() -> Self {
        Self {
            chunk_cache_size_mb: 64,
            nodata_sentinel: -999.0,
        }
    }
}

impl GridIoConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ZONAL_CHUNK_CACHE_MB") {
            if let Ok(size) = val.parse() {
                config.chunk_cache_size_mb = size;
            }
        }

        if let Ok(val) = std::env::var("ZONAL_NODATA_SENTINEL") {
            if let Ok(value) = val.parse() {
                config.nodata_sentinel = value;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_cache_size_mb == 0 {
            return Err("chunk_cache_size_mb must be > 0".to_string());
        }

        if !self.nodata_sentinel.is_finite() {
            return Err("nodata_sentinel must be a finite number".to_string());
        }

        Ok(())
    }

    /// Get the chunk cache size in bytes.
    pub fn chunk_cache_size_bytes(&self) -> usize {
        self.chunk_cache_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = GridIoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_cache_size_bytes(), 64 * 1024 * 1024);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = GridIoConfig {
            chunk_cache_size_mb: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GridIoConfig {
            nodata_sentinel: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
