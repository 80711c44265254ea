use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// TTL for `cache(true)` when no configuration is supplied.
pub const DEFAULT_CACHE: Duration = Duration::from_secs(1);

/// Repository-level defaults applied to a query before translation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// TTL used when a query asks for caching without a duration.
    pub default_cache_ms: u64,
    /// Page size when neither a cursor nor `limit` sets one. `0` leaves it unbounded.
    pub default_page_size: u64,
    /// Larger requested pages are clamped. `0` disables the clamp.
    pub max_page_size: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_cache_ms: DEFAULT_CACHE.as_millis() as u64,
            default_page_size: 0,
            max_page_size: 0,
        }
    }
}

impl QueryConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: QueryConfig =
            serde_json::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()
    }

    pub fn validate(self) -> Result<Self> {
        if self.max_page_size > 0 && self.default_page_size > self.max_page_size {
            return Err(Error::Config(format!(
                "default_page_size {} exceeds max_page_size {}",
                self.default_page_size, self.max_page_size
            )));
        }
        Ok(self)
    }

    pub fn default_cache(&self) -> Duration {
        Duration::from_millis(self.default_cache_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = QueryConfig::from_json(r#"{"max_page_size": 100}"#).unwrap();
        assert_eq!(config.max_page_size, 100);
        assert_eq!(config.default_cache(), Duration::from_secs(1));
    }

    #[test]
    fn inconsistent_page_sizes_are_rejected() {
        let err = QueryConfig::from_json(r#"{"default_page_size": 50, "max_page_size": 10}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(QueryConfig::from_json("{"), Err(Error::Config(_))));
    }
}
