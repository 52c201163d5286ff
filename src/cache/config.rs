//! Cache configuration.
//!
//! Controls the catalog cache TTL and page revalidation via `kovert.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_TTL_SECONDS: u64 = 300;
const DEFAULT_PAGE_RESPONSE_LIMIT: usize = 64;

fn default_revalidate_paths() -> Vec<String> {
    vec![
        "/".to_string(),
        "/catalog".to_string(),
        "/catalog/taxonomy".to_string(),
    ]
}

/// Cache configuration from `kovert.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the catalog cache and page response cache.
    pub enabled: bool,
    /// Catalog snapshot time-to-live in seconds.
    pub ttl_seconds: u64,
    /// Page paths whose cached responses are dropped after a catalog write.
    pub revalidate_paths: Vec<String>,
    /// Maximum cached page responses.
    pub page_response_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            revalidate_paths: default_revalidate_paths(),
            page_response_limit: DEFAULT_PAGE_RESPONSE_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl_seconds: settings.ttl_seconds,
            revalidate_paths: settings.revalidate_paths.clone(),
            page_response_limit: settings.page_response_limit,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Returns the page response limit as NonZeroUsize, clamping to 1 if zero.
    pub fn page_response_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.page_response_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
