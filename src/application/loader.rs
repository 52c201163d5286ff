//! The Data Loader seam: where catalog snapshots actually come from.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::catalog::CatalogSnapshot;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("upstream catalog fetch failed: {0}")]
    Upstream(String),
    #[error("catalog rows could not be decoded: {message}")]
    Decode { message: String },
}

impl LoaderError {
    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Self::Upstream(err.to_string())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

/// Loads the full catalog from the backing store.
///
/// Pure input to the cache: implementations must not touch cache state.
/// The coordinator guarantees at most one `load_catalog` call is in flight
/// at a time regardless of concurrent demand.
#[async_trait]
pub trait CatalogLoader: Send + Sync {
    async fn load_catalog(&self) -> Result<CatalogSnapshot, LoaderError>;
}
