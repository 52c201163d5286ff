//! Kovert Cache System
//!
//! Two cooperating layers keep the storefront fast and consistent:
//!
//! - **Catalog cache**: one process-wide snapshot of the skins catalog with
//!   TTL expiry and single-flight refresh
//! - **Revalidation**: after catalog writes, drops the snapshot and signals
//!   the rendered-page cache for each configured path
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `kovert.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 300
//! revalidate_paths = ["/", "/catalog", "/catalog/taxonomy"]
//! # ... see config.rs for all options
//! ```

mod config;
mod coordinator;
pub(crate) mod lock;
mod revalidate;

pub use config::CacheConfig;
pub use coordinator::{CacheError, CatalogCache};
pub use revalidate::{
    CacheRevalidator, PageRevalidator, RefreshSummary, RevalidateError, RevalidationReport,
};
