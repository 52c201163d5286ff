//! Invalidation coordinator.
//!
//! After a catalog write, the in-process cache and the rendered-page cache
//! must agree on freshness: drop (or reload) the snapshot, then signal each
//! configured page path. Page signals are best-effort; one failing path
//! never blocks the rest and never fails the operation.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::coordinator::{CacheError, CatalogCache};

const METRIC_REVALIDATION: &str = "kovert_page_revalidation_total";
const METRIC_REVALIDATION_FAILED: &str = "kovert_page_revalidation_failed_total";

#[derive(Debug, Error)]
#[error("page revalidation failed for `{path}`: {message}")]
pub struct RevalidateError {
    pub path: String,
    pub message: String,
}

impl RevalidateError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Signals an external page-rendering cache that output for a path must be
/// regenerated. Implemented in production by the response cache; tests use
/// a recording fake.
#[async_trait]
pub trait PageRevalidator: Send + Sync {
    async fn revalidate(&self, path: &str) -> Result<(), RevalidateError>;
}

/// Outcome of an invalidate-and-propagate round.
#[derive(Debug, Clone)]
pub struct RevalidationReport {
    pub success: bool,
    pub message: String,
    pub revalidated: Vec<String>,
    pub failed: Vec<String>,
}

/// Outcome of a forced refresh, with snapshot counts for observability.
#[derive(Debug, Clone)]
pub struct RefreshSummary {
    pub item_count: usize,
    pub category_count: usize,
    pub revalidated: Vec<String>,
    pub failed: Vec<String>,
}

/// Wraps the catalog cache with page-cache revalidation fan-out.
#[derive(Clone)]
pub struct CacheRevalidator {
    cache: CatalogCache,
    pages: Arc<dyn PageRevalidator>,
    paths: Vec<String>,
}

impl CacheRevalidator {
    pub fn new(cache: CatalogCache, pages: Arc<dyn PageRevalidator>, config: &CacheConfig) -> Self {
        Self {
            cache,
            pages,
            paths: config.revalidate_paths.clone(),
        }
    }

    /// Drop the catalog snapshot and signal every configured page path.
    ///
    /// The next catalog read reloads. Per-path failures are logged and
    /// reported but do not fail the round; the in-process cache is already
    /// correctly invalidated by the time fan-out begins.
    pub async fn invalidate_and_propagate(&self) -> RevalidationReport {
        self.cache.invalidate();
        let (revalidated, failed) = self.propagate().await;

        info!(
            revalidated = revalidated.len(),
            failed = failed.len(),
            "catalog cache invalidated"
        );

        RevalidationReport {
            success: true,
            message: format!(
                "catalog cache invalidated, {} of {} pages revalidated",
                revalidated.len(),
                revalidated.len() + failed.len()
            ),
            revalidated,
            failed,
        }
    }

    /// Reload the catalog now, then run the same fan-out.
    ///
    /// Loader failure surfaces as the overall failure; page-path failures
    /// do not.
    pub async fn force_refresh_and_propagate(&self) -> Result<RefreshSummary, CacheError> {
        let snapshot = self.cache.refresh_now().await?;
        let (revalidated, failed) = self.propagate().await;

        info!(
            items = snapshot.item_count(),
            categories = snapshot.category_count(),
            revalidated = revalidated.len(),
            failed = failed.len(),
            "catalog cache refreshed"
        );

        Ok(RefreshSummary {
            item_count: snapshot.item_count(),
            category_count: snapshot.category_count(),
            revalidated,
            failed,
        })
    }

    async fn propagate(&self) -> (Vec<String>, Vec<String>) {
        let mut revalidated = Vec::new();
        let mut failed = Vec::new();

        for path in &self.paths {
            counter!(METRIC_REVALIDATION).increment(1);
            match self.pages.revalidate(path).await {
                Ok(()) => {
                    debug!(path, "page revalidated");
                    revalidated.push(path.clone());
                }
                Err(err) => {
                    warn!(path, error = %err, "page revalidation failed");
                    counter!(METRIC_REVALIDATION_FAILED).increment(1);
                    failed.push(path.clone());
                }
            }
        }

        (revalidated, failed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::application::loader::{CatalogLoader, LoaderError};
    use crate::domain::catalog::CatalogSnapshot;

    use super::*;

    struct FixedLoader {
        fail: bool,
    }

    #[async_trait]
    impl CatalogLoader for FixedLoader {
        async fn load_catalog(&self) -> Result<CatalogSnapshot, LoaderError> {
            if self.fail {
                return Err(LoaderError::upstream("fixed loader failure"));
            }
            Ok(CatalogSnapshot::from_items(Vec::new()))
        }
    }

    #[derive(Default)]
    struct RecordingRevalidator {
        seen: Mutex<Vec<String>>,
        fail_path: Option<String>,
    }

    impl RecordingRevalidator {
        fn failing_on(path: &str) -> Self {
            Self {
                fail_path: Some(path.to_string()),
                ..Self::default()
            }
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().expect("seen lock").clone()
        }
    }

    #[async_trait]
    impl PageRevalidator for RecordingRevalidator {
        async fn revalidate(&self, path: &str) -> Result<(), RevalidateError> {
            self.seen.lock().expect("seen lock").push(path.to_string());
            if self.fail_path.as_deref() == Some(path) {
                return Err(RevalidateError::new(path, "simulated failure"));
            }
            Ok(())
        }
    }

    fn revalidator_with(
        loader_fails: bool,
        pages: Arc<RecordingRevalidator>,
        paths: &[&str],
    ) -> CacheRevalidator {
        let cache = CatalogCache::new(
            Arc::new(FixedLoader { fail: loader_fails }),
            Duration::from_secs(300),
        );
        let config = CacheConfig {
            revalidate_paths: paths.iter().map(ToString::to_string).collect(),
            ..Default::default()
        };
        CacheRevalidator::new(cache, pages, &config)
    }

    #[tokio::test]
    async fn invalidation_signals_every_configured_path() {
        let pages = Arc::new(RecordingRevalidator::default());
        let revalidator = revalidator_with(false, pages.clone(), &["/", "/catalog"]);

        let report = revalidator.invalidate_and_propagate().await;

        assert!(report.success);
        assert_eq!(report.revalidated, vec!["/", "/catalog"]);
        assert!(report.failed.is_empty());
        assert_eq!(pages.seen(), vec!["/", "/catalog"]);
    }

    #[tokio::test]
    async fn failing_path_does_not_block_later_paths() {
        let pages = Arc::new(RecordingRevalidator::failing_on("/b"));
        let revalidator = revalidator_with(false, pages.clone(), &["/a", "/b", "/c"]);

        let report = revalidator.invalidate_and_propagate().await;

        assert!(report.success);
        assert_eq!(report.revalidated, vec!["/a", "/c"]);
        assert_eq!(report.failed, vec!["/b"]);
        // /c was still attempted after /b failed.
        assert_eq!(pages.seen(), vec!["/a", "/b", "/c"]);
    }

    #[tokio::test]
    async fn forced_refresh_reports_snapshot_counts() {
        let pages = Arc::new(RecordingRevalidator::default());
        let revalidator = revalidator_with(false, pages, &["/catalog"]);

        let summary = revalidator
            .force_refresh_and_propagate()
            .await
            .expect("refresh");

        assert_eq!(summary.item_count, 0);
        assert_eq!(summary.category_count, 0);
        assert_eq!(summary.revalidated, vec!["/catalog"]);
    }

    #[tokio::test]
    async fn loader_failure_fails_the_forced_refresh() {
        let pages = Arc::new(RecordingRevalidator::default());
        let revalidator = revalidator_with(true, pages.clone(), &["/catalog"]);

        let result = revalidator.force_refresh_and_propagate().await;

        assert!(result.is_err());
        // No fan-out after a failed reload; the page cache still matches the
        // (unchanged) catalog state.
        assert!(pages.seen().is_empty());
    }
}
