//! Catalog cache coordinator.
//!
//! One shared snapshot, one TTL clock, one in-flight refresh. Concurrent
//! readers that find the entry stale fan in to the same refresh instead of
//! each hitting the loader ("single-flight").
//!
//! Lock discipline: `state` is a `std::sync::Mutex` held only across
//! suspension-free sections, never across an `.await`. The refresh itself
//! runs on a spawned task so it completes even if every waiter is cancelled.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use metrics::counter;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::application::loader::{CatalogLoader, LoaderError};
use crate::domain::catalog::CatalogSnapshot;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::coordinator";

const METRIC_CATALOG_HIT: &str = "kovert_catalog_cache_hit_total";
const METRIC_CATALOG_MISS: &str = "kovert_catalog_cache_miss_total";
const METRIC_CATALOG_REFRESH: &str = "kovert_catalog_refresh_total";
const METRIC_CATALOG_STALE_SERVED: &str = "kovert_catalog_stale_served_total";

/// Failure of a catalog refresh, shared between all fanned-in waiters.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("catalog load failed: {0}")]
    Loader(#[from] Arc<LoaderError>),
    #[error("catalog refresh task failed: {0}")]
    Refresh(String),
}

struct CacheEntry {
    snapshot: Arc<CatalogSnapshot>,
    refreshed_at: Instant,
}

type InFlight = Shared<BoxFuture<'static, Result<Arc<CatalogSnapshot>, CacheError>>>;

#[derive(Default)]
struct CacheState {
    entry: Option<CacheEntry>,
    in_flight: Option<InFlight>,
}

struct CacheInner {
    loader: Arc<dyn CatalogLoader>,
    ttl: Duration,
    state: Mutex<CacheState>,
}

/// Process-wide catalog cache with TTL expiry and single-flight refresh.
///
/// Cheap to clone; clones share the same entry and in-flight slot.
#[derive(Clone)]
pub struct CatalogCache {
    inner: Arc<CacheInner>,
}

/// Clears the in-flight slot when the refresh task finishes.
///
/// Runs on success, loader error, and loader panic alike; without it a
/// single failed refresh would leave every future reader fanned in to a
/// flight that never lands.
struct InFlightGuard {
    inner: Arc<CacheInner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        mutex_lock(&self.inner.state, SOURCE, "refresh.clear_in_flight").in_flight = None;
    }
}

impl CatalogCache {
    pub fn new(loader: Arc<dyn CatalogLoader>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                loader,
                ttl,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Return the current snapshot, refreshing it first if absent, expired,
    /// or `force_refresh` is set.
    ///
    /// Readers with a fresh entry never suspend. Readers that trigger or
    /// join a refresh all resolve to the same snapshot. A failed refresh
    /// degrades to the previous snapshot for non-forced readers; forced
    /// readers and cold-start readers see the error.
    pub async fn get(&self, force_refresh: bool) -> Result<Arc<CatalogSnapshot>, CacheError> {
        let (flight, previous) = {
            let mut state = mutex_lock(&self.inner.state, SOURCE, "get");

            if !force_refresh
                && let Some(entry) = &state.entry
                && entry.refreshed_at.elapsed() <= self.inner.ttl
            {
                counter!(METRIC_CATALOG_HIT).increment(1);
                return Ok(Arc::clone(&entry.snapshot));
            }

            counter!(METRIC_CATALOG_MISS).increment(1);
            let previous = state.entry.as_ref().map(|entry| Arc::clone(&entry.snapshot));
            let flight = match &state.in_flight {
                Some(flight) => {
                    debug!(outcome = "fan_in", "joining in-flight catalog refresh");
                    flight.clone()
                }
                None => {
                    let flight = self.spawn_refresh();
                    state.in_flight = Some(flight.clone());
                    flight
                }
            };
            (flight, previous)
        };

        match flight.await {
            Ok(snapshot) => Ok(snapshot),
            Err(err) if force_refresh => Err(err),
            Err(err) => match previous {
                Some(snapshot) => {
                    warn!(error = %err, "catalog refresh failed, serving previous snapshot");
                    counter!(METRIC_CATALOG_STALE_SERVED).increment(1);
                    Ok(snapshot)
                }
                None => Err(err),
            },
        }
    }

    /// Drop the cached entry. The next `get` performs a fresh load.
    ///
    /// Idempotent. Never touches an active refresh: a flight started before
    /// the invalidation still lands and stores its snapshot.
    pub fn invalidate(&self) {
        let mut state = mutex_lock(&self.inner.state, SOURCE, "invalidate");
        if state.entry.take().is_some() {
            debug!("catalog cache entry dropped");
        }
    }

    /// Reload unconditionally and return the fresh snapshot.
    ///
    /// The entry is replaced, never pre-cleared, so concurrent readers see
    /// either the old snapshot or fan in to this refresh; never "no data".
    pub async fn refresh_now(&self) -> Result<Arc<CatalogSnapshot>, CacheError> {
        self.get(true).await
    }

    /// Age of the cached entry, if one exists. For observability surfaces.
    pub fn entry_age(&self) -> Option<Duration> {
        mutex_lock(&self.inner.state, SOURCE, "entry_age")
            .entry
            .as_ref()
            .map(|entry| entry.refreshed_at.elapsed())
    }

    pub fn is_populated(&self) -> bool {
        mutex_lock(&self.inner.state, SOURCE, "is_populated")
            .entry
            .is_some()
    }

    fn spawn_refresh(&self) -> InFlight {
        counter!(METRIC_CATALOG_REFRESH).increment(1);
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _clear = InFlightGuard {
                inner: Arc::clone(&inner),
            };
            let snapshot = inner
                .loader
                .load_catalog()
                .await
                .map(Arc::new)
                .map_err(|err| CacheError::from(Arc::new(err)))?;
            let mut state = mutex_lock(&inner.state, SOURCE, "refresh.store");
            state.entry = Some(CacheEntry {
                snapshot: Arc::clone(&snapshot),
                refreshed_at: Instant::now(),
            });
            drop(state);
            debug!(
                items = snapshot.item_count(),
                categories = snapshot.category_count(),
                "catalog snapshot stored"
            );
            Ok(snapshot)
        });

        task.map(|joined| match joined {
            Ok(result) => result,
            Err(err) => Err(CacheError::Refresh(err.to_string())),
        })
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use crate::domain::catalog::SkinRecord;

    use super::*;

    fn snapshot_with(count: usize) -> CatalogSnapshot {
        let items = (0..count)
            .map(|i| SkinRecord {
                id: Uuid::new_v4(),
                market_hash_name: format!("AK-47 | Test {i} (Field-Tested)"),
                display_name: format!("Test {i}"),
                category: "Rifle".to_string(),
                subcategory: "AK-47".to_string(),
                price_cents: 100 + i as i64,
                image_url: "https://cdn.example/skin.png".to_string(),
                visible: true,
                updated_at: OffsetDateTime::now_utc(),
            })
            .collect();
        CatalogSnapshot::from_items(items)
    }

    struct StubLoader {
        calls: AtomicUsize,
        fail: AtomicBool,
        delay: Duration,
    }

    impl StubLoader {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CatalogLoader for StubLoader {
        async fn load_catalog(&self) -> Result<CatalogSnapshot, LoaderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(LoaderError::upstream("stub loader failure"));
            }
            Ok(snapshot_with(call + 1))
        }
    }

    fn cache_with(loader: Arc<StubLoader>, ttl: Duration) -> CatalogCache {
        CatalogCache::new(loader, ttl)
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entry_served_without_loader_call() {
        let loader = Arc::new(StubLoader::new());
        let cache = cache_with(loader.clone(), Duration::from_secs(300));

        let first = cache.get(false).await.expect("first load");
        let second = cache.get(false).await.expect("cached read");

        assert_eq!(loader.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_triggers_second_load() {
        let loader = Arc::new(StubLoader::new());
        let cache = cache_with(loader.clone(), Duration::from_secs(300));

        cache.get(false).await.expect("first load");
        tokio::time::advance(Duration::from_secs(301)).await;
        cache.get(false).await.expect("reload");

        assert_eq!(loader.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_readers_share_one_flight() {
        let loader = Arc::new(StubLoader::with_delay(Duration::from_millis(500)));
        let cache = cache_with(loader.clone(), Duration::from_secs(300));

        let reads = futures::future::join_all((0..16).map(|_| {
            let cache = cache.clone();
            async move { cache.get(false).await }
        }))
        .await;

        assert_eq!(loader.calls(), 1);
        let first = reads[0].as_ref().expect("shared snapshot");
        for read in &reads {
            assert!(Arc::ptr_eq(first, read.as_ref().expect("shared snapshot")));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn force_refresh_bypasses_fresh_entry() {
        let loader = Arc::new(StubLoader::new());
        let cache = cache_with(loader.clone(), Duration::from_secs(300));

        cache.get(false).await.expect("first load");
        let forced = cache.get(true).await.expect("forced reload");

        assert_eq!(loader.calls(), 2);
        assert_eq!(forced.item_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_serves_previous_snapshot() {
        let loader = Arc::new(StubLoader::new());
        let cache = cache_with(loader.clone(), Duration::from_secs(300));

        let first = cache.get(false).await.expect("first load");
        tokio::time::advance(Duration::from_secs(301)).await;
        loader.set_failing(true);

        let degraded = cache.get(false).await.expect("stale fallback");
        assert!(Arc::ptr_eq(&first, &degraded));
        assert_eq!(loader.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cold_start_failure_propagates_and_stores_nothing() {
        let loader = Arc::new(StubLoader::new());
        loader.set_failing(true);
        let cache = cache_with(loader.clone(), Duration::from_secs(300));

        let result = cache.get(false).await;
        assert!(matches!(result, Err(CacheError::Loader(_))));
        assert!(!cache.is_populated());
    }

    #[tokio::test(start_paused = true)]
    async fn forced_refresh_failure_propagates_despite_previous_snapshot() {
        let loader = Arc::new(StubLoader::new());
        let cache = cache_with(loader.clone(), Duration::from_secs(300));

        cache.get(false).await.expect("first load");
        loader.set_failing(true);

        let result = cache.refresh_now().await;
        assert!(matches!(result, Err(CacheError::Loader(_))));
        // The last good snapshot is still there for plain readers.
        assert!(cache.is_populated());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_clears_in_flight_slot() {
        let loader = Arc::new(StubLoader::new());
        let cache = cache_with(loader.clone(), Duration::from_secs(300));
        loader.set_failing(true);

        let _ = cache.get(false).await;
        loader.set_failing(false);

        // A wedged in-flight slot would fan this read into the dead flight.
        cache.get(false).await.expect("recovered load");
        assert_eq!(loader.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_then_get_reloads_within_ttl() {
        let loader = Arc::new(StubLoader::new());
        let cache = cache_with(loader.clone(), Duration::from_secs(300));

        cache.get(false).await.expect("first load");
        cache.invalidate();
        cache.get(false).await.expect("reload");

        assert_eq!(loader.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_is_idempotent() {
        let loader = Arc::new(StubLoader::new());
        let cache = cache_with(loader.clone(), Duration::from_secs(300));

        cache.invalidate();
        cache.invalidate();
        assert!(!cache.is_populated());

        cache.get(false).await.expect("load after invalidation");
        cache.invalidate();
        cache.invalidate();
        assert!(!cache.is_populated());
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_does_not_cancel_inflight_refresh() {
        let loader = Arc::new(StubLoader::with_delay(Duration::from_millis(500)));
        let cache = cache_with(loader.clone(), Duration::from_secs(300));

        let refreshing = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(false).await })
        };
        tokio::task::yield_now().await;
        cache.invalidate();

        let snapshot = refreshing
            .await
            .expect("task")
            .expect("refresh survives invalidation");
        assert_eq!(snapshot.item_count(), 1);
        // The completed refresh stored its snapshot, superseding the
        // invalidation that raced it.
        assert!(cache.is_populated());
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_now_leaves_no_absent_window() {
        let loader = Arc::new(StubLoader::with_delay(Duration::from_millis(500)));
        let cache = cache_with(loader.clone(), Duration::from_secs(300));

        cache.get(false).await.expect("first load");

        let forced = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.refresh_now().await })
        };
        tokio::task::yield_now().await;
        // Reader during the forced refresh: old snapshot, no suspension on
        // the fresh entry, never "no data".
        assert!(cache.is_populated());

        forced.await.expect("task").expect("forced refresh");
        assert_eq!(loader.calls(), 2);
    }
}
