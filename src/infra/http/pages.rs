//! Rendered-page response cache.
//!
//! Caches successful GET responses for public catalog pages and serves them
//! until a catalog write revalidates the path. This is the page-cache
//! collaborator the invalidation coordinator fans out to.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use lru::LruCache;
use metrics::counter;
use tracing::debug;

use crate::cache::lock::rw_write;
use crate::cache::{CacheConfig, PageRevalidator, RevalidateError};

const SOURCE: &str = "infra::http::pages";

const METRIC_PAGE_HIT: &str = "kovert_page_cache_hit_total";
const METRIC_PAGE_MISS: &str = "kovert_page_cache_miss_total";

/// A buffered response ready to be replayed.
#[derive(Clone)]
pub struct CachedPage {
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Bytes,
}

impl CachedPage {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.clear();
        for (name, value) in self.headers {
            headers.append(name, value);
        }

        response
    }
}

/// Path-keyed LRU of rendered page responses.
pub struct PageCache {
    enabled: bool,
    responses: RwLock<LruCache<String, CachedPage>>,
}

impl PageCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            responses: RwLock::new(LruCache::new(config.page_response_limit_non_zero())),
        }
    }

    pub fn get(&self, path: &str) -> Option<Response> {
        rw_write(&self.responses, SOURCE, "get")
            .get(path)
            .cloned()
            .map(CachedPage::into_response)
    }

    pub fn store(&self, path: String, page: CachedPage) {
        rw_write(&self.responses, SOURCE, "store").put(path, page);
    }

    pub fn invalidate(&self, path: &str) {
        rw_write(&self.responses, SOURCE, "invalidate").pop(path);
    }

    pub fn invalidate_all(&self) {
        rw_write(&self.responses, SOURCE, "invalidate_all").clear();
    }

    pub fn len(&self) -> usize {
        rw_write(&self.responses, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Production revalidation signal: drop the cached response for a path so
/// the next request re-renders from the (fresh) catalog snapshot.
pub struct PageCacheRevalidator {
    pages: Arc<PageCache>,
}

impl PageCacheRevalidator {
    pub fn new(pages: Arc<PageCache>) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl PageRevalidator for PageCacheRevalidator {
    async fn revalidate(&self, path: &str) -> Result<(), RevalidateError> {
        self.pages.invalidate(path);
        debug!(path, "cached page dropped");
        Ok(())
    }
}

/// Middleware caching successful GET responses per path.
pub async fn page_cache_layer(
    State(pages): State<Arc<PageCache>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !pages.enabled || request.method() != Method::GET {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();

    if let Some(cached) = pages.get(&path) {
        counter!(METRIC_PAGE_HIT).increment(1);
        debug!(path, outcome = "hit", "serving cached page");
        return cached;
    }

    counter!(METRIC_PAGE_MISS).increment(1);
    let response = next.run(request).await;

    if !should_store(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    match BodyExt::collect(body).await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            let cached = CachedPage {
                status: parts.status,
                headers: parts
                    .headers
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect(),
                body: bytes.clone(),
            };
            pages.store(path, cached);
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(_) => Response::from_parts(parts, Body::empty()),
    }
}

fn should_store(response: &Response) -> bool {
    if response.status() != StatusCode::OK {
        return false;
    }

    if response.headers().contains_key(header::SET_COOKIE) {
        return false;
    }

    true
}
