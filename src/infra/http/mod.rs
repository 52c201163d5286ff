mod cache_control;
mod catalog;
mod pages;

pub use pages::{PageCache, PageCacheRevalidator};

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use sqlx::PgPool;

use crate::cache::{CacheRevalidator, CatalogCache};

/// Shared state for the HTTP surface.
#[derive(Clone)]
pub struct HttpState {
    pub catalog: CatalogCache,
    pub revalidator: CacheRevalidator,
    pub pages: Arc<PageCache>,
    /// Present when the production loader is wired; health checks ping it.
    pub db: Option<PgPool>,
}

/// Assemble the service router. Catalog reads flow through the page cache;
/// the cache-control and health endpoints never do.
pub fn build_router(state: HttpState) -> Router {
    let cached = Router::new()
        .route("/catalog", get(catalog::catalog))
        .route("/catalog/taxonomy", get(catalog::taxonomy))
        .layer(middleware::from_fn_with_state(
            state.pages.clone(),
            pages::page_cache_layer,
        ));

    Router::new()
        .merge(cached)
        .route(
            "/cache-control",
            get(cache_control::get_cache_control).post(cache_control::post_cache_control),
        )
        .route("/healthz", get(health))
        .with_state(state)
}

async fn health(State(state): State<HttpState>) -> Response {
    match &state.db {
        Some(pool) => match crate::infra::db::PostgresCatalogLoader::ping(pool).await {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(err) => {
                tracing::warn!(error = %err, "database health check failed");
                StatusCode::SERVICE_UNAVAILABLE.into_response()
            }
        },
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
