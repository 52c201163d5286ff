//! Public catalog read handlers.

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::application::error::AppError;
use crate::domain::catalog::{CatalogSnapshot, Taxonomy};

use super::HttpState;

/// `GET /catalog` — the full snapshot: items plus derived taxonomy.
pub async fn catalog(
    State(state): State<HttpState>,
) -> Result<Json<Arc<CatalogSnapshot>>, AppError> {
    let snapshot = state.catalog.get(false).await?;
    Ok(Json(snapshot))
}

/// `GET /catalog/taxonomy` — category → subcategory map only, for filter menus.
pub async fn taxonomy(State(state): State<HttpState>) -> Result<Json<Taxonomy>, AppError> {
    let snapshot = state.catalog.get(false).await?;
    Ok(Json(snapshot.taxonomy.clone()))
}
