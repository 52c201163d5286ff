//! Postgres-backed catalog loader.
//!
//! The production Data Loader: reads the `skins` table and hands the cache a
//! fully-formed snapshot. Queries are runtime-checked (`query_as` without
//! offline metadata) so the crate builds without a live database.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::application::loader::{CatalogLoader, LoaderError};
use crate::domain::catalog::{CatalogSnapshot, SkinRecord};

use super::error::InfraError;

#[derive(Debug, FromRow)]
struct SkinRow {
    id: Uuid,
    market_hash_name: String,
    display_name: String,
    category: String,
    subcategory: String,
    price_cents: i64,
    image_url: String,
    visible: bool,
    updated_at: OffsetDateTime,
}

impl From<SkinRow> for SkinRecord {
    fn from(row: SkinRow) -> Self {
        Self {
            id: row.id,
            market_hash_name: row.market_hash_name,
            display_name: row.display_name,
            category: row.category,
            subcategory: row.subcategory,
            price_cents: row.price_cents,
            image_url: row.image_url,
            visible: row.visible,
            updated_at: row.updated_at,
        }
    }
}

pub struct PostgresCatalogLoader {
    pool: PgPool,
}

impl PostgresCatalogLoader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, InfraError> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|err| InfraError::database(err.to_string()))
    }

    pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
    }
}

#[async_trait]
impl CatalogLoader for PostgresCatalogLoader {
    async fn load_catalog(&self) -> Result<CatalogSnapshot, LoaderError> {
        let rows: Vec<SkinRow> = sqlx::query_as(
            "SELECT id, market_hash_name, display_name, category, subcategory, \
                    price_cents, image_url, visible, updated_at \
             FROM skins \
             ORDER BY category, subcategory, market_hash_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(LoaderError::upstream)?;

        debug!(rows = rows.len(), "catalog rows fetched");

        Ok(CatalogSnapshot::from_items(
            rows.into_iter().map(SkinRecord::from).collect(),
        ))
    }
}
