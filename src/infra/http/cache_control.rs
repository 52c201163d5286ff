//! Administrative cache-control endpoint.
//!
//! `POST /cache-control {action}` drops or reloads the catalog snapshot and
//! fans revalidation out to the page cache. The endpoint exists to bypass
//! caching, so every response (including errors and the GET documentation
//! payload) carries the full no-store header family.

use axum::{
    Json,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

use super::HttpState;

#[derive(Debug, Deserialize)]
pub struct CacheControlRequest {
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct CacheControlResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub timestamp: String,
}

impl CacheControlResponse {
    fn new(success: bool, message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            success,
            message: message.into(),
            data,
            timestamp: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
        }
    }
}

/// `POST /cache-control`.
pub async fn post_cache_control(
    State(state): State<HttpState>,
    Json(request): Json<CacheControlRequest>,
) -> Response {
    match request.action.as_str() {
        "invalidate" => {
            let report = state.revalidator.invalidate_and_propagate().await;
            let body = CacheControlResponse::new(
                report.success,
                report.message,
                Some(json!({
                    "revalidated": report.revalidated,
                    "failed": report.failed,
                })),
            );
            no_store(StatusCode::OK, body)
        }
        "refresh" => match state.revalidator.force_refresh_and_propagate().await {
            Ok(summary) => {
                let body = CacheControlResponse::new(
                    true,
                    "catalog cache refreshed",
                    Some(json!({
                        "item_count": summary.item_count,
                        "taxonomy_count": summary.category_count,
                        "revalidated": summary.revalidated,
                        "failed": summary.failed,
                    })),
                );
                no_store(StatusCode::OK, body)
            }
            Err(err) => {
                error!(error = %err, "forced catalog refresh failed");
                let body = CacheControlResponse::new(
                    false,
                    format!("catalog refresh failed: {err}"),
                    None,
                );
                no_store(StatusCode::INTERNAL_SERVER_ERROR, body)
            }
        },
        other => {
            let body = CacheControlResponse::new(
                false,
                format!("unrecognized action `{other}`, expected `invalidate` or `refresh`"),
                None,
            );
            no_store(StatusCode::BAD_REQUEST, body)
        }
    }
}

/// `GET /cache-control` — documentation payload for operators.
pub async fn get_cache_control(State(state): State<HttpState>) -> Response {
    let body = CacheControlResponse::new(
        true,
        "POST {\"action\": \"invalidate\" | \"refresh\"} to this endpoint",
        Some(json!({
            "actions": {
                "invalidate": "drop the catalog snapshot; the next read reloads",
                "refresh": "reload the catalog now and report snapshot counts",
            },
            "cache_populated": state.catalog.is_populated(),
            "entry_age_seconds": state.catalog.entry_age().map(|age| age.as_secs()),
            "cached_pages": state.pages.len(),
        })),
    );
    no_store(StatusCode::OK, body)
}

fn no_store(status: StatusCode, body: CacheControlResponse) -> Response {
    let mut response = (status, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    response
}
