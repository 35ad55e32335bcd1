//! Read-only token-usage statistics API

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use switchboard_store::{UsagePeriod, UsageStore};

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

const fn default_limit() -> usize {
    25
}

/// Build the usage-stats router
pub fn stats_router(store: UsageStore) -> Router {
    Router::new()
        .route("/v1/stats/usage-records", routing::get(usage_records))
        .route("/v1/stats/usage/{period}", routing::get(aggregated_usage))
        .with_state(store)
}

/// Handle `GET /v1/stats/usage-records`
async fn usage_records(State(store): State<UsageStore>, Query(page): Query<Pagination>) -> Response {
    let records = match store.latest(page.limit, page.offset).await {
        Ok(records) => records,
        Err(e) => return storage_error(&e),
    };
    let total_records = match store.count().await {
        Ok(count) => count,
        Err(e) => return storage_error(&e),
    };

    Json(json!({"records": records, "total_records": total_records})).into_response()
}

/// Handle `GET /v1/stats/usage/{period}`
async fn aggregated_usage(State(store): State<UsageStore>, Path(period): Path<String>) -> Response {
    let Some(period) = UsagePeriod::parse(&period) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Invalid period. Must be 'hour', 'day', 'week', or 'month'."})),
        )
            .into_response();
    };

    match store.aggregated(period).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => storage_error(&e),
    }
}

fn storage_error(error: &anyhow::Error) -> Response {
    tracing::error!(error = %error, "usage statistics query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"detail": "Could not retrieve usage statistics"})),
    )
        .into_response()
}
