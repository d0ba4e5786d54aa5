//! Geocoding endpoints: bulk sweep trigger, single-address probe, coverage
//! stats.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{map_db_error, normalize_batch_size, ApiError, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct BulkQuery {
    batch_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct AcceptedResponse {
    status: &'static str,
    message: String,
}

pub(super) async fn bulk(
    State(state): State<AppState>,
    Query(query): Query<BulkQuery>,
) -> Json<AcceptedResponse> {
    let batch_size = normalize_batch_size(query.batch_size);
    let pool = state.pool.clone();
    let client = state.geocode.clone();

    tokio::spawn(async move {
        match realagg_enrich::bulk_geocode(&pool, &client, batch_size).await {
            Ok(resolved) => tracing::info!(resolved, "bulk geocoding task finished"),
            Err(e) => tracing::error!(error = %e, "bulk geocoding task failed"),
        }
    });

    Json(AcceptedResponse {
        status: "accepted",
        message: format!("bulk geocoding started (batch_size={batch_size})"),
    })
}

#[derive(Debug, Deserialize)]
pub(super) struct SingleQuery {
    address: String,
}

#[derive(Debug, Serialize)]
pub(super) struct SingleResponse {
    address: String,
    latitude: f64,
    longitude: f64,
}

pub(super) async fn single(
    State(state): State<AppState>,
    Query(query): Query<SingleQuery>,
) -> Result<Json<SingleResponse>, ApiError> {
    if query.address.trim().is_empty() {
        return Err(ApiError::bad_request("address must not be empty"));
    }

    let result = state.geocode.geocode_address(&query.address).await;
    // The upstream usage policy caps us at 1 req/s; the probe endpoint is
    // serial by design, so the sleep enforces the gap between calls.
    tokio::time::sleep(state.geocode.rate_limit()).await;

    match result {
        Ok(Some((latitude, longitude))) => Ok(Json(SingleResponse {
            address: query.address,
            latitude,
            longitude,
        })),
        Ok(None) => Err(ApiError::not_found(format!(
            "no geocoding match for '{}'",
            query.address
        ))),
        Err(e) => {
            tracing::error!(error = %e, "single geocode failed");
            Err(ApiError::internal("geocoding request failed"))
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct StatsResponse {
    active_total: i64,
    geocoded: i64,
    missing: i64,
    last_geocoded_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub(super) async fn stats(
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, ApiError> {
    let stats = realagg_db::geocode_stats(&state.pool)
        .await
        .map_err(|e| map_db_error(&e))?;
    let last_geocoded_at = realagg_db::last_geocoded_at(&state.pool)
        .await
        .map_err(|e| map_db_error(&e))?;

    Ok(Json(StatsResponse {
        active_total: stats.active_total,
        geocoded: stats.geocoded,
        missing: stats.missing,
        last_geocoded_at,
    }))
}
