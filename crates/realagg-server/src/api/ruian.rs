//! Cadastral lookup endpoints: bulk sweep trigger, single-address probe,
//! coverage stats.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{map_db_error, normalize_batch_size, ApiError, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct BulkQuery {
    batch_size: Option<i64>,
    #[serde(default)]
    overwrite_not_found: bool,
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
    let overwrite_not_found = query.overwrite_not_found;
    let pool = state.pool.clone();
    let client = state.ruian.clone();

    tokio::spawn(async move {
        match realagg_enrich::bulk_ruian(&pool, &client, batch_size, overwrite_not_found).await {
            Ok(stats) => tracing::info!(
                total = stats.total,
                found = stats.found,
                "bulk ruian task finished"
            ),
            Err(e) => tracing::error!(error = %e, "bulk ruian task failed"),
        }
    });

    Json(AcceptedResponse {
        status: "accepted",
        message: format!(
            "bulk cadastre lookup started (batch_size={batch_size}, overwrite_not_found={overwrite_not_found})"
        ),
    })
}

#[derive(Debug, Deserialize)]
pub(super) struct SingleQuery {
    address: String,
    municipality: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct SingleResponse {
    address_used: String,
    fetch_status: String,
    ruian_kod: Option<i64>,
    cadastre_url: String,
}

pub(super) async fn single(
    State(state): State<AppState>,
    Query(query): Query<SingleQuery>,
) -> Result<Json<SingleResponse>, ApiError> {
    if query.address.trim().is_empty() {
        return Err(ApiError::bad_request("address must not be empty"));
    }

    let lookup = state
        .ruian
        .lookup_address(&query.address, query.municipality.as_deref())
        .await;
    tokio::time::sleep(state.ruian.rate_limit()).await;

    Ok(Json(SingleResponse {
        address_used: lookup.address_used,
        fetch_status: lookup.fetch_status.to_string(),
        ruian_kod: lookup.ruian_kod,
        cadastre_url: lookup.cadastre_url,
    }))
}

#[derive(Debug, Serialize)]
pub(super) struct StatsResponse {
    by_status: BTreeMap<String, i64>,
    missing: i64,
    last_fetched_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub(super) async fn stats(
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, ApiError> {
    let coverage = realagg_db::cadastre_stats(&state.pool)
        .await
        .map_err(|e| map_db_error(&e))?;

    Ok(Json(StatsResponse {
        by_status: coverage.by_status.into_iter().collect(),
        missing: coverage.missing,
        last_fetched_at: coverage.last_fetched_at,
    }))
}
