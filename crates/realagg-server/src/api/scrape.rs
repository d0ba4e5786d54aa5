//! Scrape job endpoints: enqueue, status, history.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use realagg_db::ScrapeJobRow;
use realagg_scraper::Source;

use super::{map_db_error, normalize_limit, ApiError, AppState};
use crate::runner::{run_scrape_job, ScrapeRequest};

#[derive(Debug, Deserialize)]
pub(super) struct TriggerBody {
    #[serde(default)]
    source_codes: Option<Vec<String>>,
    #[serde(default)]
    full_rescan: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct TriggerResponse {
    job_id: Uuid,
    status: &'static str,
    message: &'static str,
}

#[derive(Debug, Serialize)]
pub(super) struct JobView {
    job_id: Uuid,
    source_codes: Option<Vec<String>>,
    full_rescan: bool,
    status: String,
    progress: i32,
    listings_found: i32,
    listings_new: i32,
    listings_updated: i32,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl From<ScrapeJobRow> for JobView {
    fn from(row: ScrapeJobRow) -> Self {
        Self {
            job_id: row.id,
            source_codes: row.source_codes,
            full_rescan: row.full_rescan,
            status: row.status,
            progress: row.progress,
            listings_found: row.listings_found,
            listings_new: row.listings_new,
            listings_updated: row.listings_updated,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}

/// Create a Queued job row and dispatch the runner in the background.
/// Shared with the scheduler's trigger-now endpoint.
pub(super) async fn enqueue_job(
    state: &AppState,
    source_codes: Option<Vec<String>>,
    full_rescan: bool,
) -> Result<Uuid, ApiError> {
    if let Some(codes) = &source_codes {
        for code in codes {
            if Source::from_code(code).is_none() {
                return Err(ApiError::bad_request(format!("unknown source code: {code}")));
            }
        }
    }

    let job = realagg_db::create_job(&state.pool, source_codes.as_deref(), full_rescan)
        .await
        .map_err(|e| map_db_error(&e))?;

    let ctx = state.ctx.clone();
    let pool = state.pool.clone();
    let job_id = job.id;
    tokio::spawn(async move {
        run_scrape_job(
            ctx,
            pool,
            job_id,
            ScrapeRequest {
                source_codes,
                full_rescan,
            },
        )
        .await;
    });

    Ok(job_id)
}

pub(super) async fn trigger_scrape(
    State(state): State<AppState>,
    Json(body): Json<TriggerBody>,
) -> Result<Json<TriggerResponse>, ApiError> {
    let job_id = enqueue_job(&state, body.source_codes, body.full_rescan).await?;
    Ok(Json(TriggerResponse {
        job_id,
        status: "Queued",
        message: "Scraping job enqueued.",
    }))
}

pub(super) async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let id: Uuid = id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("malformed job id: {id}")))?;

    let row = realagg_db::get_job(&state.pool, id)
        .await
        .map_err(|e| map_db_error(&e))?;
    Ok(Json(row.into()))
}

#[derive(Debug, Deserialize)]
pub(super) struct ListQuery {
    limit: Option<i64>,
    status: Option<String>,
}

pub(super) async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<JobView>>, ApiError> {
    let rows = realagg_db::list_jobs(
        &state.pool,
        normalize_limit(query.limit),
        query.status.as_deref(),
    )
    .await
    .map_err(|e| map_db_error(&e))?;

    Ok(Json(rows.into_iter().map(JobView::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_view_carries_row_fields() {
        let row = ScrapeJobRow {
            id: Uuid::new_v4(),
            source_codes: Some(vec!["REMAX".to_string()]),
            full_rescan: false,
            status: "Succeeded".to_string(),
            progress: 100,
            listings_found: 8,
            listings_new: 2,
            listings_updated: 6,
            error_message: None,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            finished_at: Some(Utc::now()),
        };
        let view = JobView::from(row);
        assert_eq!(view.status, "Succeeded");
        assert_eq!(view.listings_found, 8);

        let json = serde_json::to_string(&view).expect("serializes");
        assert!(json.contains("\"listings_new\":2"));
    }

    #[test]
    fn trigger_body_defaults() {
        let body: TriggerBody = serde_json::from_str("{}").expect("parses");
        assert!(body.source_codes.is_none());
        assert!(!body.full_rescan);

        let body: TriggerBody =
            serde_json::from_str(r#"{"source_codes": ["REMAX"], "full_rescan": true}"#)
                .expect("parses");
        assert_eq!(body.source_codes.as_deref(), Some(&["REMAX".to_string()][..]));
        assert!(body.full_rescan);
    }
}
