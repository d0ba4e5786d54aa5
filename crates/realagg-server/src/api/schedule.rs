//! Live-scheduler management endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduler::{LiveScheduler, ScheduleError, ScheduleJobView};

use super::{ApiError, AppState};

fn require_scheduler(state: &AppState) -> Result<Arc<LiveScheduler>, ApiError> {
    state
        .scheduler
        .clone()
        .ok_or_else(|| ApiError::bad_request("scheduler is disabled by configuration"))
}

fn map_schedule_error(error: ScheduleError) -> ApiError {
    match error {
        ScheduleError::UnknownJob(name) => {
            ApiError::not_found(format!("unknown schedule job '{name}'"))
        }
        ScheduleError::InvalidCron { cron, reason } => {
            ApiError::bad_request(format!("invalid cron '{cron}': {reason}"))
        }
        ScheduleError::Scheduler(e) => {
            tracing::error!(error = %e, "scheduler operation failed");
            ApiError::internal("scheduler operation failed")
        }
    }
}

pub(super) async fn list_jobs(
    State(state): State<AppState>,
) -> Result<Json<Vec<ScheduleJobView>>, ApiError> {
    let scheduler = require_scheduler(&state)?;
    Ok(Json(scheduler.list().await))
}

#[derive(Debug, Serialize)]
pub(super) struct OkResponse {
    status: &'static str,
}

pub(super) async fn pause(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    let scheduler = require_scheduler(&state)?;
    scheduler.pause(&id).await.map_err(map_schedule_error)?;
    Ok(Json(OkResponse { status: "paused" }))
}

pub(super) async fn resume(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    let scheduler = require_scheduler(&state)?;
    scheduler.resume(&id).await.map_err(map_schedule_error)?;
    Ok(Json(OkResponse { status: "resumed" }))
}

#[derive(Debug, Deserialize)]
pub(super) struct CronQuery {
    cron: String,
}

pub(super) async fn reschedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CronQuery>,
) -> Result<Json<OkResponse>, ApiError> {
    let scheduler = require_scheduler(&state)?;
    scheduler
        .reschedule(&id, &query.cron)
        .await
        .map_err(map_schedule_error)?;
    Ok(Json(OkResponse {
        status: "rescheduled",
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct TriggerNowQuery {
    #[serde(default)]
    full_rescan: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct TriggerNowResponse {
    job_id: Uuid,
    status: &'static str,
    message: &'static str,
}

/// Fire the scheduled scrape immediately through the same enqueue path the
/// scrape endpoint uses (all active sources).
pub(super) async fn trigger_now(
    State(state): State<AppState>,
    Query(query): Query<TriggerNowQuery>,
) -> Result<Json<TriggerNowResponse>, ApiError> {
    require_scheduler(&state)?;
    let job_id = super::scrape::enqueue_job(&state, None, query.full_rescan).await?;
    Ok(Json(TriggerNowResponse {
        job_id,
        status: "Queued",
        message: "Scheduled scrape fired manually.",
    }))
}
