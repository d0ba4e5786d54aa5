//! The HTTP control surface. Thin by design: every long-running operation
//! is dispatched to a background task and acknowledged immediately.

mod geocode;
mod ruian;
mod schedule;
mod scrape;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use realagg_enrich::{GeocodeClient, RuianClient};
use realagg_scraper::ScrapeContext;

use crate::scheduler::LiveScheduler;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub ctx: ScrapeContext,
    pub geocode: GeocodeClient,
    pub ruian: RuianClient,
    pub scheduler: Option<Arc<LiveScheduler>>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: "bad_request",
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: "not_found",
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: "internal_error",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.code {
            "not_found" => StatusCode::NOT_FOUND,
            "bad_request" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_db_error(error: &realagg_db::DbError) -> ApiError {
    match error {
        realagg_db::DbError::NotFound => ApiError::not_found("record not found"),
        other => {
            tracing::error!(error = %other, "database query failed");
            ApiError::internal("database query failed")
        }
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn normalize_batch_size(batch_size: Option<i64>) -> i64 {
    batch_size.unwrap_or(50).clamp(1, 500)
}

#[derive(Debug, Serialize)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

async fn health(State(state): State<AppState>) -> Json<HealthData> {
    let database = match realagg_db::health_check(&state.pool).await {
        Ok(()) => "up",
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            "down"
        }
    };
    Json(HealthData {
        status: "running",
        database,
    })
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/scrape/run", post(scrape::trigger_scrape))
        .route("/v1/scrape/jobs", get(scrape::list_jobs))
        .route("/v1/scrape/jobs/{id}", get(scrape::get_job))
        .route("/v1/geocode/bulk", post(geocode::bulk))
        .route("/v1/geocode/single", get(geocode::single))
        .route("/v1/geocode/stats", get(geocode::stats))
        .route("/v1/ruian/bulk", post(ruian::bulk))
        .route("/v1/ruian/single", get(ruian::single))
        .route("/v1/ruian/stats", get(ruian::stats))
        .route("/v1/schedule/jobs", get(schedule::list_jobs))
        .route("/v1/schedule/jobs/{id}/pause", put(schedule::pause))
        .route("/v1/schedule/jobs/{id}/resume", put(schedule::resume))
        .route("/v1/schedule/jobs/{id}/cron", put(schedule::reschedule))
        .route("/v1/schedule/trigger-now", post(schedule::trigger_now))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_clamped() {
        assert_eq!(normalize_limit(None), 50);
        assert_eq!(normalize_limit(Some(0)), 1);
        assert_eq!(normalize_limit(Some(10_000)), 200);
        assert_eq!(normalize_batch_size(Some(1_000)), 500);
    }

    #[test]
    fn api_error_maps_to_status() {
        let response = ApiError::not_found("x").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = ApiError::bad_request("x").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = ApiError::internal("x").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
