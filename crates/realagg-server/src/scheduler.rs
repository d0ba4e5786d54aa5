//! Cron-driven scrape scheduling in the Europe/Prague time zone.
//!
//! Two standing jobs: a daily incremental pass and a weekly full rescan.
//! The live registry supports pause (job removed from the scheduler but
//! kept registered), resume, and cron replacement at runtime.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use realagg_scraper::ScrapeContext;

use crate::runner::{run_scrape_job, ScrapeRequest};

pub const DAILY_JOB: &str = "daily_scrape";
pub const WEEKLY_JOB: &str = "weekly_full_rescan";

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("unknown schedule job '{0}'")]
    UnknownJob(String),
    #[error("invalid cron expression '{cron}': {reason}")]
    InvalidCron { cron: String, reason: String },
    #[error("scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
}

struct ManagedJob {
    cron: String,
    full_rescan: bool,
    /// `None` while paused.
    scheduled_id: Option<Uuid>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ScheduleJobView {
    pub id: String,
    pub cron: String,
    pub full_rescan: bool,
    pub paused: bool,
    pub next_fire_at: Option<DateTime<Utc>>,
}

pub struct LiveScheduler {
    scheduler: JobScheduler,
    ctx: ScrapeContext,
    pool: PgPool,
    jobs: tokio::sync::Mutex<BTreeMap<String, ManagedJob>>,
}

impl LiveScheduler {
    /// Build the scheduler, register both standing jobs, and start it.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError`] when a cron expression does not parse or
    /// the scheduler cannot start.
    pub async fn start(
        ctx: ScrapeContext,
        pool: PgPool,
        settings: realagg_core::SchedulerSettings,
    ) -> Result<Self, ScheduleError> {
        let scheduler = JobScheduler::new().await?;

        let live = Self {
            scheduler,
            ctx,
            pool,
            jobs: tokio::sync::Mutex::new(BTreeMap::new()),
        };

        live.register(DAILY_JOB, &settings.daily_cron, false).await?;
        live.register(WEEKLY_JOB, &settings.weekly_cron, true).await?;

        live.scheduler.start().await?;
        tracing::info!(
            daily = %settings.daily_cron,
            weekly = %settings.weekly_cron,
            "scheduler started (Europe/Prague)"
        );
        Ok(live)
    }

    async fn register(
        &self,
        name: &'static str,
        cron: &str,
        full_rescan: bool,
    ) -> Result<(), ScheduleError> {
        let job = self.build_job(cron, full_rescan)?;
        let scheduled_id = self.scheduler.add(job).await?;

        let mut jobs = self.jobs.lock().await;
        jobs.insert(
            name.to_string(),
            ManagedJob {
                cron: cron.to_string(),
                full_rescan,
                scheduled_id: Some(scheduled_id),
            },
        );
        Ok(())
    }

    fn build_job(&self, cron: &str, full_rescan: bool) -> Result<Job, ScheduleError> {
        let ctx = self.ctx.clone();
        let pool = self.pool.clone();
        let six_field = to_six_field(cron);

        Job::new_async_tz(six_field.as_str(), chrono_tz::Europe::Prague, move |_id, _sched| {
            let ctx = ctx.clone();
            let pool = pool.clone();
            Box::pin(async move {
                fire_scheduled_scrape(ctx, pool, full_rescan).await;
            })
        })
        .map_err(|e| ScheduleError::InvalidCron {
            cron: cron.to_string(),
            reason: e.to_string(),
        })
    }

    /// All registered jobs with their next fire times.
    pub async fn list(&self) -> Vec<ScheduleJobView> {
        let jobs = self.jobs.lock().await;
        let mut views = Vec::with_capacity(jobs.len());
        for (name, managed) in jobs.iter() {
            let next_fire_at = match managed.scheduled_id {
                Some(id) => {
                    let mut scheduler = self.scheduler.clone();
                    scheduler.next_tick_for_job(id).await.ok().flatten()
                }
                None => None,
            };
            views.push(ScheduleJobView {
                id: name.clone(),
                cron: managed.cron.clone(),
                full_rescan: managed.full_rescan,
                paused: managed.scheduled_id.is_none(),
                next_fire_at,
            });
        }
        views
    }

    /// Remove the job from the scheduler, keeping its registration so it
    /// can be resumed. Pausing a paused job is a no-op.
    pub async fn pause(&self, name: &str) -> Result<(), ScheduleError> {
        let mut jobs = self.jobs.lock().await;
        let managed = jobs
            .get_mut(name)
            .ok_or_else(|| ScheduleError::UnknownJob(name.to_string()))?;

        if let Some(id) = managed.scheduled_id.take() {
            self.scheduler.remove(&id).await?;
            tracing::info!(job = name, "schedule job paused");
        }
        Ok(())
    }

    /// Re-add a paused job under its registered cron.
    pub async fn resume(&self, name: &str) -> Result<(), ScheduleError> {
        let mut jobs = self.jobs.lock().await;
        let managed = jobs
            .get_mut(name)
            .ok_or_else(|| ScheduleError::UnknownJob(name.to_string()))?;

        if managed.scheduled_id.is_none() {
            let job = self.build_job(&managed.cron, managed.full_rescan)?;
            managed.scheduled_id = Some(self.scheduler.add(job).await?);
            tracing::info!(job = name, "schedule job resumed");
        }
        Ok(())
    }

    /// Replace a job's cron expression. The new expression is validated by
    /// constructing the job before the old registration is dropped; a bad
    /// expression leaves the previous schedule untouched.
    pub async fn reschedule(&self, name: &str, cron: &str) -> Result<(), ScheduleError> {
        let mut jobs = self.jobs.lock().await;
        let managed = jobs
            .get_mut(name)
            .ok_or_else(|| ScheduleError::UnknownJob(name.to_string()))?;

        let was_active = managed.scheduled_id.is_some();
        let job = self.build_job(cron, managed.full_rescan)?;

        if let Some(old_id) = managed.scheduled_id.take() {
            self.scheduler.remove(&old_id).await?;
        }
        managed.cron = cron.to_string();
        if was_active {
            managed.scheduled_id = Some(self.scheduler.add(job).await?);
        }
        tracing::info!(job = name, cron, "schedule job rescheduled");
        Ok(())
    }
}

/// One scheduler tick: create a job row and run it to completion.
async fn fire_scheduled_scrape(ctx: ScrapeContext, pool: PgPool, full_rescan: bool) {
    tracing::info!(full_rescan, "scheduler tick: launching scrape");
    let job = match realagg_db::create_job(&pool, None, full_rescan).await {
        Ok(job) => job,
        Err(e) => {
            tracing::error!(error = %e, "scheduler could not create job row");
            return;
        }
    };

    run_scrape_job(
        ctx,
        pool,
        job.id,
        ScrapeRequest {
            source_codes: None,
            full_rescan,
        },
    )
    .await;
}

/// The settings document carries standard 5-field cron; the scheduler's
/// parser wants a seconds field in front.
fn to_six_field(cron: &str) -> String {
    let fields = cron.split_whitespace().count();
    if fields == 5 {
        format!("0 {cron}")
    } else {
        cron.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_field_cron_gains_a_seconds_field() {
        assert_eq!(to_six_field("0 3 * * *"), "0 0 3 * * *");
        assert_eq!(to_six_field("0 2 * * 0"), "0 0 2 * * 0");
    }

    #[test]
    fn six_field_cron_passes_through() {
        assert_eq!(to_six_field("0 0 3 * * *"), "0 0 3 * * *");
    }

    #[test]
    fn schedule_view_serializes() {
        let view = ScheduleJobView {
            id: DAILY_JOB.to_string(),
            cron: "0 3 * * *".to_string(),
            full_rescan: false,
            paused: false,
            next_fire_at: None,
        };
        let json = serde_json::to_string(&view).expect("serializes");
        assert!(json.contains("daily_scrape"));
        assert!(json.contains("\"paused\":false"));
    }
}
