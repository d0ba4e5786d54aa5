//! Scrape-job execution: lifecycle transitions, the parallel fan-out over
//! the selected adapters, and the post-run deactivation sweep.

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use sqlx::PgPool;
use uuid::Uuid;

use realagg_db::JobPatch;
use realagg_scraper::{run_source, RunSummary, ScrapeContext, Source};

#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub source_codes: Option<Vec<String>>,
    pub full_rescan: bool,
}

/// Run one scrape job to completion and record the outcome on its row.
/// Individual adapter failures are logged and excluded from the
/// deactivation pass; only runner-level failures mark the job `Failed`.
pub async fn run_scrape_job(
    ctx: ScrapeContext,
    pool: PgPool,
    job_id: Uuid,
    request: ScrapeRequest,
) {
    tracing::info!(
        %job_id,
        sources = ?request.source_codes,
        full_rescan = request.full_rescan,
        "scrape job starting"
    );

    match execute(&ctx, &pool, job_id, &request).await {
        Ok(totals) => {
            let patch = JobPatch {
                status: Some("Succeeded".to_string()),
                progress: Some(100),
                listings_found: Some(clamp_count(totals.found)),
                listings_new: Some(clamp_count(totals.saved_new)),
                listings_updated: Some(clamp_count(totals.saved_updated)),
                finished_at: Some(Utc::now()),
                ..JobPatch::default()
            };
            if let Err(e) = realagg_db::update_job(&pool, job_id, patch).await {
                tracing::error!(%job_id, error = %e, "failed to finalize job row");
            }
            tracing::info!(
                %job_id,
                found = totals.found,
                saved = totals.saved(),
                "scrape job succeeded"
            );
        }
        Err(e) => {
            tracing::error!(%job_id, error = %e, "scrape job failed");
            let patch = JobPatch {
                status: Some("Failed".to_string()),
                error_message: Some(format!("{e:#}")),
                finished_at: Some(Utc::now()),
                ..JobPatch::default()
            };
            if let Err(update_err) = realagg_db::update_job(&pool, job_id, patch).await {
                tracing::error!(%job_id, error = %update_err, "failed to record job failure");
            }
        }
    }
}

async fn execute(
    ctx: &ScrapeContext,
    pool: &PgPool,
    job_id: Uuid,
    request: &ScrapeRequest,
) -> anyhow::Result<RunSummary> {
    realagg_db::update_job(
        pool,
        job_id,
        JobPatch {
            status: Some("Running".to_string()),
            started_at: Some(Utc::now()),
            ..JobPatch::default()
        },
    )
    .await?;

    let sources = resolve_sources(pool, request.source_codes.as_deref()).await?;
    anyhow::ensure!(!sources.is_empty(), "no runnable sources selected");

    // Everything saved by this run carries last_seen_at >= scan_started;
    // the deactivation sweep cuts on this timestamp.
    let scan_started = Utc::now();
    let total_sources = sources.len();

    let mut tasks: FuturesUnordered<_> = sources
        .into_iter()
        .map(|source| {
            let ctx = ctx.clone();
            let full_rescan = request.full_rescan;
            async move {
                let result = tokio::spawn(async move {
                    run_source(&ctx, source, full_rescan).await
                })
                .await;
                (source, result)
            }
        })
        .collect();

    let mut totals = RunSummary::default();
    let mut clean_sources: Vec<Source> = Vec::new();
    let mut completed: usize = 0;

    while let Some((source, result)) = tasks.next().await {
        completed += 1;
        match result {
            Ok(Ok(summary)) => {
                totals.merge(summary);
                clean_sources.push(source);
            }
            Ok(Err(e)) => {
                tracing::error!(source = %source, error = %e, "adapter failed");
            }
            Err(join_err) => {
                tracing::error!(source = %source, error = %join_err, "adapter task aborted");
            }
        }

        let progress = (completed * 100 / total_sources) as i32;
        let patch = JobPatch {
            progress: Some(progress.min(99)),
            listings_found: Some(clamp_count(totals.found)),
            listings_new: Some(clamp_count(totals.saved_new)),
            listings_updated: Some(clamp_count(totals.saved_updated)),
            ..JobPatch::default()
        };
        if let Err(e) = realagg_db::update_job(pool, job_id, patch).await {
            tracing::warn!(%job_id, error = %e, "progress update failed");
        }
    }

    if request.full_rescan {
        for source in &clean_sources {
            match ctx.gateway.deactivate_unseen(source.code(), scan_started).await {
                Ok(0) => {}
                Ok(deactivated) => {
                    tracing::info!(source = %source, deactivated, "unseen listings deactivated");
                }
                Err(e) => {
                    tracing::warn!(source = %source, error = %e, "deactivation sweep failed");
                }
            }
        }
    }

    Ok(totals)
}

/// Resolve the requested codes to adapters; with no explicit selection,
/// every active catalog source that has an adapter runs.
async fn resolve_sources(
    pool: &PgPool,
    requested: Option<&[String]>,
) -> anyhow::Result<Vec<Source>> {
    let codes: Vec<String> = match requested {
        Some(codes) if !codes.is_empty() => codes.to_vec(),
        _ => realagg_db::list_active_sources(pool)
            .await?
            .into_iter()
            .map(|row| row.code)
            .collect(),
    };

    let mut sources = Vec::new();
    for code in codes {
        match Source::from_code(&code) {
            Some(source) => sources.push(source),
            None => tracing::warn!(code, "no adapter for source code, skipping"),
        }
    }
    Ok(sources)
}

fn clamp_count(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_saturate_instead_of_wrapping() {
        assert_eq!(clamp_count(12), 12);
        assert_eq!(clamp_count(u64::MAX), i32::MAX);
    }

    #[test]
    fn request_carries_selection() {
        let request = ScrapeRequest {
            source_codes: Some(vec!["REMAX".to_string()]),
            full_rescan: true,
        };
        assert_eq!(request.source_codes.as_deref().unwrap().len(), 1);
        assert!(request.full_rescan);
    }
}
