//! Persistence for `scrape_jobs` lifecycle records.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const JOB_COLUMNS: &str = "id, source_codes, full_rescan, status, progress, \
     listings_found, listings_new, listings_updated, error_message, \
     created_at, started_at, finished_at";

/// A row from the `scrape_jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScrapeJobRow {
    pub id: Uuid,
    pub source_codes: Option<Vec<String>>,
    pub full_rescan: bool,
    pub status: String,
    pub progress: i32,
    pub listings_found: i32,
    pub listings_new: i32,
    pub listings_updated: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Partial update for a job: only supplied fields are written.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<String>,
    pub progress: Option<i32>,
    pub listings_found: Option<i32>,
    pub listings_new: Option<i32>,
    pub listings_updated: Option<i32>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.progress.is_none()
            && self.listings_found.is_none()
            && self.listings_new.is_none()
            && self.listings_updated.is_none()
            && self.error_message.is_none()
            && self.started_at.is_none()
            && self.finished_at.is_none()
    }
}

/// Create a new job in `Queued` status and return the full row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_job(
    pool: &PgPool,
    source_codes: Option<&[String]>,
    full_rescan: bool,
) -> Result<ScrapeJobRow, DbError> {
    let row = sqlx::query_as::<_, ScrapeJobRow>(&format!(
        "INSERT INTO scrape_jobs (id, source_codes, full_rescan, status) \
         VALUES ($1, $2, $3, 'Queued') \
         RETURNING {JOB_COLUMNS}",
    ))
    .bind(Uuid::new_v4())
    .bind(source_codes)
    .bind(full_rescan)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Apply a partial update. Only the supplied fields are written; an empty
/// patch is a no-op.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] when no row matches `id`, or
/// [`DbError::Sqlx`] on query failure.
pub async fn update_job(pool: &PgPool, id: Uuid, patch: JobPatch) -> Result<(), DbError> {
    if patch.is_empty() {
        return Ok(());
    }

    let mut sets: Vec<String> = Vec::new();
    let mut index = 1_u32;
    let mut push = |sets: &mut Vec<String>, column: &str| {
        index += 1;
        sets.push(format!("{column} = ${index}"));
    };

    if patch.status.is_some() {
        push(&mut sets, "status");
    }
    if patch.progress.is_some() {
        push(&mut sets, "progress");
    }
    if patch.listings_found.is_some() {
        push(&mut sets, "listings_found");
    }
    if patch.listings_new.is_some() {
        push(&mut sets, "listings_new");
    }
    if patch.listings_updated.is_some() {
        push(&mut sets, "listings_updated");
    }
    if patch.error_message.is_some() {
        push(&mut sets, "error_message");
    }
    if patch.started_at.is_some() {
        push(&mut sets, "started_at");
    }
    if patch.finished_at.is_some() {
        push(&mut sets, "finished_at");
    }

    let sql = format!("UPDATE scrape_jobs SET {} WHERE id = $1", sets.join(", "));

    let mut query = sqlx::query(&sql).bind(id);
    if let Some(status) = &patch.status {
        query = query.bind(status);
    }
    if let Some(progress) = patch.progress {
        query = query.bind(progress);
    }
    if let Some(found) = patch.listings_found {
        query = query.bind(found);
    }
    if let Some(new) = patch.listings_new {
        query = query.bind(new);
    }
    if let Some(updated) = patch.listings_updated {
        query = query.bind(updated);
    }
    if let Some(error_message) = &patch.error_message {
        query = query.bind(error_message);
    }
    if let Some(started_at) = patch.started_at {
        query = query.bind(started_at);
    }
    if let Some(finished_at) = patch.finished_at {
        query = query.bind(finished_at);
    }

    let result = query.execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Fetch a single job.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] when no row exists, or [`DbError::Sqlx`]
/// on query failure.
pub async fn get_job(pool: &PgPool, id: Uuid) -> Result<ScrapeJobRow, DbError> {
    let row = sqlx::query_as::<_, ScrapeJobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM scrape_jobs WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// The most recent jobs in reverse-chronological order, optionally filtered
/// by status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_jobs(
    pool: &PgPool,
    limit: i64,
    status: Option<&str>,
) -> Result<Vec<ScrapeJobRow>, DbError> {
    let rows = if let Some(status) = status {
        sqlx::query_as::<_, ScrapeJobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM scrape_jobs \
             WHERE status = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2",
        ))
        .bind(status)
        .bind(limit)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, ScrapeJobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM scrape_jobs \
             ORDER BY created_at DESC, id DESC LIMIT $1",
        ))
        .bind(limit)
        .fetch_all(pool)
        .await?
    };

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_is_detected() {
        assert!(JobPatch::default().is_empty());
        let patch = JobPatch {
            status: Some("Running".to_string()),
            ..JobPatch::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn job_row_has_expected_fields() {
        let row = ScrapeJobRow {
            id: Uuid::new_v4(),
            source_codes: Some(vec!["REMAX".to_string()]),
            full_rescan: false,
            status: "Queued".to_string(),
            progress: 0,
            listings_found: 0,
            listings_new: 0,
            listings_updated: 0,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };

        assert_eq!(row.status, "Queued");
        assert_eq!(row.source_codes.as_deref(), Some(&["REMAX".to_string()][..]));
        assert!(row.started_at.is_none());
    }
}
