//! Source catalog reads and the TTL cache in front of them.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sqlx::PgPool;

use crate::DbError;

/// A row from the `sources` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SourceRow {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub base_url: String,
    pub is_active: bool,
}

/// Fetch a source by its code.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_source_by_code(pool: &PgPool, code: &str) -> Result<Option<SourceRow>, DbError> {
    let row = sqlx::query_as::<_, SourceRow>(
        "SELECT id, code, name, base_url, is_active FROM sources WHERE code = $1",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// All active sources, ordered by code.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_sources(pool: &PgPool) -> Result<Vec<SourceRow>, DbError> {
    let rows = sqlx::query_as::<_, SourceRow>(
        "SELECT id, code, name, base_url, is_active \
         FROM sources WHERE is_active = TRUE ORDER BY code",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Keyed cache for source rows so the per-upsert lookup stays off the
/// database. Entries expire after `ttl`; a miss or an expired entry falls
/// through to a fresh query.
#[derive(Debug)]
pub struct SourceCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (SourceRow, Instant)>>,
}

impl SourceCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `code` through the cache, querying the pool on miss.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownSource`] when the code has no catalog row,
    /// or [`DbError::Sqlx`] on query failure.
    pub async fn resolve(&self, pool: &PgPool, code: &str) -> Result<SourceRow, DbError> {
        if let Some(row) = self.cached(code) {
            return Ok(row);
        }

        let row = get_source_by_code(pool, code)
            .await?
            .ok_or_else(|| DbError::UnknownSource(code.to_string()))?;

        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(code.to_string(), (row.clone(), Instant::now()));
        Ok(row)
    }

    fn cached(&self, code: &str) -> Option<SourceRow> {
        let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let (row, stored_at) = entries.get(code)?;
        if stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(row.clone())
    }

    /// Insert a row directly, used by tests and warm-up paths.
    pub fn prime(&self, row: SourceRow) {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(row.code.clone(), (row, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(code: &str) -> SourceRow {
        SourceRow {
            id: 1,
            code: code.to_string(),
            name: "Test source".to_string(),
            base_url: "https://example.cz".to_string(),
            is_active: true,
        }
    }

    #[test]
    fn primed_entry_is_served_within_ttl() {
        let cache = SourceCache::new(Duration::from_secs(60));
        cache.prime(row("REMAX"));
        assert_eq!(cache.cached("REMAX").map(|r| r.id), Some(1));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = SourceCache::new(Duration::ZERO);
        cache.prime(row("REMAX"));
        // ttl of zero expires immediately
        assert!(cache.cached("REMAX").is_none());
    }

    #[test]
    fn unknown_code_is_a_miss() {
        let cache = SourceCache::new(Duration::from_secs(60));
        assert!(cache.cached("SREALITY").is_none());
    }
}
