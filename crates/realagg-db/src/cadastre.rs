//! Persistence for cadastral lookup outcomes (`listing_cadastre_data`).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A listing awaiting cadastral lookup.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CadastreCandidate {
    pub id: Uuid,
    pub location_text: String,
    pub municipality: Option<String>,
    pub district: Option<String>,
}

/// The whole-row upsert payload.
#[derive(Debug, Clone)]
pub struct NewCadastreData {
    pub address_searched: String,
    pub ruian_kod: Option<i64>,
    pub cadastre_url: String,
    pub fetch_status: String,
    pub raw_ruian: Option<serde_json::Value>,
}

/// Counters for one bulk sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CadastreStats {
    pub total: u64,
    pub found: u64,
    pub not_found: u64,
    pub error: u64,
}

impl CadastreStats {
    pub fn record(&mut self, status: &str) {
        match status {
            "found" => self.found += 1,
            "not_found" => self.not_found += 1,
            _ => self.error += 1,
        }
    }
}

/// Active listings that still need a cadastral lookup.
///
/// Rows whose existing record is `found` or `manual` are never candidates;
/// `pending` and `error` always are, and `not_found` only when
/// `overwrite_not_found` is set.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_cadastre_candidates(
    pool: &PgPool,
    batch_size: i64,
    overwrite_not_found: bool,
) -> Result<Vec<CadastreCandidate>, DbError> {
    let reprocess: &[&str] = if overwrite_not_found {
        &["pending", "not_found", "error"]
    } else {
        &["pending", "error"]
    };
    let reprocess: Vec<String> = reprocess.iter().map(|s| (*s).to_string()).collect();

    let rows = sqlx::query_as::<_, CadastreCandidate>(
        "SELECT l.id, l.location_text, l.municipality, l.district \
         FROM listings l \
         WHERE l.is_active = TRUE \
           AND NOT EXISTS ( \
               SELECT 1 FROM listing_cadastre_data lcd \
               WHERE lcd.listing_id = l.id \
                 AND lcd.fetch_status != ALL($1::text[]) \
           ) \
         ORDER BY l.first_seen_at DESC \
         LIMIT $2",
    )
    .bind(&reprocess)
    .bind(batch_size)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Upsert the whole cadastre row for a listing, stamping `fetched_at`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_cadastre(
    pool: &PgPool,
    listing_id: Uuid,
    data: &NewCadastreData,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO listing_cadastre_data \
             (listing_id, address_searched, ruian_kod, cadastre_url, \
              fetch_status, raw_ruian, fetched_at) \
         VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
         ON CONFLICT (listing_id) DO UPDATE SET \
             address_searched = EXCLUDED.address_searched, \
             ruian_kod        = EXCLUDED.ruian_kod, \
             cadastre_url     = EXCLUDED.cadastre_url, \
             fetch_status     = EXCLUDED.fetch_status, \
             raw_ruian        = EXCLUDED.raw_ruian, \
             fetched_at       = NOW()",
    )
    .bind(listing_id)
    .bind(&data.address_searched)
    .bind(data.ruian_kod)
    .bind(&data.cadastre_url)
    .bind(&data.fetch_status)
    .bind(&data.raw_ruian)
    .execute(pool)
    .await?;

    Ok(())
}

/// Per-status row counts plus the number of active listings with no
/// cadastre row at all.
#[derive(Debug, Clone, Default)]
pub struct CadastreCoverage {
    pub by_status: Vec<(String, i64)>,
    pub missing: i64,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// Aggregate sweep coverage for the stats endpoint.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn cadastre_stats(pool: &PgPool) -> Result<CadastreCoverage, DbError> {
    let by_status = sqlx::query_as::<_, (String, i64)>(
        "SELECT fetch_status, COUNT(*) FROM listing_cadastre_data GROUP BY fetch_status",
    )
    .fetch_all(pool)
    .await?;

    let missing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM listings l \
         WHERE l.is_active = TRUE \
           AND NOT EXISTS ( \
               SELECT 1 FROM listing_cadastre_data lcd WHERE lcd.listing_id = l.id \
           )",
    )
    .fetch_one(pool)
    .await?;

    let last_fetched_at = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
        "SELECT MAX(fetched_at) FROM listing_cadastre_data",
    )
    .fetch_one(pool)
    .await?;

    Ok(CadastreCoverage {
        by_status,
        missing,
        last_fetched_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_counters_bucket_by_status() {
        let mut stats = CadastreStats::default();
        stats.record("found");
        stats.record("found");
        stats.record("not_found");
        stats.record("error");
        stats.record("weird");
        assert_eq!(stats.found, 2);
        assert_eq!(stats.not_found, 1);
        assert_eq!(stats.error, 2);
    }
}
