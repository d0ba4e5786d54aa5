//! Coordinate backfill queries for the reverse-geocoding sweep.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// An active listing with no coordinates yet.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UngeocodedListing {
    pub id: Uuid,
    pub location_text: String,
    pub municipality: Option<String>,
    pub district: Option<String>,
}

/// Newest-first batch of active listings missing coordinates.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_ungeocoded(
    pool: &PgPool,
    batch_size: i64,
) -> Result<Vec<UngeocodedListing>, DbError> {
    let rows = sqlx::query_as::<_, UngeocodedListing>(
        "SELECT id, location_text, municipality, district \
         FROM listings \
         WHERE is_active = TRUE AND latitude IS NULL \
         ORDER BY first_seen_at DESC \
         LIMIT $1",
    )
    .bind(batch_size)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Write resolved coordinates with provenance.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] when the listing is gone, or
/// [`DbError::Sqlx`] on query failure.
pub async fn set_coordinates(
    pool: &PgPool,
    listing_id: Uuid,
    latitude: f64,
    longitude: f64,
    source: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE listings \
         SET latitude = $1::NUMERIC(9,6), \
             longitude = $2::NUMERIC(9,6), \
             geocode_source = $3, \
             geocoded_at = NOW() \
         WHERE id = $4",
    )
    .bind(latitude)
    .bind(longitude)
    .bind(source)
    .bind(listing_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Coverage numbers for the stats endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeocodeStats {
    pub active_total: i64,
    pub geocoded: i64,
    pub missing: i64,
}

/// Count active listings with and without coordinates.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn geocode_stats(pool: &PgPool) -> Result<GeocodeStats, DbError> {
    let (active_total, geocoded): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(latitude) FROM listings WHERE is_active = TRUE",
    )
    .fetch_one(pool)
    .await?;

    Ok(GeocodeStats {
        active_total,
        geocoded,
        missing: active_total - geocoded,
    })
}

/// Most recent geocoding activity, for operator visibility.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn last_geocoded_at(pool: &PgPool) -> Result<Option<DateTime<Utc>>, DbError> {
    let ts = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
        "SELECT MAX(geocoded_at) FROM listings",
    )
    .fetch_one(pool)
    .await?;

    Ok(ts)
}
