//! Bulk enrichment sweeps.
//!
//! Both sweeps scan the store for unresolved rows, call the rate-limited
//! client per row, and upsert the outcome. Re-running a sweep over fully
//! resolved data selects zero candidates and performs no writes.

use sqlx::PgPool;

use realagg_db::{CadastreStats, NewCadastreData};

use crate::error::EnrichError;
use crate::geocode::{GeocodeClient, GEOCODE_SOURCE_TAG};
use crate::ruian::RuianClient;

/// Geocode up to `batch_size` active listings that have no coordinates yet.
/// Returns the number of listings successfully geocoded.
///
/// # Errors
///
/// Returns [`EnrichError::Db`] when candidate selection or a coordinate
/// write fails; per-listing geocoding misses are skipped, not errors.
pub async fn bulk_geocode(
    pool: &PgPool,
    client: &GeocodeClient,
    batch_size: i64,
) -> Result<u64, EnrichError> {
    let rows = realagg_db::list_ungeocoded(pool, batch_size).await?;
    if rows.is_empty() {
        tracing::info!("no listings awaiting geocoding");
        return Ok(0);
    }

    tracing::info!(count = rows.len(), "bulk geocoding batch");
    let mut resolved: u64 = 0;

    for row in rows {
        let coords = client
            .geocode_listing_location(
                &row.location_text,
                row.municipality.as_deref(),
                row.district.as_deref(),
            )
            .await;

        if let Some((lat, lon)) = coords {
            realagg_db::set_coordinates(pool, row.id, lat, lon, GEOCODE_SOURCE_TAG).await?;
            resolved += 1;
            tracing::debug!(listing_id = %row.id, lat, lon, "listing geocoded");
        }

        tokio::time::sleep(client.rate_limit()).await;
    }

    tracing::info!(resolved, "bulk geocoding finished");
    Ok(resolved)
}

/// Cadastral sweep over up to `batch_size` active listings without resolved
/// cadastre data. Rows marked `manual` are never touched; `not_found` rows
/// are reprocessed only when `overwrite_not_found` is set.
///
/// # Errors
///
/// Returns [`EnrichError::Db`] when candidate selection or an upsert fails;
/// per-listing lookup failures become `error` rows and the sweep continues.
pub async fn bulk_ruian(
    pool: &PgPool,
    client: &RuianClient,
    batch_size: i64,
    overwrite_not_found: bool,
) -> Result<CadastreStats, EnrichError> {
    let rows = realagg_db::list_cadastre_candidates(pool, batch_size, overwrite_not_found).await?;
    let mut stats = CadastreStats {
        total: rows.len() as u64,
        ..CadastreStats::default()
    };
    if rows.is_empty() {
        tracing::info!("no listings awaiting cadastre lookup");
        return Ok(stats);
    }

    tracing::info!(count = rows.len(), overwrite_not_found, "bulk ruian batch");

    for row in rows {
        let lookup = client
            .lookup_address(&row.location_text, row.municipality.as_deref())
            .await;

        let data = NewCadastreData {
            address_searched: lookup.address_used.clone(),
            ruian_kod: lookup.ruian_kod,
            cadastre_url: lookup.cadastre_url.clone(),
            fetch_status: lookup.fetch_status.to_string(),
            raw_ruian: lookup.raw.clone(),
        };
        realagg_db::upsert_cadastre(pool, row.id, &data).await?;
        stats.record(lookup.fetch_status);

        tokio::time::sleep(client.rate_limit()).await;
    }

    tracing::info!(
        found = stats.found,
        not_found = stats.not_found,
        error = stats.error,
        "bulk ruian finished"
    );
    Ok(stats)
}
