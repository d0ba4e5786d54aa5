//! The listing gateway: canonical enum mapping, ingest inference, policy
//! admission, and the atomic upsert with photo synchronization.

use std::sync::Arc;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use realagg_core::{Decision, FilterPolicy, ListingRecord, OfferType, PropertyType};

use crate::infer::enrich_listing_fields;
use crate::sources::SourceCache;
use crate::DbError;

const MAX_TITLE_CHARS: usize = 200;
const MAX_LOCATION_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 5000;
const MAX_PHOTOS: usize = 20;

/// Result of pushing one candidate record through the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { id: Uuid, is_new: bool },
    Skipped { reason: String },
}

impl SaveOutcome {
    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved { .. })
    }
}

/// Shared handle the adapters write through. Cheap to clone.
#[derive(Clone)]
pub struct ListingGateway {
    pool: PgPool,
    sources: Arc<SourceCache>,
    policy: Arc<FilterPolicy>,
}

impl ListingGateway {
    #[must_use]
    pub fn new(pool: PgPool, sources: Arc<SourceCache>, policy: Arc<FilterPolicy>) -> Self {
        Self {
            pool,
            sources,
            policy,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Fail fast when a source code has no catalog row. Adapters call this
    /// before discovery so a misconfigured catalog aborts the run instead
    /// of failing every single record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownSource`] or [`DbError::Sqlx`].
    pub async fn ensure_source(&self, code: &str) -> Result<(), DbError> {
        self.sources.resolve(&self.pool, code).await.map(|_| ())
    }

    /// Canonicalize, infer, filter, and persist one candidate record.
    ///
    /// At most one row ever exists per `(source_id, external_id)`: the write
    /// is a single `INSERT … ON CONFLICT DO UPDATE` statement, so two
    /// adapters racing on the same identity both land on the same row.
    /// Photo replacement shares the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownSource`] for a record whose source code has
    /// no catalog row, or [`DbError::Sqlx`] on write failure.
    pub async fn save(&self, mut record: ListingRecord) -> Result<SaveOutcome, DbError> {
        let source = self.sources.resolve(&self.pool, record.source_code).await?;

        enrich_listing_fields(&mut record);

        if let Decision::Reject(reason) = self.policy.evaluate(&record) {
            tracing::debug!(
                source = record.source_code,
                external_id = %record.external_id,
                reason,
                "listing rejected by policy"
            );
            return Ok(SaveOutcome::Skipped { reason });
        }

        let property_type =
            PropertyType::from_text(record.property_type.as_deref().unwrap_or_default());
        let offer_type = OfferType::from_text(record.offer_type.as_deref().unwrap_or_default());

        let title = truncate_chars(&record.title, MAX_TITLE_CHARS);
        let description = truncate_chars(
            record.description.as_deref().unwrap_or_default(),
            MAX_DESCRIPTION_CHARS,
        );
        let location_text = truncate_chars(&record.location_text, MAX_LOCATION_CHARS);
        let price = record.price.and_then(Decimal::from_f64);

        let mut tx = self.pool.begin().await?;

        let (id, is_new): (Uuid, bool) = sqlx::query_as(
            "INSERT INTO listings \
                 (id, source_id, source_code, source_name, external_id, url, \
                  title, description, property_type, offer_type, price, \
                  location_text, municipality, district, latitude, longitude, \
                  area_built_up, area_land, disposition, rooms, condition, \
                  construction_type, first_seen_at, last_seen_at, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, \
                     $11, $12, $13, $14, \
                     $15::NUMERIC(9,6), $16::NUMERIC(9,6), \
                     $17::NUMERIC(10,2), $18::NUMERIC(10,2), \
                     $19, $20, $21, $22, NOW(), NOW(), TRUE) \
             ON CONFLICT (source_id, external_id) DO UPDATE SET \
                 url               = EXCLUDED.url, \
                 title             = EXCLUDED.title, \
                 description       = EXCLUDED.description, \
                 property_type     = EXCLUDED.property_type, \
                 offer_type        = EXCLUDED.offer_type, \
                 price             = EXCLUDED.price, \
                 location_text     = EXCLUDED.location_text, \
                 municipality      = COALESCE(EXCLUDED.municipality, listings.municipality), \
                 district          = COALESCE(EXCLUDED.district, listings.district), \
                 latitude          = COALESCE(EXCLUDED.latitude, listings.latitude), \
                 longitude         = COALESCE(EXCLUDED.longitude, listings.longitude), \
                 area_built_up     = EXCLUDED.area_built_up, \
                 area_land         = EXCLUDED.area_land, \
                 disposition       = COALESCE(EXCLUDED.disposition, listings.disposition), \
                 rooms             = COALESCE(EXCLUDED.rooms, listings.rooms), \
                 condition         = COALESCE(EXCLUDED.condition, listings.condition), \
                 construction_type = COALESCE(EXCLUDED.construction_type, listings.construction_type), \
                 last_seen_at      = NOW(), \
                 is_active         = TRUE \
             RETURNING id, (xmax = 0) AS is_new",
        )
        .bind(Uuid::new_v4())
        .bind(source.id)
        .bind(&source.code)
        .bind(&source.name)
        .bind(&record.external_id)
        .bind(&record.url)
        .bind(&title)
        .bind(&description)
        .bind(property_type.as_str())
        .bind(offer_type.as_str())
        .bind(price)
        .bind(&location_text)
        .bind(&record.municipality)
        .bind(&record.district)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(record.area_built_up)
        .bind(record.area_land)
        .bind(&record.disposition)
        .bind(record.rooms)
        .bind(&record.condition)
        .bind(&record.construction_type)
        .fetch_one(&mut *tx)
        .await?;

        if !record.photos.is_empty() {
            replace_photos(&mut tx, id, &record.photos).await?;
        }

        tx.commit().await?;

        tracing::debug!(
            source = record.source_code,
            external_id = %record.external_id,
            listing_id = %id,
            is_new,
            "listing upserted"
        );

        Ok(SaveOutcome::Saved { id, is_new })
    }

    /// Mark listings of `source_code` not seen since `cutoff` as inactive.
    ///
    /// Only called after a successful full rescan of that source; returns
    /// the number of rows deactivated.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownSource`] or [`DbError::Sqlx`].
    pub async fn deactivate_unseen(
        &self,
        source_code: &str,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64, DbError> {
        let source = self.sources.resolve(&self.pool, source_code).await?;

        let rows_affected = sqlx::query(
            "UPDATE listings \
             SET is_active = FALSE \
             WHERE source_id = $1 \
               AND is_active = TRUE \
               AND last_seen_at < $2",
        )
        .bind(source.id)
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected)
    }
}

/// Replace the photo set for a listing: delete everything, reinsert in
/// source order, capped at 20. The source is the authority on ordering.
async fn replace_photos(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    listing_id: Uuid,
    urls: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM listing_photos WHERE listing_id = $1")
        .bind(listing_id)
        .execute(&mut **tx)
        .await?;

    for (order_index, url) in urls.iter().take(MAX_PHOTOS).enumerate() {
        sqlx::query(
            "INSERT INTO listing_photos (id, listing_id, original_url, order_index) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(listing_id)
        .bind(url)
        .bind(i32::try_from(order_index).unwrap_or(i32::MAX))
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
