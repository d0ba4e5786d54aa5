use realagg_core::Settings;
use sqlx::migrate::Migrate;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;

// Path relative to crates/realagg-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 5,
            acquire_timeout_secs: 10,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings, acquire_timeout_secs: u64) -> Self {
        Self {
            max_connections: settings.database.max_connections,
            min_connections: settings.database.min_connections,
            acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("source '{0}' not found in catalog")]
    UnknownSource(String),
    #[error("record not found")]
    NotFound,
    #[error("invalid scrape job state transition for {id}: expected status '{expected_status}'")]
    InvalidJobTransition {
        id: uuid::Uuid,
        expected_status: &'static str,
    },
    #[error(transparent)]
    Config(#[from] realagg_core::ConfigError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    let applied_before = {
        let mut conn = pool.acquire().await?;
        conn.ensure_migrations_table().await?;
        conn.list_applied_migrations().await?.len()
    };

    MIGRATOR.run(pool).await?;

    let applied_after = {
        let mut conn = pool.acquire().await?;
        conn.ensure_migrations_table().await?;
        conn.list_applied_migrations().await?.len()
    };

    Ok(applied_after.saturating_sub(applied_before))
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Run a full health check: ping the pool and return a typed error on failure.
///
/// # Errors
///
/// Returns [`DbError`] if the ping fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await?;
    Ok(())
}

pub mod cadastre;
pub mod gateway;
pub mod geocode;
pub mod infer;
pub mod jobs;
pub mod sources;

pub use cadastre::{
    cadastre_stats, list_cadastre_candidates, upsert_cadastre, CadastreCandidate,
    CadastreCoverage, CadastreStats, NewCadastreData,
};
pub use gateway::{ListingGateway, SaveOutcome};
pub use geocode::{
    geocode_stats, last_geocoded_at, list_ungeocoded, set_coordinates, GeocodeStats,
    UngeocodedListing,
};
pub use jobs::{create_job, get_job, list_jobs, update_job, JobPatch, ScrapeJobRow};
pub use sources::{get_source_by_code, list_active_sources, SourceCache, SourceRow};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_has_sane_defaults() {
        let config = PoolConfig::default();

        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.acquire_timeout_secs, 10);
    }

    #[test]
    fn pool_config_from_settings_uses_document_values() {
        let settings = Settings::default();
        let config = PoolConfig::from_settings(&settings, 7);
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.acquire_timeout_secs, 7);
    }
}
