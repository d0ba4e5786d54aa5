//! Offline unit tests for realagg-db pool configuration and row types.
//! These tests do not require a live database connection.

use chrono::Utc;
use realagg_core::Settings;
use realagg_db::{
    CadastreCandidate, JobPatch, NewCadastreData, PoolConfig, ScrapeJobRow, SourceRow,
    UngeocodedListing,
};
use serde_json::json;
use uuid::Uuid;

#[test]
fn pool_config_from_settings_uses_document_values() {
    let mut settings = Settings::default();
    settings.database.max_connections = 42;
    settings.database.min_connections = 7;

    let pool_config = PoolConfig::from_settings(&settings, 9);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

/// Compile-time smoke test: confirm that [`ScrapeJobRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn scrape_job_row_has_expected_fields() {
    let row = ScrapeJobRow {
        id: Uuid::new_v4(),
        source_codes: Some(vec!["REMAX".to_string(), "SREALITY".to_string()]),
        full_rescan: true,
        status: "Running".to_string(),
        progress: 50,
        listings_found: 12,
        listings_new: 3,
        listings_updated: 9,
        error_message: None,
        created_at: Utc::now(),
        started_at: Some(Utc::now()),
        finished_at: None,
    };

    assert_eq!(row.status, "Running");
    assert_eq!(row.progress, 50);
    assert_eq!(row.listings_found, 12);
    assert!(row.full_rescan);
    assert!(row.finished_at.is_none());
}

#[test]
fn source_row_has_expected_fields() {
    let row = SourceRow {
        id: 3,
        code: "SREALITY".to_string(),
        name: "Sreality.cz".to_string(),
        base_url: "https://www.sreality.cz".to_string(),
        is_active: true,
    };

    assert_eq!(row.code, "SREALITY");
    assert!(row.is_active);
}

#[test]
fn cadastre_payload_round_trips_raw_json() {
    let data = NewCadastreData {
        address_searched: "Kravsko".to_string(),
        ruian_kod: Some(12_345_678),
        cadastre_url:
            "https://nahlizenidokn.cuzk.cz/ZobrazitMapu/Basic?typeCode=adresniMisto&id=12345678"
                .to_string(),
        fetch_status: "found".to_string(),
        raw_ruian: Some(json!({"results": [{"attributes": {"KOD": 12_345_678}}]})),
    };

    assert_eq!(data.fetch_status, "found");
    assert!(data.raw_ruian.as_ref().unwrap()["results"].is_array());
}

#[test]
fn enrichment_candidate_rows_carry_location_fields() {
    let cadastre = CadastreCandidate {
        id: Uuid::new_v4(),
        location_text: "Kravsko, okres Znojmo".to_string(),
        municipality: Some("Kravsko".to_string()),
        district: Some("Znojmo".to_string()),
    };
    let geocode = UngeocodedListing {
        id: Uuid::new_v4(),
        location_text: "Znojmo".to_string(),
        municipality: None,
        district: None,
    };

    assert_eq!(cadastre.municipality.as_deref(), Some("Kravsko"));
    assert!(geocode.municipality.is_none());
}

#[test]
fn job_patch_defaults_to_empty() {
    assert!(JobPatch::default().is_empty());
}
