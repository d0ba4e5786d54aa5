//! Cadastral address lookup against the public RUIAN map service.
//!
//! The ArcGIS `find` endpoint searches layer 2 (address points); the first
//! match carries a numeric address-point code under one of several keys,
//! from which a deep link into the public cadastre viewer is built.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;

use crate::error::EnrichError;

const DEFAULT_FIND_URL: &str =
    "https://ags.cuzk.cz/arcgis/rest/services/RUIAN/Vyhledavaci_sluzba_nad_daty_RUIAN/MapServer/find";
const VIEWER_BASE: &str = "https://nahlizenidokn.cuzk.cz";
const MAX_SEARCH_CHARS: usize = 100;

/// Deep link to the public cadastre viewer for an address point, or the
/// viewer root when the code is unknown.
#[must_use]
pub fn build_cadastre_url(ruian_kod: Option<i64>) -> String {
    match ruian_kod {
        Some(kod) => {
            format!("{VIEWER_BASE}/ZobrazitMapu/Basic?typeCode=adresniMisto&id={kod}")
        }
        None => format!("{VIEWER_BASE}/"),
    }
}

/// Outcome of one lookup; persisted whole into the cadastre side table.
#[derive(Debug, Clone)]
pub struct RuianLookup {
    pub ruian_kod: Option<i64>,
    pub cadastre_url: String,
    pub address_used: String,
    pub fetch_status: &'static str,
    pub raw: Option<Value>,
}

#[derive(Clone)]
pub struct RuianClient {
    client: reqwest::Client,
    find_url: String,
    rate_limit: Duration,
}

impl RuianClient {
    /// Build a client against the public endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::Http`] if the HTTP client cannot be built.
    pub fn new(user_agent: &str, rate_limit_ms: u64) -> Result<Self, EnrichError> {
        Self::with_find_url(DEFAULT_FIND_URL, user_agent, rate_limit_ms)
    }

    /// Build a client against an explicit find URL (tests point this at a
    /// mock server).
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::Http`] if the HTTP client cannot be built.
    pub fn with_find_url(
        find_url: &str,
        user_agent: &str,
        rate_limit_ms: u64,
    ) -> Result<Self, EnrichError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            find_url: find_url.to_string(),
            rate_limit: Duration::from_millis(rate_limit_ms),
        })
    }

    /// The throttle interval between consecutive requests.
    #[must_use]
    pub fn rate_limit(&self) -> Duration {
        self.rate_limit
    }

    /// Look up an address point. The municipality, when known, beats the
    /// full listing address: shorter queries hit the registry far more
    /// reliably. Never fails — errors are folded into the
    /// `fetch_status = "error"` outcome so the sweep can keep going.
    pub async fn lookup_address(
        &self,
        address_text: &str,
        municipality: Option<&str>,
    ) -> RuianLookup {
        let search_text = normalize_search_text(address_text, municipality);

        let mut lookup = RuianLookup {
            ruian_kod: None,
            cadastre_url: build_cadastre_url(None),
            address_used: search_text.clone(),
            fetch_status: "not_found",
            raw: None,
        };

        let response = match self.find(&search_text).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(search = %search_text, error = %e, "ruian lookup failed");
                lookup.fetch_status = "error";
                lookup.raw = Some(serde_json::json!({ "error": e.to_string() }));
                return lookup;
            }
        };

        lookup.raw = Some(response.clone());

        let Some(kod) = first_address_point_code(&response) else {
            tracing::debug!(search = %search_text, "no ruian match");
            return lookup;
        };

        tracing::info!(search = %search_text, kod, "ruian address point found");
        lookup.ruian_kod = Some(kod);
        lookup.cadastre_url = build_cadastre_url(Some(kod));
        lookup.fetch_status = "found";
        lookup
    }

    async fn find(&self, search_text: &str) -> Result<Value, EnrichError> {
        let response = self
            .client
            .get(&self.find_url)
            .query(&[
                ("searchText", search_text),
                ("contains", "true"),
                // Layer 2 = address points in the RUIAN map server.
                ("layers", "2"),
                ("returnGeometry", "false"),
                ("f", "json"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichError::UnexpectedStatus {
                status: status.as_u16(),
                url: self.find_url.clone(),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|source| EnrichError::Deserialize {
            context: format!("ruian find for '{search_text}'"),
            source,
        })
    }
}

/// Prefer the municipality, strip `okres/kraj/okr.` qualifiers, and cap the
/// query length.
fn normalize_search_text(address_text: &str, municipality: Option<&str>) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i),?\s*(okres|kraj|okr\.)\s+\S+").expect("valid qualifier regex")
    });

    let base = municipality
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| address_text.trim());
    let stripped = re.replace_all(base, "").trim().to_string();
    stripped.chars().take(MAX_SEARCH_CHARS).collect()
}

/// The address-point code hides under different keys depending on the map
/// server revision.
fn first_address_point_code(response: &Value) -> Option<i64> {
    let first = response.get("results")?.as_array()?.first()?;
    let attributes = first.get("attributes")?;

    for key in ["KOD", "kod", "KOD_ADM", "OBJECTID"] {
        let Some(value) = attributes.get(key) else {
            continue;
        };
        if let Some(kod) = value.as_i64() {
            return Some(kod);
        }
        if let Some(kod) = value.as_str().and_then(|s| s.parse::<i64>().ok()) {
            return Some(kod);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn cadastre_url_embeds_the_code() {
        assert_eq!(
            build_cadastre_url(Some(12_345_678)),
            "https://nahlizenidokn.cuzk.cz/ZobrazitMapu/Basic?typeCode=adresniMisto&id=12345678"
        );
        assert_eq!(build_cadastre_url(None), "https://nahlizenidokn.cuzk.cz/");
    }

    #[test]
    fn municipality_beats_full_address() {
        assert_eq!(
            normalize_search_text("Kravsko 100, okres Znojmo", Some("Kravsko")),
            "Kravsko"
        );
    }

    #[test]
    fn district_qualifiers_are_stripped() {
        assert_eq!(
            normalize_search_text("Kravsko 100, okres Znojmo", None),
            "Kravsko 100"
        );
        assert_eq!(
            normalize_search_text("Dyje, Jihomoravský kraj Brno", None),
            "Dyje, Jihomoravský"
        );
    }

    #[test]
    fn long_queries_are_capped() {
        let long = "a".repeat(300);
        assert_eq!(normalize_search_text(&long, None).chars().count(), 100);
    }

    #[test]
    fn code_keys_are_tried_in_order() {
        let response = json!({"results": [{"attributes": {"KOD": 21_367_821}}]});
        assert_eq!(first_address_point_code(&response), Some(21_367_821));

        let as_string = json!({"results": [{"attributes": {"KOD": "21367821"}}]});
        assert_eq!(first_address_point_code(&as_string), Some(21_367_821));

        let empty = json!({"results": []});
        assert_eq!(first_address_point_code(&empty), None);
    }

    #[tokio::test]
    async fn found_lookup_builds_deep_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/find"))
            .and(query_param("searchText", "Kravsko"))
            .and(query_param("layers", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"results": [{"attributes": {"KOD": 21367821}}]}"#,
            ))
            .mount(&server)
            .await;

        let client =
            RuianClient::with_find_url(&format!("{}/find", server.uri()), "realagg-test/0.1", 0)
                .expect("client builds");
        let lookup = client.lookup_address("Kravsko 100", Some("Kravsko")).await;

        assert_eq!(lookup.fetch_status, "found");
        assert_eq!(lookup.ruian_kod, Some(21_367_821));
        assert!(lookup.cadastre_url.contains("id=21367821"));
        assert_eq!(lookup.address_used, "Kravsko");
        assert!(lookup.raw.is_some());
    }

    #[tokio::test]
    async fn empty_result_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/find"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"results": []}"#))
            .mount(&server)
            .await;

        let client =
            RuianClient::with_find_url(&format!("{}/find", server.uri()), "realagg-test/0.1", 0)
                .expect("client builds");
        let lookup = client.lookup_address("Neexistuje", None).await;
        assert_eq!(lookup.fetch_status, "not_found");
        assert!(lookup.ruian_kod.is_none());
    }

    #[tokio::test]
    async fn transport_failure_is_an_error_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/find"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client =
            RuianClient::with_find_url(&format!("{}/find", server.uri()), "realagg-test/0.1", 0)
                .expect("client builds");
        let lookup = client.lookup_address("Znojmo", None).await;
        assert_eq!(lookup.fetch_status, "error");
        assert!(lookup.raw.unwrap()["error"].is_string());
    }
}
