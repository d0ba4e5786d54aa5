//! Reverse geocoding against a Nominatim-style endpoint.
//!
//! Usage terms: at most 1 request per second and an identifying User-Agent.
//! The client sleeps between progressive query attempts; the bulk sweep in
//! [`crate::bulk`] sleeps between rows.

use std::time::Duration;

use serde_json::Value;

use crate::error::EnrichError;

pub const GEOCODE_SOURCE_TAG: &str = "nominatim";

const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Clone)]
pub struct GeocodeClient {
    client: reqwest::Client,
    base_url: String,
    rate_limit: Duration,
}

impl GeocodeClient {
    /// Build a client with the public endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::Http`] if the HTTP client cannot be built.
    pub fn new(user_agent: &str, rate_limit_ms: u64) -> Result<Self, EnrichError> {
        Self::with_base_url(DEFAULT_BASE_URL, user_agent, rate_limit_ms)
    }

    /// Build a client against an explicit base URL (tests point this at a
    /// mock server).
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::Http`] if the HTTP client cannot be built.
    pub fn with_base_url(
        base_url: &str,
        user_agent: &str,
        rate_limit_ms: u64,
    ) -> Result<Self, EnrichError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limit: Duration::from_millis(rate_limit_ms),
        })
    }

    /// The throttle interval between consecutive requests.
    #[must_use]
    pub fn rate_limit(&self) -> Duration {
        self.rate_limit
    }

    /// Geocode a single address string. Returns `(lat, lon)` of the best
    /// match, or `None` when the endpoint has no result.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError`] for transport failures or malformed
    /// responses.
    pub async fn geocode_address(
        &self,
        address: &str,
    ) -> Result<Option<(f64, f64)>, EnrichError> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", address),
                ("countrycodes", "cz"),
                ("format", "json"),
                ("limit", "1"),
                ("accept-language", "cs"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        let results: Value =
            serde_json::from_str(&body).map_err(|source| EnrichError::Deserialize {
                context: format!("geocode response for '{address}'"),
                source,
            })?;

        let Some(first) = results.as_array().and_then(|a| a.first()) else {
            tracing::debug!(address, "no geocoding match");
            return Ok(None);
        };

        let lat = json_coord(first, "lat");
        let lon = json_coord(first, "lon");
        match (lat, lon) {
            (Some(lat), Some(lon)) => {
                tracing::debug!(address, lat, lon, "geocoded");
                Ok(Some((lat, lon)))
            }
            _ => Ok(None),
        }
    }

    /// Geocode a listing location, trying progressively less specific
    /// queries: the full location text, then municipality + district, then
    /// the district alone. Sleeps the rate-limit interval between attempts.
    ///
    /// Transport errors on one attempt degrade to the next attempt rather
    /// than aborting; the sweep treats a fully-failed listing as unresolved.
    pub async fn geocode_listing_location(
        &self,
        location_text: &str,
        municipality: Option<&str>,
        district: Option<&str>,
    ) -> Option<(f64, f64)> {
        let mut attempts: Vec<String> = vec![location_text.to_string()];
        if let (Some(municipality), Some(district)) = (municipality, district) {
            attempts.push(format!("{municipality}, {district}, Česká republika"));
        }
        if let Some(district) = district {
            attempts.push(format!("{district}, Česká republika"));
        }

        for (index, attempt) in attempts.iter().enumerate() {
            if attempt.trim().chars().count() < 3 {
                continue;
            }
            if index > 0 {
                tokio::time::sleep(self.rate_limit).await;
            }

            match self.geocode_address(attempt).await {
                Ok(Some(coords)) => return Some(coords),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(address = %attempt, error = %e, "geocoding attempt failed");
                }
            }
        }
        None
    }
}

/// Nominatim returns coordinates as strings.
fn json_coord(value: &Value, key: &str) -> Option<f64> {
    value
        .get(key)
        .and_then(|v| v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_f64()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> GeocodeClient {
        GeocodeClient::with_base_url(&server.uri(), "realagg-test/0.1", 0).expect("client builds")
    }

    #[tokio::test]
    async fn first_match_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Znojmo"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"lat": "48.8555", "lon": "16.0488", "display_name": "Znojmo"}]"#,
            ))
            .mount(&server)
            .await;

        let coords = client(&server)
            .await
            .geocode_address("Znojmo")
            .await
            .expect("request succeeds");
        assert_eq!(coords, Some((48.8555, 16.0488)));
    }

    #[tokio::test]
    async fn empty_result_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let coords = client(&server)
            .await
            .geocode_address("Neexistující obec 123")
            .await
            .expect("request succeeds");
        assert_eq!(coords, None);
    }

    #[tokio::test]
    async fn server_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = client(&server).await.geocode_address("Znojmo").await;
        assert!(matches!(
            result,
            Err(EnrichError::UnexpectedStatus { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn progressive_attempts_fall_back_to_district() {
        let server = MockServer::start().await;
        // Full text and municipality queries miss; the district query hits.
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Znojmo, Česká republika"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"[{"lat": "48.85", "lon": "16.05"}]"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let coords = client(&server)
            .await
            .geocode_listing_location("Neznámá ulice 7", Some("Kravsko"), Some("Znojmo"))
            .await;
        assert_eq!(coords, Some((48.85, 16.05)));
    }

    #[tokio::test]
    async fn short_inputs_are_skipped() {
        let server = MockServer::start().await;
        // No expectations mounted: a request would 404 and log, not panic.
        let coords = client(&server)
            .await
            .geocode_listing_location("", None, None)
            .await;
        assert_eq!(coords, None);
    }

    #[test]
    fn numeric_coordinates_are_also_accepted() {
        let value: Value = serde_json::json!({"lat": 48.8, "lon": 16.0});
        assert_eq!(json_coord(&value, "lat"), Some(48.8));
        assert_eq!(json_coord(&value, "lon"), Some(16.0));
    }
}
