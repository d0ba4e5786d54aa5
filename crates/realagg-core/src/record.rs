//! The normalized candidate record produced by every source adapter.

/// One scraped listing, as close to the portal's own data as practical.
///
/// A single flat struct with optional fields: adapters fill what their
/// source exposes and leave the rest `None`. `property_type` and
/// `offer_type` stay free-form text here (portals speak Czech, platform
/// constants, or URL slugs); the store gateway owns the canonical mapping.
#[derive(Debug, Clone, Default)]
pub struct ListingRecord {
    pub source_code: &'static str,
    pub external_id: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub property_type: Option<String>,
    pub offer_type: Option<String>,
    pub price: Option<f64>,
    pub location_text: String,
    pub municipality: Option<String>,
    pub district: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub area_built_up: Option<f64>,
    pub area_land: Option<f64>,
    pub disposition: Option<String>,
    pub rooms: Option<i32>,
    pub condition: Option<String>,
    pub construction_type: Option<String>,
    pub photos: Vec<String>,
}

impl ListingRecord {
    /// A minimally-populated record; adapters typically start from this and
    /// fill in detail-page fields afterwards.
    #[must_use]
    pub fn new(source_code: &'static str, external_id: impl Into<String>) -> Self {
        Self {
            source_code,
            external_id: external_id.into(),
            ..Self::default()
        }
    }
}
