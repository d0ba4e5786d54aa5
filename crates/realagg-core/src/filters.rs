//! Admission policy applied to every candidate record before persistence.
//!
//! Pure and immutable after load: quality checks run first and
//! short-circuit, then the district match, then the per-property-type
//! price band. Rejection reasons are single-line diagnostics only.

use crate::record::ListingRecord;
use crate::settings::{QualityFilters, SearchFilters, Settings, TypeFilter};
use crate::types::{OfferType, PropertyType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject(String),
}

impl Decision {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accept)
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Accept => None,
            Decision::Reject(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    search: SearchFilters,
    quality: QualityFilters,
}

impl FilterPolicy {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            search: settings.search_filters.clone(),
            quality: settings.quality_filters.clone(),
        }
    }

    /// Decide whether `record` should be persisted.
    ///
    /// Property and offer labels are canonicalized here with the same
    /// mapping the store gateway uses, so adapters can emit source-native
    /// text and the policy still lines up with what lands in the store.
    #[must_use]
    pub fn evaluate(&self, record: &ListingRecord) -> Decision {
        if let Some(reason) = self.quality_reject(record) {
            return Decision::Reject(reason);
        }
        if let Some(reason) = self.search_reject(record) {
            return Decision::Reject(reason);
        }
        Decision::Accept
    }

    fn quality_reject(&self, record: &ListingRecord) -> Option<String> {
        let q = &self.quality;

        if q.require_photos && record.photos.len() < q.min_photos {
            return Some(format!(
                "insufficient photos (have {}, need {})",
                record.photos.len(),
                q.min_photos
            ));
        }

        if q.require_price && record.price.is_none() {
            return Some("missing price".to_string());
        }

        if q.require_location && record.location_text.trim().is_empty() {
            return Some("missing location".to_string());
        }

        if q.require_description {
            let len = record.description.as_deref().map_or(0, |d| d.chars().count());
            if len < q.min_description_length {
                return Some(format!(
                    "description too short (min {} chars)",
                    q.min_description_length
                ));
            }
        }

        None
    }

    fn search_reject(&self, record: &ListingRecord) -> Option<String> {
        let s = &self.search;

        if !s.target_districts.is_empty() {
            let location = record.location_text.to_lowercase();
            let matched = s
                .target_districts
                .iter()
                .any(|district| location.contains(&district.to_lowercase()));
            if !matched {
                return Some(format!(
                    "district not in target list: {}",
                    record.location_text
                ));
            }
        }

        let property_type =
            PropertyType::from_text(record.property_type.as_deref().unwrap_or_default());
        let offer_type = OfferType::from_text(record.offer_type.as_deref().unwrap_or_default());

        let stanza = match property_type {
            PropertyType::House => s.houses.as_ref(),
            PropertyType::Land => s.land.as_ref(),
            PropertyType::Apartment => s.apartments.as_ref(),
            PropertyType::Commercial => s.commercial.as_ref(),
            PropertyType::Cottage
            | PropertyType::Industrial
            | PropertyType::Garage
            | PropertyType::Other => None,
        };

        // Missing stanza = no constraint for that property type.
        let Some(stanza) = stanza else {
            return None;
        };

        Self::stanza_reject(stanza, property_type, offer_type, record.price)
    }

    fn stanza_reject(
        stanza: &TypeFilter,
        property_type: PropertyType,
        offer_type: OfferType,
        price: Option<f64>,
    ) -> Option<String> {
        if !stanza.enabled {
            return Some(format!("{property_type} listings disabled"));
        }

        if !stanza.offer_types.is_empty() {
            let allowed = stanza
                .offer_types
                .iter()
                .any(|o| OfferType::from_text(o) == offer_type);
            if !allowed {
                return Some(format!(
                    "offer type {offer_type} not allowed for {property_type}"
                ));
            }
        }

        if let Some(price) = price {
            if let Some(max) = stanza.max_price {
                if price > max {
                    return Some(format!("price {price} exceeds max {max}"));
                }
            }
            if let Some(min) = stanza.min_price {
                if price < min {
                    return Some(format!("price {price} below min {min}"));
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FilterPolicy {
        FilterPolicy::from_settings(&Settings::default())
    }

    fn valid_listing() -> ListingRecord {
        ListingRecord {
            source_code: "REMAX",
            external_id: "423340".to_string(),
            title: "Rodinný dům 5+1".to_string(),
            price: Some(4_000_000.0),
            location_text: "Znojmo, Jihomoravský kraj".to_string(),
            property_type: Some("House".to_string()),
            offer_type: Some("Sale".to_string()),
            photos: vec!["https://example.cz/foto1.jpg".to_string()],
            description: Some("Krásný rodinný dům v klidném prostředí.".to_string()),
            ..ListingRecord::default()
        }
    }

    #[test]
    fn valid_listing_is_accepted() {
        assert_eq!(policy().evaluate(&valid_listing()), Decision::Accept);
    }

    #[test]
    fn listing_without_photos_is_rejected() {
        let mut listing = valid_listing();
        listing.photos.clear();
        let decision = policy().evaluate(&listing);
        assert!(!decision.is_accepted());
        assert!(decision.reason().unwrap().contains("photos"));
    }

    #[test]
    fn photos_not_required_when_disabled() {
        let mut settings = Settings::default();
        settings.quality_filters.require_photos = false;
        let mut listing = valid_listing();
        listing.photos.clear();
        let policy = FilterPolicy::from_settings(&settings);
        assert!(policy.evaluate(&listing).is_accepted());
    }

    #[test]
    fn listing_without_price_is_rejected() {
        let mut listing = valid_listing();
        listing.price = None;
        let decision = policy().evaluate(&listing);
        assert!(decision.reason().unwrap().contains("price"));
    }

    #[test]
    fn listing_without_location_is_rejected() {
        let mut listing = valid_listing();
        listing.location_text = String::new();
        assert!(!policy().evaluate(&listing).is_accepted());
    }

    #[test]
    fn district_substring_match_is_case_insensitive() {
        let mut listing = valid_listing();
        listing.location_text = "okres znojmo".to_string();
        assert!(policy().evaluate(&listing).is_accepted());
    }

    #[test]
    fn wrong_district_is_rejected_with_reason() {
        let mut listing = valid_listing();
        listing.location_text = "Brno, Jihomoravský kraj".to_string();
        // Keep the default policy but widen districts to Znojmo only.
        let mut settings = Settings::default();
        settings.search_filters.target_districts = vec!["Znojmo".to_string()];
        let policy = FilterPolicy::from_settings(&settings);
        let decision = policy.evaluate(&listing);
        assert!(!decision.is_accepted());
        assert!(decision.reason().unwrap().contains("Znojmo") || decision.reason().unwrap().contains("district"));
    }

    #[test]
    fn empty_district_list_admits_any_location() {
        let mut settings = Settings::default();
        settings.search_filters.target_districts.clear();
        let mut listing = valid_listing();
        listing.location_text = "Praha 1".to_string();
        let policy = FilterPolicy::from_settings(&settings);
        assert!(policy.evaluate(&listing).is_accepted());
    }

    #[test]
    fn house_price_at_max_is_inclusive() {
        let mut listing = valid_listing();
        listing.price = Some(8_500_000.0);
        assert!(policy().evaluate(&listing).is_accepted());
    }

    #[test]
    fn house_price_above_max_is_rejected() {
        let mut listing = valid_listing();
        listing.price = Some(9_000_000.0);
        let decision = policy().evaluate(&listing);
        assert!(decision.reason().unwrap().contains("exceeds"));
    }

    #[test]
    fn land_above_band_is_rejected() {
        let mut listing = valid_listing();
        listing.property_type = Some("Pozemek".to_string());
        listing.price = Some(3_000_000.0);
        assert!(!policy().evaluate(&listing).is_accepted());
    }

    #[test]
    fn disabled_stanza_rejects() {
        let mut settings = Settings::default();
        if let Some(houses) = settings.search_filters.houses.as_mut() {
            houses.enabled = false;
        }
        let policy = FilterPolicy::from_settings(&settings);
        assert!(!policy.evaluate(&valid_listing()).is_accepted());
    }

    #[test]
    fn missing_stanza_means_no_constraint() {
        // Default config carries no apartments stanza; an expensive flat
        // passes untouched.
        let mut listing = valid_listing();
        listing.property_type = Some("Byt".to_string());
        listing.price = Some(20_000_000.0);
        assert!(policy().evaluate(&listing).is_accepted());
    }

    #[test]
    fn offer_type_allow_list_is_honored() {
        let mut settings = Settings::default();
        if let Some(houses) = settings.search_filters.houses.as_mut() {
            houses.offer_types = vec!["Sale".to_string()];
        }
        let mut listing = valid_listing();
        listing.offer_type = Some("Pronájem".to_string());
        let policy = FilterPolicy::from_settings(&settings);
        assert!(!policy.evaluate(&listing).is_accepted());
    }

    #[test]
    fn evaluation_is_pure() {
        let listing = valid_listing();
        let policy = policy();
        let first = policy.evaluate(&listing);
        let second = policy.evaluate(&listing);
        assert_eq!(first, second);
    }

    #[test]
    fn quality_failure_wins_over_geo_failure() {
        let mut listing = valid_listing();
        listing.photos.clear();
        listing.location_text = "Brno".to_string();
        let decision = policy().evaluate(&listing);
        assert!(decision.reason().unwrap().contains("photos"));
    }
}
