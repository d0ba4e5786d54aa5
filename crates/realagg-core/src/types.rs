//! Canonical property and offer classifications.
//!
//! Adapters emit whatever text their portal uses (Czech labels, English
//! platform constants, URL slugs); the mapping to these enums happens once,
//! at the store-gateway boundary.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    House,
    Apartment,
    Land,
    Cottage,
    Commercial,
    Industrial,
    Garage,
    Other,
}

impl PropertyType {
    /// Maps a free-form property label (Czech or canonical English) to the
    /// enum. Unrecognized values fall through to [`PropertyType::Other`].
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let lower = text.trim().to_lowercase();
        match lower.as_str() {
            "dům" | "dum" | "house" => Self::House,
            "byt" | "apartment" | "flat" => Self::Apartment,
            "pozemek" | "land" => Self::Land,
            "chata" | "chalupa" | "cottage" => Self::Cottage,
            "komerční" | "komercni" | "commercial" => Self::Commercial,
            "průmyslový" | "prumyslovy" | "industrial" => Self::Industrial,
            "garáž" | "garaz" | "garage" => Self::Garage,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::House => "House",
            Self::Apartment => "Apartment",
            Self::Land => "Land",
            Self::Cottage => "Cottage",
            Self::Commercial => "Commercial",
            Self::Industrial => "Industrial",
            Self::Garage => "Garage",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferType {
    Sale,
    Rent,
    Auction,
}

impl OfferType {
    /// Maps a free-form offer label to the enum. Rentals are recognized with
    /// and without diacritics ("pronájem", "Pronajem", "pronajmu"); auctions
    /// via "dražba"; anything else defaults to [`OfferType::Sale`].
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let lower = text.trim().to_lowercase();
        if lower.contains("pronáj") || lower.contains("pronaj") || lower == "rent" {
            Self::Rent
        } else if lower.contains("dražb") || lower.contains("drazb") || lower == "auction" {
            Self::Auction
        } else {
            Self::Sale
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sale => "Sale",
            Self::Rent => "Rent",
            Self::Auction => "Auction",
        }
    }
}

impl std::fmt::Display for OfferType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn czech_property_labels_map_to_canonical() {
        assert_eq!(PropertyType::from_text("Dům"), PropertyType::House);
        assert_eq!(PropertyType::from_text("Byt"), PropertyType::Apartment);
        assert_eq!(PropertyType::from_text("Pozemek"), PropertyType::Land);
        assert_eq!(PropertyType::from_text("Chata"), PropertyType::Cottage);
        assert_eq!(PropertyType::from_text("Garáž"), PropertyType::Garage);
    }

    #[test]
    fn english_property_labels_are_idempotent() {
        assert_eq!(PropertyType::from_text("House"), PropertyType::House);
        assert_eq!(PropertyType::from_text("Commercial"), PropertyType::Commercial);
    }

    #[test]
    fn unknown_property_label_is_other() {
        assert_eq!(PropertyType::from_text("Hrad"), PropertyType::Other);
        assert_eq!(PropertyType::from_text(""), PropertyType::Other);
    }

    #[test]
    fn rent_is_recognized_with_and_without_diacritics() {
        assert_eq!(OfferType::from_text("pronájem"), OfferType::Rent);
        assert_eq!(OfferType::from_text("Pronajem"), OfferType::Rent);
        assert_eq!(OfferType::from_text("pronajmu ihned"), OfferType::Rent);
    }

    #[test]
    fn anything_else_defaults_to_sale() {
        assert_eq!(OfferType::from_text("Prodej"), OfferType::Sale);
        assert_eq!(OfferType::from_text(""), OfferType::Sale);
        assert_eq!(OfferType::from_text("PRODEJ"), OfferType::Sale);
    }

    #[test]
    fn auction_maps_from_drazba() {
        assert_eq!(OfferType::from_text("Dražba"), OfferType::Auction);
    }
}
