//! Ingest-time field inference over title and description.
//!
//! Fills `disposition`, `rooms`, `condition`, and `construction_type` when
//! the adapter left them unset. Adapter-provided values are never
//! overwritten.

use std::sync::OnceLock;

use regex::Regex;

use realagg_core::ListingRecord;

fn disposition_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\+(kk|KK|1)").expect("valid disposition regex"))
}

/// Infer the missing descriptive fields on `record` in place.
pub fn enrich_listing_fields(record: &mut ListingRecord) {
    let haystack = format!(
        "{} {}",
        record.title,
        record.description.as_deref().unwrap_or_default()
    );
    let lower = haystack.to_lowercase();

    if record.disposition.is_none() {
        if let Some(cap) = disposition_re().captures(&haystack) {
            let rooms: Option<i32> = cap.get(1).and_then(|m| m.as_str().parse().ok());
            let suffix = cap.get(2).map_or("1", |m| m.as_str());
            let disposition = format!(
                "{}+{}",
                cap.get(1).map_or("", |m| m.as_str()),
                suffix.to_uppercase()
            );
            record.disposition = Some(disposition);
            if record.rooms.is_none() {
                record.rooms = rooms;
            }
        }
    }

    if record.condition.is_none() {
        record.condition = infer_condition(&lower).map(str::to_string);
    }

    if record.construction_type.is_none() {
        record.construction_type = infer_construction(&lower).map(str::to_string);
    }
}

/// "k rekonstrukci" / "vyžaduje rekonstrukci" must win over the bare
/// "rekonstrukce" substring, so the pre-reconstruction checks come first.
fn infer_condition(lower: &str) -> Option<&'static str> {
    if lower.contains("novostavb") {
        return Some("Novostavba");
    }
    if lower.contains("k rekonstrukci")
        || lower.contains("vyžaduje rekonstrukci")
        || lower.contains("vyzaduje rekonstrukci")
        || lower.contains("před rekonstrukcí")
        || lower.contains("pred rekonstrukci")
    {
        return Some("Před rekonstrukcí");
    }
    if lower.contains("po rekonstrukci") || lower.contains("po kompletní rekonstrukci") {
        return Some("Po rekonstrukci");
    }
    if lower.contains("dobrý stav") || lower.contains("dobry stav") {
        return Some("Dobrý stav");
    }
    None
}

fn infer_construction(lower: &str) -> Option<&'static str> {
    if lower.contains("cihl") {
        return Some("Cihla");
    }
    if lower.contains("panel") {
        return Some("Panel");
    }
    if lower.contains("dřevostavb") || lower.contains("drevostavb") || lower.contains("dřevěn") {
        return Some("Dřevo");
    }
    None
}
