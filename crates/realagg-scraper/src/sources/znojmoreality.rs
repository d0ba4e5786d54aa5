//! Znojmo Reality adapter (znojmoreality.cz, Realman platform).
//!
//! Four single-page category lists, no pagination; detail URLs end in
//! `-{id}`. GPS is scraped out of the embedded Leaflet map setup.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use realagg_core::ListingRecord;

use crate::context::{RunSummary, ScrapeContext};
use crate::error::ScrapeError;
use crate::parse::{
    absolutize, clean_html_text, extract_h1, extract_hrefs, extract_table_params, parse_area,
    parse_price, table_param,
};

const SOURCE_CODE: &str = "ZNOJMOREALITY";
const BASE_URL: &str = "https://www.znojmoreality.cz";
const PHOTO_CDN: &str = "t.rmcl.cz";

const CATEGORY_PAGES: [(&str, &str); 4] = [
    ("/domy", "Dům"),
    ("/byty", "Byt"),
    ("/pozemky", "Pozemek"),
    ("/ostatni", "Komerční"),
];

pub(super) async fn run(
    ctx: &ScrapeContext,
    _full_rescan: bool,
) -> Result<RunSummary, ScrapeError> {
    // Single-page category lists; a full rescan sees the same inventory.
    let mut summary = RunSummary::default();

    for (path, property_type) in CATEGORY_PAGES {
        let url = format!("{BASE_URL}{path}");
        match ctx.client.get_text(&url).await {
            Ok(html) => {
                let ids = extract_listing_ids(&html);
                tracing::info!(category = path, count = ids.len(), "category listed");
                summary.found += ids.len() as u64;

                for (external_id, detail_url) in ids {
                    match ctx.client.get_text(&detail_url).await {
                        Ok(detail_html) => {
                            let record = parse_detail(
                                &detail_html,
                                &external_id,
                                &detail_url,
                                property_type,
                            );
                            summary.absorb(ctx.save_record(record).await);
                        }
                        Err(e) => {
                            tracing::error!(url = %detail_url, error = %e, "detail fetch failed");
                            summary.failed += 1;
                        }
                    }
                    crate::context::pause_between_requests().await;
                }
            }
            Err(e) => {
                tracing::error!(category = path, error = %e, "category fetch failed");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// Listing links are same-host paths ending in `-{digits}`.
fn extract_listing_ids(html: &str) -> Vec<(String, String)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"-(\d+)/?$").expect("valid id suffix regex"));

    let mut out = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for href in extract_hrefs(html) {
        let full = absolutize(BASE_URL, &href);
        if !full.starts_with(BASE_URL) {
            continue;
        }
        let path = full.trim_end_matches('/');
        let Some(cap) = re.captures(path) else {
            continue;
        };
        let id = cap.get(1).map_or("", |m| m.as_str()).to_string();
        if !id.is_empty() && seen.insert(id.clone()) {
            out.push((id, full));
        }
    }
    out
}

fn parse_detail(
    html: &str,
    external_id: &str,
    url: &str,
    default_property_type: &str,
) -> ListingRecord {
    let mut record = ListingRecord::new(SOURCE_CODE, external_id.to_string());
    record.url = url.to_string();
    record.title = extract_h1(html).unwrap_or_default();
    record.property_type = Some(default_property_type.to_string());

    let title_lower = record.title.to_lowercase();
    record.offer_type = Some(
        if title_lower.contains("pronájem") || title_lower.contains("pronajem") {
            "Pronájem"
        } else {
            "Prodej"
        }
        .to_string(),
    );

    let params = extract_table_params(html);
    record.price = table_param(&params, "cena").and_then(parse_price);
    record.area_built_up = table_param(&params, "užitná plocha").and_then(parse_area);
    record.area_land = table_param(&params, "plocha pozemku").and_then(parse_area);

    let locality = table_param(&params, "lokalita").unwrap_or_default();
    let district = table_param(&params, "okres").unwrap_or_default();
    record.location_text = if locality.is_empty() {
        district.to_string()
    } else {
        locality.to_string()
    };
    if !district.is_empty() {
        record.district = Some(district.to_string());
    }

    record.description = extract_description(html);
    record.photos = extract_photos(html);

    let (lat, lng) = extract_gps(html);
    record.latitude = lat;
    record.longitude = lng;

    record
}

fn extract_description(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)<div[^>]+class=["'][^"']*(?:description|popis)[^"']*["'][^>]*>(.*?)</div>"#)
            .expect("valid description regex")
    });
    let text = clean_html_text(re.captures(html)?.get(1)?.as_str());
    if text.chars().count() < 30 {
        None
    } else {
        Some(text.chars().take(5000).collect())
    }
}

/// Gallery anchors link full-size photos on the Realman CDN.
fn extract_photos(html: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)href=["']([^"']*t\.rmcl\.cz[^"']*)["']"#).expect("valid photo regex")
    });

    let mut photos = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for cap in re.captures_iter(html) {
        let href = cap.get(1).map_or("", |m| m.as_str()).to_string();
        if href.contains(PHOTO_CDN) && seen.insert(href.clone()) {
            photos.push(href);
            if photos.len() >= 20 {
                break;
            }
        }
    }
    photos
}

/// The map widget initializes either `L.marker([lat, lng])` /
/// `setView([lat, lng])` or `data-lat` / `data-lng` attributes.
fn extract_gps(html: &str) -> (Option<f64>, Option<f64>) {
    static MARKER_RE: OnceLock<Regex> = OnceLock::new();
    static LAT_RE: OnceLock<Regex> = OnceLock::new();
    static LNG_RE: OnceLock<Regex> = OnceLock::new();

    let marker = MARKER_RE.get_or_init(|| {
        Regex::new(r"(?:L\.marker|setView)\(\[([0-9.]+),\s*([0-9.]+)\]")
            .expect("valid marker regex")
    });
    if let Some(cap) = marker.captures(html) {
        let lat = cap.get(1).and_then(|m| m.as_str().parse().ok());
        let lng = cap.get(2).and_then(|m| m.as_str().parse().ok());
        return (lat, lng);
    }

    let lat_re = LAT_RE
        .get_or_init(|| Regex::new(r#"data-lat=["']([0-9.]+)["']"#).expect("valid lat regex"));
    let lng_re = LNG_RE
        .get_or_init(|| Regex::new(r#"data-lng=["']([0-9.]+)["']"#).expect("valid lng regex"));
    let lat = lat_re
        .captures(html)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse().ok());
    let lng = lng_re
        .captures(html)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse().ok());
    match (lat, lng) {
        (Some(lat), Some(lng)) => (Some(lat), Some(lng)),
        _ => (None, None),
    }
}
