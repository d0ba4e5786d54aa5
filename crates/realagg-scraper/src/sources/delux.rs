//! DeluXreality adapter (deluxreality.cz, WordPress).
//!
//! Single listing index at `/nemovitosti/`, detail slugs under
//! `/nemovitost/`. Full-size photos are linked from bare anchors into
//! `wp-content/uploads`.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use realagg_core::ListingRecord;

use crate::context::{RunSummary, ScrapeContext};
use crate::error::ScrapeError;
use crate::parse::{
    absolutize, clean_html_text, extract_h1, extract_hrefs, extract_price_czk, parse_area,
};

const SOURCE_CODE: &str = "DELUXREALITY";
const BASE_URL: &str = "https://deluxreality.cz";

fn offer_type_from(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if lower.contains("pronájem") || lower.contains("pronajem") {
        "Rent"
    } else {
        "Sale"
    }
}

fn property_type_from(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    // Stems rather than full words: Czech declension bends the endings
    // ("domu", "chaty", "rodinného").
    let pairs: [(&str, &str); 17] = [
        ("byt", "Apartment"),
        ("apartmán", "Apartment"),
        ("dům", "House"),
        ("dom", "House"),
        ("rodinn", "House"),
        ("vila", "House"),
        ("pozem", "Land"),
        ("parcel", "Land"),
        ("zahrad", "Land"),
        ("stavební", "Land"),
        ("komerč", "Commercial"),
        ("sklad", "Commercial"),
        ("kancelář", "Commercial"),
        ("chat", "Cottage"),
        ("chalup", "Cottage"),
        ("rekrea", "Cottage"),
        ("horsk", "Cottage"),
    ];
    for (keyword, mapped) in pairs {
        if lower.contains(keyword) {
            return mapped;
        }
    }
    "Other"
}

pub(super) async fn run(
    ctx: &ScrapeContext,
    _full_rescan: bool,
) -> Result<RunSummary, ScrapeError> {
    // One unpaginated index page; rescan mode makes no difference.
    let mut summary = RunSummary::default();

    let index_url = format!("{BASE_URL}/nemovitosti/");
    let html = ctx.client.get_text(&index_url).await?;
    let urls = extract_listing_urls(&html);
    tracing::info!(count = urls.len(), "listings discovered");
    summary.found = urls.len() as u64;

    for url in urls {
        match ctx.client.get_text(&url).await {
            Ok(detail_html) => match parse_detail(&detail_html, &url) {
                Some(record) => summary.absorb(ctx.save_record(record).await),
                None => {
                    tracing::warn!(url, "detail did not parse");
                    summary.failed += 1;
                }
            },
            Err(e) => {
                tracing::error!(url, error = %e, "detail fetch failed");
                summary.failed += 1;
            }
        }
        crate::context::pause_between_requests().await;
    }

    Ok(summary)
}

fn extract_listing_urls(html: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for href in extract_hrefs(html) {
        if !href.contains("/nemovitost/") {
            continue;
        }
        let full = absolutize(BASE_URL, &href);
        if full.trim_end_matches('/').ends_with("/nemovitosti") {
            continue;
        }
        if seen.insert(full.clone()) {
            urls.push(full);
        }
    }
    urls
}

fn slug_from_url(url: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re =
        RE.get_or_init(|| Regex::new(r"/nemovitost/([^/]+)/?$").expect("valid slug regex"));
    re.captures(url)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

fn parse_detail(html: &str, url: &str) -> Option<ListingRecord> {
    let title = extract_h1(html)?;
    let external_id = slug_from_url(url).unwrap_or_else(|| url.to_string());

    let h2 = extract_h2(html).unwrap_or_default();
    let type_context = format!("{title} {h2}");

    let mut record = ListingRecord::new(SOURCE_CODE, external_id);
    record.url = url.to_string();
    record.offer_type = Some(offer_type_from(&type_context).to_string());
    record.property_type = Some(property_type_from(&type_context).to_string());
    record.price = extract_price_czk(html);
    record.area_built_up = extract_area(html);
    record.location_text = extract_location(html);
    record.description = extract_description(html);
    record.photos = extract_photos(html);
    record.title = title;

    Some(record)
}

fn extract_h2(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?is)<h2[^>]*>(.*?)</h2>").expect("valid h2 regex"));
    let text = clean_html_text(re.captures(html)?.get(1)?.as_str());
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// "plocha bytu: XX m²"-style rows, or any standalone plausible area.
fn extract_area(html: &str) -> Option<f64> {
    static LABELED_RE: OnceLock<Regex> = OnceLock::new();
    static BARE_RE: OnceLock<Regex> = OnceLock::new();

    let labeled = LABELED_RE.get_or_init(|| {
        Regex::new(r"(?i)(?:plocha bytu|užitná plocha|plocha domu)\s*:?\s*([\d\s\u{a0}]+)\s*m")
            .expect("valid labeled area regex")
    });
    let text = clean_html_text(html);
    if let Some(cap) = labeled.captures(&text) {
        return parse_area(cap.get(1).map_or("", |m| m.as_str()));
    }

    let bare = BARE_RE.get_or_init(|| {
        Regex::new(r"(\d{2,4})\s*m[²2]").expect("valid bare area regex")
    });
    for cap in bare.captures_iter(&text) {
        if let Some(value) = parse_area(cap.get(1).map_or("", |m| m.as_str())) {
            if value > 10.0 && value < 2000.0 {
                return Some(value);
            }
        }
    }
    None
}

/// The page rarely labels the address; fall back to the first short text
/// mentioning a municipality from the agency's home turf.
fn extract_location(html: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)[^<>]*(?:Znojmo|Hevlín|Šatov|Vrbovec|Mikulovice|Hnanice)[^<>]*")
            .expect("valid locality regex")
    });

    for m in re.find_iter(html) {
        let text = clean_html_text(m.as_str());
        let len = text.chars().count();
        if len > 3 && len < 80 {
            return text;
        }
    }
    "Znojmo".to_string()
}

fn extract_description(html: &str) -> Option<String> {
    static P_RE: OnceLock<Regex> = OnceLock::new();
    let p_re =
        P_RE.get_or_init(|| Regex::new(r"(?is)<p[^>]*>(.*?)</p>").expect("valid paragraph regex"));

    let paragraphs: Vec<String> = p_re
        .captures_iter(html)
        .filter_map(|cap| {
            let text = clean_html_text(cap.get(1).map_or("", |m| m.as_str()));
            if text.chars().count() > 80 {
                Some(text)
            } else {
                None
            }
        })
        .take(6)
        .collect();
    if paragraphs.is_empty() {
        return None;
    }
    Some(paragraphs.join("\n\n").chars().take(5000).collect())
}

fn extract_photos(html: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)<a[^>]+href=["']([^"']*wp-content/uploads[^"']*\.(?:jpg|jpeg|png|webp))["']"#)
            .expect("valid photo anchor regex")
    });

    let mut photos = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for cap in re.captures_iter(html) {
        let href = cap.get(1).map_or("", |m| m.as_str()).to_string();
        if seen.insert(href.clone()) {
            photos.push(href);
            if photos.len() >= 20 {
                break;
            }
        }
    }
    photos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_links_point_at_details_only() {
        let html = r#"
<a href="/nemovitost/prodej-bytu-znojmo/">Byt</a>
<a href="/nemovitost/prodej-bytu-znojmo/">Duplikát</a>
<a href="/nemovitosti/">Výpis</a>
"#;
        let urls = extract_listing_urls(html);
        assert_eq!(urls.len(), 1);
        assert!(urls[0].ends_with("/nemovitost/prodej-bytu-znojmo/"));
    }

    #[test]
    fn slug_is_extracted_from_url() {
        assert_eq!(
            slug_from_url("https://deluxreality.cz/nemovitost/prodej-bytu-znojmo/"),
            Some("prodej-bytu-znojmo".to_string())
        );
        assert_eq!(slug_from_url("https://deluxreality.cz/kontakt/"), None);
    }

    #[test]
    fn type_maps_honor_czech_keywords() {
        assert_eq!(property_type_from("Prodej bytu 2+kk"), "Apartment");
        assert_eq!(property_type_from("Prodej chaty s vinohradem"), "Cottage");
        assert_eq!(offer_type_from("Pronájem kanceláře"), "Rent");
        assert_eq!(offer_type_from("Prodej domu"), "Sale");
    }

    #[test]
    fn detail_parses_wordpress_markup() {
        let html = r#"<html>
<h1>Prodej rodinného domu Hevlín</h1>
<h2>Prodej</h2>
<h3>Cena</h3>
<div>4 890 000 Kč</div>
<p>Nabízíme exkluzivně k prodeji rodinný dům v obci Hevlín s dispozicí 4+1, plocha domu: 145 m², pozemek 520 m². Dům je po částečné rekonstrukci.</p>
<a href="https://deluxreality.cz/2019/wp-content/uploads/2024/03/hevlin-01.jpg"></a>
<a href="https://deluxreality.cz/2019/wp-content/uploads/2024/03/hevlin-01.jpg"></a>
</html>"#;

        let record = parse_detail(html, "https://deluxreality.cz/nemovitost/prodej-domu-hevlin/")
            .expect("parses");
        assert_eq!(record.external_id, "prodej-domu-hevlin");
        assert_eq!(record.property_type.as_deref(), Some("House"));
        assert_eq!(record.offer_type.as_deref(), Some("Sale"));
        assert_eq!(record.price, Some(4_890_000.0));
        assert_eq!(record.area_built_up, Some(145.0));
        assert!(record.location_text.contains("Hevlín"));
        assert_eq!(record.photos.len(), 1);
    }

    #[test]
    fn page_without_title_is_rejected() {
        assert!(parse_detail("<html></html>", "https://deluxreality.cz/nemovitost/x/").is_none());
    }
}
