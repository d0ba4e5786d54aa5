//! Lexamo adapter (lexamo.cz, Webflow CMS).
//!
//! Listings render on the homepage with a Webflow collection pager
//! (`?65cdb0cc_page=N`); detail URLs live under `/realman-listing/` and end
//! in a numeric id. Photos come from the Webflow CDN.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use realagg_core::ListingRecord;

use crate::context::{RunSummary, ScrapeContext};
use crate::error::ScrapeError;
use crate::parse::{absolutize, clean_html_text, extract_hrefs, extract_img_srcs};

const SOURCE_CODE: &str = "LEXAMO";
const BASE_URL: &str = "https://www.lexamo.cz";
const MAX_PAGER_PAGES: u32 = 20;

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
    let pairs: [(&str, &str); 15] = [
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
        ("kancelář", "Commercial"),
        ("chat", "Cottage"),
        ("chalup", "Cottage"),
        ("rekrea", "Cottage"),
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
    // The pager walks the whole CMS collection in both modes.
    let mut summary = RunSummary::default();

    let mut urls: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for page in 1..=MAX_PAGER_PAGES {
        let page_url = if page == 1 {
            format!("{BASE_URL}/")
        } else {
            format!("{BASE_URL}/?65cdb0cc_page={page}")
        };
        let html = ctx.client.get_text(&page_url).await?;

        let mut new_found = false;
        for href in extract_hrefs(&html) {
            if !href.contains("/realman-listing/") {
                continue;
            }
            let full = absolutize(BASE_URL, &href);
            if seen.insert(full.clone()) {
                urls.push(full);
                new_found = true;
            }
        }
        if !new_found {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    tracing::info!(count = urls.len(), "listings discovered");
    summary.found = urls.len() as u64;

    for url in urls {
        match ctx.client.get_text(&url).await {
            Ok(html) => match parse_detail(&html, &url) {
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

fn external_id_from_url(url: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"-(\d+)/?$").expect("valid id regex"));
    re.captures(url.trim_end_matches('/'))
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

fn headings(html: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?is)<h[1-4][^>]*>(.*?)</h[1-4]>").expect("valid heading regex")
    });
    re.captures_iter(html)
        .filter_map(|cap| {
            let text = clean_html_text(cap.get(1).map_or("", |m| m.as_str()));
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        })
        .collect()
}

fn parse_detail(html: &str, url: &str) -> Option<ListingRecord> {
    static OFFER_RE: OnceLock<Regex> = OnceLock::new();
    let offer_re = OFFER_RE
        .get_or_init(|| Regex::new(r"(?i)prodej|pronájem|pronajem").expect("valid offer regex"));

    let all_headings = headings(html);
    let title = all_headings
        .iter()
        .find(|h| offer_re.is_match(h) && h.chars().count() > 5)?
        .clone();

    let external_id = external_id_from_url(url).unwrap_or_else(|| url.to_string());
    let mut record = ListingRecord::new(SOURCE_CODE, external_id);
    record.url = url.to_string();
    record.offer_type = Some(offer_type_from(&title).to_string());
    record.property_type = Some(property_type_from(&format!("{title} {url}")).to_string());
    record.price = heading_price(&all_headings);
    record.location_text = location_heading(&all_headings, &title).unwrap_or_default();

    let params = extract_params(html);
    record.area_built_up = params.0.or(params.1);
    record.description = extract_description(html);
    record.photos = extract_photos(html);
    record.title = title;

    Some(record)
}

/// The asking price is itself a heading ("5 490 000 Kč").
fn heading_price(all_headings: &[String]) -> Option<f64> {
    for heading in all_headings {
        if heading.contains("Kč") {
            let digits: String = heading.chars().filter(char::is_ascii_digit).collect();
            if let Ok(price) = digits.parse::<f64>() {
                if price > 1000.0 {
                    return Some(price);
                }
            }
        }
    }
    None
}

/// The location is the next short heading after the title that is neither
/// a price nor another offer line.
fn location_heading(all_headings: &[String], title: &str) -> Option<String> {
    static OFFER_RE: OnceLock<Regex> = OnceLock::new();
    let offer_re = OFFER_RE
        .get_or_init(|| Regex::new(r"(?i)prodej|pronájem|pronajem").expect("valid offer regex"));

    let start = all_headings.iter().position(|h| h == title)?;
    all_headings
        .iter()
        .skip(start + 1)
        .take(3)
        .find(|h| !h.contains("Kč") && h.chars().count() < 80 && !offer_re.is_match(h))
        .cloned()
}

/// "Užitná plocha 175 m²" / "Celková plocha 2.059 m²" rows.
fn extract_params(html: &str) -> (Option<f64>, Option<f64>) {
    static USABLE_RE: OnceLock<Regex> = OnceLock::new();
    static TOTAL_RE: OnceLock<Regex> = OnceLock::new();

    let text = clean_html_text(html);
    let usable = USABLE_RE.get_or_init(|| {
        Regex::new(r"(?i)Užitná plocha\s+([0-9][0-9\s.,\u{a0}]*)\s*m").expect("valid usable regex")
    });
    let total = TOTAL_RE.get_or_init(|| {
        Regex::new(r"(?i)Celková plocha\s+([0-9][0-9\s.,\u{a0}]*)\s*m").expect("valid total regex")
    });

    let parse_czech_number = |raw: &str| -> Option<f64> {
        // Thousands separators arrive as dots or thin spaces: "2.059" = 2059.
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return None;
        }
        digits.parse().ok()
    };

    let usable_area = usable
        .captures(&text)
        .and_then(|cap| cap.get(1))
        .and_then(|m| parse_czech_number(m.as_str()));
    let total_area = total
        .captures(&text)
        .and_then(|cap| cap.get(1))
        .and_then(|m| parse_czech_number(m.as_str()));

    (usable_area, total_area)
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
        .take(8)
        .collect();
    if paragraphs.is_empty() {
        return None;
    }
    Some(paragraphs.join("\n\n").chars().take(5000).collect())
}

/// Webflow CDN images, with icons and logos filtered out.
fn extract_photos(html: &str) -> Vec<String> {
    let mut photos = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for src in extract_img_srcs(html) {
        let lower = src.to_lowercase();
        if !lower.contains("website-files.com") {
            continue;
        }
        if lower.ends_with(".svg") || lower.contains("icon") || lower.contains("logo") {
            continue;
        }
        if seen.insert(src.clone()) {
            photos.push(src);
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

    const DETAIL_HTML: &str = r#"<html>
<h1>Prodej rodinného domu 5+1 Morašice</h1>
<h2>Morašice</h2>
<h2>5 490 000 Kč</h2>
<div>Užitná plocha 175 m²  Celková plocha 2.059 m²</div>
<p>Nabízíme k prodeji prostorný rodinný dům v obci Morašice, okres Znojmo, s rozlehlou zahradou a vinným sklepem za domem.</p>
<img src="https://assets.website-files.com/64f/house-01.jpg">
<img src="https://assets.website-files.com/64f/icon-phone.svg">
"#;

    #[test]
    fn title_is_the_offer_heading() {
        let record = parse_detail(
            DETAIL_HTML,
            "https://www.lexamo.cz/realman-listing/prodej-domu-morasice-3411",
        )
        .expect("parses");
        assert_eq!(record.title, "Prodej rodinného domu 5+1 Morašice");
        assert_eq!(record.external_id, "3411");
    }

    #[test]
    fn location_is_the_following_short_heading() {
        let record = parse_detail(
            DETAIL_HTML,
            "https://www.lexamo.cz/realman-listing/prodej-domu-morasice-3411",
        )
        .expect("parses");
        assert_eq!(record.location_text, "Morašice");
    }

    #[test]
    fn price_comes_from_heading() {
        let record = parse_detail(
            DETAIL_HTML,
            "https://www.lexamo.cz/realman-listing/prodej-domu-morasice-3411",
        )
        .expect("parses");
        assert_eq!(record.price, Some(5_490_000.0));
    }

    #[test]
    fn czech_thousands_dot_is_not_a_decimal_point() {
        let (usable, total) = extract_params(DETAIL_HTML);
        assert_eq!(usable, Some(175.0));
        assert_eq!(total, Some(2059.0));
    }

    #[test]
    fn webflow_icons_are_not_photos() {
        let photos = extract_photos(DETAIL_HTML);
        assert_eq!(
            photos,
            vec!["https://assets.website-files.com/64f/house-01.jpg".to_string()]
        );
    }

    #[test]
    fn page_without_offer_heading_is_rejected() {
        assert!(parse_detail("<h1>O nás</h1>", "https://www.lexamo.cz/realman-listing/x-1").is_none());
    }

    #[test]
    fn type_stems_cover_declensions() {
        assert_eq!(property_type_from("Prodej domu Morašice"), "House");
        assert_eq!(property_type_from("Specifický pozemek"), "Land");
        assert_eq!(offer_type_from("Pronájem bytu"), "Rent");
    }
}
