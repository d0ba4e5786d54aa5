//! CENTURY 21 adapter (century21.cz).
//!
//! Server-rendered search with a JSON filter document in the query string.
//! Discovery walks a fixed set of property/offer configurations for the
//! target county, collecting detail URLs until a page repeats itself or
//! comes back short. Detail pages carry a `label | value` parameter table.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use realagg_core::ListingRecord;

use crate::context::{RunSummary, ScrapeContext};
use crate::error::ScrapeError;
use crate::parse::{
    absolutize, clean_html_text, extract_hrefs, extract_table_params, parse_area, table_param,
};

const SOURCE_CODE: &str = "CENTURY21";
const BASE_URL: &str = "https://www.century21.cz";
const SEARCH_PATH: &str = "/nemovitosti";
const FULL_PAGE_SIZE: usize = 12;

/// (property type filter, listing type filter)
const SEARCH_CONFIGS: [(&str, &str); 7] = [
    ("HOUSE", "SALE"),
    ("HOUSE", "RENT"),
    ("FLAT", "SALE"),
    ("FLAT", "RENT"),
    ("LAND", "SALE"),
    ("COMMERCIAL", "SALE"),
    ("GARAGE", "SALE"),
];

fn table_property_type(category: &str) -> Option<&'static str> {
    let lower = category.to_lowercase();
    let mapped = if lower.contains("byt") {
        "Byt"
    } else if lower.contains("dům") || lower.contains("dum") || lower.contains("vila") {
        "Dům"
    } else if lower.contains("pozem") {
        "Pozemek"
    } else if lower.contains("komerč") || lower.contains("kancelář") || lower.contains("sklad") {
        "Komerční"
    } else if lower.contains("chat") || lower.contains("chalup") || lower.contains("rekrea") {
        "Chata"
    } else if lower.contains("garáž") || lower.contains("garaz") {
        "Garáž"
    } else {
        return None;
    };
    Some(mapped)
}

fn url_property_type(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    if lower.contains("-domy-") || lower.contains("-dum-") || lower.contains("-rodinny-") {
        "Dům"
    } else if lower.contains("-byty-") || lower.contains("-byt-") {
        "Byt"
    } else if lower.contains("-pozemky-") || lower.contains("-pozemek-") {
        "Pozemek"
    } else if lower.contains("-komercni-") || lower.contains("-kancelar") {
        "Komerční"
    } else if lower.contains("-chata") || lower.contains("-chalupa") {
        "Chata"
    } else {
        "Ostatní"
    }
}

pub(super) async fn run(
    ctx: &ScrapeContext,
    full_rescan: bool,
) -> Result<RunSummary, ScrapeError> {
    let max_pages: u32 = if full_rescan { 50 } else { 5 };
    let mut summary = RunSummary::default();

    let mut detail_urls: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (property_type, listing_type) in SEARCH_CONFIGS {
        match collect_urls_for_config(ctx, property_type, listing_type, max_pages).await {
            Ok(urls) => {
                tracing::info!(
                    property_type,
                    listing_type,
                    count = urls.len(),
                    "search config collected"
                );
                for url in urls {
                    if seen.insert(url.clone()) {
                        detail_urls.push(url);
                    }
                }
            }
            Err(e) => {
                tracing::error!(property_type, listing_type, error = %e, "search config failed");
            }
        }
    }

    tracing::info!(count = detail_urls.len(), "unique listings discovered");
    summary.found = detail_urls.len() as u64;

    for url in detail_urls {
        match ctx.client.get_text(&url).await {
            Ok(html) => match parse_detail(&html, &url) {
                Some(record) => summary.absorb(ctx.save_record(record).await),
                None => {
                    tracing::warn!(url, "detail did not parse");
                    summary.failed += 1;
                }
            },
            Err(e) => {
                tracing::warn!(url, error = %e, "detail fetch failed");
                summary.failed += 1;
            }
        }
        crate::context::pause_between_requests().await;
    }

    Ok(summary)
}

async fn collect_urls_for_config(
    ctx: &ScrapeContext,
    property_type: &str,
    listing_type: &str,
    max_pages: u32,
) -> Result<Vec<String>, ScrapeError> {
    let mut urls: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for page in 1..=max_pages {
        let url = search_url(property_type, listing_type, page);
        let html = ctx.client.get_text(&url).await?;

        if zero_results(&html) {
            break;
        }

        let page_urls = extract_detail_urls(&html);
        if page_urls.is_empty() {
            break;
        }

        let new_urls: Vec<String> = page_urls
            .iter()
            .filter(|u| !seen.contains(*u))
            .cloned()
            .collect();
        if new_urls.is_empty() {
            // The search served a page we already have; past the end.
            break;
        }

        seen.extend(new_urls.iter().cloned());
        urls.extend(new_urls);

        if page_urls.len() < FULL_PAGE_SIZE {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    Ok(urls)
}

/// The filter document travels URL-encoded in the `filter` query param.
fn search_url(property_type: &str, listing_type: &str, page: u32) -> String {
    let filter = serde_json::json!({
        "regions": ["Jihomoravský"],
        "country": [],
        "county": ["Znojmo"],
        "district": [],
        "propertyType": [property_type],
        "listingType": listing_type,
        "isAbroad": false,
        "construction": [],
        "disposition": [],
        "condition": [],
        "ownershipType": [],
        "energy": [],
    });

    let encoded = percent_encoding::utf8_percent_encode(
        &filter.to_string(),
        percent_encoding::NON_ALPHANUMERIC,
    )
    .to_string();

    if page > 1 {
        format!("{BASE_URL}{SEARCH_PATH}?filter={encoded}&page={page}")
    } else {
        format!("{BASE_URL}{SEARCH_PATH}?filter={encoded}")
    }
}

fn zero_results(html: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)(\d+)\s+NEMOVITOST").expect("valid count regex"));
    re.captures(html)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .is_some_and(|count| count == 0)
}

/// Detail links live under `/nemovitosti/` and carry an `id=` UUID; gallery
/// and navigation links do not.
fn extract_detail_urls(html: &str) -> Vec<String> {
    let mut urls = Vec::new();
    for href in extract_hrefs(html) {
        if !href.contains("/nemovitosti/") || !href.contains("id=") {
            continue;
        }
        if href.trim_end_matches('/').ends_with("/nemovitosti") {
            continue;
        }
        let full = absolutize(BASE_URL, &href);
        if !urls.contains(&full) {
            urls.push(full);
        }
    }
    urls
}

fn parse_detail(html: &str, url: &str) -> Option<ListingRecord> {
    static UUID_RE: OnceLock<Regex> = OnceLock::new();
    let uuid_re = UUID_RE
        .get_or_init(|| Regex::new(r"(?i)id=([0-9a-f-]{36})").expect("valid uuid regex"));

    let external_id = uuid_re
        .captures(url)
        .and_then(|cap| cap.get(1))
        .map_or_else(|| url.to_string(), |m| m.as_str().to_string());

    let title = extract_title(html)?;

    let params = extract_table_params(html);
    let mut record = ListingRecord::new(SOURCE_CODE, external_id);
    record.url = url.to_string();
    record.price = crate::parse::extract_price_czk(html);

    record.offer_type = Some(
        if url.contains("/pronajem-") {
            "Pronájem"
        } else {
            "Prodej"
        }
        .to_string(),
    );

    record.property_type = Some(
        table_param(&params, "kategorie")
            .and_then(table_property_type)
            .unwrap_or_else(|| url_property_type(url))
            .to_string(),
    );

    for key in ["plocha užitná", "plocha", "velikost bytu"] {
        if let Some(value) = table_param(&params, key) {
            if let Some(area) = parse_area(value) {
                record.area_built_up = Some(area);
                break;
            }
        }
    }
    if let Some(value) = table_param(&params, "plocha pozemku") {
        record.area_land = parse_area(value);
    }

    let disposition = table_param(&params, "velikost").unwrap_or_default();
    record.title = if !disposition.is_empty() && !title.contains(disposition) {
        format!("{title} ({disposition})")
    } else {
        title
    };

    let mut location = table_param(&params, "lokalita")
        .or_else(|| table_param(&params, "obec"))
        .unwrap_or_default()
        .to_string();
    // Every hit comes from the county filter, but the table only names the
    // municipality; make sure the district filter can still match.
    let lower = location.to_lowercase();
    if location.is_empty() {
        location = "okres Znojmo".to_string();
    } else if !lower.contains("znojmo") && !lower.contains("jihomoravsk") {
        location = format!("{location}, okres Znojmo");
    }
    record.location_text = location;

    record.description = extract_description(html);
    record.photos = extract_photos(html);

    Some(record)
}

fn extract_title(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?is)<(h[123])[^>]*>(.*?)</h[123]>").expect("valid heading regex")
    });

    for cap in re.captures_iter(html) {
        let text = clean_html_text(cap.get(2).map_or("", |m| m.as_str()));
        if text.chars().count() > 5 && !text.to_lowercase().contains("cookie") {
            return Some(text);
        }
    }
    None
}

/// The main description sits in a Tailwind `whitespace-break-spaces` div;
/// paragraphs and og:description are fallbacks.
fn extract_description(html: &str) -> Option<String> {
    static BREAK_RE: OnceLock<Regex> = OnceLock::new();
    static P_RE: OnceLock<Regex> = OnceLock::new();
    static OG_RE: OnceLock<Regex> = OnceLock::new();

    let break_re = BREAK_RE.get_or_init(|| {
        Regex::new(r#"(?is)<div[^>]+class=["'][^"']*whitespace-break[^"']*["'][^>]*>(.*?)</div>"#)
            .expect("valid description regex")
    });
    if let Some(cap) = break_re.captures(html) {
        let text = clean_html_text(cap.get(1).map_or("", |m| m.as_str()));
        if text.chars().count() > 50 {
            return Some(text.chars().take(5000).collect());
        }
    }

    let p_re =
        P_RE.get_or_init(|| Regex::new(r"(?is)<p[^>]*>(.*?)</p>").expect("valid paragraph regex"));
    let paragraphs: Vec<String> = p_re
        .captures_iter(html)
        .filter_map(|cap| {
            let text = clean_html_text(cap.get(1).map_or("", |m| m.as_str()));
            let lower = text.to_lowercase();
            if text.chars().count() > 50
                && !lower.contains("cookie")
                && !lower.contains("souhlas")
                && !lower.contains("práva")
            {
                Some(text)
            } else {
                None
            }
        })
        .take(8)
        .collect();
    if !paragraphs.is_empty() {
        return Some(paragraphs.join("\n\n"));
    }

    let og_re = OG_RE.get_or_init(|| {
        Regex::new(r#"(?is)<meta[^>]+property=["']og:description["'][^>]+content=["'](.*?)["']"#)
            .expect("valid og regex")
    });
    let content = clean_html_text(og_re.captures(html)?.get(1)?.as_str());
    if content.chars().count() > 20 {
        Some(content)
    } else {
        None
    }
}

/// Photos live on the igluu CDN; real assets have a UUID in the file path,
/// thumbnails do not.
fn extract_photos(html: &str) -> Vec<String> {
    static SRC_RE: OnceLock<Regex> = OnceLock::new();
    static UUID_PATH_RE: OnceLock<Regex> = OnceLock::new();

    let src_re = SRC_RE.get_or_init(|| {
        Regex::new(r#"(?is)(?:src|href)=["']([^"']*igluu\.cz[^"']*)["']"#)
            .expect("valid igluu regex")
    });
    let uuid_path_re = UUID_PATH_RE
        .get_or_init(|| Regex::new(r"(?i)file/[0-9a-f-]{36}").expect("valid uuid path regex"));

    let mut photos: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for cap in src_re.captures_iter(html) {
        let src = cap.get(1).map_or("", |m| m.as_str()).trim().to_string();
        if src.is_empty() || !uuid_path_re.is_match(&src) || !seen.insert(src.clone()) {
            continue;
        }
        photos.push(src);
        if photos.len() >= 20 {
            break;
        }
    }
    photos
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL_URL: &str =
        "https://www.century21.cz/nemovitosti/prodej-rodinne-domy-dobsice-id=0a1b2c3d-4e5f-6a7b-8c9d-0e1f2a3b4c5d";

    #[test]
    fn search_url_embeds_filter_json() {
        let url = search_url("HOUSE", "SALE", 1);
        assert!(url.starts_with("https://www.century21.cz/nemovitosti?filter="));
        assert!(url.contains("%22HOUSE%22"));
        assert!(!url.contains("page="));
        assert!(search_url("HOUSE", "SALE", 3).contains("&page=3"));
    }

    #[test]
    fn zero_result_page_is_detected() {
        assert!(zero_results("<h2>0 NEMOVITOSTÍ</h2>"));
        assert!(!zero_results("<h2>24 NEMOVITOSTÍ</h2>"));
        assert!(!zero_results("<h2>Nemovitosti</h2>"));
    }

    #[test]
    fn detail_urls_require_uuid_param() {
        let html = r#"
            <a href="/nemovitosti/prodej-domu-znojmo-id=0a1b2c3d-4e5f-6a7b-8c9d-0e1f2a3b4c5d">detail</a>
            <a href="/nemovitosti/prodej-domu-znojmo-id=0a1b2c3d-4e5f-6a7b-8c9d-0e1f2a3b4c5d">duplicate</a>
            <a href="/nemovitosti">search</a>
            <a href="/kontakty">contact</a>
        "#;
        let urls = extract_detail_urls(html);
        assert_eq!(urls.len(), 1);
        assert!(urls[0].starts_with("https://www.century21.cz/nemovitosti/"));
    }

    #[test]
    fn detail_page_parses_table_and_price() {
        let html = r#"<html>
<h1>Prodej rodinného domu Dobšice</h1>
<table>
  <tr><td>KATEGORIE</td><td>Rodinné domy</td></tr>
  <tr><td>LOKALITA</td><td>Dobšice</td></tr>
  <tr><td>VELIKOST</td><td>4+kk</td></tr>
  <tr><td>PLOCHA UŽITNÁ</td><td>161 m²</td></tr>
  <tr><td>PLOCHA POZEMKU</td><td>750 m²</td></tr>
</table>
<div>Nabídková cena: 5 990 000 Kč</div>
<div class="text-base whitespace-break-spaces leading-7">Nabízíme ke koupi prostorný rodinný dům po rekonstrukci se zahradou a garáží v Dobšicích u Znojma.</div>
<img src="https://live-file-api.igluu.cz/file/0a1b2c3d-4e5f-6a7b-8c9d-0e1f2a3b4c5d/foto.jpg">
<img src="https://live-file-api.igluu.cz/thumbs/no-uuid.jpg">
</html>"#;

        let record = parse_detail(html, DETAIL_URL).expect("parses");
        assert_eq!(record.external_id, "0a1b2c3d-4e5f-6a7b-8c9d-0e1f2a3b4c5d");
        assert_eq!(record.property_type.as_deref(), Some("Dům"));
        assert_eq!(record.offer_type.as_deref(), Some("Prodej"));
        assert_eq!(record.price, Some(5_990_000.0));
        assert_eq!(record.area_built_up, Some(161.0));
        assert_eq!(record.area_land, Some(750.0));
        assert!(record.title.contains("(4+kk)"));
        assert_eq!(record.location_text, "Dobšice, okres Znojmo");
        assert_eq!(record.photos.len(), 1);
        assert!(record.description.unwrap().contains("rodinný dům"));
    }

    #[test]
    fn bare_county_location_is_not_suffixed_twice() {
        let html = r#"<html>
<h1>Prodej pozemku</h1>
<table><tr><td>LOKALITA</td><td>Znojmo</td></tr></table>
</html>"#;
        let record = parse_detail(html, DETAIL_URL).expect("parses");
        assert_eq!(record.location_text, "Znojmo");
    }

    #[test]
    fn missing_title_fails_parse() {
        assert!(parse_detail("<html><h1>ab</h1></html>", DETAIL_URL).is_none());
    }
}
