//! PREMIA Reality adapter (premiareality.cz).
//!
//! Five category list pages (`/{kategorie}/seznam.html`), everything on one
//! page, detail URLs end in `-{id}.html`. Thumbnail paths are rewritten to
//! the original assets.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use realagg_core::ListingRecord;

use crate::context::{RunSummary, ScrapeContext};
use crate::error::ScrapeError;
use crate::parse::{
    absolutize, clean_html_text, extract_h1, extract_hrefs, extract_table_params, parse_area,
    parse_price, table_param,
};

const SOURCE_CODE: &str = "PREMIAREALITY";
const BASE_URL: &str = "https://www.premiareality.cz";

const CATEGORIES: [(&str, &str); 5] = [
    ("byty", "Byt"),
    ("domy", "Dům"),
    ("parcely", "Pozemek"),
    ("rekreace", "Dům"),
    ("ostatni", "Ostatní"),
];

pub(super) async fn run(
    ctx: &ScrapeContext,
    _full_rescan: bool,
) -> Result<RunSummary, ScrapeError> {
    // Category lists are unpaginated; both modes see the full inventory.
    let mut summary = RunSummary::default();
    let mut seen: HashSet<String> = HashSet::new();

    for (category, default_type) in CATEGORIES {
        let list_url = format!("{BASE_URL}/{category}/seznam.html");
        match ctx.client.get_text(&list_url).await {
            Ok(html) => {
                let urls: Vec<String> = extract_detail_urls(&html)
                    .into_iter()
                    .filter(|url| seen.insert(url.clone()))
                    .collect();
                tracing::info!(category, count = urls.len(), "category listed");
                summary.found += urls.len() as u64;

                for url in urls {
                    match ctx.client.get_text(&url).await {
                        Ok(detail_html) => {
                            let record = parse_detail(&detail_html, &url, default_type);
                            summary.absorb(ctx.save_record(record).await);
                        }
                        Err(e) => {
                            tracing::error!(url, error = %e, "detail fetch failed");
                            summary.failed += 1;
                        }
                    }
                    crate::context::pause_between_requests().await;
                }
            }
            Err(e) => {
                tracing::error!(category, error = %e, "category fetch failed");
                summary.failed += 1;
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    Ok(summary)
}

fn extract_detail_urls(html: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"-\d+\.html$").expect("valid detail suffix regex"));

    let mut urls = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for href in extract_hrefs(html) {
        if !re.is_match(&href) {
            continue;
        }
        let full = absolutize(BASE_URL, &href);
        if !full.starts_with(BASE_URL) {
            continue;
        }
        if seen.insert(full.clone()) {
            urls.push(full);
        }
    }
    urls
}

fn external_id_from_url(url: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"-(\d+)\.html$").expect("valid id regex"));
    re.captures(url)
        .and_then(|cap| cap.get(1))
        .map_or_else(
            || url.rsplit('/').next().unwrap_or(url).to_string(),
            |m| m.as_str().to_string(),
        )
}

fn property_type_from_table(nemovitost: &str, fallback: &str) -> String {
    let lower = nemovitost.to_lowercase();
    if lower.contains("byt") {
        "Byt"
    } else if lower.contains("dům")
        || lower.contains("dum")
        || lower.contains("vila")
        || lower.contains("chata")
        || lower.contains("chalupa")
    {
        "Dům"
    } else if lower.contains("pozemek") || lower.contains("parcela") || lower.contains("zahrada") {
        "Pozemek"
    } else if lower.contains("garáž") || lower.contains("garaz") {
        "Garáž"
    } else if lower.contains("komerč") || lower.contains("sklep") || lower.contains("vinný") {
        "Ostatní"
    } else if lower.is_empty() {
        return fallback.to_string();
    } else {
        "Ostatní"
    }
    .to_string()
}

fn parse_detail(html: &str, url: &str, default_type: &str) -> ListingRecord {
    let mut record = ListingRecord::new(SOURCE_CODE, external_id_from_url(url));
    record.url = url.to_string();
    record.title = extract_h1(html).unwrap_or_default();

    let url_lower = url.to_lowercase();
    record.offer_type = Some(
        if url_lower.contains("pronajem") || url_lower.contains("pronájem") {
            "Pronájem"
        } else {
            "Prodej"
        }
        .to_string(),
    );

    let params = extract_table_params(html);
    record.price = table_param(&params, "cena").and_then(parse_price);
    record.property_type = Some(property_type_from_table(
        table_param(&params, "nemovitost").unwrap_or_default(),
        default_type,
    ));

    if let Some(value) = table_param(&params, "užitná plocha") {
        record.area_built_up = parse_area(value);
    }
    for key in ["plocha zahrady", "plocha pozemku", "plocha parcely"] {
        if let Some(value) = table_param(&params, key) {
            record.area_land = parse_area(value);
            break;
        }
    }

    let ulice = table_param(&params, "ulice").unwrap_or_default();
    let mesto = table_param(&params, "město")
        .or_else(|| table_param(&params, "mesto"))
        .unwrap_or_default();
    record.location_text = match (ulice.is_empty(), mesto.is_empty()) {
        (false, false) => format!("{ulice}, {mesto}"),
        (true, false) => mesto.to_string(),
        (false, true) => ulice.to_string(),
        (true, true) => extract_h2(html).unwrap_or_else(|| "Znojmo a okolí".to_string()),
    };
    if !mesto.is_empty() {
        record.municipality = Some(mesto.to_string());
    }

    record.description = extract_description(html);
    record.photos = extract_photos(html);

    record
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

fn extract_description(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)<div[^>]+class=["'][^"']*ps-5[^"']*["'][^>]*>(.*?)</div>"#)
            .expect("valid description regex")
    });
    let text = clean_html_text(re.captures(html)?.get(1)?.as_str());
    if text.chars().count() < 30 {
        None
    } else {
        Some(text.chars().take(5000).collect())
    }
}

/// Gallery thumbnails live under `/thumbs_W_H/`; dropping that path segment
/// yields the original image.
fn extract_photos(html: &str) -> Vec<String> {
    static SRC_RE: OnceLock<Regex> = OnceLock::new();
    static THUMB_RE: OnceLock<Regex> = OnceLock::new();

    let src_re = SRC_RE.get_or_init(|| {
        Regex::new(r#"(?is)(?:href|src|data-src)=["']([^"']*(?:importestate|estate)[^"']*)["']"#)
            .expect("valid photo regex")
    });
    let thumb_re =
        THUMB_RE.get_or_init(|| Regex::new(r"/thumbs_\d+_\d+/").expect("valid thumb regex"));

    let mut photos = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for cap in src_re.captures_iter(html) {
        let raw = cap.get(1).map_or("", |m| m.as_str());
        let full = thumb_re
            .replace_all(&absolutize(BASE_URL, raw), "/")
            .to_string();
        if seen.insert(full.clone()) {
            photos.push(full);
            if photos.len() >= 20 {
                break;
            }
        }
    }
    photos
}
