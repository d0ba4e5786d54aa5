//! HV Reality adapter (hvreality.cz, WordPress/Elementor).
//!
//! Two archive sections (sale and rental) with rel-next pagination.
//! Identity is the post slug; photos are WordPress uploads with the
//! `-WxH` thumbnail suffix stripped back to the original file.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use realagg_core::ListingRecord;

use crate::context::{RunSummary, ScrapeContext};
use crate::error::ScrapeError;
use crate::parse::{
    absolutize, clean_html_text, extract_h1, extract_price_czk, infer_property_type,
    normalize_offer_type, parse_area,
};

const SOURCE_CODE: &str = "HVREALITY";
const BASE_URL: &str = "https://hvreality.cz";

const START_PATHS: [&str; 2] = ["/prodej-nemovitosti/", "/pronajem-nemovitosti/"];

pub(super) async fn run(
    ctx: &ScrapeContext,
    full_rescan: bool,
) -> Result<RunSummary, ScrapeError> {
    let max_pages: u32 = if full_rescan { 20 } else { 3 };
    let mut summary = RunSummary::default();
    let mut seen: HashSet<String> = HashSet::new();

    for start_path in START_PATHS {
        let mut current_url = Some(format!("{BASE_URL}{start_path}"));
        let mut page: u32 = 1;

        while let Some(url) = current_url.take() {
            if page > max_pages {
                break;
            }

            let html = match ctx.client.get_text(&url).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::error!(url, error = %e, "archive fetch failed");
                    summary.failed += 1;
                    break;
                }
            };

            let (items, next_url) = parse_archive_page(&html, &url);
            let fresh: Vec<String> = items
                .into_iter()
                .filter(|u| seen.insert(u.clone()))
                .collect();
            if fresh.is_empty() {
                break;
            }
            summary.found += fresh.len() as u64;

            for detail_url in fresh {
                match ctx.client.get_text(&detail_url).await {
                    Ok(detail_html) => {
                        let record = parse_detail(&detail_html, &detail_url);
                        summary.absorb(ctx.save_record(record).await);
                    }
                    Err(e) => {
                        tracing::error!(url = %detail_url, error = %e, "detail fetch failed");
                        summary.failed += 1;
                    }
                }
                crate::context::pause_between_requests().await;
            }

            current_url = next_url;
            page += 1;
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    Ok(summary)
}

/// Archive entries are `.hentry` articles whose heading links at the post.
fn parse_archive_page(html: &str, current_url: &str) -> (Vec<String>, Option<String>) {
    static ENTRY_RE: OnceLock<Regex> = OnceLock::new();
    static NEXT_RE: OnceLock<Regex> = OnceLock::new();

    let entry_re = ENTRY_RE.get_or_init(|| {
        Regex::new(
            r#"(?is)<h\d[^>]+class=["'][^"']*entry-title[^"']*["'][^>]*>\s*<a[^>]+href=["']([^"']+)["']"#,
        )
        .expect("valid entry regex")
    });

    let mut urls = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for cap in entry_re.captures_iter(html) {
        let href = cap.get(1).map_or("", |m| m.as_str());
        let full = absolutize(BASE_URL, href);
        if full.trim_end_matches('/') == current_url.trim_end_matches('/') {
            continue;
        }
        if ["page/", "/category/", "/author/", "/tag/"]
            .iter()
            .any(|frag| full.contains(frag))
        {
            continue;
        }
        if seen.insert(full.clone()) {
            urls.push(full);
        }
    }

    let next_re = NEXT_RE.get_or_init(|| {
        Regex::new(r#"(?is)<a[^>]+class=["'][^"']*next[^"']*["'][^>]+href=["']([^"']+)["']|<a[^>]+href=["']([^"']+)["'][^>]+class=["'][^"']*next[^"']*["']"#)
            .expect("valid next regex")
    });
    let next_url = next_re.captures(html).and_then(|cap| {
        cap.get(1)
            .or_else(|| cap.get(2))
            .map(|m| absolutize(BASE_URL, m.as_str()))
    });

    (urls, next_url)
}

fn slug_from_url(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .to_string()
}

fn parse_detail(html: &str, url: &str) -> ListingRecord {
    let mut record = ListingRecord::new(SOURCE_CODE, slug_from_url(url));
    record.url = url.to_string();
    record.title = extract_h1(html).unwrap_or_default();
    record.price = extract_price_czk(html);
    record.property_type = Some(infer_property_type(&[&record.title]).to_string());
    record.offer_type = Some(normalize_offer_type(&record.title).to_string());

    let (built_up, land) = extract_param_areas(html);
    record.area_built_up = built_up;
    record.area_land = land;

    record.location_text = extract_location(html).unwrap_or_else(|| "Znojmo a okolí".to_string());
    record.description = extract_description(html);
    record.photos = extract_photos(html);

    record
}

fn extract_param_areas(html: &str) -> (Option<f64>, Option<f64>) {
    static ROW_RE: OnceLock<Regex> = OnceLock::new();
    let row_re = ROW_RE.get_or_init(|| {
        Regex::new(r"(?is)<(?:tr|li)[^>]*>(.*?)</(?:tr|li)>").expect("valid row regex")
    });

    let mut built_up = None;
    let mut land = None;
    for cap in row_re.captures_iter(html) {
        let text = clean_html_text(cap.get(1).map_or("", |m| m.as_str())).to_lowercase();
        if !text.contains("plocha") || !(text.contains("m2") || text.contains("m²")) {
            continue;
        }
        let value = parse_area(&text);
        if text.contains("pozem") || text.contains("parcel") {
            if land.is_none() {
                land = value;
            }
        } else if built_up.is_none() {
            built_up = value;
        }
    }
    (built_up, land)
}

fn extract_location(html: &str) -> Option<String> {
    static ROW_RE: OnceLock<Regex> = OnceLock::new();
    let row_re = ROW_RE.get_or_init(|| {
        Regex::new(r"(?is)<(?:tr|li|span)[^>]*>(.*?)</(?:tr|li|span)>").expect("valid row regex")
    });

    for cap in row_re.captures_iter(html) {
        let text = clean_html_text(cap.get(1).map_or("", |m| m.as_str()));
        let lower = text.to_lowercase();
        for label in ["lokalita", "adresa", "obec", "město"] {
            if lower.starts_with(label) {
                let value = text
                    .splitn(2, ':')
                    .nth(1)
                    .map(str::trim)
                    .unwrap_or_default();
                if value.chars().count() > 3 {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Elementor text blocks hold the description paragraphs.
fn extract_description(html: &str) -> Option<String> {
    static P_RE: OnceLock<Regex> = OnceLock::new();
    let p_re =
        P_RE.get_or_init(|| Regex::new(r"(?is)<p[^>]*>(.*?)</p>").expect("valid paragraph regex"));

    let paragraphs: Vec<String> = p_re
        .captures_iter(html)
        .filter_map(|cap| {
            let text = clean_html_text(cap.get(1).map_or("", |m| m.as_str()));
            if text.chars().count() > 20 {
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

fn extract_photos(html: &str) -> Vec<String> {
    static SIZE_RE: OnceLock<Regex> = OnceLock::new();
    let size_re = SIZE_RE.get_or_init(|| {
        Regex::new(r"-\d+x\d+(\.[A-Za-z]+)$").expect("valid size suffix regex")
    });

    let mut photos = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for src in crate::parse::extract_img_srcs(html) {
        let lower = src.to_lowercase();
        if lower.ends_with(".svg") || lower.contains("icon") || lower.contains("logo") {
            continue;
        }
        if !(lower.contains("uploads") || lower.contains("foto") || lower.contains("gallery")) {
            continue;
        }
        let full = size_re
            .replace(&absolutize(BASE_URL, &src), "$1")
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
