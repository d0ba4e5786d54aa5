//! Nemovitosti Znojmo adapter (nemovitostiznojmo.cz, Eurobydleni/Urbium
//! platform).
//!
//! Paginated list at `/reality/page-N`; detail URLs end in
//! `/detail/{id}`. Parameters are loose `label: value` rows rather than a
//! single table.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use realagg_core::ListingRecord;

use crate::context::{RunSummary, ScrapeContext};
use crate::error::ScrapeError;
use crate::parse::{
    absolutize, clean_html_text, extract_h1, extract_hrefs, extract_img_srcs, extract_price_czk,
    infer_property_type, normalize_offer_type, parse_area,
};

const SOURCE_CODE: &str = "NEMZNOJMO";
const BASE_URL: &str = "https://www.nemovitostiznojmo.cz";

pub(super) async fn run(
    ctx: &ScrapeContext,
    full_rescan: bool,
) -> Result<RunSummary, ScrapeError> {
    let max_pages: u32 = if full_rescan { 50 } else { 5 };
    let mut summary = RunSummary::default();
    let mut seen: HashSet<String> = HashSet::new();

    for page in 1..=max_pages {
        let url = if page == 1 {
            format!("{BASE_URL}/reality/")
        } else {
            format!("{BASE_URL}/reality/page-{page}")
        };

        let html = ctx.client.get_text(&url).await?;
        let (items, has_next) = parse_list_page(&html);
        let fresh: Vec<(String, String)> = items
            .into_iter()
            .filter(|(id, _)| seen.insert(id.clone()))
            .collect();
        if fresh.is_empty() {
            tracing::info!(page, "no new items, stopping");
            break;
        }
        summary.found += fresh.len() as u64;

        for (external_id, detail_url) in fresh {
            match ctx.client.get_text(&detail_url).await {
                Ok(detail_html) => {
                    let record = parse_detail(&detail_html, &external_id, &detail_url);
                    summary.absorb(ctx.save_record(record).await);
                }
                Err(e) => {
                    tracing::error!(url = %detail_url, error = %e, "detail fetch failed");
                    summary.failed += 1;
                }
            }
            crate::context::pause_between_requests().await;
        }

        if !has_next {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    Ok(summary)
}

fn parse_list_page(html: &str) -> (Vec<(String, String)>, bool) {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"/detail/(\d+)$").expect("valid detail regex"));

    let mut items = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for href in extract_hrefs(html) {
        let full = absolutize(BASE_URL, &href);
        let Some(cap) = re.captures(full.trim_end_matches('/')) else {
            continue;
        };
        let id = cap.get(1).map_or("", |m| m.as_str()).to_string();
        if !id.is_empty() && seen.insert(id.clone()) {
            items.push((id, full));
        }
    }

    let has_next = html.contains("page-");
    (items, has_next)
}

fn parse_detail(html: &str, external_id: &str, url: &str) -> ListingRecord {
    let mut record = ListingRecord::new(SOURCE_CODE, external_id.to_string());
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

/// Parameter rows (`tr`, `li`, or param divs) mentioning an area; land is
/// told apart by pozemek/parcela keywords in the same row.
fn extract_param_areas(html: &str) -> (Option<f64>, Option<f64>) {
    static ROW_RE: OnceLock<Regex> = OnceLock::new();
    let row_re = ROW_RE.get_or_init(|| {
        Regex::new(r"(?is)<(?:tr|li|div)[^>]*>(.*?)</(?:tr|li|div)>").expect("valid row regex")
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
    static ZNOJMO_RE: OnceLock<Regex> = OnceLock::new();

    let row_re = ROW_RE.get_or_init(|| {
        Regex::new(r"(?is)<(?:tr|li|div|span)[^>]*>(.*?)</(?:tr|li|div|span)>")
            .expect("valid row regex")
    });
    for cap in row_re.captures_iter(html) {
        let text = clean_html_text(cap.get(1).map_or("", |m| m.as_str()));
        let lower = text.to_lowercase();
        if lower.starts_with("lokalita") || lower.starts_with("adresa") || lower.starts_with("obec")
        {
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

    // Last resort: any mention of the district name in page text.
    let znojmo_re = ZNOJMO_RE.get_or_init(|| {
        Regex::new(r"(?i)[^<>]*okres Znojmo[^<>]*|[^<>]*Znojmo[^<>]*").expect("valid znojmo regex")
    });
    let m = znojmo_re.find(html)?;
    let text = clean_html_text(m.as_str());
    if text.chars().count() > 3 && text.chars().count() < 200 {
        Some(text)
    } else {
        None
    }
}

fn extract_description(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)<(?:div|p)[^>]+class=["'][^"']*(?:description|perex|content)[^"']*["'][^>]*>(.*?)</(?:div|p)>"#)
            .expect("valid description regex")
    });
    let text = clean_html_text(re.captures(html)?.get(1)?.as_str());
    if text.chars().count() < 30 {
        None
    } else {
        Some(text.chars().take(5000).collect())
    }
}

fn extract_photos(html: &str) -> Vec<String> {
    let mut photos = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for src in extract_img_srcs(html) {
        let lower = src.to_lowercase();
        if !(lower.contains("foto") || lower.contains("gallery") || lower.contains("image")) {
            continue;
        }
        let full = absolutize(BASE_URL, &src);
        if seen.insert(full.clone()) {
            photos.push(full);
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
    fn list_page_extracts_detail_ids() {
        let html = r#"
<a href="/prodej-domu-znojmo/detail/4411">Dům</a>
<a href="/prodej-bytu/detail/4412">Byt</a>
<a href="/prodej-domu-znojmo/detail/4411">Duplikát</a>
<a href="/reality/page-2">Další</a>
"#;
        let (items, has_next) = parse_list_page(html);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].0, "4411");
        assert!(has_next);
    }

    #[test]
    fn last_page_reports_no_next() {
        let html = r#"<a href="/prodej-domu/detail/4411">Dům</a>"#;
        let (_, has_next) = parse_list_page(html);
        assert!(!has_next);
    }

    #[test]
    fn detail_parses_loose_param_rows() {
        let html = r#"<html>
<h1>Prodej rodinného domu Dyje</h1>
<div class="price">3 190 000 Kč</div>
<ul>
  <li>Užitná plocha: 120 m²</li>
  <li>Plocha pozemku: 450 m²</li>
  <li>Lokalita: Dyje, okres Znojmo</li>
</ul>
<p class="perex">Nabízíme rodinný dům v obci Dyje nedaleko Znojma, ihned k nastěhování.</p>
<img src="/data/foto/4411-01.jpg">
</html>"#;
        let record = parse_detail(html, "4411", "https://www.nemovitostiznojmo.cz/x/detail/4411");
        assert_eq!(record.price, Some(3_190_000.0));
        assert_eq!(record.area_built_up, Some(120.0));
        assert_eq!(record.area_land, Some(450.0));
        assert_eq!(record.location_text, "Dyje, okres Znojmo");
        assert_eq!(record.property_type.as_deref(), Some("Dům"));
        assert_eq!(record.photos.len(), 1);
    }

    #[test]
    fn location_falls_back_to_district_phrase() {
        let html = "<html><h1>Prodej pozemku</h1><p>Stavební pozemek, okres Znojmo.</p></html>";
        let record = parse_detail(html, "1", "https://www.nemovitostiznojmo.cz/x/detail/1");
        assert!(record.location_text.to_lowercase().contains("znojmo"));
    }
}
