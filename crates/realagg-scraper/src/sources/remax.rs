//! RE/MAX Czech Republic adapter (remax-czech.cz).
//!
//! Paginated search HTML; detail URLs follow `/reality/detail/{id}/{slug}`.
//! List pages render server-side, so plain HTTP is enough; with the
//! `browser` feature enabled a headless render is used as a fallback for
//! detail pages that come back without content.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use regex::Regex;

use realagg_core::ListingRecord;

use crate::context::{ItemOutcome, RunSummary, ScrapeContext};
use crate::error::ScrapeError;
use crate::parse::{
    absolutize, clean_html_text, extract_h1, extract_price_czk, infer_property_type,
    normalize_offer_type, parse_area,
};

const SOURCE_CODE: &str = "REMAX";
const BASE_URL: &str = "https://www.remax-czech.cz";
const SEARCH_URL: &str = "https://www.remax-czech.cz/reality/vyhledavani/";
const PHOTO_CDN: &str = "mlsf.remax-czech.cz";

#[derive(Debug, Clone)]
struct ListItem {
    external_id: String,
    detail_url: String,
    title: String,
}

pub(super) async fn run(
    ctx: &ScrapeContext,
    full_rescan: bool,
) -> Result<RunSummary, ScrapeError> {
    let tuning = ctx.tuning("remax");
    let max_pages: u32 = if full_rescan { 60 } else { 5 };
    let mut summary = RunSummary::default();

    for page in 1..=max_pages {
        let url = format!("{SEARCH_URL}?page={page}");
        let html = ctx.client.get_text(&url).await?;

        let items = parse_list_page(&html);
        if items.is_empty() {
            tracing::info!(page, "no more items, stopping");
            break;
        }
        summary.found += items.len() as u64;

        let outcomes: Vec<ItemOutcome> = stream::iter(items)
            .map(|item| process_item(ctx, item))
            .buffer_unordered(tuning.detail_fetch_concurrency.max(1))
            .collect()
            .await;
        for outcome in outcomes {
            summary.absorb(outcome);
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    Ok(summary)
}

async fn process_item(ctx: &ScrapeContext, item: ListItem) -> ItemOutcome {
    let html = match ctx.client.get_text(&item.detail_url).await {
        Ok(html) => html,
        Err(e) => {
            tracing::error!(url = %item.detail_url, error = %e, "detail fetch failed");
            return ItemOutcome::Failed;
        }
    };

    let record = match parse_detail_page(&html, &item) {
        Some(record) => record,
        None => {
            #[cfg(feature = "browser")]
            {
                match fetch_detail_rendered(&item).await {
                    Some(record) => record,
                    None => return ItemOutcome::Failed,
                }
            }
            #[cfg(not(feature = "browser"))]
            {
                tracing::warn!(url = %item.detail_url, "detail did not parse");
                return ItemOutcome::Failed;
            }
        }
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    ctx.save_record(record).await
}

#[cfg(feature = "browser")]
async fn fetch_detail_rendered(item: &ListItem) -> Option<ListingRecord> {
    let pool = crate::browser::shared_pool();
    match pool.fetch_page(&item.detail_url, false).await {
        Ok(html) => parse_detail_page(&html, item),
        Err(e) => {
            tracing::warn!(url = %item.detail_url, error = %e, "browser fallback failed");
            None
        }
    }
}

fn parse_list_page(html: &str) -> Vec<ListItem> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)<a[^>]+href=["']([^"']*/reality/detail/(\d+)/[^"']*)["'][^>]*>(.*?)</a>"#)
            .expect("valid list link regex")
    });

    let mut items = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for cap in re.captures_iter(html) {
        let href = cap.get(1).map_or("", |m| m.as_str());
        let external_id = cap.get(2).map_or("", |m| m.as_str()).to_string();
        if external_id.is_empty() || !seen.insert(external_id.clone()) {
            continue;
        }
        items.push(ListItem {
            external_id,
            detail_url: absolutize(BASE_URL, href),
            title: clean_html_text(cap.get(3).map_or("", |m| m.as_str())),
        });
    }
    items
}

fn parse_detail_page(html: &str, item: &ListItem) -> Option<ListingRecord> {
    let title = extract_h1(html).or_else(|| {
        if item.title.is_empty() {
            None
        } else {
            Some(item.title.clone())
        }
    })?;

    let mut record = ListingRecord::new(SOURCE_CODE, item.external_id.clone());
    record.url = item.detail_url.clone();
    record.price = extract_price_czk(html);
    record.location_text = extract_location(html).unwrap_or_default();
    record.property_type = Some(infer_property_type(&[&title]).to_string());
    record.offer_type = Some(normalize_offer_type(&format!("{} {}", item.detail_url, title)).to_string());

    let (built_up, land) = extract_areas(html);
    record.area_built_up = built_up;
    record.area_land = land;

    record.description = extract_description(html);
    record.photos = extract_photos(html);
    record.title = title;

    Some(record)
}

fn extract_location(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)<[^>]+class=["'][^"']*location[^"']*["'][^>]*>(.*?)</"#)
            .expect("valid location regex")
    });
    let text = clean_html_text(re.captures(html)?.get(1)?.as_str());
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Areas appear as loose text rows: "Plocha pozemku: 750 m²",
/// "Užitná plocha: 161 m²".
fn extract_areas(html: &str) -> (Option<f64>, Option<f64>) {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)(užitná plocha|uzitna plocha|plocha pozemku|zastavěná plocha|plocha)\s*:?\s*([\d\s\u{a0}]+)\s*m")
            .expect("valid area row regex")
    });

    let text = clean_html_text(html);
    let mut built_up = None;
    let mut land = None;
    for cap in re.captures_iter(&text) {
        let label = cap.get(1).map_or("", |m| m.as_str()).to_lowercase();
        let value = parse_area(cap.get(2).map_or("", |m| m.as_str()));
        if label.contains("pozem") {
            if land.is_none() {
                land = value;
            }
        } else if built_up.is_none() {
            built_up = value;
        }
    }
    (built_up, land)
}

fn extract_description(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)<div[^>]+class=["'][^"']*(?:description|popis)[^"']*["'][^>]*>(.*?)</div>"#)
            .expect("valid description regex")
    });
    let text = clean_html_text(re.captures(html)?.get(1)?.as_str());
    if text.chars().count() < 20 {
        None
    } else {
        Some(text.chars().take(5000).collect())
    }
}

fn extract_photos(html: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)(?:src|href)=["']([^"']*mlsf\.remax-czech\.cz[^"']*)["']"#)
            .expect("valid photo regex")
    });

    let mut photos = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for cap in re.captures_iter(html) {
        let src = cap.get(1).map_or("", |m| m.as_str()).to_string();
        if src.contains(PHOTO_CDN) && seen.insert(src.clone()) {
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

    const MOCK_LIST_HTML: &str = r#"
<html><body>
  <a href="/reality/detail/423340/prodej-rodinneho-domu-znojmo">Prodej rodinného domu 5+1</a>
  <a href="/reality/detail/423341/prodej-bytu-3kk">Prodej bytu 3+kk</a>
  <a href="/reality/detail/423340/prodej-rodinneho-domu-znojmo">Duplicitní odkaz</a>
  <a href="/kontakty">Irelevantní odkaz</a>
</body></html>
"#;

    const MOCK_DETAIL_HTML: &str = r#"
<html><body>
  <h1>Prodej rodinného domu 5+1, 161 m², Znojmo</h1>
  <span class="location-text">Znojmo, Jihomoravský kraj</span>
  <div>Nabídková cena: 3 500 000 Kč</div>
  <p>Plocha pozemku: 750 m²</p>
  <img src="https://mlsf.remax-czech.cz/media/photo_001.jpg" alt="foto 1">
  <img src="https://mlsf.remax-czech.cz/media/photo_002.jpg" alt="foto 2">
  <img src="https://cdn.external.cz/irrelevant.jpg" alt="ext">
</body></html>
"#;

    fn mock_item() -> ListItem {
        ListItem {
            external_id: "423340".to_string(),
            detail_url: "https://www.remax-czech.cz/reality/detail/423340/slug".to_string(),
            title: "Prodej rodinného domu 5+1".to_string(),
        }
    }

    #[test]
    fn list_page_yields_unique_items() {
        let items = parse_list_page(MOCK_LIST_HTML);
        assert_eq!(items.len(), 2);
        let ids: Vec<&str> = items.iter().map(|i| i.external_id.as_str()).collect();
        assert_eq!(ids, vec!["423340", "423341"]);
    }

    #[test]
    fn irrelevant_links_are_ignored() {
        let items = parse_list_page(MOCK_LIST_HTML);
        assert!(items.iter().all(|i| !i.detail_url.contains("/kontakty")));
    }

    #[test]
    fn empty_list_page_yields_nothing() {
        assert!(parse_list_page("<html><body></body></html>").is_empty());
    }

    #[test]
    fn detail_extracts_title_and_price() {
        let record = parse_detail_page(MOCK_DETAIL_HTML, &mock_item()).expect("parses");
        assert!(record.title.contains("rodinného domu"));
        assert_eq!(record.price, Some(3_500_000.0));
    }

    #[test]
    fn detail_extracts_location_and_type() {
        let record = parse_detail_page(MOCK_DETAIL_HTML, &mock_item()).expect("parses");
        assert_eq!(record.location_text, "Znojmo, Jihomoravský kraj");
        assert_eq!(record.property_type.as_deref(), Some("Dům"));
        assert_eq!(record.offer_type.as_deref(), Some("Prodej"));
    }

    #[test]
    fn detail_extracts_land_area() {
        let record = parse_detail_page(MOCK_DETAIL_HTML, &mock_item()).expect("parses");
        assert!(record.area_built_up.is_some() || record.area_land.is_some());
        assert_eq!(record.area_land, Some(750.0));
    }

    #[test]
    fn photos_come_only_from_the_cdn_and_are_unique() {
        let record = parse_detail_page(MOCK_DETAIL_HTML, &mock_item()).expect("parses");
        assert_eq!(record.photos.len(), 2);
        assert!(record.photos.iter().all(|p| p.contains(PHOTO_CDN)));
        let unique: HashSet<&String> = record.photos.iter().collect();
        assert_eq!(unique.len(), record.photos.len());
    }

    #[test]
    fn detail_without_title_falls_back_to_list_title() {
        let record =
            parse_detail_page("<html><div>Nabídková cena: 2 000 000 Kč</div></html>", &mock_item())
                .expect("falls back");
        assert_eq!(record.title, "Prodej rodinného domu 5+1");
    }
}
