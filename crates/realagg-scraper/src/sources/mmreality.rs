//! M&M Reality adapter (mmreality.cz).
//!
//! The search grid paginates through an AJAX endpoint that returns the
//! rendered card fragment inside a JSON envelope. Anonymized listings
//! (hidden address, price, and photos) must be skipped outright.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::Deserialize;

use realagg_core::ListingRecord;

use crate::context::{ItemOutcome, RunSummary, ScrapeContext};
use crate::error::ScrapeError;
use crate::parse::{
    absolutize, clean_html_text, extract_h1, extract_price_czk, infer_property_type,
    normalize_offer_type, parse_area,
};

const SOURCE_CODE: &str = "MMR";
const BASE_URL: &str = "https://www.mmreality.cz";

#[derive(Debug, Deserialize)]
struct AjaxFragment {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    html: String,
}

pub(super) async fn run(
    ctx: &ScrapeContext,
    full_rescan: bool,
) -> Result<RunSummary, ScrapeError> {
    let tuning = ctx.tuning("mmreality");
    let max_pages: u64 = if full_rescan { 100 } else { 5 };
    let mut summary = RunSummary::default();

    let ajax_url = format!("{BASE_URL}/nabidka/ajax/");
    let mut seen: HashSet<String> = HashSet::new();
    let mut consumed: u64 = 0;
    let mut reported: Option<u64> = None;

    for page in 1..=max_pages {
        let fragment: AjaxFragment = ctx
            .client
            .post_form_json(
                &ajax_url,
                &[("page", page.to_string())],
                &[("X-Requested-With", "XMLHttpRequest")],
            )
            .await?;

        if reported.is_none() && fragment.count > 0 {
            reported = Some(fragment.count);
            tracing::info!(count = fragment.count, "grid count reported");
        }

        let urls: Vec<String> = extract_detail_urls(&fragment.html)
            .into_iter()
            .filter(|(id, _)| seen.insert(id.clone()))
            .map(|(_, url)| url)
            .collect();
        if urls.is_empty() {
            tracing::info!(page, "no new listings on page, stopping");
            break;
        }

        summary.found += urls.len() as u64;
        consumed += urls.len() as u64;

        let outcomes: Vec<ItemOutcome> = stream::iter(urls)
            .map(|url| process_detail(ctx, url))
            .buffer_unordered(tuning.detail_fetch_concurrency.max(1))
            .collect()
            .await;
        for outcome in outcomes {
            summary.absorb(outcome);
        }

        if reported.is_some_and(|count| consumed >= count) {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    Ok(summary)
}

/// Detail links look like `/nabidka/123456/` with an optional slug tail.
fn extract_detail_urls(fragment: &str) -> Vec<(String, String)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)href=["']([^"']*/nabidka/(\d+)[^"']*)["']"#)
            .expect("valid detail link regex")
    });

    let mut out = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for cap in re.captures_iter(fragment) {
        let id = cap.get(2).map_or("", |m| m.as_str()).to_string();
        let href = cap.get(1).map_or("", |m| m.as_str());
        if !id.is_empty() && seen.insert(id.clone()) {
            out.push((id, absolutize(BASE_URL, href)));
        }
    }
    out
}

async fn process_detail(ctx: &ScrapeContext, url: String) -> ItemOutcome {
    let html = match ctx.client.get_text(&url).await {
        Ok(html) => html,
        Err(e) => {
            tracing::error!(url, error = %e, "detail fetch failed");
            return ItemOutcome::Failed;
        }
    };

    tokio::time::sleep(Duration::from_millis(300)).await;

    match parse_detail(&html, &url) {
        Some(record) => ctx.save_record(record).await,
        None => {
            tracing::debug!(url, "anonymized or unparseable listing skipped");
            ItemOutcome::Skipped
        }
    }
}

fn external_id_from_url(url: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"/nabidka/(\d+)").expect("valid id regex"));
    re.captures(url)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

/// Anonymized listings hide everything identifying behind a broker-contact
/// wall; there is nothing worth storing.
fn is_anonymized(html: &str, price: Option<f64>, photos: &[String], location: &str) -> bool {
    let lower = html.to_lowercase();
    if lower.contains("anonymizov") || lower.contains("adresa skryta") {
        return true;
    }
    price.is_none() && photos.is_empty() && location.is_empty()
}

fn parse_detail(html: &str, url: &str) -> Option<ListingRecord> {
    let external_id = external_id_from_url(url)?;
    let title = extract_h1(html)?;

    let price = extract_price_czk(html);
    let photos = extract_photos(html);
    let location = extract_location(html).unwrap_or_default();

    if is_anonymized(html, price, &photos, &location) {
        return None;
    }

    let mut record = ListingRecord::new(SOURCE_CODE, external_id);
    record.url = url.to_string();
    record.price = price;
    record.location_text = location;
    record.property_type = Some(infer_property_type(&[&title]).to_string());
    record.offer_type = Some(normalize_offer_type(&title).to_string());
    record.photos = photos;

    let (built_up, land) = extract_areas(html);
    record.area_built_up = built_up;
    record.area_land = land;
    record.description = extract_description(html);
    record.title = title;

    Some(record)
}

fn extract_location(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)<[^>]+class=["'][^"']*(?:address|location|lokalita)[^"']*["'][^>]*>(.*?)</"#)
            .expect("valid location regex")
    });
    let text = clean_html_text(re.captures(html)?.get(1)?.as_str());
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn extract_areas(html: &str) -> (Option<f64>, Option<f64>) {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)(užitná plocha|uzitna plocha|plocha pozemku|plocha parcely|plocha)\s*:?\s*([\d\s\u{a0}]+)\s*m")
            .expect("valid area regex")
    });

    let text = clean_html_text(html);
    let mut built_up = None;
    let mut land = None;
    for cap in re.captures_iter(&text) {
        let label = cap.get(1).map_or("", |m| m.as_str()).to_lowercase();
        let value = parse_area(cap.get(2).map_or("", |m| m.as_str()));
        if label.contains("pozem") || label.contains("parcel") {
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
        Regex::new(r#"(?is)<div[^>]+class=["'][^"']*(?:description|popis|detail-text)[^"']*["'][^>]*>(.*?)</div>"#)
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
    for src in crate::parse::extract_img_srcs(html) {
        let lower = src.to_lowercase();
        if !(lower.contains("foto") || lower.contains("photo") || lower.contains("gallery")) {
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

    const FRAGMENT: &str = r#"
<div class="estate-item"><a href="/nabidka/711001/prodej-domu-znojmo">Dům Znojmo</a></div>
<div class="estate-item"><a href="/nabidka/711002/">Byt</a></div>
<div class="estate-item"><a href="/nabidka/711001/prodej-domu-znojmo#galerie">Galerie</a></div>
<a href="/kontakt">Kontakt</a>
"#;

    #[test]
    fn fragment_links_are_unique_by_id() {
        let urls = extract_detail_urls(FRAGMENT);
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].0, "711001");
        assert_eq!(urls[1].0, "711002");
        assert!(urls[0].1.starts_with("https://www.mmreality.cz/"));
    }

    #[test]
    fn external_id_comes_from_path() {
        assert_eq!(
            external_id_from_url("https://www.mmreality.cz/nabidka/711001/prodej-domu"),
            Some("711001".to_string())
        );
        assert_eq!(external_id_from_url("https://www.mmreality.cz/kontakt"), None);
    }

    #[test]
    fn full_detail_parses() {
        let html = r#"<html>
<h1>Prodej rodinného domu 4+1, Znojmo</h1>
<span class="address">Znojmo, Jihomoravský kraj</span>
<div class="price">4 750 000 Kč</div>
<ul><li>Užitná plocha: 140 m²</li><li>Plocha pozemku: 520 m²</li></ul>
<div class="detail-text">Prodej rodinného domu po částečné rekonstrukci v klidné části Znojma.</div>
<img src="/foto/711001-01.jpg">
</html>"#;
        let record =
            parse_detail(html, "https://www.mmreality.cz/nabidka/711001/prodej-domu").expect("parses");
        assert_eq!(record.external_id, "711001");
        assert_eq!(record.price, Some(4_750_000.0));
        assert_eq!(record.area_built_up, Some(140.0));
        assert_eq!(record.area_land, Some(520.0));
        assert_eq!(record.property_type.as_deref(), Some("Dům"));
        assert_eq!(record.photos.len(), 1);
    }

    #[test]
    fn anonymized_marker_skips_listing() {
        let html = r#"<html>
<h1>Prodej domu</h1>
<p>Inzerát anonymizován na žádost majitele.</p>
<div class="price">3 000 000 Kč</div>
</html>"#;
        assert!(parse_detail(html, "https://www.mmreality.cz/nabidka/711003/").is_none());
    }

    #[test]
    fn empty_shell_listing_is_treated_as_anonymized() {
        let html = "<html><h1>Prodej domu</h1></html>";
        assert!(parse_detail(html, "https://www.mmreality.cz/nabidka/711004/").is_none());
    }
}
