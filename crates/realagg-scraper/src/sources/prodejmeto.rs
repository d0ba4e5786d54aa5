//! Prodejme.to adapter.
//!
//! Listing discovery goes through the site's own AJAX endpoint: a POST to
//! `/nabidky/ajax/` with `page` and `sold=0` returns `{count, html}` where
//! `html` is the rendered card fragment. Pagination stops once the reported
//! count has been consumed or a page stops adding new slugs.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use realagg_core::ListingRecord;

use crate::context::{RunSummary, ScrapeContext};
use crate::error::ScrapeError;
use crate::parse::{
    clean_html_text, extract_h1, infer_property_type, normalize_offer_type, parse_area,
    parse_price,
};

const SOURCE_CODE: &str = "PRODEJMETO";
const BASE_URL: &str = "https://www.prodejme.to";
const CARDS_PER_PAGE: u64 = 9;

#[derive(Debug, Deserialize)]
struct AjaxPage {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    html: String,
}

#[derive(Debug, Clone)]
struct Card {
    slug: String,
    title: String,
    price_text: String,
}

pub(super) async fn run(
    ctx: &ScrapeContext,
    full_rescan: bool,
) -> Result<RunSummary, ScrapeError> {
    let mut summary = RunSummary::default();
    let ajax_url = format!("{BASE_URL}/nabidky/ajax/");
    let referer = format!("{BASE_URL}/nabidky/");

    let mut seen: HashSet<String> = HashSet::new();
    let mut page: u64 = 1;
    let mut total_pages: u64 = if full_rescan { u64::MAX } else { 2 };

    while page <= total_pages {
        let payload: AjaxPage = ctx
            .client
            .post_form_json(
                &ajax_url,
                &[("page", page.to_string()), ("sold", "0".to_string())],
                &[
                    ("X-Requested-With", "XMLHttpRequest"),
                    ("Referer", referer.as_str()),
                ],
            )
            .await?;

        if page == 1 {
            let count_pages = payload.count.div_ceil(CARDS_PER_PAGE).max(1);
            total_pages = total_pages.min(count_pages);
            tracing::info!(count = payload.count, pages = count_pages, "ajax listing discovered");
        }

        let cards = parse_cards(&payload.html);
        let fresh: Vec<Card> = cards
            .into_iter()
            .filter(|card| seen.insert(card.slug.clone()))
            .collect();
        if fresh.is_empty() {
            tracing::info!(page, "page added no new listings, stopping");
            break;
        }

        for card in fresh {
            summary.found += 1;
            let detail_url = format!("{BASE_URL}/nabidky/{}", card.slug);
            match ctx.client.get_text(&detail_url).await {
                Ok(html) => {
                    let record = parse_detail(&html, &card, &detail_url);
                    summary.absorb(ctx.save_record(record).await);
                }
                Err(e) => {
                    tracing::error!(url = %detail_url, error = %e, "detail fetch failed");
                    summary.failed += 1;
                }
            }
            crate::context::pause_between_requests().await;
        }

        page += 1;
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    Ok(summary)
}

/// Cards are `div.project-item` blocks whose heading link points at the
/// listing slug.
fn parse_cards(fragment: &str) -> Vec<Card> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r#"(?is)<h[23][^>]*class=["'][^"']*title[^"']*["'][^>]*>\s*<a[^>]+href=["']([^"']+)["'][^>]*>(.*?)</a>"#,
        )
        .expect("valid card regex")
    });

    re.captures_iter(fragment)
        .filter_map(|cap| {
            let href = cap.get(1)?.as_str().trim_end_matches('/');
            let slug = href.rsplit('/').next()?.to_string();
            if slug.is_empty() {
                return None;
            }
            let title = clean_html_text(cap.get(2).map_or("", |m| m.as_str()));
            let price_text = price_near(fragment, &slug);
            Some(Card {
                slug,
                title,
                price_text,
            })
        })
        .collect()
}

/// Best-effort price from the card fragment: the first Kč amount after the
/// slug's anchor.
fn price_near(fragment: &str, slug: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)([\d][\d\s\u{a0}]{2,20}K[čc])").expect("valid card price regex")
    });

    let tail = match fragment.find(slug) {
        Some(pos) => &fragment[pos..],
        None => fragment,
    };
    re.captures(tail)
        .and_then(|cap| cap.get(1))
        .map_or_else(String::new, |m| m.as_str().trim().to_string())
}

fn parse_detail(html: &str, card: &Card, url: &str) -> ListingRecord {
    let mut record = ListingRecord::new(SOURCE_CODE, card.slug.clone());
    record.url = url.to_string();
    record.title = extract_h1(html).unwrap_or_else(|| card.title.clone());

    record.price = extract_labeled(html, "cena")
        .and_then(|text| parse_price(&text))
        .or_else(|| parse_price(&card.price_text))
        .or_else(|| crate::parse::extract_price_czk(html));

    let area_text = extract_labeled(html, "plocha").unwrap_or_default();
    record.area_built_up = parse_area(&area_text);
    // "161 m² / 750 m²" — the second token is the land plot.
    if let Some((_, land)) = area_text.split_once('/') {
        record.area_land = parse_area(land);
    }

    record.location_text = extract_labeled(html, "lokalita")
        .or_else(|| extract_labeled(html, "obec"))
        .unwrap_or_else(|| "Znojmo a okolí".to_string());

    record.property_type =
        Some(infer_property_type(&[&record.title, &card.title]).to_string());
    record.offer_type = Some(normalize_offer_type(&record.title).to_string());
    record.description = extract_description(html);
    record.photos = extract_photos(html);

    record
}

/// `Label: value` rows in tables or definition lists, matched loosely.
fn extract_labeled(html: &str, label: &str) -> Option<String> {
    let pattern = format!(
        r"(?is){label}\s*:?\s*</[^>]+>\s*<[^>]+>(.*?)</|{label}\s*:\s*([^<\n]+)"
    );
    let re = Regex::new(&pattern).ok()?;
    let cap = re.captures(html)?;
    let raw = cap
        .get(1)
        .or_else(|| cap.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default();
    let text = clean_html_text(raw);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn extract_description(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)<div[^>]+class=["'][^"']*(?:description|popis|content)[^"']*["'][^>]*>(.*?)</div>"#)
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
        if !(lower.contains("foto") || lower.contains("gallery") || lower.contains("upload")) {
            continue;
        }
        let full = crate::parse::absolutize(BASE_URL, &src);
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

    const CARD_FRAGMENT: &str = r#"
<div class="project-item">
  <h3 class="title"><a href="/nabidky/suchohrdly/">Rodinný dům Suchohrdly</a></h3>
  <p class="price">3 500 000 Kč</p>
</div>
<div class="project-item">
  <h2 class="title"><a href="/nabidky/znojmo-vinohrady">Stavební pozemek Znojmo</a></h2>
  <p class="price">cena dohodou</p>
</div>
"#;

    #[test]
    fn cards_are_parsed_with_slugs() {
        let cards = parse_cards(CARD_FRAGMENT);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].slug, "suchohrdly");
        assert_eq!(cards[1].slug, "znojmo-vinohrady");
        assert_eq!(cards[0].title, "Rodinný dům Suchohrdly");
    }

    #[test]
    fn card_price_is_captured_when_present() {
        let cards = parse_cards(CARD_FRAGMENT);
        assert_eq!(parse_price(&cards[0].price_text), Some(3_500_000.0));
        assert_eq!(parse_price(&cards[1].price_text), None);
    }

    #[test]
    fn empty_fragment_has_no_cards() {
        assert!(parse_cards("<div></div>").is_empty());
    }

    fn card() -> Card {
        Card {
            slug: "suchohrdly".to_string(),
            title: "Rodinný dům Suchohrdly".to_string(),
            price_text: String::new(),
        }
    }

    #[test]
    fn detail_parses_labeled_rows() {
        let html = r#"<html>
<h1>Prodej rodinného domu Suchohrdly</h1>
<table>
<tr><td>Cena</td><td>3 500 000 Kč</td></tr>
<tr><td>Plocha</td><td>161 m² / 750 m²</td></tr>
<tr><td>Lokalita</td><td>Suchohrdly, okres Znojmo</td></tr>
</table>
<div class="description">Prostorný rodinný dům se zahradou v obci Suchohrdly u Znojma.</div>
<img src="/foto/suchohrdly-01.jpg">
</html>"#;
        let record = parse_detail(html, &card(), "https://www.prodejme.to/nabidky/suchohrdly");
        assert_eq!(record.price, Some(3_500_000.0));
        assert_eq!(record.area_built_up, Some(161.0));
        assert_eq!(record.area_land, Some(750.0));
        assert_eq!(record.location_text, "Suchohrdly, okres Znojmo");
        assert_eq!(record.property_type.as_deref(), Some("Dům"));
        assert_eq!(record.offer_type.as_deref(), Some("Prodej"));
        assert_eq!(record.photos.len(), 1);
        assert!(record.description.is_some());
    }

    #[test]
    fn negotiated_price_stays_none() {
        let html = "<h1>Prodej pozemku</h1><table><tr><td>Cena</td><td>cena dohodou</td></tr></table>";
        let record = parse_detail(html, &card(), "https://www.prodejme.to/nabidky/x");
        assert_eq!(record.price, None);
    }

    #[test]
    fn rental_title_maps_to_rent() {
        let html = "<h1>Pronájem bytu 2+kk Znojmo</h1>";
        let record = parse_detail(html, &card(), "https://www.prodejme.to/nabidky/x");
        assert_eq!(record.offer_type.as_deref(), Some("Pronájem"));
    }
}
