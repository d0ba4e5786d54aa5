//! Reality iDNES.cz adapter.
//!
//! Discovery walks the sitemap index: the index lists gzipped sub-sitemaps,
//! each of which lists listing URLs. Only sale/rental URLs in the target
//! region are kept. Detail pages are server-rendered HTML.

use std::io::Read;
use std::sync::OnceLock;

use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

use realagg_core::ListingRecord;

use crate::context::{RunSummary, ScrapeContext};
use crate::error::ScrapeError;
use crate::parse::{clean_html_text, extract_h1, extract_img_srcs, extract_price_czk};

const SOURCE_CODE: &str = "IDNES";
const BASE_URL: &str = "https://reality.idnes.cz";
const REGION_KEYWORD: &str = "znojmo";

pub(super) async fn run(
    ctx: &ScrapeContext,
    full_rescan: bool,
) -> Result<RunSummary, ScrapeError> {
    let max_details: usize = if full_rescan { 999 } else { 100 };
    let mut summary = RunSummary::default();

    let sitemap_url = format!("{BASE_URL}/sitemap.xml");
    let index_xml = ctx.client.get_text(&sitemap_url).await?;
    let entries = extract_locs(&index_xml);

    // The index either lists listing URLs directly or points at gzipped
    // sub-sitemaps; collect listing URLs from both shapes.
    let mut listing_urls: Vec<String> = Vec::new();
    for entry in entries {
        if entry.ends_with(".xml.gz") || entry.ends_with(".gz") {
            match fetch_sub_sitemap(ctx, &entry).await {
                Ok(urls) => listing_urls.extend(urls),
                Err(e) => tracing::warn!(sitemap = entry, error = %e, "sub-sitemap failed"),
            }
        } else if is_listing_url(&entry) {
            listing_urls.push(entry);
        }
    }

    listing_urls.retain(|url| is_listing_url(url));
    listing_urls.dedup();
    tracing::info!(count = listing_urls.len(), "listing urls discovered from sitemap");

    for url in listing_urls.into_iter().take(max_details) {
        summary.found += 1;
        match ctx.client.get_text(&url).await {
            Ok(html) => match parse_detail(&html, &url) {
                Some(record) => summary.absorb(ctx.save_record(record).await),
                None => {
                    tracing::warn!(url, "detail page did not parse");
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

async fn fetch_sub_sitemap(ctx: &ScrapeContext, url: &str) -> Result<Vec<String>, ScrapeError> {
    let bytes = ctx.client.get_bytes(url).await?;
    let xml = gunzip_to_string(&bytes).map_err(|source| ScrapeError::Decompress {
        url: url.to_string(),
        source,
    })?;
    Ok(extract_locs(&xml)
        .into_iter()
        .filter(|u| is_listing_url(u))
        .collect())
}

fn gunzip_to_string(bytes: &[u8]) -> std::io::Result<String> {
    // Some mirrors serve sub-sitemaps already decompressed despite the
    // .gz suffix; fall back to plain text when the magic bytes are absent.
    if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut decoder = GzDecoder::new(bytes);
        let mut xml = String::new();
        decoder.read_to_string(&mut xml)?;
        Ok(xml)
    } else {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

fn is_listing_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    (lower.contains("/prodej/") || lower.contains("/pronajem/"))
        && lower.contains(REGION_KEYWORD)
}

fn extract_locs(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut locs = Vec::new();
    let mut in_loc = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"loc" => in_loc = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"loc" => in_loc = false,
            Ok(Event::Text(t)) if in_loc => {
                if let Ok(text) = t.unescape() {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        locs.push(text);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::warn!(error = %e, "sitemap xml parse error");
                break;
            }
            _ => {}
        }
    }
    locs
}

fn parse_detail(html: &str, url: &str) -> Option<ListingRecord> {
    let title = extract_h1(html)?;

    let mut record = ListingRecord::new(SOURCE_CODE, extract_external_id(url));
    record.url = url.to_string();
    record.title = title;
    record.price = extract_price_czk(html);
    record.location_text = extract_location(html).unwrap_or_default();
    record.description = extract_description(html);
    record.area_built_up = extract_area(html);

    let lower_url = url.to_lowercase();
    record.property_type = Some(
        if lower_url.contains("/byt") {
            "Byt"
        } else if lower_url.contains("/dum") || lower_url.contains("/dům") {
            "Dům"
        } else if lower_url.contains("/pozemek") {
            "Pozemek"
        } else {
            "Ostatní"
        }
        .to_string(),
    );
    record.offer_type = Some(
        if lower_url.contains("/pronajem") {
            "Pronájem"
        } else {
            "Prodej"
        }
        .to_string(),
    );

    record.photos = extract_gallery_photos(html);

    Some(record)
}

/// Gallery imgs carry photo/image/gallery in their class attribute.
fn extract_gallery_photos(html: &str) -> Vec<String> {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let tag_re = TAG_RE.get_or_init(|| Regex::new(r"(?is)<img[^>]+>").expect("valid img tag regex"));

    tag_re
        .find_iter(html)
        .map(|m| m.as_str())
        .filter(|tag| {
            let lower = tag.to_lowercase();
            lower.contains("photo") || lower.contains("image") || lower.contains("gallery")
        })
        .flat_map(extract_img_srcs)
        .map(|src| crate::parse::absolutize(BASE_URL, &src))
        .take(20)
        .collect()
}

fn extract_location(html: &str) -> Option<String> {
    static ITEMPROP_RE: OnceLock<Regex> = OnceLock::new();
    static CLASS_RE: OnceLock<Regex> = OnceLock::new();

    let itemprop = ITEMPROP_RE.get_or_init(|| {
        Regex::new(r#"(?is)<[^>]+itemprop=["']addressLocality["'][^>]*>(.*?)</"#)
            .expect("valid itemprop regex")
    });
    if let Some(cap) = itemprop.captures(html) {
        let text = clean_html_text(cap.get(1).map_or("", |m| m.as_str()));
        if !text.is_empty() {
            return Some(text);
        }
    }

    let class = CLASS_RE.get_or_init(|| {
        Regex::new(r#"(?is)<span[^>]+class=["'][^"']*(?:location|place|address)[^"']*["'][^>]*>(.*?)</span>"#)
            .expect("valid location regex")
    });
    let cap = class.captures(html)?;
    let text = clean_html_text(cap.get(1).map_or("", |m| m.as_str()));
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn extract_description(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)<div[^>]+class=["'][^"']*(?:description|b-desc)[^"']*["'][^>]*>(.*?)</div>"#)
            .expect("valid description regex")
    });
    let cap = re.captures(html)?;
    let text = clean_html_text(cap.get(1).map_or("", |m| m.as_str()));
    if text.len() < 10 {
        None
    } else {
        Some(text.chars().take(5000).collect())
    }
}

fn extract_area(html: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)<span[^>]+class=["'][^"']*(?:area|size)[^"']*["'][^>]*>(.*?)</span>"#)
            .expect("valid area regex")
    });
    let cap = re.captures(html)?;
    crate::parse::parse_area(&clean_html_text(cap.get(1).map_or("", |m| m.as_str())))
}

fn extract_external_id(url: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d+)/?$").expect("valid id regex"));
    re.captures(url)
        .and_then(|cap| cap.get(1))
        .map_or_else(
            || url.rsplit('/').next().unwrap_or(url).to_string(),
            |m| m.as_str().to_string(),
        )
}
