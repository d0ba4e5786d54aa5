//! Reas.cz adapter.
//!
//! Next.js SSR: every category page embeds the full listing payload in its
//! `__NEXT_DATA__` script tag. The CDN in front of the HTML ignores the
//! `?page=N` query and serves page 1 for every page, so:
//!
//! - incremental runs accept the cached first page and fetch two
//!   differently-sorted landing URLs to widen the catch;
//! - full rescans bypass the CDN through the framework's own JSON data
//!   endpoint `/_next/data/{buildId}/{category}.json?page=N`, with the
//!   build id derived from the home page once per run.
//!
//! The category count is also a trap: when the server-side locality filter
//! silently fails, `count` reports the unfiltered national total. Anything
//! above [`MAX_EXPECTED_CATEGORY_COUNT`] skips the category rather than
//! ingest half the country.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde_json::Value;

use realagg_core::ListingRecord;

use crate::context::{ItemOutcome, RunSummary, ScrapeContext};
use crate::error::ScrapeError;
use crate::parse::extract_next_data;

const SOURCE_CODE: &str = "REAS";
const BASE_URL: &str = "https://www.reas.cz";
const PAGE_LIMIT: u64 = 10;
const MAX_EXPECTED_CATEGORY_COUNT: u64 = 500;

/// (category path, offer label, segment key, locality hint)
///
/// The locality hint is appended to `location_text` when the formatted
/// address lacks it; sub-municipalities like "Oblekovice" would otherwise
/// fail the district filter.
const CATEGORIES: [(&str, &str, &str, &str); 1] = [(
    "prodej/domy/jihomoravsky-kraj/cena-do-10-milionu",
    "Prodej",
    "domy",
    "Jihomoravský kraj",
)];

/// Differently-sorted variants of the same category landing page; the CDN
/// caches each separately, so an incremental pass over both sees more of
/// the fresh inventory than one cached page would.
const INCREMENTAL_SORTS: [&str; 2] = ["", "?sort=newest"];

fn segment_name(segment: &str) -> &'static str {
    match segment {
        "byty" => "bytu",
        "domy" => "domu",
        "pozemky" => "pozemku",
        "komerci" => "komerční nemovitosti",
        _ => "nemovitosti",
    }
}

fn property_type_label(reas_type: &str) -> &'static str {
    match reas_type {
        "flat" => "Apartment",
        "house" => "House",
        "land" => "Land",
        "commercial" => "Commercial",
        "cottage" => "Cottage",
        "garage" => "Garage",
        _ => "Other",
    }
}

pub(super) async fn run(
    ctx: &ScrapeContext,
    full_rescan: bool,
) -> Result<RunSummary, ScrapeError> {
    let tuning = ctx.tuning("reas");
    let mut summary = RunSummary::default();

    let build_id = if full_rescan {
        Some(derive_build_id(ctx).await?)
    } else {
        None
    };

    for (category_path, offer_type, segment, locality_hint) in CATEGORIES {
        let result = scrape_category(
            ctx,
            category_path,
            offer_type,
            segment,
            locality_hint,
            build_id.as_deref(),
            tuning.fetch_details,
            tuning.detail_fetch_concurrency.max(1),
        )
        .await;

        match result {
            Ok(category_summary) => summary.merge(category_summary),
            Err(e) => {
                tracing::error!(category = category_path, error = %e, "category failed");
                summary.failed += 1;
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    Ok(summary)
}

/// The Next.js build id is embedded in every SSR page; one fetch of the
/// home page per run is enough, and the next run re-derives it.
async fn derive_build_id(ctx: &ScrapeContext) -> Result<String, ScrapeError> {
    let html = ctx.client.get_text(BASE_URL).await?;
    extract_build_id(&html).ok_or(ScrapeError::MissingBuildId {
        url: BASE_URL.to_string(),
    })
}

fn extract_build_id(html: &str) -> Option<String> {
    extract_next_data(html)?["buildId"].as_str().map(str::to_string)
}

#[allow(clippy::too_many_arguments)]
async fn scrape_category(
    ctx: &ScrapeContext,
    category_path: &str,
    offer_type: &str,
    segment: &str,
    locality_hint: &str,
    build_id: Option<&str>,
    fetch_details: bool,
    detail_concurrency: usize,
) -> Result<RunSummary, ScrapeError> {
    let mut summary = RunSummary::default();

    let first_page = fetch_listing_page(ctx, category_path, 1, build_id).await?;
    let Some(first_page) = first_page else {
        tracing::warn!(category = category_path, "no payload on page 1");
        return Ok(summary);
    };

    let total_count = first_page["count"].as_u64().unwrap_or(0);
    let total_pages = total_count.div_ceil(PAGE_LIMIT).max(1);

    if total_count > MAX_EXPECTED_CATEGORY_COUNT {
        tracing::error!(
            category = category_path,
            count = total_count,
            limit = MAX_EXPECTED_CATEGORY_COUNT,
            "count looks like the unfiltered national total, skipping category"
        );
        return Ok(summary);
    }

    tracing::info!(
        category = category_path,
        count = total_count,
        pages = total_pages,
        "category discovered"
    );

    if let Some(build_id) = build_id {
        // Full rescan: walk every page through the data endpoint.
        let mut page: u64 = 1;
        while page <= total_pages {
            let payload = if page == 1 {
                Some(first_page.clone())
            } else {
                fetch_listing_page(ctx, category_path, page, Some(build_id)).await?
            };
            if let Some(payload) = payload {
                process_page(
                    ctx,
                    &payload,
                    offer_type,
                    segment,
                    locality_hint,
                    fetch_details,
                    detail_concurrency,
                    &mut summary,
                )
                .await;
            }
            page += 1;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    } else {
        // Incremental: the CDN pins us to page 1; take it under both sort
        // orders and let the upsert dedup the overlap.
        process_page(
            ctx,
            &first_page,
            offer_type,
            segment,
            locality_hint,
            fetch_details,
            detail_concurrency,
            &mut summary,
        )
        .await;

        for sort in &INCREMENTAL_SORTS[1..] {
            let url = format!("{BASE_URL}/{category_path}{sort}");
            match ctx.client.get_text(&url).await {
                Ok(html) => {
                    if let Some(payload) = payload_from_html(&html) {
                        process_page(
                            ctx,
                            &payload,
                            offer_type,
                            segment,
                            locality_hint,
                            fetch_details,
                            detail_concurrency,
                            &mut summary,
                        )
                        .await;
                    }
                }
                Err(e) => tracing::warn!(url, error = %e, "sorted landing fetch failed"),
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    Ok(summary)
}

/// Fetch one category page. With a build id the framework data endpoint is
/// used (real pagination); without it the HTML page is fetched and the SSR
/// payload extracted.
async fn fetch_listing_page(
    ctx: &ScrapeContext,
    category_path: &str,
    page: u64,
    build_id: Option<&str>,
) -> Result<Option<Value>, ScrapeError> {
    if let Some(build_id) = build_id {
        let url = format!("{BASE_URL}/_next/data/{build_id}/{category_path}.json?page={page}");
        let data: Value = ctx.client.get_json(&url).await?;
        Ok(ads_list_result(&data))
    } else {
        let url = format!("{BASE_URL}/{category_path}?page={page}");
        let html = ctx.client.get_text(&url).await?;
        Ok(payload_from_html(&html))
    }
}

fn payload_from_html(html: &str) -> Option<Value> {
    ads_list_result(&extract_next_data(html)?)
}

/// The ads payload sits under `pageProps.adsListResult` both in the SSR
/// document and in the `_next/data` response.
fn ads_list_result(data: &Value) -> Option<Value> {
    let props = if data["props"].is_object() {
        &data["props"]["pageProps"]
    } else {
        &data["pageProps"]
    };
    let result = &props["adsListResult"];
    if result.is_object() {
        Some(result.clone())
    } else {
        None
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_page(
    ctx: &ScrapeContext,
    payload: &Value,
    offer_type: &str,
    segment: &str,
    locality_hint: &str,
    fetch_details: bool,
    detail_concurrency: usize,
    summary: &mut RunSummary,
) {
    let ads = payload["data"].as_array().cloned().unwrap_or_default();
    summary.found += ads.len() as u64;

    let outcomes: Vec<ItemOutcome> = stream::iter(ads)
        .map(|ad| process_ad(ctx, ad, offer_type, segment, locality_hint, fetch_details))
        .buffer_unordered(detail_concurrency)
        .collect()
        .await;
    for outcome in outcomes {
        summary.absorb(outcome);
    }
}

async fn process_ad(
    ctx: &ScrapeContext,
    ad: Value,
    offer_type: &str,
    segment: &str,
    locality_hint: &str,
    fetch_details: bool,
) -> ItemOutcome {
    let mut description = None;

    if fetch_details {
        if let Some(link) = ad["link"].as_str() {
            match ctx.client.get_text(link).await {
                Ok(html) => {
                    description = parse_description(&html);
                    tokio::time::sleep(Duration::from_millis(300)).await;
                }
                Err(e) => tracing::debug!(link, error = %e, "detail fetch failed"),
            }
        }
    }

    let Some(record) = build_listing(&ad, offer_type, segment, description, locality_hint) else {
        return ItemOutcome::Skipped;
    };
    ctx.save_record(record).await
}

fn parse_description(html: &str) -> Option<String> {
    let nd = extract_next_data(html)?;
    let detail = &nd["props"]["pageProps"]["adEstateDetail"];
    let desc = detail["description"]
        .as_str()
        .or_else(|| detail["text"].as_str())?;
    let trimmed = desc.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(4000).collect())
}

fn build_listing(
    ad: &Value,
    offer_type: &str,
    segment: &str,
    description: Option<String>,
    locality_hint: &str,
) -> Option<ListingRecord> {
    let external_id = ad["_id"].as_str()?.to_string();
    let mut record = ListingRecord::new(SOURCE_CODE, external_id.clone());

    record.url = ad["link"]
        .as_str()
        .map_or_else(|| format!("{BASE_URL}/inzerat/{external_id}"), str::to_string);

    let reas_type = ad["type"]
        .as_str()
        .or_else(|| ad["subType"].as_str())
        .unwrap_or("other");
    record.property_type = Some(property_type_label(&reas_type.to_lowercase()).to_string());
    record.offer_type = Some(offer_type.to_string());

    let disposition = ad["disposition"].as_str().unwrap_or_default();
    let area = ad["displayArea"].as_f64().or_else(|| ad["floorArea"].as_f64());
    let location_short = ad["formattedAddress"]
        .as_str()
        .or_else(|| ad["formattedLocation"].as_str())
        .unwrap_or_default();

    let mut title_parts: Vec<String> =
        vec![offer_type.to_string(), segment_name(segment).to_string()];
    if !disposition.is_empty() {
        title_parts.push(disposition.to_string());
        record.disposition = Some(disposition.to_uppercase());
    }
    if let Some(area) = area {
        title_parts.push(format!("{area} m²"));
    }
    if !location_short.is_empty() {
        title_parts.push(format!("– {location_short}"));
    }
    record.title = title_parts.join(" ");

    record.price = ad["price"]
        .as_f64()
        .or_else(|| ad["originalPrice"].as_f64());
    record.area_built_up = area;

    let mut location_text = ad["formattedLocation"]
        .as_str()
        .or_else(|| ad["formattedAddress"].as_str())
        .unwrap_or_default()
        .to_string();
    if !locality_hint.is_empty()
        && !location_text
            .to_lowercase()
            .contains(&locality_hint.to_lowercase())
    {
        if location_text.is_empty() {
            location_text = locality_hint.to_string();
        } else {
            location_text = format!("{location_text}, {locality_hint}");
        }
    }
    record.location_text = location_text;

    // GeoJSON order: [longitude, latitude].
    if let Some(coords) = ad["point"]["coordinates"].as_array() {
        if coords.len() >= 2 {
            record.longitude = coords[0].as_f64();
            record.latitude = coords[1].as_f64();
        }
    }

    let mut images: Vec<(i64, String)> = ad["imagesWithMetadata"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|img| {
            let url = img["original"].as_str().or_else(|| img["preview"].as_str())?;
            Some((img["order"].as_i64().unwrap_or(999), url.to_string()))
        })
        .collect();
    images.sort_by_key(|(order, _)| *order);
    record.photos = images.into_iter().map(|(_, url)| url).take(20).collect();

    record.description = description;
    Some(record)
}
