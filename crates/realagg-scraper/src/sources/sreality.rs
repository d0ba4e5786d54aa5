//! Sreality.cz adapter.
//!
//! Pure JSON REST: `/api/cs/v2/estates` paginates the list, and
//! `/api/cs/v2/estates/{hash_id}` carries the description, parameter items,
//! and the full photo set. GPS arrives already in the list payload.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde_json::Value;

use realagg_core::ListingRecord;

use crate::context::{ItemOutcome, RunSummary, ScrapeContext};
use crate::error::ScrapeError;

const SOURCE_CODE: &str = "SREALITY";
const BASE_API: &str = "https://www.sreality.cz/api/cs/v2";
const BASE_WEB: &str = "https://www.sreality.cz";
const PER_PAGE: u32 = 60;

fn category_main_label(cb: i64) -> &'static str {
    match cb {
        1 => "Byt",
        2 => "Dům",
        3 => "Pozemek",
        4 => "Komerční",
        _ => "Ostatní",
    }
}

fn category_type_label(cb: i64) -> &'static str {
    match cb {
        2 => "Pronájem",
        3 => "Dražba",
        _ => "Prodej",
    }
}

fn category_main_slug(cb: i64) -> &'static str {
    match cb {
        1 => "byt",
        3 => "pozemek",
        4 => "komercni",
        5 => "ostatni",
        _ => "dum",
    }
}

fn category_type_slug(cb: i64) -> &'static str {
    match cb {
        2 => "pronajem",
        3 => "drazba",
        _ => "prodej",
    }
}

fn category_sub_slug(cb: i64) -> Option<&'static str> {
    Some(match cb {
        2 => "1+kk",
        3 => "1+1",
        4 => "2+kk",
        5 => "2+1",
        6 => "3+kk",
        7 => "3+1",
        8 => "4+kk",
        9 => "4+1",
        10 => "5+kk",
        11 => "5+1",
        12 => "6-a-vice",
        16 => "atypicke",
        17 => "bydleni",
        18 => "zemedelsky",
        19 => "komercni",
        21 => "ostatni",
        22 => "les",
        23 => "rybniky",
        24 => "garaz",
        25 => "stani",
        26 => "vinice-sad",
        27 => "kancelar",
        28 => "sklad",
        29 => "vyroba",
        30 => "obchodni",
        31 => "ubytovani",
        32 => "restaurace",
        33 => "vila",
        37 => "rodinny",
        39 => "chata",
        43 => "radovy",
        44 => "bungalov",
        45 => "bytovy-dum",
        46 => "atypicky",
        _ => return None,
    })
}

pub(super) async fn run(
    ctx: &ScrapeContext,
    full_rescan: bool,
) -> Result<RunSummary, ScrapeError> {
    let tuning = ctx.tuning("sreality");
    let max_pages: u32 = if full_rescan { 999 } else { 5 };
    let mut summary = RunSummary::default();

    let mut page: u32 = 1;
    while page <= max_pages {
        let url = list_url(
            page,
            tuning.locality_region_id,
            tuning.locality_district_id,
        );
        let data: Value = ctx.client.get_json(&url).await?;

        let estates = data["_embedded"]["estates"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        if estates.is_empty() {
            tracing::info!(page, "no estates on page, stopping");
            break;
        }

        let result_size = data["result_size"].as_u64().unwrap_or(0);
        tracing::info!(page, count = estates.len(), result_size, "list page fetched");
        summary.found += estates.len() as u64;

        let outcomes: Vec<ItemOutcome> = stream::iter(estates)
            .map(|estate| process_estate(ctx, estate, tuning.fetch_details))
            .buffer_unordered(tuning.detail_fetch_concurrency.max(1))
            .collect()
            .await;
        for outcome in outcomes {
            summary.absorb(outcome);
        }

        let total_pages = result_size.div_ceil(u64::from(PER_PAGE)) as u32;
        if page >= total_pages {
            break;
        }
        page += 1;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    Ok(summary)
}

fn list_url(page: u32, region_id: Option<u32>, district_id: Option<u32>) -> String {
    let mut url = format!(
        "{BASE_API}/estates?per_page={PER_PAGE}&page={page}&category_type_cb=1"
    );
    if let Some(region) = region_id {
        url.push_str(&format!("&locality_region_id={region}"));
    }
    if let Some(district) = district_id {
        url.push_str(&format!("&locality_district_id={district}"));
    }
    url
}

async fn process_estate(ctx: &ScrapeContext, estate: Value, fetch_details: bool) -> ItemOutcome {
    let Some(hash_id) = estate["hash_id"].as_i64() else {
        return ItemOutcome::Skipped;
    };

    let mut record = normalize_list_item(&estate, hash_id);

    if fetch_details {
        let detail_url = format!("{BASE_API}/estates/{hash_id}");
        match ctx.client.get_json::<Value>(&detail_url).await {
            Ok(detail) => {
                merge_detail(&mut record, &detail);
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            Err(e) => {
                tracing::warn!(hash_id, error = %e, "detail fetch failed, saving list data");
            }
        }
    }

    ctx.save_record(record).await
}

fn normalize_list_item(estate: &Value, hash_id: i64) -> ListingRecord {
    let seo = &estate["seo"];
    let cat_main = seo["category_main_cb"].as_i64().unwrap_or(2);
    let cat_sub = seo["category_sub_cb"].as_i64();
    let cat_type = seo["category_type_cb"].as_i64().unwrap_or(1);
    let locality_slug = seo["locality"].as_str().unwrap_or_default();

    let mut record = ListingRecord::new(SOURCE_CODE, hash_id.to_string());
    record.url = detail_url(cat_type, cat_main, cat_sub, locality_slug, hash_id);
    record.title = estate["name"].as_str().unwrap_or_default().to_string();
    record.location_text = estate["locality"].as_str().unwrap_or_default().to_string();
    record.property_type = Some(category_main_label(cat_main).to_string());
    record.offer_type = Some(category_type_label(cat_type).to_string());

    // value_raw of 0/1 is the portal's placeholder for "price on request".
    record.price = estate["price_czk"]["value_raw"]
        .as_f64()
        .filter(|raw| *raw > 1.0);

    record.latitude = estate["gps"]["lat"].as_f64();
    record.longitude = estate["gps"]["lon"].as_f64();
    record.photos = image_hrefs(&estate["_links"]["images"]);

    record
}

fn detail_url(
    cat_type: i64,
    cat_main: i64,
    cat_sub: Option<i64>,
    locality_slug: &str,
    hash_id: i64,
) -> String {
    let type_slug = category_type_slug(cat_type);
    let main_slug = category_main_slug(cat_main);
    let sub_slug = cat_sub.and_then(category_sub_slug);

    match (sub_slug, locality_slug.is_empty()) {
        (Some(sub), false) => {
            format!("{BASE_WEB}/detail/{type_slug}/{main_slug}/{sub}/{locality_slug}/{hash_id}")
        }
        (_, false) => format!("{BASE_WEB}/detail/{type_slug}/{main_slug}/{locality_slug}/{hash_id}"),
        _ => format!("{BASE_WEB}/detail/{type_slug}/{main_slug}/{hash_id}"),
    }
}

fn merge_detail(record: &mut ListingRecord, detail: &Value) {
    // The API returns `text` either as {"name": "Popis", "value": "..."} or
    // as a plain string, depending on listing age.
    let description = match &detail["text"] {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("value").and_then(Value::as_str).map(str::to_string),
        _ => detail["description"].as_str().map(str::to_string),
    };
    if let Some(description) = description.filter(|d| !d.is_empty()) {
        record.description = Some(description);
    }

    let mut photos = image_hrefs(&detail["_links"]["images"]);
    for img in detail["_embedded"]["images"].as_array().into_iter().flatten() {
        if let Some(href) = img["href"].as_str().or_else(|| img["url"].as_str()) {
            photos.push(href.to_string());
        }
    }
    let mut seen = std::collections::HashSet::new();
    photos.retain(|p| seen.insert(p.clone()));
    if !photos.is_empty() {
        photos.truncate(20);
        record.photos = photos;
    }

    for item in detail["items"].as_array().into_iter().flatten() {
        let Some(name) = item["name"].as_str() else {
            continue;
        };
        let value = match &item["value"] {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => continue,
        };
        let lower = name.trim().to_lowercase();
        if lower.contains("užit") || lower.contains("uzit") {
            record.area_built_up = parse_area_digits(&value);
        } else if lower.contains("pozem") {
            record.area_land = parse_area_digits(&value);
        }
    }
}

fn image_hrefs(images: &Value) -> Vec<String> {
    let mut photos: Vec<String> = images
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|img| img["href"].as_str().map(str::to_string))
        .collect();
    photos.truncate(20);
    photos
}

/// Digit-only area extraction. `is_ascii_digit` rather than a general digit
/// class because the superscript in "m²" is a Unicode digit.
fn parse_area_digits(value: &str) -> Option<f64> {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_estate() -> Value {
        json!({
            "hash_id": 123456_i64,
            "name": "Prodej rodinného domu 150 m²",
            "locality": "Znojmo, okres Znojmo",
            "seo": {
                "category_main_cb": 2,
                "category_sub_cb": 37,
                "category_type_cb": 1,
                "locality": "znojmo"
            },
            "price_czk": {"value_raw": 4_500_000},
            "gps": {"lat": 48.8555, "lon": 16.0488},
            "_links": {
                "images": [
                    {"href": "https://d18-a.sdn.cz/d_18/foto1.jpg"},
                    {"href": "https://d18-a.sdn.cz/d_18/foto2.jpg"}
                ]
            }
        })
    }

    #[test]
    fn list_item_is_normalized() {
        let estate = sample_estate();
        let record = normalize_list_item(&estate, 123_456);
        assert_eq!(record.external_id, "123456");
        assert_eq!(record.property_type.as_deref(), Some("Dům"));
        assert_eq!(record.offer_type.as_deref(), Some("Prodej"));
        assert_eq!(record.price, Some(4_500_000.0));
        assert_eq!(record.latitude, Some(48.8555));
        assert_eq!(record.photos.len(), 2);
        assert_eq!(
            record.url,
            "https://www.sreality.cz/detail/prodej/dum/rodinny/znojmo/123456"
        );
    }

    #[test]
    fn placeholder_price_becomes_none() {
        let mut estate = sample_estate();
        estate["price_czk"]["value_raw"] = json!(1);
        let record = normalize_list_item(&estate, 123_456);
        assert_eq!(record.price, None);
    }

    #[test]
    fn url_degrades_without_sub_slug() {
        let mut estate = sample_estate();
        estate["seo"]["category_sub_cb"] = Value::Null;
        let record = normalize_list_item(&estate, 123_456);
        assert_eq!(
            record.url,
            "https://www.sreality.cz/detail/prodej/dum/znojmo/123456"
        );
    }

    #[test]
    fn detail_merge_prefers_text_object_value() {
        let mut record = normalize_list_item(&sample_estate(), 123_456);
        let detail = json!({
            "text": {"name": "Popis", "value": "Prostorný dům se zahradou."},
            "items": [
                {"name": "Užitná plocha", "value": "161 m²"},
                {"name": "Plocha pozemku", "value": "750"}
            ]
        });
        merge_detail(&mut record, &detail);
        assert_eq!(
            record.description.as_deref(),
            Some("Prostorný dům se zahradou.")
        );
        assert_eq!(record.area_built_up, Some(161.0));
        assert_eq!(record.area_land, Some(750.0));
    }

    #[test]
    fn detail_merge_accepts_plain_string_text() {
        let mut record = normalize_list_item(&sample_estate(), 123_456);
        let detail = json!({"text": "Plain popis."});
        merge_detail(&mut record, &detail);
        assert_eq!(record.description.as_deref(), Some("Plain popis."));
    }

    #[test]
    fn area_parse_ignores_unicode_superscript() {
        assert_eq!(parse_area_digits("161 m²"), Some(161.0));
        assert_eq!(parse_area_digits("—"), None);
    }

    #[test]
    fn list_url_includes_locality_filters() {
        let url = list_url(2, Some(14), Some(72));
        assert!(url.contains("page=2"));
        assert!(url.contains("locality_region_id=14"));
        assert!(url.contains("locality_district_id=72"));
        let bare = list_url(1, None, None);
        assert!(!bare.contains("locality_region_id"));
    }
}
