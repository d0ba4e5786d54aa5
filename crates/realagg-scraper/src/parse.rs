//! Shared text extraction helpers for portal HTML and payloads.
//!
//! Czech portals format prices as `"3 500 000 Kč"` (regular or non-breaking
//! spaces) and areas as `"161 m²"`, sometimes with a second figure for the
//! land plot (`"161 m² / 750 m²"`). Only the first numeric token of an area
//! counts.

use std::sync::OnceLock;

use regex::Regex;

/// Parse a price string to a numeric amount.
///
/// Returns `None` for empty input or text with no digits
/// (e.g. `"cena dohodou"`).
#[must_use]
pub fn parse_price(text: &str) -> Option<f64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<f64>().ok()
}

/// Parse an area string, taking the first numeric token only.
#[must_use]
pub fn parse_area(text: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d[\d\s\u{a0}]*)").expect("valid area regex"));

    let m = re.captures(text)?.get(1)?;
    let digits: String = m.as_str().chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<f64>().ok()
}

/// Infer a Czech property label from free text (usually the title).
///
/// "pozem" is checked before the cottage keywords so "Chalupa s pozemkem"
/// classifies as land, matching how listings are actually categorized.
#[must_use]
pub fn infer_property_type(candidates: &[&str]) -> &'static str {
    for candidate in candidates {
        let lower = candidate.to_lowercase();
        if lower.is_empty() {
            continue;
        }
        if lower.contains("byt") {
            return "Byt";
        }
        if lower.contains("pozem") || lower.contains("parcel") || lower.contains("zahrad") {
            return "Pozemek";
        }
        if lower.contains("dům") || lower.contains("dum") || lower.contains("vila") {
            return "Dům";
        }
        if lower.contains("komerč") || lower.contains("komerc") || lower.contains("kancelář") {
            return "Komerční";
        }
        if lower.contains("chata") || lower.contains("chalup") || lower.contains("rekrea") {
            return "Chata";
        }
        if lower.contains("garáž") || lower.contains("garaz") {
            return "Garáž";
        }
    }
    "Ostatní"
}

/// Normalize a Czech offer label: anything containing "pronaj" (with or
/// without diacritics) is a rental, everything else a sale.
#[must_use]
pub fn normalize_offer_type(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if lower.contains("pronáj") || lower.contains("pronaj") {
        "Pronájem"
    } else {
        "Prodej"
    }
}

/// Strip tags and collapse whitespace in an HTML fragment.
#[must_use]
pub fn clean_html_text(input: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?is)<[^>]+>").expect("valid tags regex"));
    let no_tags = re.replace_all(input, " ");
    no_tags.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract every `href` attribute from an HTML fragment, in document order.
#[must_use]
pub fn extract_hrefs(html: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r#"(?is)href\s*=\s*["']([^"']+)["']"#).expect("valid href regex"));
    re.captures_iter(html)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|href| {
            !href.is_empty()
                && !href.starts_with('#')
                && !href.starts_with("mailto:")
                && !href.starts_with("javascript:")
        })
        .collect()
}

/// Extract every `img src` (or `data-src`) attribute from a fragment.
#[must_use]
pub fn extract_img_srcs(html: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?is)<img[^>]+?(?:data-src|src)\s*=\s*["']([^"']+)["']"#)
            .expect("valid img regex")
    });
    re.captures_iter(html)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|src| !src.is_empty())
        .collect()
}

/// First `<h1>` text of a page, tags stripped.
#[must_use]
pub fn extract_h1(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("valid h1 regex"));
    let text = clean_html_text(re.captures(html)?.get(1)?.as_str());
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// The first short price-looking text (`… Kč`) on a page.
///
/// Skips long matches, which are usually description sentences that merely
/// mention an amount.
#[must_use]
pub fn extract_price_czk(html: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)([\d][\d\s\u{a0}]{2,20})K[čc]").expect("valid price regex")
    });

    for cap in re.captures_iter(html) {
        let raw = cap.get(1).map_or("", |m| m.as_str());
        if let Some(price) = parse_price(raw) {
            if price > 10_000.0 {
                return Some(price);
            }
        }
    }
    None
}

/// Resolve a possibly-relative href against a base origin.
#[must_use]
pub fn absolutize(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if href.starts_with("//") {
        return format!("https:{href}");
    }
    let base = base.trim_end_matches('/');
    if href.starts_with('/') {
        format!("{base}{href}")
    } else {
        format!("{base}/{href}")
    }
}

/// Extract the `__NEXT_DATA__` JSON payload embedded in a Next.js page.
#[must_use]
pub fn extract_next_data(html: &str) -> Option<serde_json::Value> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?s)<script id="__NEXT_DATA__"[^>]*>(.*?)</script>"#)
            .expect("valid next-data regex")
    });
    let raw = re.captures(html)?.get(1)?.as_str();
    serde_json::from_str(raw).ok()
}

/// Parameter rows of a `label | value` detail table, keyed by the
/// upper-cased label.
#[must_use]
pub fn extract_table_params(html: &str) -> Vec<(String, String)> {
    static ROW_RE: OnceLock<Regex> = OnceLock::new();
    static CELL_RE: OnceLock<Regex> = OnceLock::new();
    let row_re =
        ROW_RE.get_or_init(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("valid tr regex"));
    let cell_re = CELL_RE.get_or_init(|| {
        Regex::new(r"(?is)<t[dh][^>]*>(.*?)</t[dh]>").expect("valid td regex")
    });

    let mut params = Vec::new();
    for row in row_re.captures_iter(html) {
        let row_html = row.get(1).map_or("", |m| m.as_str());
        let cells: Vec<String> = cell_re
            .captures_iter(row_html)
            .filter_map(|c| c.get(1).map(|m| clean_html_text(m.as_str())))
            .collect();
        if cells.len() >= 2 && !cells[0].is_empty() && !cells[1].is_empty() {
            params.push((cells[0].to_uppercase(), cells[1].clone()));
        }
    }
    params
}

/// Look up a table param by label, case-insensitively.
#[must_use]
pub fn table_param<'a>(params: &'a [(String, String)], label: &str) -> Option<&'a str> {
    let needle = label.to_uppercase();
    params
        .iter()
        .find(|(key, _)| key.contains(&needle))
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_with_spaces_parses() {
        assert_eq!(parse_price("3 500 000 Kč"), Some(3_500_000.0));
    }

    #[test]
    fn price_without_spaces_parses() {
        assert_eq!(parse_price("1250000"), Some(1_250_000.0));
    }

    #[test]
    fn negotiated_price_is_none() {
        assert_eq!(parse_price("cena dohodou"), None);
    }

    #[test]
    fn empty_price_is_none() {
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn padded_price_parses() {
        assert_eq!(parse_price("  2 000 000  Kč  "), Some(2_000_000.0));
    }

    #[test]
    fn area_with_unit_parses() {
        assert_eq!(parse_area("161 m²"), Some(161.0));
    }

    #[test]
    fn area_without_space_parses() {
        assert_eq!(parse_area("750m2 pozemek"), Some(750.0));
    }

    #[test]
    fn area_takes_first_numeric_token() {
        assert_eq!(parse_area("161 m² / 750 m²"), Some(161.0));
    }

    #[test]
    fn area_without_digits_is_none() {
        assert_eq!(parse_area("bez plochy"), None);
        assert_eq!(parse_area(""), None);
    }

    #[test]
    fn property_type_keywords() {
        assert_eq!(infer_property_type(&["Prodej bytu 2+kk"]), "Byt");
        assert_eq!(infer_property_type(&["Rodinný dům"]), "Dům");
        assert_eq!(infer_property_type(&["Stavební pozemek"]), "Pozemek");
        assert_eq!(infer_property_type(&["Komerční prostory"]), "Komerční");
        assert_eq!(infer_property_type(&["Rekreační chata"]), "Chata");
        assert_eq!(infer_property_type(&["Jiné"]), "Ostatní");
    }

    #[test]
    fn land_mention_beats_cottage() {
        assert_eq!(infer_property_type(&["Chalupa s pozemkem"]), "Pozemek");
        assert_eq!(infer_property_type(&["Chalupa"]), "Chata");
    }

    #[test]
    fn empty_candidates_are_skipped() {
        assert_eq!(infer_property_type(&["", "bytová jednotka"]), "Byt");
    }

    #[test]
    fn offer_type_rental_keywords() {
        assert_eq!(normalize_offer_type("pronajem"), "Pronájem");
        assert_eq!(normalize_offer_type("pronájem"), "Pronájem");
        assert_eq!(normalize_offer_type("pronajmu"), "Pronájem");
    }

    #[test]
    fn offer_type_defaults_to_sale() {
        assert_eq!(normalize_offer_type("Prodej"), "Prodej");
        assert_eq!(normalize_offer_type("PRODEJ"), "Prodej");
        assert_eq!(normalize_offer_type(""), "Prodej");
    }

    #[test]
    fn hrefs_are_extracted_in_order() {
        let html = r##"<a href="/a">A</a> <a href='/b'>B</a> <a href="#x">skip</a>"##;
        assert_eq!(extract_hrefs(html), vec!["/a", "/b"]);
    }

    #[test]
    fn h1_text_is_cleaned() {
        let html = "<h1 class=\"t\">Prodej <b>domu</b>\n 5+1</h1>";
        assert_eq!(extract_h1(html).as_deref(), Some("Prodej domu 5+1"));
    }

    #[test]
    fn price_czk_on_page_is_found() {
        let html = "<div>Nabídková cena: 3 500 000 Kč</div>";
        assert_eq!(extract_price_czk(html), Some(3_500_000.0));
    }

    #[test]
    fn tiny_amounts_are_ignored() {
        let html = "<div>záloha 500 Kč</div>";
        assert_eq!(extract_price_czk(html), None);
    }

    #[test]
    fn absolutize_handles_relative_and_absolute() {
        assert_eq!(
            absolutize("https://example.cz", "/detail/1"),
            "https://example.cz/detail/1"
        );
        assert_eq!(
            absolutize("https://example.cz/", "https://cdn.cz/a.jpg"),
            "https://cdn.cz/a.jpg"
        );
        assert_eq!(
            absolutize("https://example.cz", "//cdn.cz/a.jpg"),
            "https://cdn.cz/a.jpg"
        );
    }

    #[test]
    fn next_data_payload_is_extracted() {
        let html = r#"<html><script id="__NEXT_DATA__" type="application/json">{"props":{"pageProps":{"count":1}}}</script></html>"#;
        let data = extract_next_data(html).expect("payload parses");
        assert_eq!(data["props"]["pageProps"]["count"], 1);
    }

    #[test]
    fn malformed_next_data_is_none() {
        let html = r#"<script id="__NEXT_DATA__" type="application/json">{broken</script>"#;
        assert!(extract_next_data(html).is_none());
    }

    #[test]
    fn table_params_are_keyed_by_upper_label() {
        let html = "<table><tr><td>Cena</td><td>4 200 000 Kč</td></tr>\
                    <tr><td>Užitná plocha</td><td>161 m²</td></tr></table>";
        let params = extract_table_params(html);
        assert_eq!(table_param(&params, "cena"), Some("4 200 000 Kč"));
        assert_eq!(table_param(&params, "užitná plocha"), Some("161 m²"));
        assert_eq!(table_param(&params, "okres"), None);
    }

    #[test]
    fn img_srcs_include_lazy_loaded() {
        let html = r#"<img src="/a.jpg"><img data-src="/b.jpg" src="/placeholder.gif">"#;
        let srcs = extract_img_srcs(html);
        assert!(srcs.contains(&"/a.jpg".to_string()));
        assert!(srcs.contains(&"/b.jpg".to_string()));
    }
}
