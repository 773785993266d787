//! Best-effort product image discovery.

use scraper::{Html, Selector};
use url::Url;

/// Attribute sources tried in order before falling back to `<img>` tags.
const META_SOURCES: &[(&str, &str)] = &[
    (r#"meta[property="og:image"]"#, "content"),
    (r#"meta[name="twitter:image"]"#, "content"),
    (r#"link[rel="image_src"]"#, "href"),
];

/// Minimum `src` length for a plain `<img>` to be considered a product image.
const MIN_IMG_SRC_LEN: usize = 10;

/// Find a representative image URL for the page.
///
/// Root-relative results are resolved against the page URL's origin; other
/// values are returned as found. Never fails.
pub fn extract_thumbnail(document: &Html, page_url: &str) -> Option<String> {
    let found = META_SOURCES
        .iter()
        .find_map(|(selector, attr)| first_attr(document, selector, attr))
        .or_else(|| first_product_img(document))?;

    Some(resolve_root_relative(&found, page_url))
}

fn first_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn first_product_img(document: &Html) -> Option<String> {
    let selector = Selector::parse("img").ok()?;
    document
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .find(|src| src.len() >= MIN_IMG_SRC_LEN && !src.contains("svg") && !src.contains("icon"))
        .map(str::to_string)
}

fn resolve_root_relative(thumb: &str, page_url: &str) -> String {
    if !thumb.starts_with('/') {
        return thumb.to_string();
    }
    Url::parse(page_url)
        .and_then(|base| base.join(thumb))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| thumb.to_string())
}
