//! HTML extraction for catalog pages
//!
//! This module turns fetched HTML into:
//! - A listing: detail-page links plus the optional next listing page
//! - A `Record` for one detail page
//!
//! Missing pieces degrade to defaults instead of failing the page.

use crate::model::{Rating, Record};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Extraction errors that make a page unusable
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("response body is not HTML")]
    NotHtml,

    #[error("invalid source URL '{0}'")]
    InvalidSourceUrl(String),
}

/// Links found on one catalog listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Absolute detail-page URLs, in page order
    pub detail_urls: Vec<String>,

    /// Absolute URL of the next listing page, if any
    pub next_page: Option<String>,
}

const LISTING_LINK: &str = "article.product_pod h3 a";
const NEXT_LINK: &str = "li.next a";
const NAME: &str = "h1";
const DESCRIPTION: &str = "#product_description + p";
const BREADCRUMB_LINK: &str = "ul.breadcrumb a";
const IMAGE: &str = "#product_gallery img";
const STAR_RATING: &str = "p.star-rating";
const TABLE_ROW: &str = "tr";

const PRICE_NET_LABEL: &str = "Price (excl. tax)";
const PRICE_GROSS_LABEL: &str = "Price (incl. tax)";
const AVAILABILITY_LABEL: &str = "Availability";
const REVIEWS_LABEL: &str = "Number of reviews";

/// Availability used when the page does not state one
pub const UNKNOWN_AVAILABILITY: &str = "Unknown";

/// Parses a catalog listing page
///
/// # Arguments
///
/// * `html` - The listing page HTML
/// * `base_url` - URL of the listing page, used to resolve relative links
///
/// # Returns
///
/// The detail URLs and the optional next-page URL
///
/// # Example
///
/// ```
/// use catalog_harvest::crawler::extract_listing;
/// use url::Url;
///
/// let html = r#"<article class="product_pod"><h3><a href="a_1/index.html">A</a></h3></article>
///               <ul class="pager"><li class="next"><a href="page-2.html">next</a></li></ul>"#;
/// let base = Url::parse("https://example.com/catalogue/page-1.html").unwrap();
/// let listing = extract_listing(html, &base);
/// assert_eq!(listing.detail_urls, vec!["https://example.com/catalogue/a_1/index.html"]);
/// assert_eq!(listing.next_page.as_deref(), Some("https://example.com/catalogue/page-2.html"));
/// ```
pub fn extract_listing(html: &str, base_url: &Url) -> Listing {
    let document = Html::parse_document(html);

    let detail_urls = match selector(LISTING_LINK) {
        Some(sel) => document
            .select(&sel)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| resolve_link(href, base_url))
            .collect(),
        None => Vec::new(),
    };

    let next_page = selector(NEXT_LINK).and_then(|sel| {
        document
            .select(&sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| resolve_link(href, base_url))
    });

    Listing {
        detail_urls,
        next_page,
    }
}

/// Parses one detail page into a `Record`
///
/// The returned record carries a fresh fingerprint and the raw page as its
/// snapshot. Only a body that cannot be HTML at all is rejected.
pub fn extract_record(html: &str, source_url: &str) -> Result<Record, ExtractError> {
    if html.trim().is_empty() || !html.contains('<') {
        return Err(ExtractError::NotHtml);
    }

    let page_url =
        Url::parse(source_url).map_err(|_| ExtractError::InvalidSourceUrl(source_url.to_string()))?;
    let document = Html::parse_document(html);
    let mut record = Record::new(source_url);

    record.name = first_text(&document, NAME).unwrap_or_default();
    if record.name.is_empty() {
        warn!("No name found on {}", source_url);
    }

    record.description = first_text(&document, DESCRIPTION).unwrap_or_default();

    record.category = selector(BREADCRUMB_LINK)
        .and_then(|sel| document.select(&sel).last().map(element_text))
        .unwrap_or_default();

    let table = product_table(&document);

    record.price_net = table
        .get(PRICE_NET_LABEL)
        .and_then(|text| parse_price(text, PRICE_NET_LABEL, source_url))
        .unwrap_or(0.0);

    record.price_gross = table
        .get(PRICE_GROSS_LABEL)
        .and_then(|text| parse_price(text, PRICE_GROSS_LABEL, source_url))
        .unwrap_or(record.price_net);

    record.availability = table
        .get(AVAILABILITY_LABEL)
        .filter(|text| !text.is_empty())
        .cloned()
        .unwrap_or_else(|| UNKNOWN_AVAILABILITY.to_string());

    record.review_count = table
        .get(REVIEWS_LABEL)
        .and_then(|text| text.parse().ok())
        .unwrap_or(0);

    record.image_url = selector(IMAGE)
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .and_then(|img| img.value().attr("src"))
                .and_then(|src| resolve_link(src, &page_url))
        })
        .unwrap_or_default();

    record.rating = selector(STAR_RATING).and_then(|sel| {
        document
            .select(&sel)
            .next()
            .and_then(|p| p.value().classes().find_map(Rating::from_class_token))
    });

    record.snapshot = Some(html.to_string());
    record.refresh_fingerprint();

    Ok(record)
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let sel = selector(css)?;
    document.select(&sel).next().map(element_text)
}

/// Maps each `th` label of the product table to its `td` value
fn product_table(document: &Html) -> HashMap<String, String> {
    let (Some(rows), Some(th), Some(td)) = (selector(TABLE_ROW), selector("th"), selector("td"))
    else {
        return HashMap::new();
    };

    let mut table = HashMap::new();
    for row in document.select(&rows) {
        let label = row.select(&th).next().map(element_text);
        let value = row.select(&td).next().map(element_text);
        if let (Some(label), Some(value)) = (label, value) {
            table.entry(label).or_insert(value);
        }
    }
    table
}

/// Parses a price after scrubbing currency symbols
fn parse_price(text: &str, label: &str, source_url: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    match cleaned.parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Could not parse {} '{}' on {}", label, text, source_url);
            None
        }
    }
}

/// Resolves an href against the page URL, keeping only http(s) results
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    if absolute.scheme() == "http" || absolute.scheme() == "https" {
        Some(absolute.to_string())
    } else {
        None
    }
}
