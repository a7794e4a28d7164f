//! Structural page signals
//!
//! Scans a document once and records which detail-page and listing-page
//! markers it carries. Each marker is worth a fixed number of points; the
//! structural signal is the balance of product points over listing points.

use crate::ClassificationError;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;

/// Point balance at which the structural signal saturates
const SATURATION: f64 = 8.0;

/// Detail-page markers and their points
const PRODUCT_MARKERS: &[(&str, i32)] = &[
    ("structure:add-to-cart", 3),
    ("structure:variant-selector", 3),
    ("structure:delivery-check", 3),
    ("structure:product-schema", 4),
    ("structure:price", 2),
    ("structure:sku", 1),
    ("structure:price-title-sku", 1),
    ("structure:details", 1),
    ("structure:reviews", 1),
    ("structure:gallery", 1),
    ("structure:wishlist", 1),
    ("structure:stock", 1),
    ("structure:breadcrumb-leaf", 1),
    ("structure:payment-offer", 1),
    ("structure:shipping", 1),
];

/// Listing-page markers and their points
const LISTING_MARKERS: &[(&str, i32)] = &[
    ("structure:product-grid", 2),
    ("structure:filters", 2),
    ("structure:pagination", 2),
    ("structure:repeated-cart", 2),
    ("structure:item-list", 2),
];

/// More add-to-cart affordances than this means a grid of items
const MAX_DETAIL_CART_BUTTONS: usize = 3;

/// Product tiles needed before a page reads as a grid
const MIN_GRID_TILES: usize = 4;

struct Patterns {
    cart_text: Regex,
    cart_attr: Regex,
    cart_action: Regex,
    variant_attr: Regex,
    variant_label: Regex,
    variant_name: Regex,
    delivery: Regex,
    payment_text: Regex,
    payment_attr: Regex,
    payment_logo: Regex,
    shipping_text: Regex,
    shipping_attr: Regex,
    price_attr: Regex,
    currency: Regex,
    sku_attr: Regex,
    sku_text: Regex,
    details_attr: Regex,
    details_heading: Regex,
    reviews_attr: Regex,
    reviews_heading: Regex,
    gallery_attr: Regex,
    wishlist_attr: Regex,
    stock_attr: Regex,
    stock_text: Regex,
    breadcrumb: Regex,
    grid_attr: Regex,
    tile_attr: Regex,
    secondary_block: Regex,
    filter_attr: Regex,
    filter_name: Regex,
    filter_text: Regex,
    pagination_attr: Regex,
    product_type: Regex,
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in structure pattern compiles")
}

static PATTERNS: Lazy<Patterns> = Lazy::new(|| Patterns {
    cart_text: re(r"(?i)\b(add\s+to\s+(cart|bag|basket)|buy\s+now|purchase\s+now)\b"),
    cart_attr: re(r"(?i)add[-_]?to[-_]?(cart|bag|basket)|buy[-_]?now"),
    cart_action: re(r"(?i)/cart/add|add[-_]?to[-_]?cart"),
    variant_attr: re(r"(?i)\bsize|variant|swatch"),
    variant_label: re(r"(?i)^\s*(select\s+)?(size|colou?r|variant|quantity|qty)\b"),
    variant_name: re(r"(?i)size|colou?r|variant|option"),
    delivery: re(r"(?i)pin\s*code|zip\s*code|postal\s*code|check\s+delivery"),
    payment_text: re(r"(?i)\b(bank\s+offers?|payment\s+options?|emi|credit\s+card|debit\s+card)\b"),
    payment_attr: re(r"(?i)offer|payment|\bemi\b"),
    payment_logo: re(r"(?i)visa|mastercard|paypal|gpay|upi"),
    shipping_text: re(r"(?i)\b(shipping|delivery|dispatch)\b"),
    shipping_attr: re(r"(?i)shipping|delivery"),
    price_attr: re(r"(?i)price|mrp"),
    currency: re(r"(\$|€|£|₹|\bUSD|\bEUR|\bGBP|\bINR)\s*\d+([.,]\d{2})?"),
    sku_attr: re(r"(?i)\bsku\b|product[-_]?code"),
    sku_text: re(r"(?i)\b(sku|item\s*(no|#|number)|model\s*(no|#|number)|style\s*(no|#))\b"),
    details_attr: re(r"(?i)product[-_]?detail|specification|description"),
    details_heading: re(r"(?i)product\s+details?|specifications?|description|features"),
    reviews_attr: re(r"(?i)review|rating"),
    reviews_heading: re(r"(?i)\b(reviews?|ratings?)\b"),
    gallery_attr: re(r"(?i)gallery|product[-_]?(image|media|photo)"),
    wishlist_attr: re(r"(?i)wishlist|favou?rite"),
    stock_attr: re(r"(?i)stock|availability"),
    stock_text: re(r"(?i)\b(in\s+stock|out\s+of\s+stock|sold\s+out|only\s+\d+\s+left)\b"),
    breadcrumb: re(r"(?i)breadcrumb"),
    grid_attr: re(
        r"(?i)products?[-_]?(grid|list|listing)|collection[-_]?(grid|products)|search[-_]?results",
    ),
    tile_attr: re(r"(?i)product[-_]?(tile|card|item)\b"),
    secondary_block: re(r"(?i)related|recommend|similar|also|upsell|cross|recent"),
    filter_attr: re(r"(?i)(^|[\s_-])(filters?|facets?|sort|sorting|refine)([\s_-]|$)"),
    filter_name: re(r"(?i)sort|filter"),
    filter_text: re(r"(?i)\b(filter\s+by|sort\s+by)\b"),
    pagination_attr: re(r"(?i)paginat|pager"),
    product_type: re(r#""@type"\s*:\s*"Product""#),
});

/// Markers found on one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructureSignals {
    /// Ids of every marker found
    pub markers: BTreeSet<&'static str>,
    /// Raw `href` values of every anchor, in document order
    pub hrefs: Vec<String>,
}

impl StructureSignals {
    pub fn product_points(&self) -> i32 {
        points(PRODUCT_MARKERS, &self.markers)
    }

    pub fn listing_points(&self) -> i32 {
        points(LISTING_MARKERS, &self.markers)
    }

    /// Structural signal in `-1.0..=1.0`
    ///
    /// `extra_listing_points` carries points the caller derives from the
    /// page's links (many product links on one page).
    pub fn score(&self, extra_listing_points: i32) -> f64 {
        let balance = self.product_points() - self.listing_points() - extra_listing_points;
        (balance as f64 / SATURATION).clamp(-1.0, 1.0)
    }
}

fn points(table: &[(&str, i32)], found: &BTreeSet<&'static str>) -> i32 {
    table
        .iter()
        .filter(|(id, _)| found.contains(id))
        .map(|(_, points)| points)
        .sum()
}

/// Extracts structural markers from a page
///
/// Fails with `ClassificationError` when the document holds no elements and
/// no text, as happens with empty or binary bodies.
pub fn extract(html: &str) -> Result<StructureSignals, ClassificationError> {
    if html.trim().is_empty() {
        return Err(ClassificationError("empty document".to_string()));
    }

    let document = Html::parse_document(html);
    let p = &*PATTERNS;

    let Ok(all) = Selector::parse("*") else {
        return Err(ClassificationError("selector unavailable".to_string()));
    };

    let mut signals = StructureSignals::default();
    let mut found = |id: &'static str| {
        signals.markers.insert(id);
    };

    let mut element_count = 0;
    let mut cart_buttons = 0;
    let mut cart_form = false;
    let mut h1_count = 0;
    let mut tiles = 0;
    let mut breadcrumb: Option<ElementRef> = None;
    let mut hrefs = Vec::new();

    for el in document.select(&all) {
        let tag = el.value().name();
        if matches!(tag, "html" | "head" | "body") {
            continue;
        }
        element_count += 1;

        let attrs = class_and_id(&el);
        let attr = |name: &str| el.value().attr(name).unwrap_or_default();

        match tag {
            "button" | "a" | "input" => {
                let label = if tag == "input" {
                    attr("value").to_string()
                } else {
                    own_text(&el)
                };
                if p.cart_text.is_match(&label) || p.cart_attr.is_match(&attrs) {
                    cart_buttons += 1;
                }
                if p.wishlist_attr.is_match(&attrs) {
                    found("structure:wishlist");
                }
                if tag == "a" {
                    if let Some(href) = el.value().attr("href") {
                        hrefs.push(href.to_string());
                    }
                    if is_rel(attr("rel"), &["next", "prev"]) {
                        found("structure:pagination");
                    }
                }
                if tag == "input" && (p.delivery.is_match(attr("placeholder")) || p.delivery.is_match(&attrs)) {
                    found("structure:delivery-check");
                }
                if tag != "a" && p.variant_name.is_match(attr("name")) {
                    found("structure:variant-selector");
                }
            }
            "form" => {
                if p.cart_action.is_match(attr("action")) {
                    cart_form = true;
                }
            }
            "link" => {
                if is_rel(attr("rel"), &["next", "prev"]) {
                    found("structure:pagination");
                }
            }
            "meta" => {
                if attr("property").eq_ignore_ascii_case("og:type")
                    && attr("content").eq_ignore_ascii_case("product")
                {
                    found("structure:product-schema");
                }
            }
            "script" => {
                if attr("type").eq_ignore_ascii_case("application/ld+json") {
                    let body: String = el.text().collect();
                    scan_json_ld(&body, &mut found);
                }
            }
            "label" => {
                if p.variant_label.is_match(&own_text(&el)) {
                    found("structure:variant-selector");
                }
            }
            "img" => {
                if p.payment_logo.is_match(attr("alt")) {
                    found("structure:payment-offer");
                }
            }
            "h1" => h1_count += 1,
            "h2" | "h3" | "h4" => {
                let heading = own_text(&el);
                if p.details_heading.is_match(&heading) {
                    found("structure:details");
                }
                if p.reviews_heading.is_match(&heading) {
                    found("structure:reviews");
                }
            }
            _ => {}
        }

        if tag == "select" && p.filter_name.is_match(attr("name")) {
            found("structure:filters");
        } else if matches!(tag, "select" | "div" | "ul" | "fieldset") && p.variant_attr.is_match(&attrs) {
            found("structure:variant-selector");
        }

        if attrs.is_empty() && el.value().attr("itemprop").is_none() && el.value().attr("itemtype").is_none() {
            if breadcrumb.is_none() && p.breadcrumb.is_match(attr("aria-label")) {
                breadcrumb = Some(el);
            }
            continue;
        }

        match attr("itemprop") {
            "price" | "lowPrice" => found("structure:price"),
            "sku" | "mpn" | "gtin" | "gtin13" | "gtin14" | "gtin8" => found("structure:sku"),
            "availability" => found("structure:stock"),
            _ => {}
        }
        if attr("itemtype").contains("schema.org/Product") {
            found("structure:product-schema");
        }

        let secondary = p.secondary_block.is_match(&attrs);

        if matches!(tag, "span" | "div" | "p" | "strong") && p.price_attr.is_match(&attrs) {
            found("structure:price");
        }
        if p.sku_attr.is_match(&attrs) {
            found("structure:sku");
        }
        if matches!(tag, "div" | "section") && p.details_attr.is_match(&attrs) {
            found("structure:details");
        }
        if matches!(tag, "div" | "section") && p.reviews_attr.is_match(&attrs) {
            found("structure:reviews");
        }
        if matches!(tag, "div" | "ul") && p.gallery_attr.is_match(&attrs) {
            found("structure:gallery");
        }
        if matches!(tag, "div" | "span" | "p") && p.stock_attr.is_match(&attrs) {
            found("structure:stock");
        }
        if matches!(tag, "input" | "div") && p.delivery.is_match(&attrs) {
            found("structure:delivery-check");
        }
        if matches!(tag, "div" | "section") && p.payment_attr.is_match(&attrs) {
            found("structure:payment-offer");
        }
        if matches!(tag, "div" | "section" | "p") && p.shipping_attr.is_match(&attrs) {
            found("structure:shipping");
        }
        if !secondary && matches!(tag, "div" | "ul" | "ol" | "section") && p.grid_attr.is_match(&attrs) {
            found("structure:product-grid");
        }
        if !secondary && p.tile_attr.is_match(&attrs) {
            tiles += 1;
        }
        if matches!(tag, "div" | "form" | "aside" | "section") && p.filter_attr.is_match(&attrs) {
            found("structure:filters");
        }
        if matches!(tag, "div" | "ul" | "nav" | "ol") && p.pagination_attr.is_match(&attrs) {
            found("structure:pagination");
        }
        if breadcrumb.is_none()
            && (p.breadcrumb.is_match(&attrs) || p.breadcrumb.is_match(attr("aria-label")))
        {
            breadcrumb = Some(el);
        }
    }

    let text: String = document.root_element().text().collect();
    if element_count == 0 && text.trim().is_empty() {
        return Err(ClassificationError("no element content".to_string()));
    }

    if p.currency.is_match(&text) {
        found("structure:price");
    }
    if p.sku_text.is_match(&text) {
        found("structure:sku");
    }
    if p.stock_text.is_match(&text) {
        found("structure:stock");
    }
    if p.filter_text.is_match(&text) {
        found("structure:filters");
    }
    if p.payment_text.is_match(&text) {
        found("structure:payment-offer");
    }
    if p.shipping_text.is_match(&text) {
        found("structure:shipping");
    }

    if cart_buttons > MAX_DETAIL_CART_BUTTONS {
        found("structure:repeated-cart");
    } else if cart_buttons > 0 || cart_form {
        found("structure:add-to-cart");
    }

    if tiles >= MIN_GRID_TILES {
        found("structure:product-grid");
    }

    if let Some(crumbs) = breadcrumb {
        if ends_in_leaf(&crumbs) {
            found("structure:breadcrumb-leaf");
        }
    }

    drop(found);

    let has = |id| signals.markers.contains(id);
    if has("structure:price") && has("structure:sku") && h1_count == 1 {
        signals.markers.insert("structure:price-title-sku");
    }
    signals.hrefs = hrefs;

    Ok(signals)
}

fn class_and_id(el: &ElementRef) -> String {
    let value = el.value();
    match (value.attr("class"), value.attr("id")) {
        (Some(class), Some(id)) => format!("{} {}", class, id),
        (Some(class), None) => class.to_string(),
        (None, Some(id)) => id.to_string(),
        (None, None) => String::new(),
    }
}

fn own_text(el: &ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn is_rel(rel: &str, wanted: &[&str]) -> bool {
    rel.split_whitespace()
        .any(|r| wanted.iter().any(|w| r.eq_ignore_ascii_case(w)))
}

/// A breadcrumb trail ends in a leaf when its last item is not a link
fn ends_in_leaf(crumbs: &ElementRef) -> bool {
    let items = Selector::parse("li").ok();
    let last_item = items.and_then(|sel| crumbs.select(&sel).last());

    match last_item {
        Some(item) => {
            let has_link = Selector::parse("a[href]")
                .map(|sel| item.select(&sel).next().is_some())
                .unwrap_or(false);
            let current = item.value().attr("aria-current").is_some();
            current || !has_link
        }
        None => {
            // Flat trails: <nav><a/> › <a/> › <span>Leaf</span></nav>
            let Ok(sel) = Selector::parse("a, span") else {
                return false;
            };
            crumbs
                .select(&sel)
                .last()
                .map(|last| last.value().name() == "span" || last.value().attr("href").is_none())
                .unwrap_or(false)
        }
    }
}

/// Looks for Product or listing types in a JSON-LD block
fn scan_json_ld(body: &str, found: &mut impl FnMut(&'static str)) {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => {
            let mut types = Vec::new();
            collect_types(&value, &mut types);
            for t in types {
                match t.as_str() {
                    "Product" | "ProductGroup" | "IndividualProduct" => found("structure:product-schema"),
                    "ItemList" | "CollectionPage" | "SearchResultsPage" | "OfferCatalog" => {
                        found("structure:item-list")
                    }
                    _ => {}
                }
            }
        }
        Err(_) => {
            if PATTERNS.product_type.is_match(body) {
                found("structure:product-schema");
            }
        }
    }
}

/// Collects `@type` values at the top level and inside `@graph`
///
/// Nested objects (offers, brand, reviews) are not searched: an ItemList of
/// Products would otherwise read as a product page.
fn collect_types(value: &serde_json::Value, types: &mut Vec<String>) {
    match value {
        serde_json::Value::Array(items) => {
            for item in items {
                collect_types(item, types);
            }
        }
        serde_json::Value::Object(map) => {
            match map.get("@type") {
                Some(serde_json::Value::String(t)) => types.push(t.clone()),
                Some(serde_json::Value::Array(ts)) => {
                    types.extend(ts.iter().filter_map(|t| t.as_str().map(str::to_string)))
                }
                _ => {}
            }
            if let Some(graph) = map.get("@graph") {
                collect_types(graph, types);
            }
        }
        _ => {}
    }
}
