//! HTML parser for extracting links and page metadata
//!
//! Links come from three sources, in this order:
//! - `<a href>` anchors, in document order
//! - `<link rel="next|prev">` pagination hints
//! - URLs embedded in JSON script blocks (`application/ld+json`,
//!   `application/json`), a fallback for catalog grids rendered from data

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

/// Weight of one external `<script src>` in the script ratio
const EXTERNAL_SCRIPT_WEIGHT: usize = 512;

/// JSON keys whose string values are treated as links
const JSON_LINK_KEYS: &[&str] = &["url", "href", "link", "@id"];

/// How a link was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// A plain anchor
    Anchor,
    /// A next/previous/numbered listing page
    Pagination,
    /// A URL found in embedded JSON
    Embedded,
}

/// A link found on a page, resolved against the page URL
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedLink {
    pub url: Url,
    pub anchor_text: String,
    pub kind: LinkKind,
}

/// Extracted information from an HTML page
#[derive(Debug, Clone)]
pub struct ParsedPage {
    /// Outbound links in discovery order
    pub links: Vec<ExtractedLink>,

    /// Share of script in the document, in `0.0..=1.0`
    pub script_ratio: f64,
}

/// Link extractor aware of the site's pagination parameters
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    pagination_params: Vec<String>,
}

impl LinkExtractor {
    pub fn new(pagination_params: &[String]) -> Self {
        Self {
            pagination_params: pagination_params
                .iter()
                .map(|p| p.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Parses a page and extracts its links and script ratio
    ///
    /// A `<base href>` element, when present, replaces `page_url` for
    /// resolving relative links.
    ///
    /// # Example
    ///
    /// ```
    /// use shelf_scout::crawler::{LinkExtractor, LinkKind};
    /// use url::Url;
    ///
    /// let html = r#"<title>Shoes</title><a href="/product/1">Runner</a><a rel="next" href="?page=2">Next</a>"#;
    /// let page = Url::parse("https://shop.example/category/shoes").unwrap();
    /// let parsed = LinkExtractor::new(&["page".to_string()]).parse(html, &page);
    /// assert_eq!(parsed.links[0].anchor_text, "Runner");
    /// assert_eq!(parsed.links[1].kind, LinkKind::Pagination);
    /// ```
    pub fn parse(&self, html: &str, page_url: &Url) -> ParsedPage {
        let document = Html::parse_document(html);
        let base = base_href(&document, page_url);

        let mut links = Vec::new();
        self.extract_anchors(&document, &base, &mut links);
        extract_rel_links(&document, &base, &mut links);
        extract_embedded(&document, &base, &mut links);

        ParsedPage {
            links,
            script_ratio: script_ratio(&document),
        }
    }

    /// Returns true if the URL's query carries a numeric pagination parameter
    pub fn is_pagination_url(&self, url: &Url) -> bool {
        url.query_pairs().any(|(key, value)| {
            !value.is_empty()
                && value.chars().all(|c| c.is_ascii_digit())
                && self
                    .pagination_params
                    .iter()
                    .any(|p| key.eq_ignore_ascii_case(p))
        })
    }

    fn extract_anchors(&self, document: &Html, base: &Url, links: &mut Vec<ExtractedLink>) {
        let Ok(selector) = Selector::parse("a[href]") else {
            return;
        };

        for element in document.select(&selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            let Some(url) = element.value().attr("href").and_then(|h| resolve_link(h, base)) else {
                continue;
            };

            let rel = element.value().attr("rel").unwrap_or_default();
            let kind = if has_rel(rel, &["next", "prev", "previous"])
                || in_pagination_container(&element)
                || self.is_pagination_url(&url)
            {
                LinkKind::Pagination
            } else {
                LinkKind::Anchor
            };

            links.push(ExtractedLink {
                url,
                anchor_text: anchor_text(&element),
                kind,
            });
        }
    }
}

impl Default for LinkExtractor {
    fn default() -> Self {
        Self::new(&crate::config::CrawlerConfig::default().pagination_params)
    }
}

/// Extracts links with the default pagination parameters
pub fn extract_links(html: &str, page_url: &Url) -> Vec<ExtractedLink> {
    LinkExtractor::default().parse(html, page_url).links
}

fn base_href(document: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
        .unwrap_or_else(|| page_url.clone())
}

fn extract_rel_links(document: &Html, base: &Url, links: &mut Vec<ExtractedLink>) {
    let Ok(selector) = Selector::parse("link[href][rel]") else {
        return;
    };

    for element in document.select(&selector) {
        let rel = element.value().attr("rel").unwrap_or_default();
        if !has_rel(rel, &["next", "prev", "previous"]) {
            continue;
        }
        if let Some(url) = element.value().attr("href").and_then(|h| resolve_link(h, base)) {
            links.push(ExtractedLink {
                url,
                anchor_text: String::new(),
                kind: LinkKind::Pagination,
            });
        }
    }
}

fn extract_embedded(document: &Html, base: &Url, links: &mut Vec<ExtractedLink>) {
    let Ok(selector) = Selector::parse("script[type]") else {
        return;
    };

    for element in document.select(&selector) {
        let script_type = element.value().attr("type").unwrap_or_default();
        if !script_type.eq_ignore_ascii_case("application/ld+json")
            && !script_type.eq_ignore_ascii_case("application/json")
        {
            continue;
        }

        let body: String = element.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(&body) else {
            continue;
        };

        let mut found = Vec::new();
        collect_json_links(&value, &mut found);

        for (href, name) in found {
            if let Some(url) = resolve_link(&href, base) {
                links.push(ExtractedLink {
                    url,
                    anchor_text: name,
                    kind: LinkKind::Embedded,
                });
            }
        }
    }
}

/// Walks a JSON document collecting `(link, name)` pairs
///
/// Only strings that look like a path or an http(s) URL are kept; the
/// sibling `name` or `title` field becomes the anchor text.
fn collect_json_links(value: &Value, found: &mut Vec<(String, String)>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_json_links(item, found);
            }
        }
        Value::Object(map) => {
            let name = ["name", "title"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .unwrap_or_default();

            for (key, child) in map {
                match child {
                    Value::String(s) if JSON_LINK_KEYS.contains(&key.as_str()) => {
                        if looks_like_link(s) {
                            found.push((s.clone(), name.to_string()));
                        }
                    }
                    Value::Array(_) | Value::Object(_) => collect_json_links(child, found),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn looks_like_link(s: &str) -> bool {
    let s = s.trim();
    (s.starts_with('/') && !s.starts_with("//"))
        || s.starts_with("http://")
        || s.starts_with("https://")
}

/// Resolves a link href to an absolute http(s) URL
///
/// Returns None for javascript:, mailto:, tel: and data: links, for
/// fragment-only links and for anything that does not resolve.
fn resolve_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let url = base.join(href).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

fn has_rel(rel: &str, wanted: &[&str]) -> bool {
    rel.split_whitespace()
        .any(|r| wanted.iter().any(|w| r.eq_ignore_ascii_case(w)))
}

fn in_pagination_container(element: &ElementRef) -> bool {
    element.ancestors().any(|node| match node.value() {
        Node::Element(el) => {
            let class = el.attr("class").unwrap_or_default().to_ascii_lowercase();
            let id = el.attr("id").unwrap_or_default().to_ascii_lowercase();
            let label = el.attr("aria-label").unwrap_or_default().to_ascii_lowercase();
            [class, id, label]
                .iter()
                .any(|s| s.contains("paginat") || s.contains("pager"))
        }
        _ => false,
    })
}

fn anchor_text(element: &ElementRef) -> String {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if !text.is_empty() {
        return text;
    }

    // Image links: fall back to aria-label, title or the image alt
    let value = element.value();
    value
        .attr("aria-label")
        .or_else(|| value.attr("title"))
        .map(str::to_string)
        .or_else(|| {
            Selector::parse("img[alt]")
                .ok()
                .and_then(|sel| element.select(&sel).next())
                .and_then(|img| img.value().attr("alt"))
                .map(str::to_string)
        })
        .unwrap_or_default()
}

/// Share of script in a document
///
/// Inline script text plus a fixed weight per external script, over that
/// plus the visible body text. A near-empty shell loading a bundle scores
/// close to 1.0.
fn script_ratio(document: &Html) -> f64 {
    let mut script = 0usize;
    if let Ok(selector) = Selector::parse("script") {
        for element in document.select(&selector) {
            let script_type = element.value().attr("type").unwrap_or("text/javascript");
            if script_type.contains("json") {
                continue;
            }
            script += element.text().map(str::len).sum::<usize>();
            if element.value().attr("src").is_some() {
                script += EXTERNAL_SCRIPT_WEIGHT;
            }
        }
    }

    let mut visible = 0usize;
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
            .map(|name| matches!(name.as_str(), "script" | "style" | "noscript" | "template" | "title"))
            .unwrap_or(false);
        if !hidden {
            visible += text.trim().len();
        }
    }

    let total = script + visible;
    if total == 0 {
        0.0
    } else {
        script as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Position;

    fn base_url() -> Url {
        Url::parse("https://shop.example/category/shoes").unwrap()
    }

    fn parse(html: &str) -> ParsedPage {
        LinkExtractor::default().parse(html, &base_url())
    }

    fn urls(page: &ParsedPage) -> Vec<String> {
        page.links.iter().map(|l| l.url.to_string()).collect()
    }

    #[test]
    fn test_relative_and_absolute_links() {
        let parsed = parse(
            r#"<a href="/product/1">One</a>
               <a href="boots">Boots</a>
               <a href="https://other.example/x">Elsewhere</a>"#,
        );
        assert_eq!(
            urls(&parsed),
            vec![
                "https://shop.example/product/1",
                "https://shop.example/category/boots",
                "https://other.example/x",
            ]
        );
    }

    #[test]
    fn test_document_order_and_anchor_text() {
        let parsed = parse(r#"<a href="/b"> Second   link </a><a href="/a"><img alt="Red shoe"></a>"#);
        assert_eq!(parsed.links[0].anchor_text, "Second link");
        assert_eq!(parsed.links[1].anchor_text, "Red shoe");
    }

    #[test]
    fn test_skips_non_navigational_links() {
        let parsed = parse(
            r##"<a href="javascript:void(0)">JS</a>
               <a href="JavaScript:alert(1)">JS</a>
               <a href="mailto:help@shop.example">Mail</a>
               <a href="tel:+100">Call</a>
               <a href="data:text/html,x">Data</a>
               <a href="#reviews">Reviews</a>
               <a href="">Empty</a>
               <a href="/manual.pdf" download>Manual</a>
               <a href="ftp://shop.example/file">FTP</a>
               <a href="/ok">OK</a>"##,
        );
        assert_eq!(urls(&parsed), vec!["https://shop.example/ok"]);
    }

    #[test]
    fn test_pagination_kinds() {
        let extractor = LinkExtractor::new(&["page".to_string()]);
        let parsed = extractor.parse(
            r#"<head><link rel="next" href="/category/shoes?page=2"></head>
               <a href="/product/1">Shoe</a>
               <a rel="next" href="/category/shoes/2">Next</a>
               <nav class="Pagination"><a href="/category/shoes/3">3</a></nav>
               <a href="/category/shoes?page=4">4</a>
               <a href="/category/shoes?page=last">Last</a>"#,
            &base_url(),
        );

        let kinds: Vec<(String, LinkKind)> = parsed
            .links
            .iter()
            .map(|l| (l.url[Position::BeforePath..].to_string(), l.kind))
            .collect();

        assert_eq!(
            kinds,
            vec![
                ("/product/1".to_string(), LinkKind::Anchor),
                ("/category/shoes/2".to_string(), LinkKind::Pagination),
                ("/category/shoes/3".to_string(), LinkKind::Pagination),
                ("/category/shoes?page=4".to_string(), LinkKind::Pagination),
                ("/category/shoes?page=last".to_string(), LinkKind::Anchor),
                ("/category/shoes?page=2".to_string(), LinkKind::Pagination),
            ]
        );
    }

    #[test]
    fn test_embedded_json_links() {
        let parsed = parse(
            r#"<script type="application/ld+json">
                 {"@type":"ItemList","itemListElement":[
                   {"@type":"ListItem","url":"/product/7","name":"Boot"},
                   {"@type":"ListItem","url":"https://shop.example/product/8"}]}
               </script>
               <script type="application/json" id="__DATA__">
                 {"grid":{"items":[{"href":"/p/9","title":"Sandal"},{"href":"not a link"}]}}
               </script>
               <script>var x = {"url": "/ignored"};</script>"#,
        );

        assert_eq!(
            urls(&parsed),
            vec![
                "https://shop.example/product/7",
                "https://shop.example/product/8",
                "https://shop.example/p/9",
            ]
        );
        assert!(parsed.links.iter().all(|l| l.kind == LinkKind::Embedded));
        assert_eq!(parsed.links[0].anchor_text, "Boot");
        assert_eq!(parsed.links[2].anchor_text, "Sandal");
    }

    #[test]
    fn test_malformed_json_is_ignored() {
        let parsed = parse(r#"<script type="application/ld+json">{"url": "/p/1",</script><a href="/x">X</a>"#);
        assert_eq!(urls(&parsed), vec!["https://shop.example/x"]);
    }

    #[test]
    fn test_base_href() {
        let parsed = parse(r#"<head><base href="https://shop.example/en/"></head><a href="p/1">One</a>"#);
        assert_eq!(urls(&parsed), vec!["https://shop.example/en/p/1"]);
    }

    #[test]
    fn test_script_ratio() {
        let spa = parse(r#"<html><body><div id="root"></div><script src="/bundle.js"></script></body></html>"#);
        assert!(spa.script_ratio > 0.9);

        let catalog = parse(
            r#"<html><body><h1>Shoes</h1><p>Hand-made leather shoes, shipped worldwide from our workshop.</p>
               <script>track()</script></body></html>"#,
        );
        assert!(catalog.script_ratio < 0.2);

        assert_eq!(parse("<html></html>").script_ratio, 0.0);
    }

    #[test]
    fn test_extract_links_helper() {
        let links = extract_links(r#"<a href="/product/1">One</a>"#, &base_url());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].kind, LinkKind::Anchor);
    }
}
