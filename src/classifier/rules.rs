//! Rule table for the product classifier
//!
//! Rules are data, not code: each one is an identifier, a regular expression
//! and a weight. The built-in table covers the common platform URL schemes;
//! configuration can extend or replace it.

use crate::config::RuleEntry;
use crate::ConfigError;
use regex::Regex;

/// What a rule is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTarget {
    /// The URL path only
    Path,
    /// The URL path followed by `?query` when a query is present
    PathAndQuery,
    /// The anchor text of the link that led to the URL
    AnchorText,
}

/// A compiled rule
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub target: RuleTarget,
    pub weight: f64,
    regex: Regex,
}

impl Rule {
    pub fn new(id: &str, pattern: &str, weight: f64, target: RuleTarget) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern)
            .map_err(|e| ConfigError::InvalidPattern(format!("rule '{}': {}", id, e)))?;
        Ok(Self {
            id: id.to_string(),
            target,
            weight,
            regex,
        })
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }
}

/// Built-in product path rules: (id, pattern, weight)
const PRODUCT_RULES: &[(&str, &str, f64)] = &[
    ("path:product", r"(?i)/products?/[^/]+$", 1.0),
    ("path:item", r"(?i)/items?/[^/]+$", 1.0),
    ("path:p", r"(?i)/p/[^/]+$", 1.0),
    ("path:pd", r"(?i)/pd/[^/]+$", 1.0),
    ("path:dp", r"(?i)/dp/[a-z0-9]{10}$", 1.0),
    ("path:detail", r"(?i)/(product-?detail|detail)/[^/]+$", 1.0),
    ("path:html-id", r"(?i)/[^/]+/[^/]*\d+\.html?$", 0.9),
    ("path:sku-tail", r"(?i)/[^/]*\d{4,}[^/]*$", 0.9),
    ("path:pr-slug", r"(?i)/-pr-[^/]+$", 1.0),
    ("path:mp-id", r"(?i)/p-mp\d+$", 1.0),
];

/// Built-in negative rules: (id, pattern, weight)
const NEGATIVE_RULES: &[(&str, &str, f64)] = &[
    ("neg:cart", r"(?i)/(cart|basket|bag)(/|$|\?)", 1.0),
    ("neg:checkout", r"(?i)/checkout(/|$|\?)", 1.0),
    (
        "neg:account",
        r"(?i)/(account|login|signin|sign-in|register|signup|profile|orders|wishlist|compare)(/|$|\?)",
        1.0,
    ),
    ("neg:search", r"(?i)(/search(/|$|\?)|[?&](q|query|search)=)", 1.0),
    ("neg:category", r"(?i)/(category|categories)(/|$|\?)", 1.0),
    ("neg:collection", r"(?i)/collections?/[^/?]+(\?|$)", 1.0),
    (
        "neg:editorial",
        r"(?i)/(blog|blogs|news|tag|tags|journal|stories)(/|$|\?)",
        1.0,
    ),
    (
        "neg:info",
        r"(?i)/(about|about-us|contact|faq|help|support|careers|press|privacy|terms|shipping|returns|store-locator|sitemap)(/|$|\?|\.html?)",
        1.0,
    ),
];

/// Anchor text cues that a link leads to a listing rather than an item
const ANCHOR_RULES: &[(&str, &str, f64)] = &[(
    "anchor:listing",
    r"(?i)^\s*((view|shop|see)\s+(all|more)|next|prev(ious)?|page\s+\d+|\d+|»|›)\s*$",
    0.5,
)];

/// The full, compiled rule table
#[derive(Debug, Clone)]
pub struct RuleTable {
    pub product: Vec<Rule>,
    pub negative: Vec<Rule>,
}

impl RuleTable {
    /// Builds the table from the built-in rules plus configured extensions
    ///
    /// `pagination_params` become one negative rule matching numbered listing
    /// pages (`?page=2`).
    pub fn build(
        extra_product: &[RuleEntry],
        extra_negative: &[RuleEntry],
        pagination_params: &[String],
        replace_builtin: bool,
    ) -> Result<Self, ConfigError> {
        let mut product = Vec::new();
        let mut negative = Vec::new();

        if !replace_builtin {
            for (id, pattern, weight) in PRODUCT_RULES {
                product.push(Rule::new(id, pattern, *weight, RuleTarget::Path)?);
            }
            for (id, pattern, weight) in NEGATIVE_RULES {
                negative.push(Rule::new(id, pattern, *weight, RuleTarget::PathAndQuery)?);
            }
            for (id, pattern, weight) in ANCHOR_RULES {
                negative.push(Rule::new(id, pattern, *weight, RuleTarget::AnchorText)?);
            }
        }

        for entry in extra_product {
            product.push(Rule::new(&entry.id, &entry.pattern, entry.weight, RuleTarget::Path)?);
        }
        for entry in extra_negative {
            negative.push(Rule::new(
                &entry.id,
                &entry.pattern,
                entry.weight,
                RuleTarget::PathAndQuery,
            )?);
        }

        if !pagination_params.is_empty() {
            let names: Vec<String> = pagination_params.iter().map(|p| regex::escape(p)).collect();
            let pattern = format!(r"(?i)[?&]({})=\d+(&|$)", names.join("|"));
            negative.push(Rule::new("neg:pagination", &pattern, 1.0, RuleTarget::PathAndQuery)?);
        }

        Ok(Self { product, negative })
    }

    /// Strongest product rule matching `path`, with every matching rule id
    pub fn match_product(&self, path: &str) -> (f64, Vec<String>) {
        strongest(&self.product, |rule| match rule.target {
            RuleTarget::Path => rule.is_match(path),
            _ => false,
        })
    }

    /// Strongest negative rule matching the URL or its anchor text
    pub fn match_negative(&self, path_and_query: &str, anchor_text: &str) -> (f64, Vec<String>) {
        strongest(&self.negative, |rule| match rule.target {
            RuleTarget::Path => {
                let path = path_and_query.split('?').next().unwrap_or_default();
                rule.is_match(path)
            }
            RuleTarget::PathAndQuery => rule.is_match(path_and_query),
            RuleTarget::AnchorText => !anchor_text.trim().is_empty() && rule.is_match(anchor_text),
        })
    }
}

fn strongest<F>(rules: &[Rule], mut matches: F) -> (f64, Vec<String>)
where
    F: FnMut(&Rule) -> bool,
{
    let mut best = 0.0_f64;
    let mut ids = Vec::new();

    for rule in rules.iter().filter(|r| matches(r)) {
        best = best.max(rule.weight);
        ids.push(rule.id.clone());
    }

    (best, ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RuleTable {
        RuleTable::build(&[], &[], &["page".to_string()], false).unwrap()
    }

    #[test]
    fn test_product_paths() {
        let table = table();
        for path in [
            "/product/12345",
            "/products/red-shoe",
            "/p/ABC",
            "/item/99",
            "/dp/B08N5WRWNW",
            "/men/shirts/oxford-shirt-10293.html",
            "/shoes/runner-x-204512",
        ] {
            let (weight, ids) = table.match_product(path);
            assert!(weight > 0.0, "expected product match for {}", path);
            assert!(!ids.is_empty());
        }
    }

    #[test]
    fn test_marketplace_paths() {
        let table = table();
        let (weight, ids) = table.match_product("/-pr-blue-kurta-4410");
        assert_eq!(weight, 1.0);
        assert!(ids.contains(&"path:pr-slug".to_string()));

        let (weight, ids) = table.match_product("/cotton-kurta/p-mp000000012");
        assert_eq!(weight, 1.0);
        assert!(ids.contains(&"path:mp-id".to_string()));
    }

    #[test]
    fn test_non_product_paths() {
        let table = table();
        for path in ["/", "/products", "/product-guide", "/category/shoes", "/about"] {
            let (weight, _) = table.match_product(path);
            assert_eq!(weight, 0.0, "unexpected product match for {}", path);
        }
    }

    #[test]
    fn test_negative_rules() {
        let table = table();
        assert!(table.match_negative("/cart", "").0 > 0.0);
        assert!(table.match_negative("/search?q=x", "").0 > 0.0);
        assert!(table.match_negative("/category/shoes", "").0 > 0.0);
        assert!(table.match_negative("/collections/summer", "").0 > 0.0);
        assert!(table.match_negative("/shoes?page=3", "").0 > 0.0);
        assert!(table.match_negative("/product/1", "").0 == 0.0);
        assert!(table.match_negative("/collections/summer/products/sandal", "").0 == 0.0);
    }

    #[test]
    fn test_anchor_rule() {
        let table = table();
        let (weight, ids) = table.match_negative("/shoes", "View all");
        assert_eq!(weight, 0.5);
        assert_eq!(ids, vec!["anchor:listing".to_string()]);
        assert_eq!(table.match_negative("/shoes", "Trail Runner").0, 0.0);
    }

    #[test]
    fn test_extra_rules_and_replace() {
        let extra = vec![RuleEntry {
            id: "path:shop-item".to_string(),
            pattern: r"/shop-item/[^/]+$".to_string(),
            weight: 0.8,
        }];
        let table = RuleTable::build(&extra, &[], &[], true).unwrap();
        assert_eq!(table.product.len(), 1);
        assert!(table.negative.is_empty());
        assert_eq!(table.match_product("/shop-item/42").0, 0.8);
        assert_eq!(table.match_product("/product/42").0, 0.0);
    }
}
