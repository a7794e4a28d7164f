//! Product page classifier
//!
//! Combines three independent signals into one weighted score:
//!
//! - **Path**: strongest matching product path rule, in `0.0..=1.0`
//! - **Structure**: detail-page markers minus listing-page markers, in `-1.0..=1.0`
//! - **Negative**: strongest matching non-product rule (path, query or anchor text)
//!
//! `score = path_weight * path + structure_weight * structure - negative_weight * negative`
//!
//! A URL is a product page only when the score is strictly above the
//! threshold, so ties are rejected.

mod rules;
mod structure;

pub use rules::{Rule, RuleTable, RuleTarget};
pub use structure::{extract as extract_structure, StructureSignals};

use crate::config::ClassifierConfig;
use crate::ConfigError;
use url::Url;

/// Product links on one page beyond this count read as a listing
const LISTING_LINK_FLOOR: usize = 5;

/// Rule id reported when page HTML could not be read
pub const UNREADABLE_RULE: &str = "structure:unreadable";

/// Verdict for one URL
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub url: Url,
    pub is_product: bool,
    /// Score scaled into `0.0..=1.0` against the best reachable score
    pub confidence: f64,
    /// Raw weighted score compared against the threshold
    pub score: f64,
    /// Ids of every rule and marker that contributed
    pub matched_rules: Vec<String>,
}

/// Weighted, rule-driven product classifier
#[derive(Debug, Clone)]
pub struct ProductClassifier {
    rules: RuleTable,
    threshold: f64,
    path_weight: f64,
    structure_weight: f64,
    negative_weight: f64,
}

impl ProductClassifier {
    /// Builds a classifier from configuration
    ///
    /// `pagination_params` are the query parameters marking numbered listing
    /// pages; they feed a negative rule.
    pub fn from_config(
        config: &ClassifierConfig,
        pagination_params: &[String],
    ) -> Result<Self, ConfigError> {
        let rules = RuleTable::build(
            &config.product_rules,
            &config.negative_rules,
            pagination_params,
            config.replace_builtin_rules,
        )?;

        Ok(Self {
            rules,
            threshold: config.threshold,
            path_weight: config.path_weight,
            structure_weight: config.structure_weight,
            negative_weight: config.negative_weight,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Path signal for a URL
    pub fn path_signal(&self, url: &Url) -> f64 {
        self.rules.match_product(url.path()).0
    }

    /// Returns true if the URL's path alone matches a product rule
    pub fn looks_like_product(&self, url: &Url) -> bool {
        self.path_signal(url) > 0.0
    }

    /// Counts links on a page whose path matches a product rule
    pub fn count_product_links<'a, I>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = &'a Url>,
    {
        urls.into_iter().filter(|u| self.looks_like_product(u)).count()
    }

    /// Classifies a URL, using page HTML when available
    ///
    /// Unreadable HTML never fails the call: the page is reported as a
    /// non-product with the `structure:unreadable` rule.
    pub fn classify(&self, url: &Url, anchor_text: &str, html: Option<&str>) -> ClassificationResult {
        let (path, mut matched) = self.rules.match_product(url.path());

        let path_and_query = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let (negative, negative_ids) = self.rules.match_negative(&path_and_query, anchor_text);
        matched.extend(negative_ids);

        let structure = match html {
            None => 0.0,
            Some(html) => match structure::extract(html) {
                Ok(signals) => {
                    let links = self.count_page_product_links(url, &signals.hrefs);
                    let extra = if links > LISTING_LINK_FLOOR {
                        matched.push("structure:many-product-links".to_string());
                        (links / LISTING_LINK_FLOOR) as i32
                    } else {
                        0
                    };
                    matched.extend(signals.markers.iter().map(|m| m.to_string()));
                    signals.score(extra)
                }
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "structural signals unavailable");
                    matched.push(UNREADABLE_RULE.to_string());
                    return self.verdict(url, f64::NEG_INFINITY, matched);
                }
            },
        };

        let score = self.path_weight * path + self.structure_weight * structure
            - self.negative_weight * negative;

        self.verdict(url, score, matched)
    }

    fn verdict(&self, url: &Url, score: f64, matched_rules: Vec<String>) -> ClassificationResult {
        let best = self.path_weight + self.structure_weight;
        let confidence = if best > 0.0 && score.is_finite() {
            (score / best).clamp(0.0, 1.0)
        } else {
            0.0
        };

        ClassificationResult {
            url: url.clone(),
            is_product: score > self.threshold,
            confidence,
            score: if score.is_finite() { score } else { 0.0 },
            matched_rules,
        }
    }

    fn count_page_product_links(&self, page: &Url, hrefs: &[String]) -> usize {
        let links: Vec<Url> = hrefs
            .iter()
            .filter_map(|href| page.join(href).ok())
            .filter(|link| link != page)
            .collect();
        self.count_product_links(&links)
    }
}
