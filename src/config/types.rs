use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Shelf-Scout
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub fetch: FetchConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub normalize: NormalizeConfig,
    pub classifier: ClassifierConfig,
    pub output: OutputConfig,
    pub domains: Vec<DomainEntry>,
}

/// Crawl scope and concurrency configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum link depth from a domain root
    pub max_depth: u32,

    /// Number of workers shared by all domains of a job
    pub worker_count: u32,

    /// Minimum time between two requests to the same host (milliseconds)
    pub politeness_interval: u64,

    /// Default page cap per domain when a job request does not carry one
    pub max_pages_per_domain: u32,

    /// Whether pagination links are followed
    pub follow_pagination: bool,

    /// Query parameters that mark numbered listing pages
    pub pagination_params: Vec<String>,

    /// Whether robots.txt is fetched and honored
    pub respect_robots_txt: bool,

    /// Host patterns (e.g. "*.shop.example") considered part of a domain
    pub allowed_subdomains: Vec<String>,
}

impl CrawlerConfig {
    pub fn politeness_interval(&self) -> Duration {
        Duration::from_millis(self.politeness_interval)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            worker_count: 8,
            politeness_interval: 500,
            max_pages_per_domain: 200,
            follow_pagination: true,
            pagination_params: ["page", "pg", "p", "offset", "start"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            respect_robots_txt: true,
            allowed_subdomains: Vec::new(),
        }
    }
}

/// Fetch, retry and render configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Whole-request timeout (milliseconds)
    pub request_timeout: u64,

    /// Connection timeout (milliseconds)
    pub connect_timeout: u64,

    /// Retries after the first attempt for transient failures
    pub max_retries: u32,

    /// Base backoff delay, doubled on every retry (milliseconds)
    pub retry_backoff: u64,

    /// Maximum redirect hops followed for one fetch
    pub max_redirects: u32,

    /// Render service endpoint; empty disables rendered fetches
    pub render_endpoint: String,

    /// Render service timeout (milliseconds)
    pub render_timeout: u64,

    /// Product-link count below which a page is a render candidate
    pub render_link_threshold: usize,

    /// Script share of the document above which a page is a render candidate
    pub render_script_ratio: f64,
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout)
    }

    /// Returns true if a render endpoint is configured
    pub fn render_enabled(&self) -> bool {
        !self.render_endpoint.trim().is_empty()
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: 15_000,
            connect_timeout: 5_000,
            max_retries: 3,
            retry_backoff: 500,
            max_redirects: 10,
            render_endpoint: String::new(),
            render_timeout: 30_000,
            render_link_threshold: 2,
            render_script_ratio: 0.5,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "ShelfScout".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/bot".to_string(),
            contact_email: "bot@example.com".to_string(),
        }
    }
}

/// URL normalization configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NormalizeConfig {
    /// Query parameters dropped during normalization; a trailing `*` matches a prefix
    pub tracking_params: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            tracking_params: [
                "utm_*", "ref", "gclid", "fbclid", "mc_eid", "msclkid", "_ga", "igshid",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Product classifier weights and extra rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClassifierConfig {
    /// Score a URL must strictly exceed to be accepted
    pub threshold: f64,

    /// Weight of the path-pattern signal
    pub path_weight: f64,

    /// Weight of the structural page signal
    pub structure_weight: f64,

    /// Weight of the negative signal
    pub negative_weight: f64,

    /// Extra product path rules, appended to the built-in table
    pub product_rules: Vec<RuleEntry>,

    /// Extra negative rules, appended to the built-in table
    pub negative_rules: Vec<RuleEntry>,

    /// Drop the built-in rule table and use only the configured rules
    pub replace_builtin_rules: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            path_weight: 0.6,
            structure_weight: 0.6,
            negative_weight: 1.0,
            product_rules: Vec::new(),
            negative_rules: Vec::new(),
            replace_builtin_rules: false,
        }
    }
}

/// One entry of the classifier rule table
#[derive(Debug, Clone, Deserialize)]
pub struct RuleEntry {
    /// Identifier reported in classification results
    pub id: String,

    /// Regular expression matched against `path` or `path?query`
    pub pattern: String,

    /// Rule strength in `0.0..=1.0`
    #[serde(default = "default_rule_weight")]
    pub weight: f64,
}

fn default_rule_weight() -> f64 {
    1.0
}

/// Result file format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory receiving result files
    pub directory: String,

    /// Result file format
    pub format: OutputFormat,

    /// Path to the SQLite job store; empty disables it
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "./crawler_results".to_string(),
            format: OutputFormat::Csv,
            database_path: String::new(),
        }
    }
}

/// A shop domain to crawl
#[derive(Debug, Clone, Deserialize)]
pub struct DomainEntry {
    /// Root URL of the shop (e.g., "https://shop.example/")
    pub url: String,
}
