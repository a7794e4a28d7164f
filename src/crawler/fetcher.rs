//! Page fetching
//!
//! Two page sources share one contract, `(url) -> html | FetchError`:
//! - `HttpSource`: plain GET with manual redirect handling and a
//!   Content-Type guard
//! - `RenderSource`: delegates to an external render service that executes
//!   client-side script and returns the resulting HTML
//!
//! `Fetcher` puts the retry policy on top and decides when a statically
//! fetched page is worth rendering.

use crate::classifier::ProductClassifier;
use crate::config::{FetchConfig, UserAgentConfig};
use crate::crawler::parser::{LinkExtractor, ParsedPage};
use crate::url::authority;
use crate::FetchError;
use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// HTML retrieved for one URL
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// URL after following redirects
    pub final_url: Url,
    pub html: String,
    /// True if the HTML came from the render service
    pub rendered: bool,
}

/// A way of turning a URL into HTML
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;

    /// Like `fetch`, spacing any follow-up requests to the same host by
    /// `pace`
    async fn fetch_paced(&self, url: &Url, pace: Duration) -> Result<FetchedPage, FetchError> {
        let _ = pace;
        self.fetch(url).await
    }

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Builds the HTTP client used for pages and robots.txt
///
/// Redirects are disabled on the client; `HttpSource` follows them itself.
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    fetch: &FetchConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(fetch.request_timeout())
        .connect_timeout(fetch.connect_timeout())
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

fn classify_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e.to_string())
    }
}

/// Static HTTP GET
pub struct HttpSource {
    client: Client,
    max_redirects: u32,
}

impl HttpSource {
    pub fn new(client: Client, max_redirects: u32) -> Self {
        Self {
            client,
            max_redirects,
        }
    }
}

#[async_trait]
impl PageSource for HttpSource {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        self.fetch_paced(url, Duration::ZERO).await
    }

    /// # Request Flow
    ///
    /// 1. GET the URL
    /// 2. On 3xx, resolve `Location` and repeat, up to `max_redirects` hops;
    ///    a URL seen twice in one chain is a loop. A hop to the same host
    ///    waits `pace` first
    /// 3. Non-2xx is `HttpStatus`; a non-HTML Content-Type is `ContentMismatch`
    async fn fetch_paced(&self, url: &Url, pace: Duration) -> Result<FetchedPage, FetchError> {
        let mut current = url.clone();
        let mut chain: HashSet<String> = HashSet::new();
        chain.insert(current.as_str().to_string());
        let mut hops = 0;

        loop {
            let response = self
                .client
                .get(current.as_str())
                .send()
                .await
                .map_err(classify_reqwest_error)?;
            let status = response.status();

            if status.is_redirection() {
                let Some(next) = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|location| current.join(location).ok())
                else {
                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                    });
                };

                if hops >= self.max_redirects {
                    return Err(FetchError::RedirectLimit { hops });
                }
                if !chain.insert(next.as_str().to_string()) {
                    return Err(FetchError::RedirectLoop(next.to_string()));
                }

                debug!(from = %current, to = %next, "following redirect");
                if !pace.is_zero() && authority(&next) == authority(&current) {
                    tokio::time::sleep(pace).await;
                }
                hops += 1;
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                });
            }

            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_ascii_lowercase();
            if !content_type.is_empty() && !content_type.contains("html") {
                return Err(FetchError::ContentMismatch(content_type));
            }

            let html = response.text().await.map_err(classify_reqwest_error)?;
            return Ok(FetchedPage {
                final_url: current,
                html,
                rendered: false,
            });
        }
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    html: String,
    #[serde(default)]
    final_url: Option<String>,
}

/// External render service
///
/// Protocol: `POST {endpoint}` with `{"url": ..., "timeout_ms": ...}`; the
/// service answers `{"html": ..., "final_url": ...}` (`final_url` optional)
/// or a raw HTML body. Every failure is a `Render` error.
pub struct RenderSource {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl RenderSource {
    pub fn new(client: Client, endpoint: Url, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            timeout,
        }
    }
}

#[async_trait]
impl PageSource for RenderSource {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let request = RenderRequest {
            url: url.as_str(),
            timeout_ms: self.timeout.as_millis() as u64,
        };

        let response = self
            .client
            .post(self.endpoint.as_str())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| FetchError::Render(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Render(format!(
                "render service returned {}",
                status.as_u16()
            )));
        }

        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("json"))
            .unwrap_or(false);
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Render(e.to_string()))?;

        let (html, final_url) = if is_json {
            let parsed: RenderResponse =
                serde_json::from_str(&body).map_err(|e| FetchError::Render(e.to_string()))?;
            let final_url = parsed
                .final_url
                .and_then(|u| Url::parse(&u).ok())
                .unwrap_or_else(|| url.clone());
            (parsed.html, final_url)
        } else {
            (body, url.clone())
        };

        if html.trim().is_empty() {
            return Err(FetchError::Render("empty document".to_string()));
        }

        Ok(FetchedPage {
            final_url,
            html,
            rendered: true,
        })
    }

    fn name(&self) -> &'static str {
        "render"
    }
}

/// A fetched page together with its parsed links
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub page: FetchedPage,
    pub parsed: ParsedPage,
}

/// Retry and render-fallback policy over the page sources
pub struct Fetcher {
    primary: Arc<dyn PageSource>,
    renderer: Option<Arc<dyn PageSource>>,
    max_retries: u32,
    backoff: Duration,
    render_link_threshold: usize,
    render_script_ratio: f64,
}

impl Fetcher {
    pub fn new(
        primary: Arc<dyn PageSource>,
        renderer: Option<Arc<dyn PageSource>>,
        config: &FetchConfig,
    ) -> Self {
        Self {
            primary,
            renderer,
            max_retries: config.max_retries,
            backoff: config.retry_backoff(),
            render_link_threshold: config.render_link_threshold,
            render_script_ratio: config.render_script_ratio,
        }
    }

    /// Builds the static source and, when an endpoint is configured, the
    /// render source over one shared client
    pub fn from_config(client: Client, config: &FetchConfig) -> Result<Self, crate::ConfigError> {
        let primary: Arc<dyn PageSource> = Arc::new(HttpSource::new(client.clone(), config.max_redirects));

        let renderer: Option<Arc<dyn PageSource>> = if config.render_enabled() {
            let endpoint = Url::parse(config.render_endpoint.trim()).map_err(|e| {
                crate::ConfigError::InvalidUrl(format!("render endpoint: {}", e))
            })?;
            Some(Arc::new(RenderSource::new(
                client,
                endpoint,
                config.render_timeout(),
            )))
        } else {
            None
        };

        Ok(Self::new(primary, renderer, config))
    }

    /// Returns true if a static page should be fetched again through the
    /// render service
    pub fn wants_render(&self, product_links: usize, script_ratio: f64) -> bool {
        self.renderer.is_some()
            && product_links < self.render_link_threshold
            && script_ratio >= self.render_script_ratio
    }

    /// Fetches a page, retrying transient failures with exponential backoff
    ///
    /// `pace` is the host's politeness interval: no retry or redirect hop
    /// goes out sooner than that after the previous response.
    pub async fn fetch_with_retry(
        &self,
        source: &dyn PageSource,
        url: &Url,
        pace: Duration,
    ) -> Result<FetchedPage, FetchError> {
        let mut attempt = 0;
        loop {
            match source.fetch_paced(url, pace).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff.saturating_mul(1 << attempt.min(16)).max(pace);
                    warn!(
                        url = %url,
                        source = source.name(),
                        attempt = attempt + 1,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetches a page and parses it
    ///
    /// The static source is tried first. When the result carries fewer
    /// product links than the threshold and is script-heavy, the page is
    /// fetched once more through the render service, no sooner than `pace`
    /// after the static response. A render failure is terminal for the page.
    pub async fn fetch(
        &self,
        url: &Url,
        extractor: &LinkExtractor,
        classifier: &ProductClassifier,
        pace: Duration,
    ) -> Result<FetchedDocument, FetchError> {
        let page = self.fetch_with_retry(self.primary.as_ref(), url, pace).await?;
        let parsed = extractor.parse(&page.html, &page.final_url);

        let product_links = classifier.count_product_links(parsed.links.iter().map(|l| &l.url));
        if !self.wants_render(product_links, parsed.script_ratio) {
            return Ok(FetchedDocument { page, parsed });
        }

        let Some(renderer) = &self.renderer else {
            return Ok(FetchedDocument { page, parsed });
        };

        debug!(
            url = %page.final_url,
            product_links,
            script_ratio = parsed.script_ratio,
            "page looks script-driven, rendering"
        );

        tokio::time::sleep(pace).await;
        let rendered = renderer.fetch(&page.final_url).await?;
        let parsed = extractor.parse(&rendered.html, &rendered.final_url);
        Ok(FetchedDocument {
            page: rendered,
            parsed,
        })
    }
}
