use crate::{UrlError, UrlResult};
use url::{form_urlencoded, Url};

/// Canonicalizes URLs so equivalent spellings share one dedup key
///
/// # Normalization Steps
///
/// 1. Resolve the raw string against the base URL (if any); reject if malformed
/// 2. Reject anything but `http` and `https`
/// 3. Lowercase the host and drop the scheme's default port
/// 4. Normalize the path:
///    - Collapse repeated slashes and remove dot segments
///    - Remove trailing slash (except for root /)
/// 5. Remove the fragment
/// 6. Remove tracking query parameters, sort the rest, drop an empty query
#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Exact parameter names to drop
    exact: Vec<String>,
    /// Parameter name prefixes to drop (from patterns ending in `*`)
    prefixes: Vec<String>,
}

impl Normalizer {
    /// Builds a normalizer from tracking parameter patterns
    ///
    /// A pattern ending in `*` matches every parameter starting with the rest
    /// of the pattern (`utm_*` drops `utm_source`, `utm_medium`, ...).
    pub fn new<S: AsRef<str>>(tracking_params: &[S]) -> Self {
        let mut exact = Vec::new();
        let mut prefixes = Vec::new();

        for param in tracking_params {
            let param = param.as_ref().trim().to_ascii_lowercase();
            if let Some(prefix) = param.strip_suffix('*') {
                prefixes.push(prefix.to_string());
            } else if !param.is_empty() {
                exact.push(param);
            }
        }

        Self { exact, prefixes }
    }

    /// Normalizes `raw`, resolving it against `base` when it is relative
    ///
    /// # Examples
    ///
    /// ```
    /// use shelf_scout::url::Normalizer;
    /// use url::Url;
    ///
    /// let normalizer = Normalizer::default();
    /// let base = Url::parse("https://shop.example/category/shoes").unwrap();
    /// let url = normalizer.normalize("../product/42/?utm_source=x#reviews", Some(&base)).unwrap();
    /// assert_eq!(url.as_str(), "https://shop.example/product/42");
    /// ```
    pub fn normalize(&self, raw: &str, base: Option<&Url>) -> UrlResult<Url> {
        let raw = raw.trim();

        let mut url = match base {
            Some(base) => base.join(raw),
            None => Url::parse(raw),
        }
        .map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(UrlError::InvalidScheme(url.scheme().to_string()));
        }

        let host = url.host_str().ok_or(UrlError::MissingHost)?.to_lowercase();
        if host.is_empty() {
            return Err(UrlError::MissingHost);
        }
        url.set_host(Some(&host))
            .map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

        if url.port().is_some() && url.port() == default_port(url.scheme()) {
            // set_port only fails for URLs that cannot carry a host
            let _ = url.set_port(None);
        }

        let normalized_path = normalize_path(url.path());
        url.set_path(&normalized_path);

        url.set_fragment(None);

        if let Some(query) = url.query() {
            let query = self.clean_query(query);
            url.set_query(query.as_deref());
        }

        Ok(url)
    }

    /// Drops tracking parameters and sorts the rest
    ///
    /// Only keys are decoded, for the tracking check; kept pairs are
    /// re-joined with their original bytes.
    fn clean_query(&self, query: &str) -> Option<String> {
        let mut pairs: Vec<&str> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                let key = pair.split('=').next().unwrap_or_default();
                let decoded: String = form_urlencoded::parse(key.as_bytes())
                    .map(|(k, _)| k.into_owned())
                    .next()
                    .unwrap_or_default();
                !self.is_tracking_param(&decoded)
            })
            .collect();
        pairs.sort_unstable();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("&"))
        }
    }

    /// Checks if a query parameter is a tracking parameter
    pub fn is_tracking_param(&self, key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        self.exact.iter().any(|p| *p == key) || self.prefixes.iter().any(|p| key.starts_with(p))
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&crate::config::NormalizeConfig::default().tracking_params)
    }
}

/// Normalizes a URL with the default tracking parameter set
pub fn normalize(raw: &str, base: Option<&Url>) -> UrlResult<Url> {
    Normalizer::default().normalize(raw, base)
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// Collapses empty and dot segments and removes the trailing slash
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}
