use url::Url;

/// Returns the authority key of a URL: lowercase host, plus `:port` when the
/// port is not the scheme default
///
/// This key identifies a host for politeness and a domain for scoping.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use shelf_scout::url::authority;
///
/// let url = Url::parse("https://Shop.Example/p/1").unwrap();
/// assert_eq!(authority(&url), Some("shop.example".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(authority(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Checks if a host matches a wildcard pattern
///
/// `"shop.example"` matches only itself. `"*.shop.example"` matches the bare
/// `shop.example` and any subdomain of it, nested or not.
pub fn matches_wildcard(pattern: &str, host: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            host == base
                || (host.len() > base.len()
                    && host.ends_with(base)
                    && host.as_bytes()[host.len() - base.len() - 1] == b'.')
        }
        None => host == pattern,
    }
}

/// The set of hosts that belong to one crawled domain
///
/// A URL is in scope when it shares the root's authority, or when its host
/// matches one of the explicitly allowed subdomain patterns.
#[derive(Debug, Clone)]
pub struct DomainScope {
    authority: String,
    allowed: Vec<String>,
}

impl DomainScope {
    /// Creates a scope for the given root URL
    pub fn new(root: &Url, allowed_subdomains: &[String]) -> Option<Self> {
        Some(Self {
            authority: authority(root)?,
            allowed: allowed_subdomains
                .iter()
                .map(|p| p.trim().to_lowercase())
                .collect(),
        })
    }

    /// The root authority, used as the domain's name
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Returns true if the URL belongs to this domain
    pub fn contains(&self, url: &Url) -> bool {
        let Some(candidate) = authority(url) else {
            return false;
        };

        if candidate == self.authority {
            return true;
        }

        let host = url.host_str().unwrap_or_default().to_lowercase();
        self.allowed.iter().any(|pattern| matches_wildcard(pattern, &host))
    }
}
