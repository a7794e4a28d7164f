//! Robots.txt handling module
//!
//! robots.txt is fetched once per domain before the domain's first
//! dispatch. A missing, failing or unreachable robots.txt allows everything.

mod parser;

pub use parser::RobotsPolicy;

use crate::url::authority;
use reqwest::header;
use tracing::{debug, warn};
use url::Url;

/// Redirect hops followed for robots.txt
const MAX_ROBOTS_REDIRECTS: u32 = 5;

/// Fetches and parses robots.txt for the domain of `root`
///
/// Redirects are followed up to `MAX_ROBOTS_REDIRECTS` hops while they stay
/// on the same site (scheme changes and a `www.` prefix are allowed).
/// Never fails: any problem yields an allow-all policy.
pub async fn fetch_robots(client: &reqwest::Client, root: &Url, agent: &str) -> RobotsPolicy {
    let mut robots_url = match root.join("/robots.txt") {
        Ok(url) => url,
        Err(_) => return RobotsPolicy::allow_all(agent),
    };
    let mut hops = 0;

    let response = loop {
        let response = match client.get(robots_url.as_str()).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %robots_url, error = %e, "robots.txt unreachable, allowing all");
                return RobotsPolicy::allow_all(agent);
            }
        };

        if !response.status().is_redirection() {
            break response;
        }

        let next = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|location| robots_url.join(location).ok());
        match next {
            Some(next) if hops < MAX_ROBOTS_REDIRECTS && same_site(root, &next) => {
                debug!(from = %robots_url, to = %next, "following robots.txt redirect");
                robots_url = next;
                hops += 1;
            }
            _ => {
                warn!(url = %robots_url, hops, "robots.txt redirect not followed, allowing all");
                return RobotsPolicy::allow_all(agent);
            }
        }
    };

    if !response.status().is_success() {
        debug!(url = %robots_url, status = response.status().as_u16(), "no robots.txt");
        return RobotsPolicy::allow_all(agent);
    }

    match response.text().await {
        Ok(body) => {
            debug!(url = %robots_url, bytes = body.len(), "loaded robots.txt");
            RobotsPolicy::from_body(&body, agent)
        }
        Err(e) => {
            warn!(url = %robots_url, error = %e, "robots.txt unreadable, allowing all");
            RobotsPolicy::allow_all(agent)
        }
    }
}

fn same_site(a: &Url, b: &Url) -> bool {
    let key = |url: &Url| {
        authority(url).map(|host| host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
    };
    matches!(b.scheme(), "http" | "https") && key(a).is_some() && key(a) == key(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_missing_robots_allows_all() {
        let server = MockServer::start().await;
        let root = Url::parse(&format!("{}/", server.uri())).unwrap();

        let policy = fetch_robots(&reqwest::Client::new(), &root, "ShelfScout").await;
        assert!(policy.allows(&root.join("/cart").unwrap()));
    }

    #[tokio::test]
    async fn test_same_site_redirect_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/live/robots.txt"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/live/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /cart\n"))
            .mount(&server)
            .await;
        let root = Url::parse(&format!("{}/", server.uri())).unwrap();

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let policy = fetch_robots(&client, &root, "ShelfScout").await;
        assert!(!policy.allows(&root.join("/cart").unwrap()));
    }

    #[tokio::test]
    async fn test_offsite_redirect_allows_all() {
        let server = MockServer::start().await;
        let elsewhere = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/robots.txt", elsewhere.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
            .expect(0)
            .mount(&elsewhere)
            .await;
        let root = Url::parse(&format!("{}/", server.uri())).unwrap();

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let policy = fetch_robots(&client, &root, "ShelfScout").await;
        assert!(policy.allows(&root.join("/product/1").unwrap()));
    }

    #[test]
    fn test_same_site() {
        let root = Url::parse("http://shop.example/").unwrap();
        assert!(same_site(&root, &Url::parse("https://www.shop.example/robots.txt").unwrap()));
        assert!(!same_site(&root, &Url::parse("https://cdn.example/robots.txt").unwrap()));
        assert!(!same_site(&root, &Url::parse("ftp://shop.example/robots.txt").unwrap()));
    }

    #[tokio::test]
    async fn test_robots_rules_applied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("User-agent: *\nDisallow: /checkout\nCrawl-delay: 2\n"),
            )
            .mount(&server)
            .await;
        let root = Url::parse(&format!("{}/", server.uri())).unwrap();

        let policy = fetch_robots(&reqwest::Client::new(), &root, "ShelfScout").await;
        assert!(!policy.allows(&root.join("/checkout").unwrap()));
        assert!(policy.allows(&root.join("/product/1").unwrap()));
        assert_eq!(policy.crawl_delay(), Some(std::time::Duration::from_secs(2)));
    }
}
