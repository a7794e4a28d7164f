//! robots.txt rules for one domain
//!
//! Allow/disallow matching is delegated to the robotstxt crate; the
//! Crawl-delay directive, which that crate does not expose, is read here.

use robotstxt::DefaultMatcher;
use std::time::Duration;
use url::Url;

/// robots.txt rules bound to the crawler's agent token
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    /// Raw robots.txt body; empty means allow all
    body: String,
    agent: String,
    crawl_delay: Option<Duration>,
}

impl RobotsPolicy {
    /// Builds a policy from a robots.txt body
    pub fn from_body(body: &str, agent: &str) -> Self {
        Self {
            body: body.to_string(),
            agent: agent.to_string(),
            crawl_delay: parse_crawl_delay(body, agent),
        }
    }

    /// Policy used when robots.txt is missing or unreachable
    pub fn allow_all(agent: &str) -> Self {
        Self::from_body("", agent)
    }

    /// Checks whether the crawler may fetch `url`
    pub fn allows(&self, url: &Url) -> bool {
        if self.body.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.body, &self.agent, url.as_str())
    }

    /// Crawl-delay for this agent, falling back to the `*` group
    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }
}

/// Reads the Crawl-delay that applies to `agent`
///
/// A group is one or more consecutive `User-agent` lines followed by rules.
/// A delay in a group naming the agent wins over one in the `*` group.
fn parse_crawl_delay(body: &str, agent: &str) -> Option<Duration> {
    let agent = agent.to_lowercase();
    let mut group: Vec<String> = Vec::new();
    let mut in_rules = false;
    let mut specific = None;
    let mut wildcard = None;

    for line in body.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        if key == "user-agent" {
            if in_rules {
                group.clear();
                in_rules = false;
            }
            group.push(value.to_lowercase());
            continue;
        }

        in_rules = true;
        if key != "crawl-delay" {
            continue;
        }

        let Ok(seconds) = value.parse::<f64>() else {
            continue;
        };
        if !seconds.is_finite() || seconds < 0.0 {
            continue;
        }
        let delay = Duration::from_secs_f64(seconds);

        if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
            specific = Some(delay);
        } else if group.iter().any(|ua| ua == "*") {
            wildcard = Some(delay);
        }
    }

    specific.or(wildcard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse(&format!("https://shop.example{}", path)).unwrap()
    }

    #[test]
    fn test_allow_all() {
        let robots = RobotsPolicy::allow_all("ShelfScout");
        assert!(robots.allows(&url("/checkout")));
        assert_eq!(robots.crawl_delay(), None);
    }

    #[test]
    fn test_disallow_prefix() {
        let robots = RobotsPolicy::from_body("User-agent: *\nDisallow: /private", "ShelfScout");
        assert!(robots.allows(&url("/")));
        assert!(robots.allows(&url("/product/1")));
        assert!(!robots.allows(&url("/private")));
        assert!(!robots.allows(&url("/private/product/2")));
    }

    #[test]
    fn test_allow_overrides_disallow() {
        let body = "User-agent: *\nDisallow: /shop\nAllow: /shop/product";
        let robots = RobotsPolicy::from_body(body, "ShelfScout");
        assert!(!robots.allows(&url("/shop/cart")));
        assert!(robots.allows(&url("/shop/product/7")));
    }

    #[test]
    fn test_agent_specific_group() {
        let body = "User-agent: ShelfScout\nDisallow: /\n\nUser-agent: *\nAllow: /";
        assert!(!RobotsPolicy::from_body(body, "ShelfScout").allows(&url("/p/1")));
        assert!(RobotsPolicy::from_body(body, "OtherBot").allows(&url("/p/1")));
    }

    #[test]
    fn test_garbage_body_allows() {
        let robots = RobotsPolicy::from_body("<html>not robots</html>", "ShelfScout");
        assert!(robots.allows(&url("/anything")));
    }

    #[test]
    fn test_crawl_delay() {
        let body = "User-agent: ShelfScout\nCrawl-delay: 2\n\nUser-agent: *\nCrawl-delay: 10";
        assert_eq!(
            RobotsPolicy::from_body(body, "ShelfScout").crawl_delay(),
            Some(Duration::from_secs(2))
        );
        assert_eq!(
            RobotsPolicy::from_body(body, "OtherBot").crawl_delay(),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_crawl_delay_after_rules_and_fraction() {
        let body = "User-agent: *\nDisallow: /cart\nCrawl-delay: 1.5 # be gentle";
        assert_eq!(
            RobotsPolicy::from_body(body, "ShelfScout").crawl_delay(),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_grouped_agents_share_delay() {
        let body = "User-agent: BotA\nUser-agent: BotB\nCrawl-delay: 3";
        assert_eq!(
            RobotsPolicy::from_body(body, "BotB").crawl_delay(),
            Some(Duration::from_secs(3))
        );
        assert_eq!(RobotsPolicy::from_body(body, "BotC").crawl_delay(), None);
    }
}
