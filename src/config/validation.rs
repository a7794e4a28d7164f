use crate::config::types::{ClassifierConfig, Config, CrawlerConfig, FetchConfig, RuleEntry, UserAgentConfig};
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Upper bound on the shared worker pool
const MAX_WORKERS: u32 = 256;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetch_config(&config.fetch)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_classifier_config(&config.classifier)?;

    if config.output.directory.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    let roots: Vec<String> = config.domains.iter().map(|d| d.url.clone()).collect();
    if !roots.is_empty() {
        validate_domain_roots(&roots)?;
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.worker_count < 1 || config.worker_count > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "worker_count must be between 1 and {}, got {}",
            MAX_WORKERS, config.worker_count
        )));
    }

    if config.max_pages_per_domain < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages_per_domain must be >= 1, got {}",
            config.max_pages_per_domain
        )));
    }

    for pattern in &config.allowed_subdomains {
        validate_host_pattern(pattern)?;
    }

    if config.pagination_params.iter().any(|p| p.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "pagination_params cannot contain empty names".to_string(),
        ));
    }

    Ok(())
}

/// Validates fetch configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.request_timeout == 0 {
        return Err(ConfigError::Validation(
            "request_timeout must be > 0".to_string(),
        ));
    }

    if config.render_enabled() {
        let endpoint = Url::parse(&config.render_endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid render_endpoint '{}': {}",
                config.render_endpoint, e
            ))
        })?;
        if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "render_endpoint must use http or https, got '{}'",
                endpoint.scheme()
            )));
        }
    }

    if !(0.0..=1.0).contains(&config.render_script_ratio) {
        return Err(ConfigError::Validation(format!(
            "render_script_ratio must be within 0..=1, got {}",
            config.render_script_ratio
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

/// Validates classifier weights and compiles every configured rule once
fn validate_classifier_config(config: &ClassifierConfig) -> Result<(), ConfigError> {
    if !(config.threshold.is_finite() && config.threshold > 0.0) {
        return Err(ConfigError::Validation(format!(
            "classifier threshold must be finite and > 0, got {}",
            config.threshold
        )));
    }

    for (name, weight) in [
        ("path_weight", config.path_weight),
        ("structure_weight", config.structure_weight),
        ("negative_weight", config.negative_weight),
    ] {
        if !(weight >= 0.0) {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 0, got {}",
                name, weight
            )));
        }
    }

    for rule in config.product_rules.iter().chain(&config.negative_rules) {
        validate_rule(rule)?;
    }

    if config.replace_builtin_rules && config.product_rules.is_empty() {
        return Err(ConfigError::Validation(
            "replace_builtin_rules requires at least one product rule".to_string(),
        ));
    }

    Ok(())
}

fn validate_rule(rule: &RuleEntry) -> Result<(), ConfigError> {
    if rule.id.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "rule for pattern '{}' has an empty id",
            rule.pattern
        )));
    }

    if !(0.0..=1.0).contains(&rule.weight) {
        return Err(ConfigError::Validation(format!(
            "rule '{}' weight must be within 0..=1, got {}",
            rule.id, rule.weight
        )));
    }

    Regex::new(&rule.pattern)
        .map_err(|e| ConfigError::InvalidPattern(format!("rule '{}': {}", rule.id, e)))?;

    Ok(())
}

/// Validates the root URLs of a job and returns them parsed
///
/// Fails when the list is empty, when a root does not parse, or when it is
/// not http(s). Duplicate hosts are rejected since one domain would end up
/// with two frontiers.
pub fn validate_domain_roots(roots: &[String]) -> Result<Vec<Url>, ConfigError> {
    if roots.is_empty() {
        return Err(ConfigError::Validation(
            "a job needs at least one domain".to_string(),
        ));
    }

    let mut parsed: Vec<Url> = Vec::with_capacity(roots.len());
    for root in roots {
        let candidate = if root.contains("://") {
            root.trim().to_string()
        } else {
            format!("https://{}", root.trim())
        };

        let url = Url::parse(&candidate)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid domain '{}': {}", root, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Domain '{}' must use http or https",
                root
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::InvalidUrl(format!("Domain '{}' has no host", root)))?;

        if parsed.iter().any(|p| p.host_str() == Some(host) && p.port() == url.port()) {
            return Err(ConfigError::Validation(format!(
                "Domain '{}' is listed more than once",
                host
            )));
        }

        parsed.push(url);
    }

    Ok(parsed)
}

/// Validates a host pattern (supports a leading `*.` wildcard)
fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    let host = pattern.strip_prefix("*.").unwrap_or(pattern);

    if host.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Host pattern cannot be empty".to_string(),
        ));
    }

    if !host
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' contains invalid characters",
            host
        )));
    }

    if host.starts_with('.')
        || host.ends_with('.')
        || host.starts_with('-')
        || host.ends_with('-')
        || host.contains("..")
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' is malformed",
            host
        )));
    }

    Ok(())
}
