//! Job statistics and console reporting

use crate::state::{JobResults, JobSnapshot};

/// Totals across all domains of a job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobStatistics {
    pub domains: usize,
    pub domains_drained: usize,
    pub pages_fetched: u64,
    pub products_found: u64,
    pub failed_pages: u64,
    pub rendered_pages: u64,
    pub robots_skipped: u64,
    pub duration_seconds: Option<i64>,
}

impl JobStatistics {
    pub fn from_snapshot(snapshot: &JobSnapshot) -> Self {
        let mut stats = Self {
            domains: snapshot.domains.len(),
            ..Self::default()
        };

        for d in &snapshot.domains {
            if d.status == crate::state::DomainStatus::Drained {
                stats.domains_drained += 1;
            }
            stats.pages_fetched += d.pages_fetched as u64;
            stats.products_found += d.products_found as u64;
            stats.failed_pages += d.failed_pages as u64;
            stats.rendered_pages += d.rendered_pages as u64;
            stats.robots_skipped += d.robots_skipped as u64;
        }

        stats.duration_seconds = match (snapshot.started_at, snapshot.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        };

        stats
    }

    /// Share of fetched pages that failed, in percent
    pub fn failure_rate(&self) -> f64 {
        if self.pages_fetched == 0 {
            0.0
        } else {
            self.failed_pages as f64 / self.pages_fetched as f64 * 100.0
        }
    }
}

/// One progress line per domain, for periodic console output
pub fn format_progress(snapshot: &JobSnapshot) -> Vec<String> {
    snapshot
        .domains
        .iter()
        .map(|d| {
            format!(
                "{:<32} {:<9} fetched {:>5}  queued {:>5}  in-flight {:>3}  products {:>5}  failed {:>4}",
                d.domain,
                d.status.as_str(),
                d.pages_fetched,
                d.queued,
                d.in_flight,
                d.products_found,
                d.failed_pages
            )
        })
        .collect()
}

/// Prints the final job summary to stdout
pub fn print_summary(snapshot: &JobSnapshot, results: &JobResults) {
    let stats = JobStatistics::from_snapshot(snapshot);

    println!("=== Crawl Summary ===\n");
    println!("Job: {}", snapshot.id);
    println!("Status: {}", snapshot.status);
    if let Some(error) = &snapshot.error {
        println!("Error: {}", error);
    }
    if let Some(seconds) = stats.duration_seconds {
        println!("Duration: {}s", seconds);
    }
    if let Some(hash) = &snapshot.config_hash {
        println!("Config hash: {}", hash);
    }
    println!();

    println!("Overview:");
    println!(
        "  Domains drained: {} / {}",
        stats.domains_drained, stats.domains
    );
    println!("  Pages fetched: {}", stats.pages_fetched);
    println!("  Product URLs: {}", stats.products_found);
    println!(
        "  Failed pages: {} ({:.1}%)",
        stats.failed_pages,
        stats.failure_rate()
    );
    println!("  Rendered pages: {}", stats.rendered_pages);
    if stats.robots_skipped > 0 {
        println!("  Skipped by robots.txt: {}", stats.robots_skipped);
    }
    println!();

    println!("Per Domain:");
    for line in format_progress(snapshot) {
        println!("  {}", line);
    }
    println!();

    for (domain, urls) in results {
        println!("{} ({} product URLs)", domain, urls.len());
        for url in urls.iter().take(5) {
            println!("  - {}", url);
        }
        if urls.len() > 5 {
            println!("  ... and {} more", urls.len() - 5);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CrawlJob, DomainProgress, DomainStatus, JobId};
    use url::Url;

    fn progress(domain: &str, status: DomainStatus, fetched: u32, failed: u32) -> DomainProgress {
        DomainProgress {
            domain: domain.to_string(),
            root: format!("https://{}/", domain),
            status,
            pages_fetched: fetched,
            queued: 0,
            in_flight: 0,
            products_found: 3,
            failed_pages: failed,
            rendered_pages: 1,
            robots_skipped: 0,
        }
    }

    #[test]
    fn test_statistics_from_snapshot() {
        let job = CrawlJob::new(JobId::new(), vec![Url::parse("https://a.example/").unwrap()], 10);
        let snapshot = JobSnapshot::from_job(
            &job,
            vec![
                progress("a.example", DomainStatus::Drained, 30, 3),
                progress("b.example", DomainStatus::Crawling, 10, 1),
            ],
        );

        let stats = JobStatistics::from_snapshot(&snapshot);
        assert_eq!(stats.domains, 2);
        assert_eq!(stats.domains_drained, 1);
        assert_eq!(stats.pages_fetched, 40);
        assert_eq!(stats.products_found, 6);
        assert_eq!(stats.rendered_pages, 2);
        assert!((stats.failure_rate() - 10.0).abs() < 1e-9);
        assert_eq!(stats.duration_seconds, None);
    }

    #[test]
    fn test_format_progress() {
        let job = CrawlJob::new(JobId::new(), vec![], 10);
        let snapshot =
            JobSnapshot::from_job(&job, vec![progress("a.example", DomainStatus::Drained, 7, 0)]);
        let lines = format_progress(&snapshot);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("a.example"));
        assert!(lines[0].contains("drained"));
    }
}
