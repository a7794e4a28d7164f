//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock shops and run whole jobs through
//! `CrawlService`, from submission to stored results.

use shelf_scout::config::{Config, OutputFormat};
use shelf_scout::storage::{JobStore, SqliteJobStore};
use shelf_scout::{CrawlService, JobId, JobRequest, JobSnapshot, JobStatus};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Creates a fast, permissive test configuration writing into `output`
fn create_test_config(output: &Path) -> Config {
    let mut config = Config::default();
    config.crawler.worker_count = 4;
    config.crawler.politeness_interval = 0;
    config.crawler.max_depth = 5;
    config.fetch.max_retries = 1;
    config.fetch.retry_backoff = 1;
    config.fetch.request_timeout = 5_000;
    config.user_agent.crawler_name = "TestBot".to_string();
    config.output.directory = output.to_string_lossy().to_string();
    config
}

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_raw(body.into(), "text/html; charset=utf-8")
}

fn product_page(name: &str) -> String {
    format!(
        r#"<html><head><title>{name}</title></head><body>
        <h1>{name}</h1><span class="price">$89.00</span><p>SKU: {name}-1</p>
        <button class="add-to-cart">Add to cart</button>
        <a href="/">Home</a></body></html>"#
    )
}

fn link_page(title: &str, hrefs: &[&str]) -> String {
    let links: String = hrefs
        .iter()
        .map(|href| format!(r#"<li><a href="{href}">{href}</a></li>"#))
        .collect();
    format!(
        r#"<html><head><title>{title}</title></head><body><h1>{title}</h1><ul>{links}</ul></body></html>"#
    )
}

async fn mount(server: &MockServer, at: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn run_job(service: &CrawlService, request: JobRequest) -> (JobId, JobSnapshot) {
    let id = service.submit(request);
    let snapshot = tokio::time::timeout(Duration::from_secs(30), service.wait(id))
        .await
        .expect("job did not terminate")
        .expect("job unknown to the service");
    (id, snapshot)
}

fn product_set(service: &CrawlService, id: JobId) -> BTreeSet<String> {
    service
        .results(id)
        .expect("results available")
        .into_values()
        .flatten()
        .collect()
}

fn urls(base: &str, paths: &[&str]) -> BTreeSet<String> {
    paths.iter().map(|p| format!("{}{}", base, p)).collect()
}

async fn request_count(server: &MockServer, at: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == at)
        .count()
}

/// Notes the arrival time of every request it answers
struct Timed {
    arrivals: Arc<Mutex<Vec<Instant>>>,
    response: ResponseTemplate,
}

impl Respond for Timed {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().push(Instant::now());
        self.response.clone()
    }
}

/// root → 2 categories → 5 products + 1 editorial decoy
async fn mount_shop(server: &MockServer) {
    mount(
        server,
        "/",
        html(link_page("Shop", &["/category/shoes", "/category/bags"])),
    )
    .await;
    mount(
        server,
        "/category/shoes",
        html(link_page(
            "Shoes",
            &["/product/1", "/product/2", "/product/3", "/product-guide"],
        )),
    )
    .await;
    mount(
        server,
        "/category/bags",
        html(link_page("Bags", &["/product/4", "/product/5", "/product-guide"])),
    )
    .await;
    for i in 1..=5 {
        mount(server, &format!("/product/{}", i), html(product_page(&format!("Item{}", i)))).await;
    }
    mount(
        server,
        "/product-guide",
        html(
            r#"<html><body><h1>Product guide</h1>
            <h2>Choosing a shoe</h2><p>Read our tips before you buy.</p>
            <a href="/product/1">One</a><a href="/product/2">Two</a></body></html>"#,
        ),
    )
    .await;
}

#[tokio::test]
async fn test_shop_scenario_finds_exactly_the_products() {
    let server = MockServer::start().await;
    mount_shop(&server).await;

    let output = tempfile::tempdir().unwrap();
    let service = CrawlService::new(create_test_config(output.path())).unwrap();
    let base = server.uri();

    let (id, snapshot) = run_job(&service, JobRequest::new([format!("{}/", base)])).await;

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(
        product_set(&service, id),
        urls(
            &base,
            &["/product/1", "/product/2", "/product/3", "/product/4", "/product/5"]
        )
    );

    let domain = &snapshot.domains[0];
    assert_eq!(domain.pages_fetched, 9);
    assert_eq!(domain.products_found, 5);
    assert_eq!(domain.failed_pages, 0);

    let csv = std::fs::read_dir(output.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .find(|e| e.file_name().to_string_lossy().ends_with(".csv"))
        .expect("CSV result file");
    let content = std::fs::read_to_string(csv.path()).unwrap();
    assert_eq!(content.lines().count(), 6);
    assert!(content.starts_with("product_url"));
}

#[tokio::test]
async fn test_results_stored_as_json_and_sqlite() {
    let server = MockServer::start().await;
    mount_shop(&server).await;

    let output = tempfile::tempdir().unwrap();
    let db_path = output.path().join("jobs.db");
    let mut config = create_test_config(output.path());
    config.output.format = OutputFormat::Json;
    config.output.database_path = db_path.to_string_lossy().to_string();

    let service = CrawlService::new(config).unwrap().with_config_hash("cafebabe");
    let (id, snapshot) = run_job(&service, JobRequest::new([server.uri()])).await;
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.config_hash.as_deref(), Some("cafebabe"));

    let report = std::fs::read_to_string(output.path().join(format!("{}.json", id))).unwrap();
    let report: serde_json::Value = serde_json::from_str(&report).unwrap();
    assert_eq!(report["job"]["status"], "completed");

    let store = SqliteJobStore::new(&db_path).unwrap();
    let stored = store.load_snapshot(id).unwrap().expect("stored snapshot");
    assert_eq!(stored.status, JobStatus::Completed);
    let stored_urls: BTreeSet<String> = store
        .load_results(id)
        .unwrap()
        .into_values()
        .flatten()
        .collect();
    assert_eq!(stored_urls, product_set(&service, id));

    // Purged jobs are still answered from the store
    assert!(service.purge(id));
    assert_eq!(service.status(id).unwrap().status, JobStatus::Completed);
    assert_eq!(service.results(id).unwrap().values().map(|s| s.len()).sum::<usize>(), 5);
}

#[tokio::test]
async fn test_every_third_fetch_failing_still_completes() {
    let server = MockServer::start().await;
    let products: Vec<String> = (1..=9).map(|i| format!("/product/{}", i)).collect();
    let hrefs: Vec<&str> = products.iter().map(String::as_str).collect();
    mount(&server, "/", html(link_page("Shop", &hrefs))).await;

    for (i, p) in products.iter().enumerate() {
        let response = if (i + 1) % 3 == 0 {
            ResponseTemplate::new(500)
        } else {
            html(product_page(&format!("Item{}", i + 1)))
        };
        mount(&server, p, response).await;
    }

    let output = tempfile::tempdir().unwrap();
    let service = CrawlService::new(create_test_config(output.path())).unwrap();
    let base = server.uri();

    let (id, snapshot) = run_job(&service, JobRequest::new([base.clone()])).await;

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.domains[0].failed_pages, 3);
    assert_eq!(
        product_set(&service, id),
        urls(
            &base,
            &["/product/1", "/product/2", "/product/4", "/product/5", "/product/7", "/product/8"]
        )
    );
}

#[tokio::test]
async fn test_rate_limited_page_is_retried() {
    let server = MockServer::start().await;
    mount(&server, "/", html(link_page("Shop", &["/product/1"]))).await;
    Mock::given(method("GET"))
        .and(path("/product/1"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount(&server, "/product/1", html(product_page("Item1"))).await;

    let output = tempfile::tempdir().unwrap();
    let service = CrawlService::new(create_test_config(output.path())).unwrap();
    let base = server.uri();

    let (id, snapshot) = run_job(&service, JobRequest::new([base.clone()])).await;

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(product_set(&service, id), urls(&base, &["/product/1"]));
}

#[tokio::test]
async fn test_page_cap_is_respected() {
    let server = MockServer::start().await;
    let products: Vec<String> = (1..=20).map(|i| format!("/product/{}", i)).collect();
    let hrefs: Vec<&str> = products.iter().map(String::as_str).collect();
    mount(&server, "/", html(link_page("Shop", &hrefs))).await;
    for (i, p) in products.iter().enumerate() {
        mount(&server, p, html(product_page(&format!("Item{}", i + 1)))).await;
    }

    let output = tempfile::tempdir().unwrap();
    let service = CrawlService::new(create_test_config(output.path())).unwrap();

    let (id, snapshot) =
        run_job(&service, JobRequest::new([server.uri()]).with_max_pages(5)).await;

    assert_eq!(snapshot.status, JobStatus::Completed);
    let domain = &snapshot.domains[0];
    assert_eq!(domain.pages_fetched, 5);
    assert_eq!(domain.queued, 0);
    assert_eq!(product_set(&service, id).len(), 4);

    let requests = server.received_requests().await.unwrap();
    let page_requests = requests
        .iter()
        .filter(|r| r.url.path() != "/robots.txt")
        .count();
    assert_eq!(page_requests, 5);
}

#[tokio::test]
async fn test_cyclic_graph_terminates() {
    let server = MockServer::start().await;
    mount(&server, "/", html(link_page("Home", &["/a"]))).await;
    mount(&server, "/a", html(link_page("A", &["/b", "/"]))).await;
    mount(&server, "/b", html(link_page("B", &["/c", "/a"]))).await;
    mount(&server, "/c", html(link_page("C", &["/a", "/b", "/product/77"]))).await;
    mount(&server, "/product/77", html(product_page("Loop"))).await;

    let output = tempfile::tempdir().unwrap();
    let service = CrawlService::new(create_test_config(output.path())).unwrap();
    let base = server.uri();

    let (id, snapshot) = run_job(&service, JobRequest::new([base.clone()])).await;

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.domains[0].pages_fetched, 5);
    assert_eq!(product_set(&service, id), urls(&base, &["/product/77"]));
}

#[tokio::test]
async fn test_cancellation_keeps_partial_results() {
    let server = MockServer::start().await;
    let products: Vec<String> = (1..=30).map(|i| format!("/product/{}", i)).collect();
    let hrefs: Vec<&str> = products.iter().map(String::as_str).collect();
    mount(&server, "/", html(link_page("Shop", &hrefs))).await;
    for (i, p) in products.iter().enumerate() {
        mount(
            &server,
            p,
            html(product_page(&format!("Item{}", i + 1))).set_delay(Duration::from_millis(150)),
        )
        .await;
    }

    let output = tempfile::tempdir().unwrap();
    let mut config = create_test_config(output.path());
    config.crawler.worker_count = 1;
    let service = CrawlService::new(config).unwrap();

    let id = service.submit(JobRequest::new([server.uri()]));
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(service.cancel(id));

    let snapshot = tokio::time::timeout(Duration::from_secs(10), service.wait(id))
        .await
        .expect("cancelled job did not terminate")
        .unwrap();

    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.error.as_deref(), Some("cancelled"));
    let domain = &snapshot.domains[0];
    assert!(domain.pages_fetched < 31);
    assert_eq!(domain.in_flight, 0);
    assert_eq!(product_set(&service, id).len(), domain.products_found);
    assert!(!service.cancel(id));
}

#[tokio::test]
async fn test_robots_disallowed_urls_are_never_fetched() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/robots.txt",
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/\n"),
    )
    .await;
    mount(
        &server,
        "/",
        html(link_page("Shop", &["/private/product/1", "/product/2"])),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/private/product/1"))
        .respond_with(html(product_page("Secret")))
        .expect(0)
        .mount(&server)
        .await;
    mount(&server, "/product/2", html(product_page("Item2"))).await;

    let output = tempfile::tempdir().unwrap();
    let service = CrawlService::new(create_test_config(output.path())).unwrap();
    let base = server.uri();

    let (id, snapshot) = run_job(&service, JobRequest::new([base.clone()])).await;

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.domains[0].robots_skipped, 1);
    assert_eq!(product_set(&service, id), urls(&base, &["/product/2"]));
}

#[tokio::test]
async fn test_script_driven_listing_is_rendered() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/",
        html(r#"<html><body><div id="app"></div><script src="/app.js"></script></body></html>"#),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/render"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "html": r#"<html><body><div id="app"><a href="/product/1">One</a><a href="/product/2">Two</a></div></body></html>"#
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount(&server, "/product/1", html(product_page("Item1"))).await;
    mount(&server, "/product/2", html(product_page("Item2"))).await;

    let output = tempfile::tempdir().unwrap();
    let mut config = create_test_config(output.path());
    config.fetch.render_endpoint = format!("{}/render", server.uri());
    let service = CrawlService::new(config).unwrap();
    let base = server.uri();

    let (id, snapshot) = run_job(&service, JobRequest::new([base.clone()])).await;

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.domains[0].rendered_pages, 1);
    assert_eq!(
        product_set(&service, id),
        urls(&base, &["/product/1", "/product/2"])
    );
}

#[tokio::test]
async fn test_redirects_dedup_on_final_url() {
    let server = MockServer::start().await;
    let elsewhere = MockServer::start().await;

    mount(
        &server,
        "/",
        html(link_page("Shop", &["/product/123", "/p/123", "/moved"])),
    )
    .await;
    mount(
        &server,
        "/product/123",
        ResponseTemplate::new(301).insert_header("location", "/p/123"),
    )
    .await;
    mount(&server, "/p/123", html(product_page("Moved"))).await;
    mount(
        &server,
        "/moved",
        ResponseTemplate::new(302)
            .insert_header("location", format!("{}/product/9", elsewhere.uri()).as_str()),
    )
    .await;
    mount(&elsewhere, "/product/9", html(product_page("Elsewhere"))).await;

    let output = tempfile::tempdir().unwrap();
    let service = CrawlService::new(create_test_config(output.path())).unwrap();
    let base = server.uri();

    let (id, snapshot) = run_job(&service, JobRequest::new([base.clone()])).await;

    assert_eq!(snapshot.status, JobStatus::Completed);
    let domain = &snapshot.domains[0];
    // /p/123 is reached through the redirect and dropped from the queue
    assert_eq!(domain.pages_fetched, 3);
    assert_eq!(domain.failed_pages, 1);
    assert_eq!(request_count(&server, "/p/123").await, 1);
    assert_eq!(product_set(&service, id), urls(&base, &["/p/123"]));
}

#[tokio::test]
async fn test_queued_redirect_target_is_fetched_once() {
    let server = MockServer::start().await;
    mount(&server, "/", html(link_page("Shop", &["/old", "/p/new"]))).await;
    mount(
        &server,
        "/old",
        ResponseTemplate::new(301).insert_header("location", "/p/new"),
    )
    .await;
    mount(&server, "/p/new", html(product_page("New"))).await;

    let output = tempfile::tempdir().unwrap();
    let mut config = create_test_config(output.path());
    config.crawler.worker_count = 1;
    let service = CrawlService::new(config).unwrap();
    let base = server.uri();

    let (id, snapshot) = run_job(&service, JobRequest::new([base.clone()])).await;

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.domains[0].pages_fetched, 2);
    assert_eq!(snapshot.domains[0].queued, 0);
    assert_eq!(request_count(&server, "/p/new").await, 1);
    assert_eq!(product_set(&service, id), urls(&base, &["/p/new"]));
}

#[tokio::test]
async fn test_politeness_spaces_every_request_to_a_host() {
    let server = MockServer::start().await;
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    let timed = |response: ResponseTemplate| Timed {
        arrivals: arrivals.clone(),
        response,
    };

    for (at, response) in [
        ("/", html(link_page("Shop", &["/a", "/product/flaky", "/old"]))),
        ("/a", html(link_page("A", &[]))),
        ("/product/flaky", html(product_page("Flaky"))),
        ("/old", ResponseTemplate::new(301).insert_header("location", "/p/new")),
        ("/p/new", html(product_page("New"))),
    ] {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(timed(response))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/product/flaky"))
        .respond_with(timed(ResponseTemplate::new(500)))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    let output = tempfile::tempdir().unwrap();
    let mut config = create_test_config(output.path());
    config.crawler.politeness_interval = 200;
    let service = CrawlService::new(config).unwrap();
    let base = server.uri();

    let (id, snapshot) = run_job(&service, JobRequest::new([base.clone()])).await;

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(
        product_set(&service, id),
        urls(&base, &["/product/flaky", "/p/new"])
    );

    let mut arrivals = arrivals.lock().clone();
    arrivals.sort();
    // root, /a, /product/flaky twice, /old and its hop to /p/new
    assert_eq!(arrivals.len(), 6);
    for pair in arrivals.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= Duration::from_millis(200), "requests only {:?} apart", gap);
    }
}

#[tokio::test]
async fn test_domains_crawl_independently() {
    let shop_a = MockServer::start().await;
    let shop_b = MockServer::start().await;
    mount(&shop_a, "/", html(link_page("A", &["/product/1"]))).await;
    mount(&shop_a, "/product/1", html(product_page("A1"))).await;
    mount(&shop_b, "/", html(link_page("B", &["/p/xyz", "/cart"]))).await;
    mount(&shop_b, "/p/xyz", html(product_page("B1"))).await;
    mount(&shop_b, "/cart", html(link_page("Cart", &[]))).await;

    let output = tempfile::tempdir().unwrap();
    let service = CrawlService::new(create_test_config(output.path())).unwrap();

    let (id, snapshot) =
        run_job(&service, JobRequest::new([shop_a.uri(), shop_b.uri()])).await;

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.domains.len(), 2);

    let results = service.results(id).unwrap();
    assert_eq!(results.len(), 2);
    for (domain, urls) in &results {
        assert_eq!(urls.len(), 1, "domain {}", domain);
        assert!(urls.iter().all(|u| u.contains(domain.as_str())));
    }
}
