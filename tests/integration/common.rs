//! Shared fixtures for integration tests

use linkharvest::config::{Config, CrawlerConfig, StorageConfig, UserAgentConfig};
use linkharvest::crawler::traverser_from_config;
use linkharvest::storage::{shared, SqliteStorage, TaskRecord};
use linkharvest::{CrawlService, TaskStatus};
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration storing artifacts under `download_dir`
pub fn create_test_config(download_dir: &Path) -> Config {
    Config {
        crawler: CrawlerConfig {
            request_timeout_secs: 5,
            max_concurrent_crawls: 4,
            default_depth: 1,
            default_max_links: 100,
            excluded_extensions: vec![".js".to_string(), ".css".to_string()],
            heartbeat_interval_secs: 1,
            stale_task_secs: 60,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        storage: StorageConfig {
            database_path: ":memory:".to_string(),
            download_dir: download_dir.to_string_lossy().to_string(),
        },
    }
}

/// Builds a service over an in-memory database
pub fn create_service(download_dir: &Path) -> CrawlService {
    create_service_with(&create_test_config(download_dir))
}

/// Builds a service over an in-memory database with a custom configuration
pub fn create_service_with(config: &Config) -> CrawlService {
    let storage = shared(SqliteStorage::open_in_memory().expect("in-memory database"));
    let traverser = traverser_from_config(config).expect("traverser");
    CrawlService::new(storage, traverser, &config.crawler)
}

/// Serves an HTML page at `route`
pub async fn mount_html(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

/// Serves an HTML page at `route` after a delay
pub async fn mount_slow_html(server: &MockServer, route: &str, body: &str, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(body)
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Fails the test if `route` is ever requested
pub async fn forbid(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(server)
        .await;
}

/// Polls until the task reaches `status`
pub async fn wait_for_status(service: &CrawlService, task_id: i64, status: TaskStatus) -> TaskRecord {
    for _ in 0..500 {
        let task = service.get_task(task_id).expect("task exists");
        if task.status == status {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {} never reached {}", task_id, status);
}

/// Polls until the task reaches any terminal status
pub async fn wait_for_terminal(service: &CrawlService, task_id: i64) -> TaskRecord {
    for _ in 0..500 {
        let task = service.get_task(task_id).expect("task exists");
        if task.status.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {} never finished", task_id);
}
