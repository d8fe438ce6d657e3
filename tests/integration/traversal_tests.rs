//! End-to-end traversal scenarios: depth bounds, classification,
//! incremental exclusion and repeat crawls

use crate::common::{create_service, forbid, mount_html, wait_for_terminal};
use linkharvest::storage::{with_storage, CrawlStrategy, LinkType};
use linkharvest::{ManualCrawlRequest, TaskStatus};
use std::collections::HashSet;
use tempfile::TempDir;
use wiremock::MockServer;

fn manual(website_id: i64, strategy: CrawlStrategy) -> ManualCrawlRequest {
    ManualCrawlRequest {
        website_id,
        strategy,
        depth: None,
        max_links: None,
    }
}

#[tokio::test]
async fn test_zero_depth_crawl_fetches_nothing() {
    let server = MockServer::start().await;
    forbid(&server, "/").await;

    let downloads = TempDir::new().unwrap();
    let service = create_service(downloads.path());
    let website_id = service
        .register_website(&format!("{}/", server.uri()), Some(0), None)
        .unwrap();

    let task_id = service
        .start_manual_crawl(manual(website_id, CrawlStrategy::Full))
        .unwrap();
    let task = wait_for_terminal(&service, task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.statistics.total_links, 0);
    assert!(service.website_links(website_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_depth_one_classifies_direct_links() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_html(
        &server,
        "/",
        r#"<a href="/a">A</a> <a href="/b">B</a> <a href="http://127.0.0.1:1/c">C</a>"#,
    )
    .await;
    mount_html(&server, "/a", r#"<a href="/a-child">deeper</a>"#).await;
    mount_html(&server, "/b", "plain page").await;
    forbid(&server, "/a-child").await;

    let downloads = TempDir::new().unwrap();
    let service = create_service(downloads.path());
    let website_id = service
        .register_website(&format!("{}/", base), Some(1), None)
        .unwrap();

    let task_id = service
        .start_manual_crawl(manual(website_id, CrawlStrategy::Full))
        .unwrap();
    let task = wait_for_terminal(&service, task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.statistics.total_links, 3);
    assert_eq!(task.statistics.valid_links, 2);
    assert_eq!(task.statistics.invalid_links, 1);
    assert_eq!(task.statistics.new_links, 3);

    let links = service.website_links(website_id).unwrap();
    let by_url = |url: &str| links.iter().find(|l| l.url == url).unwrap();
    assert_eq!(by_url(&format!("{}/a", base)).link_type, LinkType::Valid);
    assert_eq!(by_url(&format!("{}/b", base)).link_type, LinkType::Valid);
    let c = by_url("http://127.0.0.1:1/c");
    assert_eq!(c.link_type, LinkType::Invalid);
    assert_eq!(c.status_code, None);
    assert!(links.iter().all(|l| l.task_id == Some(task_id)));
}

#[tokio::test]
async fn test_valid_links_leave_artifacts_on_disk() {
    let server = MockServer::start().await;
    mount_html(&server, "/", r#"<a href="/doc">doc</a>"#).await;
    mount_html(&server, "/doc", "artifact body").await;

    let downloads = TempDir::new().unwrap();
    let service = create_service(downloads.path());
    let website_id = service
        .register_website(&format!("{}/", server.uri()), Some(1), None)
        .unwrap();

    let task_id = service
        .start_manual_crawl(manual(website_id, CrawlStrategy::Full))
        .unwrap();
    wait_for_terminal(&service, task_id).await;

    let crawl_dirs: Vec<_> = std::fs::read_dir(downloads.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(crawl_dirs.len(), 1);
    assert!(crawl_dirs[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("127.0.0.1"));

    let files: Vec<_> = std::fs::read_dir(&crawl_dirs[0]).unwrap().collect();
    assert_eq!(files.len(), 1);
    let content = std::fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
    assert_eq!(content, "artifact body");
}

#[tokio::test]
async fn test_incremental_crawl_skips_known_urls() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_html(&server, "/", r#"<a href="/a">A</a>"#).await;
    mount_html(&server, "/a", "a").await;

    let downloads = TempDir::new().unwrap();
    let service = create_service(downloads.path());
    let website_id = service
        .register_website(&format!("{}/", base), Some(1), None)
        .unwrap();

    let first = service
        .start_manual_crawl(manual(website_id, CrawlStrategy::Incremental))
        .unwrap();
    wait_for_terminal(&service, first).await;
    let known_a = with_storage(service.storage(), |s| {
        s.get_link(website_id, &format!("{}/a", base))
    })
    .unwrap()
    .unwrap();

    // The start page now also links to B; A must not be requested again
    server.reset().await;
    mount_html(&server, "/", r#"<a href="/a">A</a><a href="/b">B</a>"#).await;
    mount_html(&server, "/b", "b").await;
    forbid(&server, "/a").await;

    let second = service
        .start_manual_crawl(manual(website_id, CrawlStrategy::Incremental))
        .unwrap();
    let task = wait_for_terminal(&service, second).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.statistics.total_links, 1);
    assert_eq!(task.statistics.new_links, 1);

    let b = with_storage(service.storage(), |s| {
        s.get_link(website_id, &format!("{}/b", base))
    })
    .unwrap()
    .unwrap();
    assert_eq!(b.task_id, Some(second));

    let a_after = with_storage(service.storage(), |s| {
        s.get_link(website_id, &format!("{}/a", base))
    })
    .unwrap()
    .unwrap();
    assert_eq!(a_after.first_crawled_at, known_a.first_crawled_at);
    assert_eq!(a_after.last_crawled_at, known_a.last_crawled_at);
    assert_eq!(a_after.crawl_count, 1);
}

#[tokio::test]
async fn test_repeat_full_crawl_refreshes_without_duplicating() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_html(
        &server,
        "/",
        r#"<a href="/a">A</a><a href="/b">B</a><img src="/logo.png"><script src="/app.js"></script>"#,
    )
    .await;
    mount_html(&server, "/a", r#"<a href="/a/1">one</a>"#).await;
    mount_html(&server, "/b", "b").await;
    mount_html(&server, "/a/1", "leaf").await;
    mount_html(&server, "/logo.png", "png").await;

    let downloads = TempDir::new().unwrap();
    let service = create_service(downloads.path());
    let website_id = service
        .register_website(&format!("{}/", base), Some(2), None)
        .unwrap();

    let first = service
        .start_manual_crawl(manual(website_id, CrawlStrategy::Full))
        .unwrap();
    let first_task = wait_for_terminal(&service, first).await;
    let first_links = service.website_links(website_id).unwrap();

    let second = service
        .start_manual_crawl(manual(website_id, CrawlStrategy::Full))
        .unwrap();
    let second_task = wait_for_terminal(&service, second).await;
    let second_links = service.website_links(website_id).unwrap();

    let urls = |links: &[linkharvest::storage::LinkRecord]| -> HashSet<String> {
        links.iter().map(|l| l.url.clone()).collect()
    };
    assert_eq!(urls(&first_links), urls(&second_links));
    assert_eq!(first_links.len(), 4);
    assert!(!urls(&first_links).contains(&format!("{}/app.js", base)));

    assert_eq!(first_task.statistics.new_links, 4);
    assert_eq!(second_task.statistics.total_links, 4);
    assert_eq!(second_task.statistics.new_links, 0);

    for link in &second_links {
        let before = first_links.iter().find(|l| l.url == link.url).unwrap();
        assert_eq!(link.crawl_count, 2);
        assert_eq!(link.first_crawled_at, before.first_crawled_at);
        assert!(link.last_crawled_at >= before.last_crawled_at);
    }
}

#[tokio::test]
async fn test_request_overrides_website_limits() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/",
        r#"<a href="/1">1</a><a href="/2">2</a><a href="/3">3</a>"#,
    )
    .await;
    for route in ["/1", "/2", "/3"] {
        mount_html(&server, route, "leaf").await;
    }

    let downloads = TempDir::new().unwrap();
    let service = create_service(downloads.path());
    let website_id = service
        .register_website(&format!("{}/", server.uri()), Some(0), Some(100))
        .unwrap();

    let task_id = service
        .start_manual_crawl(ManualCrawlRequest {
            website_id,
            strategy: CrawlStrategy::Full,
            depth: Some(1),
            max_links: Some(2),
        })
        .unwrap();
    let task = wait_for_terminal(&service, task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.statistics.total_links, 2);
    assert_eq!(service.website_links(website_id).unwrap().len(), 2);
}
