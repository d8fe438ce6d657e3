//! Task lifecycle scenarios: cancellation, concurrent triggers, failures
//! and shutdown

use crate::common::{
    create_service, create_service_with, create_test_config, mount_html, mount_slow_html,
    wait_for_status, wait_for_terminal,
};
use linkharvest::storage::{with_storage, CrawlStrategy, LogLevel, TaskType};
use linkharvest::{
    CrawlService, HarvestError, ManualCrawlRequest, ScheduledCrawlRequest, TaskStatus,
};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

fn full_crawl(website_id: i64) -> ManualCrawlRequest {
    ManualCrawlRequest {
        website_id,
        strategy: CrawlStrategy::Full,
        depth: None,
        max_links: None,
    }
}

async fn slow_site(delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    mount_slow_html(
        &server,
        "/",
        r#"<a href="/a">A</a><a href="/b">B</a>"#,
        delay,
    )
    .await;
    mount_html(&server, "/a", "a").await;
    mount_html(&server, "/b", "b").await;
    server
}

#[tokio::test]
async fn test_cancel_during_traversal_saves_nothing() {
    let server = slow_site(Duration::from_millis(800)).await;
    let downloads = TempDir::new().unwrap();
    let service = create_service(downloads.path());
    let website_id = service
        .register_website(&format!("{}/", server.uri()), Some(1), None)
        .unwrap();

    let task_id = service.start_manual_crawl(full_crawl(website_id)).unwrap();
    wait_for_status(&service, task_id, TaskStatus::Running).await;

    service.cancel_task(task_id).unwrap();
    service.shutdown().await;

    let task = service.get_task(task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(task.finished_at.is_some());
    assert!(service.website_links(website_id).unwrap().is_empty());
    assert!(service.signals().is_empty());

    let warnings = service.task_logs(task_id, Some(LogLevel::Warning)).unwrap();
    assert!(warnings
        .iter()
        .any(|entry| entry.message == "Cancellation requested"));
}

#[tokio::test]
async fn test_cancel_finished_task_is_conflict() {
    let server = slow_site(Duration::ZERO).await;
    let downloads = TempDir::new().unwrap();
    let service = create_service(downloads.path());
    let website_id = service
        .register_website(&format!("{}/", server.uri()), Some(1), None)
        .unwrap();

    let task_id = service.start_manual_crawl(full_crawl(website_id)).unwrap();
    let task = wait_for_terminal(&service, task_id).await;
    assert_eq!(task.status, TaskStatus::Completed);

    let err = service.cancel_task(task_id).unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(
        service.get_task(task_id).unwrap().status,
        TaskStatus::Completed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_triggers_start_one_task() {
    let server = slow_site(Duration::from_millis(500)).await;
    let downloads = TempDir::new().unwrap();
    let service = create_service(downloads.path());
    let website_id = service
        .register_website(&format!("{}/", server.uri()), Some(1), None)
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.start_manual_crawl(full_crawl(website_id))
        }));
    }

    let mut started = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(task_id) => started.push(task_id),
            Err(e) => assert!(
                matches!(e, HarvestError::TaskAlreadyRunning { .. }),
                "unexpected error: {}",
                e
            ),
        }
    }
    assert_eq!(started.len(), 1);

    let active = service
        .list_tasks(Some(website_id))
        .unwrap()
        .into_iter()
        .filter(|task| task.status.is_active())
        .count();
    assert!(active <= 1);

    service.shutdown().await;
    assert_eq!(service.list_tasks(Some(website_id)).unwrap().len(), 1);
}

#[tokio::test]
async fn test_scheduled_trigger_skips_while_manual_task_active() {
    let server = slow_site(Duration::from_millis(500)).await;
    let downloads = TempDir::new().unwrap();
    let service = create_service(downloads.path());
    let website_id = service
        .register_website(&format!("{}/", server.uri()), Some(1), None)
        .unwrap();

    let manual = service.start_manual_crawl(full_crawl(website_id)).unwrap();

    let scheduled = service
        .run_scheduled_crawl(ScheduledCrawlRequest {
            schedule_id: "hourly".to_string(),
            website_id,
            strategy: CrawlStrategy::Incremental,
        })
        .unwrap();
    assert_eq!(scheduled, None);

    wait_for_terminal(&service, manual).await;

    // Once the website is idle the schedule fires normally
    let scheduled = service
        .run_scheduled_crawl(ScheduledCrawlRequest {
            schedule_id: "hourly".to_string(),
            website_id,
            strategy: CrawlStrategy::Incremental,
        })
        .unwrap()
        .expect("scheduled task");
    let task = wait_for_terminal(&service, scheduled).await;

    assert_eq!(task.task_type, TaskType::Scheduled);
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.statistics.total_links, 0);
}

#[tokio::test]
async fn test_manual_trigger_for_missing_website() {
    let downloads = TempDir::new().unwrap();
    let service = create_service(downloads.path());

    let err = service.start_manual_crawl(full_crawl(404)).unwrap_err();

    assert!(err.is_not_found());
    assert!(service.list_tasks(None).unwrap().is_empty());
}

#[tokio::test]
async fn test_unwritable_download_dir_fails_task() {
    let server = slow_site(Duration::ZERO).await;
    let downloads = TempDir::new().unwrap();
    let blocker = downloads.path().join("not-a-directory");
    std::fs::write(&blocker, "file").unwrap();

    let service = create_service(&blocker.join("downloads"));
    let website_id = service
        .register_website(&format!("{}/", server.uri()), Some(1), None)
        .unwrap();

    let task_id = service.start_manual_crawl(full_crawl(website_id)).unwrap();
    let task = wait_for_terminal(&service, task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error_message.is_some());
    assert!(service.website_links(website_id).unwrap().is_empty());

    let errors = service.task_logs(task_id, Some(LogLevel::Error)).unwrap();
    assert_eq!(errors.len(), 1);

    // A failed task frees the website for the next trigger
    service.delete_task(task_id).unwrap();
    assert!(service.list_tasks(Some(website_id)).unwrap().is_empty());
}

#[tokio::test]
async fn test_shutdown_waits_for_workers() {
    let server = slow_site(Duration::from_millis(300)).await;
    let downloads = TempDir::new().unwrap();
    let service = create_service(downloads.path());
    let website_id = service
        .register_website(&format!("{}/", server.uri()), Some(1), None)
        .unwrap();

    let task_id = service.start_manual_crawl(full_crawl(website_id)).unwrap();
    service.shutdown().await;

    let task = service.get_task(task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.statistics.total_links, 2);

    // The pool accepts work again after shutdown returns
    let again = service.start_manual_crawl(full_crawl(website_id)).unwrap();
    service.shutdown().await;
    assert!(service.get_task(again).unwrap().status.is_terminal());
}

#[tokio::test]
async fn test_recovery_fails_orphaned_tasks() {
    let downloads = TempDir::new().unwrap();
    let mut config = create_test_config(downloads.path());
    config.crawler.stale_task_secs = 0;
    let service = create_service_with(&config);
    let website_id = service
        .register_website("https://example.com/", None, None)
        .unwrap();
    let orphan = with_storage(service.storage(), |s| {
        let id = s.insert_task(website_id, CrawlStrategy::Full, TaskType::Manual)?;
        s.update_task_status(id, TaskStatus::Running, None)?;
        Ok(id)
    })
    .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(service.recover_interrupted_tasks().unwrap(), 1);

    let task = service.get_task(orphan).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error_message.is_some());
    assert_eq!(service.recover_interrupted_tasks().unwrap(), 0);
}

#[tokio::test]
async fn test_recovery_in_second_process_spares_live_task() {
    let server = slow_site(Duration::from_millis(800)).await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir.path().join("downloads"));
    config.storage.database_path = dir
        .path()
        .join("harvest.db")
        .to_string_lossy()
        .to_string();

    let first = CrawlService::from_config(&config).unwrap();
    let second = CrawlService::from_config(&config).unwrap();
    let website_id = first
        .register_website(&format!("{}/", server.uri()), Some(1), None)
        .unwrap();

    let task_id = first.start_manual_crawl(full_crawl(website_id)).unwrap();
    wait_for_status(&first, task_id, TaskStatus::Running).await;

    // A crawl starting in another process recovers before it triggers
    assert_eq!(second.recover_interrupted_tasks().unwrap(), 0);
    assert_eq!(second.get_task(task_id).unwrap().status, TaskStatus::Running);
    assert!(matches!(
        second.start_manual_crawl(full_crawl(website_id)),
        Err(HarvestError::TaskAlreadyRunning { .. })
    ));

    first.shutdown().await;

    let task = second.get_task(task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.statistics.total_links, 2);
    assert_eq!(second.website_links(website_id).unwrap().len(), 2);
}

#[tokio::test]
async fn test_cancel_from_second_process_stops_worker() {
    let server = slow_site(Duration::from_millis(800)).await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir.path().join("downloads"));
    config.storage.database_path = dir
        .path()
        .join("harvest.db")
        .to_string_lossy()
        .to_string();

    let worker = CrawlService::from_config(&config).unwrap();
    let controller = CrawlService::from_config(&config).unwrap();
    let website_id = worker
        .register_website(&format!("{}/", server.uri()), Some(1), None)
        .unwrap();

    let task_id = worker.start_manual_crawl(full_crawl(website_id)).unwrap();
    wait_for_status(&worker, task_id, TaskStatus::Running).await;

    controller.cancel_task(task_id).unwrap();
    worker.shutdown().await;

    assert_eq!(
        worker.get_task(task_id).unwrap().status,
        TaskStatus::Cancelled
    );
    assert!(worker.website_links(website_id).unwrap().is_empty());
}
