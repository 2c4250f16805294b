// Integration tests for the session notification service
// End-to-end: schedule -> fire -> push -> history, and recovery after a restart

use chrono::{Duration as ChronoDuration, Utc};
use common::bootstrap::{init_database_pool, init_notification_service, init_push_client};
use common::config::Settings;
use common::db::repositories::JobRepository;
use common::db::DbPool;
use common::models::{JobId, NewJob, NotificationRecord, ScheduleRequest, TriggerKind};
use common::notifications::NotificationService;
use common::scheduler::Scheduler;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PUSH_PATH: &str = "/--/api/v2/push/send";

/// Helper function to build settings for a database in `dir` and a push server
fn test_settings(dir: &TempDir, push_server: &MockServer) -> Settings {
    let mut settings = Settings::default();
    settings.database.url = format!("sqlite://{}", dir.path().join("notify.db").display());
    settings.push.endpoint = format!("{}{}", push_server.uri(), PUSH_PATH);
    settings.push.timeout_seconds = 5;
    settings.scheduler.poll_interval_ms = 50;
    settings
}

/// Helper function to start the service the same way the server binary does
async fn start_service(settings: &Settings) -> (NotificationService, DbPool) {
    let pool = init_database_pool(settings)
        .await
        .expect("Failed to open database");
    let push = init_push_client(settings).expect("Failed to create push client");
    let service = init_notification_service(settings, pool.clone(), push)
        .await
        .expect("Failed to start notification service");
    (service, pool)
}

async fn mount_push_response(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path(PUSH_PATH))
        .respond_with(
            ResponseTemplate::new(status).set_body_json(json!({ "data": { "status": "ok" } })),
        )
        .mount(server)
        .await;
}

/// Helper function to wait until a user's history holds `expected` records
async fn wait_for_history(
    service: &NotificationService,
    user_id: &str,
    expected: usize,
    timeout_secs: u64,
) -> Result<Vec<NotificationRecord>, String> {
    let start = std::time::Instant::now();
    let timeout = Duration::from_secs(timeout_secs);

    loop {
        let records = service
            .history(user_id)
            .await
            .map_err(|e| format!("History error: {}", e))?;
        if records.len() >= expected {
            return Ok(records);
        }
        if start.elapsed() > timeout {
            return Err(format!(
                "Timeout waiting for {} records for {}, found {}",
                expected,
                user_id,
                records.len()
            ));
        }
        sleep(Duration::from_millis(50)).await;
    }
}

async fn received_push_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or(0)
}

fn request(user_id: &str, session_id: &str, session_at: chrono::DateTime<Utc>) -> ScheduleRequest {
    ScheduleRequest {
        user_id: user_id.to_string(),
        push_target: format!("ExponentPushToken[{}]", user_id),
        session_id: session_id.to_string(),
        session_timestamp: session_at.to_rfc3339(),
    }
}

#[tokio::test]
async fn test_past_due_session_delivers_both_notifications() {
    let dir = tempfile::tempdir().unwrap();
    let push_server = MockServer::start().await;
    mount_push_response(&push_server, 200).await;
    let (service, _pool) = start_service(&test_settings(&dir, &push_server)).await;

    service
        .schedule(&request("u1", "s1", Utc::now() - ChronoDuration::hours(1)))
        .await
        .expect("Past session should still be accepted");

    let records = wait_for_history(&service, "u1", 2, 5).await.unwrap();
    let mut titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
    titles.sort_unstable();
    assert_eq!(titles, vec!["Session Reminder", "Session Starting"]);
    assert!(records.iter().all(|r| r.session_id == "s1" && !r.read));

    let requests = push_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["to"], "ExponentPushToken[u1]");
    assert_eq!(body["sound"], "default");
    assert_eq!(body["data"]["sessionId"], "s1");

    service.scheduler().stop().await;
}

#[tokio::test]
async fn test_push_failure_records_no_history() {
    let dir = tempfile::tempdir().unwrap();
    let push_server = MockServer::start().await;
    mount_push_response(&push_server, 500).await;
    let (service, _pool) = start_service(&test_settings(&dir, &push_server)).await;

    service
        .schedule(&request("u1", "s1", Utc::now() - ChronoDuration::minutes(5)))
        .await
        .unwrap();

    // Wait until both pushes were attempted, then give the dispatcher a moment
    let start = std::time::Instant::now();
    while received_push_count(&push_server).await < 2 {
        assert!(start.elapsed() < Duration::from_secs(5), "Pushes were never attempted");
        sleep(Duration::from_millis(50)).await;
    }
    sleep(Duration::from_millis(200)).await;

    assert!(service.history("u1").await.unwrap().is_empty());
    service.scheduler().stop().await;
}

#[tokio::test]
async fn test_reminder_fires_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let push_server = MockServer::start().await;
    mount_push_response(&push_server, 200).await;
    let (service, _pool) = start_service(&test_settings(&dir, &push_server)).await;

    // Reminder is already due, start fires two seconds from now
    let session_at = Utc::now() + ChronoDuration::seconds(2);
    service
        .schedule(&request("u2", "s2", session_at))
        .await
        .unwrap();

    let first = wait_for_history(&service, "u2", 1, 3).await.unwrap();
    assert_eq!(first[0].title, "Session Reminder");

    let both = wait_for_history(&service, "u2", 2, 6).await.unwrap();
    assert_eq!(both[1].title, "Session Starting");
    assert!(both[1].sent_at >= session_at - ChronoDuration::seconds(1));

    service.scheduler().stop().await;
}

#[tokio::test]
async fn test_jobs_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let push_server = MockServer::start().await;
    mount_push_response(&push_server, 200).await;
    let settings = test_settings(&dir, &push_server);

    // First process: schedule a far-future session, then shut down
    let (first, pool) = start_service(&settings).await;
    let scheduled = first
        .schedule(&request("u3", "s3", Utc::now() + ChronoDuration::days(1)))
        .await
        .unwrap();
    first.scheduler().stop().await;
    pool.close().await;

    // Second process on the same database re-arms both triggers
    let (second, _pool) = start_service(&settings).await;
    assert_eq!(second.scheduler().armed_count().await, 2);

    // Ids handed out after recovery never collide with stored ones
    let next = second
        .schedule(&request("u3", "s4", Utc::now() + ChronoDuration::days(2)))
        .await
        .unwrap();
    assert!(next.reminder.job_id > scheduled.start.job_id);
    assert_eq!(second.scheduler().armed_count().await, 4);

    second.scheduler().stop().await;
}

#[tokio::test]
async fn test_recovered_job_fires_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let push_server = MockServer::start().await;
    mount_push_response(&push_server, 200).await;
    let settings = test_settings(&dir, &push_server);

    // A job stored by an earlier process, due shortly
    let pool = init_database_pool(&settings).await.unwrap();
    let fire_at = Utc::now() + ChronoDuration::seconds(2);
    JobRepository::new(pool.clone())
        .record_job(&NewJob {
            session_id: "s5".to_string(),
            job_id: JobId::new(17),
            kind: TriggerKind::Start,
            user_id: "u5".to_string(),
            push_target: "ExponentPushToken[u5]".to_string(),
            session_timestamp: fire_at,
            fire_at,
        })
        .await
        .unwrap();
    pool.close().await;

    let (service, _pool) = start_service(&settings).await;
    assert_eq!(service.scheduler().armed_count().await, 1);

    let records = wait_for_history(&service, "u5", 1, 6).await.unwrap();
    assert_eq!(records[0].title, "Session Starting");
    assert_eq!(received_push_count(&push_server).await, 1);

    service.scheduler().stop().await;
}

#[tokio::test]
async fn test_recovery_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let push_server = MockServer::start().await;
    let mut settings = test_settings(&dir, &push_server);

    let (first, pool) = start_service(&settings).await;
    let stored = first
        .schedule(&request("u6", "s6", Utc::now() + ChronoDuration::days(1)))
        .await
        .unwrap();
    first.scheduler().stop().await;
    pool.close().await;

    settings.scheduler.recover_on_startup = false;
    let (second, second_pool) = start_service(&settings).await;
    assert_eq!(second.scheduler().armed_count().await, 0);

    // Fresh ids still continue after the stored ones
    let fresh = second
        .schedule(&request("u6", "s7", Utc::now() + ChronoDuration::days(2)))
        .await
        .unwrap();
    assert!(fresh.reminder.job_id > stored.start.job_id);
    assert!(fresh.start.job_id > stored.start.job_id);

    let stored_ids: Vec<JobId> = JobRepository::new(second_pool.clone())
        .find_by_session("s6")
        .await
        .unwrap()
        .iter()
        .map(|job| job.job_id)
        .collect();
    assert!(!stored_ids.contains(&fresh.reminder.job_id));
    assert!(!stored_ids.contains(&fresh.start.job_id));

    second.scheduler().stop().await;
}
