use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

use internship_api::db;
use internship_api::services::email::Mailer;
use internship_api::tasks::{self, email, reports, Task, TaskQueue};

async fn setup() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().expect("tempdir");
    let url = format!("sqlite://{}/test.db", dir.path().display());
    let pool = db::init_pool(&url).await.expect("pool");
    (dir, pool)
}

async fn insert_user(pool: &SqlitePool, username: &str, email: &str, is_staff: bool) -> String {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO users (id, username, email, password, is_staff, date_joined)
         VALUES (?, ?, ?, 'x', ?, ?)",
    )
    .bind(&id)
    .bind(username)
    .bind(email)
    .bind(is_staff as i64)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn insert_log(
    pool: &SqlitePool,
    endpoint: &str,
    user_id: Option<&str>,
    status: i64,
    response_time: f64,
    timestamp: chrono::DateTime<chrono::Utc>,
) {
    sqlx::query(
        "INSERT INTO api_logs (id, endpoint, method, user_id, ip_address, timestamp, response_status, response_time)
         VALUES (?, ?, 'GET', ?, '127.0.0.1', ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(endpoint)
    .bind(user_id)
    .bind(timestamp.to_rfc3339())
    .bind(status)
    .bind(response_time)
    .execute(pool)
    .await
    .unwrap();
}

#[actix_web::test]
async fn cleanup_deletes_only_logs_older_than_30_days() {
    let (_dir, pool) = setup().await;
    let now = chrono::Utc::now();

    insert_log(&pool, "/api/old", None, 200, 0.1, now - chrono::Duration::days(40)).await;
    insert_log(&pool, "/api/borderline", None, 200, 0.1, now - chrono::Duration::days(29)).await;
    insert_log(&pool, "/api/new", None, 200, 0.1, now).await;

    let summary = reports::cleanup_old_logs(&pool).await.unwrap();
    assert_eq!(summary, "Cleaned up 1 old API logs");

    let endpoints: Vec<String> = sqlx::query_scalar("SELECT endpoint FROM api_logs ORDER BY endpoint")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(endpoints, vec!["/api/borderline", "/api/new"]);
}

#[actix_web::test]
async fn welcome_email_for_unknown_user_is_reported_not_failed() {
    let (_dir, pool) = setup().await;
    let mailer = Mailer::disabled();

    let summary = email::send_welcome_email(&pool, &mailer, "missing-id").await.unwrap();
    assert!(summary.contains("not found"));
}

#[actix_web::test]
async fn welcome_email_mentions_recipient() {
    let (_dir, pool) = setup().await;
    let mailer = Mailer::disabled();
    let user_id = insert_user(&pool, "nina", "nina@example.com", false).await;

    let summary = email::send_welcome_email(&pool, &mailer, &user_id).await.unwrap();
    assert_eq!(summary, "Welcome email sent to nina@example.com");
}

#[actix_web::test]
async fn admin_notification_without_staff_users() {
    let (_dir, pool) = setup().await;
    let mailer = Mailer::disabled();
    insert_user(&pool, "plain", "plain@example.com", false).await;

    let summary = email::send_admin_notification(&pool, &mailer, "Subject", "Body")
        .await
        .unwrap();
    assert_eq!(summary, "No admin users found");
}

#[actix_web::test]
async fn admin_notification_reaches_all_staff() {
    let (_dir, pool) = setup().await;
    let mailer = Mailer::disabled();
    insert_user(&pool, "admin1", "a1@example.com", true).await;
    insert_user(&pool, "admin2", "a2@example.com", true).await;
    insert_user(&pool, "user", "u@example.com", false).await;

    let summary = email::send_admin_notification(&pool, &mailer, "Subject", "Body")
        .await
        .unwrap();
    assert_eq!(summary, "Admin notification sent to 2 admins");
}

#[actix_web::test]
async fn bulk_notification_retries_failed_recipients() {
    std::env::set_var("BULK_RETRY_DELAY_SECS", "0");
    let (_dir, pool) = setup().await;
    let mailer = Mailer::disabled();
    let (queue, mut rx) = TaskQueue::new();

    let good = insert_user(&pool, "good", "good@example.com", false).await;
    let ids = vec![good, "missing-user".to_string()];

    let summary =
        email::send_bulk_notifications(&pool, &mailer, &queue, &ids, "Hi", "Body", 0)
            .await
            .unwrap();
    assert_eq!(summary, "Bulk notification completed: sent 1, failed 1");

    // the retry is enqueued from a spawned timer
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    match rx.try_recv() {
        Ok(Task::SendBulkNotifications { user_ids, retries, .. }) => {
            assert_eq!(user_ids, vec!["missing-user".to_string()]);
            assert_eq!(retries, 1);
        }
        other => panic!("expected retry task, got {:?}", other),
    }
}

#[actix_web::test]
async fn bulk_notification_stops_retrying_after_max_attempts() {
    std::env::set_var("BULK_RETRY_DELAY_SECS", "0");
    let (_dir, pool) = setup().await;
    let mailer = Mailer::disabled();
    let (queue, mut rx) = TaskQueue::new();

    let ids = vec!["missing-user".to_string()];
    let summary = email::send_bulk_notifications(
        &pool,
        &mailer,
        &queue,
        &ids,
        "Hi",
        "Body",
        email::BULK_MAX_RETRIES,
    )
    .await
    .unwrap();
    assert_eq!(summary, "Bulk notification completed: sent 0, failed 1");

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err(), "no retry expected past the limit");
}

#[actix_web::test]
async fn bulk_notification_counts_lookup_errors_as_failures() {
    std::env::set_var("BULK_RETRY_DELAY_SECS", "0");
    let (_dir, pool) = setup().await;
    let mailer = Mailer::disabled();
    let (queue, mut rx) = TaskQueue::new();

    // break recipient lookups entirely
    sqlx::query("DROP TABLE users").execute(&pool).await.unwrap();

    let ids = vec!["u1".to_string(), "u2".to_string()];
    let summary =
        email::send_bulk_notifications(&pool, &mailer, &queue, &ids, "Hi", "Body", 0)
            .await
            .unwrap();
    assert_eq!(summary, "Bulk notification completed: sent 0, failed 2");

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    match rx.try_recv() {
        Ok(Task::SendBulkNotifications { user_ids, retries, .. }) => {
            assert_eq!(user_ids, ids);
            assert_eq!(retries, 1);
        }
        other => panic!("expected retry task, got {:?}", other),
    }
}

#[actix_web::test]
async fn daily_report_aggregates_and_stores_workbook() {
    let (_dir, pool) = setup().await;
    let (queue, mut rx) = TaskQueue::new();
    let now = chrono::Utc::now();

    let user = insert_user(&pool, "reporter", "r@example.com", false).await;
    insert_log(&pool, "/api/public", None, 200, 0.05, now).await;
    insert_log(&pool, "/api/public", Some(&user), 200, 0.15, now).await;
    insert_log(&pool, "/api/protected", Some(&user), 401, 0.02, now).await;

    let summary = reports::generate_daily_report(&pool, &queue).await.unwrap();
    assert!(summary.contains("3 requests"));
    assert!(summary.contains("2 ok"));
    assert!(summary.contains("1 failed"));

    let (filename, size): (String, i64) =
        sqlx::query_as("SELECT filename, size FROM files LIMIT 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(filename.starts_with("daily-report-"));
    assert!(filename.ends_with(".xlsx"));
    assert!(size > 0);

    match rx.try_recv() {
        Ok(Task::SendAdminNotification { subject, .. }) => {
            assert!(subject.starts_with("Daily API report"));
        }
        other => panic!("expected admin notification, got {:?}", other),
    }
}

#[actix_web::test]
async fn analytics_summarizes_week_window() {
    let (_dir, pool) = setup().await;
    let now = chrono::Utc::now();

    let user = insert_user(&pool, "active", "a@example.com", false).await;
    insert_log(&pool, "/api/slow", Some(&user), 200, 2.0, now - chrono::Duration::days(1)).await;
    insert_log(&pool, "/api/fast", Some(&user), 500, 0.01, now).await;
    // outside the window, must be ignored
    insert_log(&pool, "/api/ancient", None, 200, 9.0, now - chrono::Duration::days(10)).await;

    let summary = reports::process_api_analytics(&pool).await.unwrap();
    assert!(summary.contains("2 requests"));
    assert!(summary.contains("error rate 50.0%"));
    assert!(summary.contains("active (2 requests)"));
    assert!(summary.contains("/api/slow"));
}

#[actix_web::test]
async fn worker_runs_enqueued_tasks() {
    let (_dir, pool) = setup().await;
    let (queue, rx) = TaskQueue::new();
    let now = chrono::Utc::now();
    insert_log(&pool, "/api/old", None, 200, 0.1, now - chrono::Duration::days(40)).await;

    // the worker keeps its own queue handle for retries, so the channel
    // never closes; poll for the effect instead of joining the worker
    let handle = tasks::spawn_worker(pool.clone(), Mailer::disabled(), queue.clone(), rx);
    queue.enqueue(Task::CleanupOldLogs);

    let mut count: i64 = 1;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        count = sqlx::query_scalar("SELECT COUNT(*) FROM api_logs")
            .fetch_one(&pool)
            .await
            .unwrap();
        if count == 0 {
            break;
        }
    }
    handle.abort();
    assert_eq!(count, 0);
}
