use rust_xlsxwriter::Workbook;
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::tasks::{Task, TaskError, TaskQueue};

const LOG_RETENTION_DAYS: i64 = 30;

/// Delete api_logs rows older than the retention window.
pub async fn cleanup_old_logs(pool: &SqlitePool) -> Result<String, TaskError> {
    let cutoff = (chrono::Utc::now() - chrono::Duration::days(LOG_RETENTION_DAYS)).to_rfc3339();

    let result = sqlx::query("DELETE FROM api_logs WHERE datetime(timestamp) < datetime(?)")
        .bind(&cutoff)
        .execute(pool)
        .await?;

    Ok(format!("Cleaned up {} old API logs", result.rows_affected()))
}

struct DayStats {
    total: i64,
    successful: i64,
    failed: i64,
    unique_users: i64,
    unique_ips: i64,
    avg_response_time: f64,
    top_endpoints: Vec<(String, i64)>,
}

async fn collect_day_stats(pool: &SqlitePool) -> Result<DayStats, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN response_status < 400 THEN 1 ELSE 0 END), 0) AS successful,
                COUNT(DISTINCT user_id) AS unique_users,
                COUNT(DISTINCT ip_address) AS unique_ips,
                COALESCE(AVG(response_time), 0.0) AS avg_time
         FROM api_logs
         WHERE date(timestamp) = date('now')",
    )
    .fetch_one(pool)
    .await?;

    let total = row.get::<i64, _>("total");
    let successful = row.get::<i64, _>("successful");

    let top_endpoints = sqlx::query(
        "SELECT endpoint, COUNT(*) AS hits
         FROM api_logs
         WHERE date(timestamp) = date('now')
         GROUP BY endpoint
         ORDER BY hits DESC
         LIMIT 5",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|r| (r.get::<String, _>("endpoint"), r.get::<i64, _>("hits")))
    .collect();

    Ok(DayStats {
        total,
        successful,
        failed: total - successful,
        unique_users: row.get::<i64, _>("unique_users"),
        unique_ips: row.get::<i64, _>("unique_ips"),
        avg_response_time: row.get::<f64, _>("avg_time"),
        top_endpoints,
    })
}

/// Aggregate today's traffic, store an xlsx workbook in the files table and
/// notify staff with the summary.
pub async fn generate_daily_report(
    pool: &SqlitePool,
    queue: &TaskQueue,
) -> Result<String, TaskError> {
    let stats = collect_day_stats(pool).await?;
    let date = chrono::Utc::now().date_naive().to_string();

    let success_rate = if stats.total > 0 {
        format!("{:.1}%", stats.successful as f64 / stats.total as f64 * 100.0)
    } else {
        "0%".to_string()
    };

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.write_string(0, 0, "Daily API Report")?;
    worksheet.write_string(0, 1, &date)?;
    worksheet.write_string(2, 0, "Total requests")?;
    worksheet.write_number(2, 1, stats.total as f64)?;
    worksheet.write_string(3, 0, "Successful requests")?;
    worksheet.write_number(3, 1, stats.successful as f64)?;
    worksheet.write_string(4, 0, "Failed requests")?;
    worksheet.write_number(4, 1, stats.failed as f64)?;
    worksheet.write_string(5, 0, "Success rate")?;
    worksheet.write_string(5, 1, &success_rate)?;
    worksheet.write_string(6, 0, "Unique users")?;
    worksheet.write_number(6, 1, stats.unique_users as f64)?;
    worksheet.write_string(7, 0, "Unique IPs")?;
    worksheet.write_number(7, 1, stats.unique_ips as f64)?;
    worksheet.write_string(8, 0, "Avg response time (s)")?;
    worksheet.write_number(8, 1, stats.avg_response_time)?;

    worksheet.write_string(10, 0, "Top endpoints")?;
    for (i, (endpoint, hits)) in stats.top_endpoints.iter().enumerate() {
        let row = 11 + i as u32;
        worksheet.write_string(row, 0, endpoint)?;
        worksheet.write_number(row, 1, *hits as f64)?;
    }

    let bytes = workbook.save_to_buffer()?;

    let file_id = Uuid::new_v4().to_string();
    let filename = format!("daily-report-{}.xlsx", date);
    sqlx::query(
        "INSERT INTO files (id, filename, mime, size, bytes, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&file_id)
    .bind(&filename)
    .bind("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
    .bind(bytes.len() as i64)
    .bind(&bytes)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    let summary = format!(
        "Daily report for {}: {} requests ({} ok, {} failed, {} success rate), \
         {} unique users, {} unique IPs, avg response time {:.3}s. \
         Workbook stored at /api/files/{}",
        date,
        stats.total,
        stats.successful,
        stats.failed,
        success_rate,
        stats.unique_users,
        stats.unique_ips,
        stats.avg_response_time,
        file_id,
    );

    queue.enqueue(Task::SendAdminNotification {
        subject: format!("Daily API report {}", date),
        message: summary.clone(),
    });

    Ok(summary)
}

/// Weekly-window usage analytics; the result is informational and logged.
pub async fn process_api_analytics(pool: &SqlitePool) -> Result<String, TaskError> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total,
                COUNT(DISTINCT user_id) AS unique_users,
                COALESCE(AVG(response_time), 0.0) AS avg_time,
                COALESCE(SUM(CASE WHEN response_status >= 400 THEN 1 ELSE 0 END), 0) AS errors
         FROM api_logs
         WHERE datetime(timestamp) >= datetime('now', '-7 days')",
    )
    .fetch_one(pool)
    .await?;

    let total = row.get::<i64, _>("total");
    let errors = row.get::<i64, _>("errors");
    let error_rate = if total > 0 {
        errors as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let most_active = sqlx::query(
        "SELECT u.username, COUNT(*) AS hits
         FROM api_logs l
         JOIN users u ON u.id = l.user_id
         WHERE datetime(l.timestamp) >= datetime('now', '-7 days')
         GROUP BY l.user_id
         ORDER BY hits DESC
         LIMIT 1",
    )
    .fetch_optional(pool)
    .await?
    .map(|r| format!("{} ({} requests)", r.get::<String, _>("username"), r.get::<i64, _>("hits")));

    let slowest = sqlx::query(
        "SELECT endpoint, AVG(response_time) AS avg_time
         FROM api_logs
         WHERE datetime(timestamp) >= datetime('now', '-7 days')
         GROUP BY endpoint
         ORDER BY avg_time DESC
         LIMIT 1",
    )
    .fetch_optional(pool)
    .await?
    .map(|r| format!("{} ({:.3}s avg)", r.get::<String, _>("endpoint"), r.get::<f64, _>("avg_time")));

    let summary = format!(
        "7-day analytics: {} requests, {} unique users, avg response time {:.3}s, \
         error rate {:.1}%, most active user: {}, slowest endpoint: {}",
        total,
        row.get::<i64, _>("unique_users"),
        row.get::<f64, _>("avg_time"),
        error_rate,
        most_active.as_deref().unwrap_or("none"),
        slowest.as_deref().unwrap_or("none"),
    );

    info!(%summary, "api analytics processed");
    Ok(summary)
}
