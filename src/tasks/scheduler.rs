use std::env;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::tasks::{Task, TaskQueue};

fn interval_from_env(var: &str, default_secs: u64) -> Duration {
    let secs = env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}

/// Periodic enqueue of maintenance tasks: daily cleanup + report, hourly
/// analytics. Intervals are overridable via env for demo runs.
pub fn spawn(queue: TaskQueue) -> Vec<JoinHandle<()>> {
    let daily = interval_from_env("REPORT_INTERVAL_SECS", 24 * 60 * 60);
    let hourly = interval_from_env("ANALYTICS_INTERVAL_SECS", 60 * 60);
    info!(daily_secs = daily.as_secs(), analytics_secs = hourly.as_secs(), "scheduler started");

    let daily_queue = queue.clone();
    let daily_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(daily);
        // the first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            daily_queue.enqueue(Task::CleanupOldLogs);
            daily_queue.enqueue(Task::GenerateDailyReport);
        }
    });

    let analytics_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(hourly);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            queue.enqueue(Task::ProcessApiAnalytics);
        }
    });

    vec![daily_handle, analytics_handle]
}
