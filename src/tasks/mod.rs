pub mod email;
pub mod reports;
pub mod scheduler;

use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::services::email::{MailError, Mailer};

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("mail error: {0}")]
    Mail(#[from] MailError),

    #[error("report error: {0}")]
    Report(#[from] rust_xlsxwriter::XlsxError),
}

/// Background work unit. Enqueued from the web tier (or the scheduler) and
/// executed by the worker loop; the queue is the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    SendWelcomeEmail { user_id: String },
    SendNotificationEmail { user_id: String, subject: String, message: String },
    SendPasswordResetEmail { user_id: String, reset_link: String },
    SendAdminNotification { subject: String, message: String },
    SendBulkNotifications { user_ids: Vec<String>, subject: String, message: String, retries: u32 },
    CleanupOldLogs,
    GenerateDailyReport,
    ProcessApiAnalytics,
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::SendWelcomeEmail { .. } => "send_welcome_email",
            Task::SendNotificationEmail { .. } => "send_notification_email",
            Task::SendPasswordResetEmail { .. } => "send_password_reset_email",
            Task::SendAdminNotification { .. } => "send_admin_notification",
            Task::SendBulkNotifications { .. } => "send_bulk_notifications",
            Task::CleanupOldLogs => "cleanup_old_logs",
            Task::GenerateDailyReport => "generate_daily_report",
            Task::ProcessApiAnalytics => "process_api_analytics",
        }
    }
}

#[derive(Clone)]
pub struct TaskQueue {
    sender: UnboundedSender<Task>,
}

impl TaskQueue {
    pub fn new() -> (Self, UnboundedReceiver<Task>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (TaskQueue { sender }, receiver)
    }

    pub fn enqueue(&self, task: Task) {
        let name = task.name();
        if self.sender.send(task).is_err() {
            warn!(task = name, "task queue closed, task dropped");
        }
    }
}

/// Run the worker loop until the queue closes. Task failures are logged and
/// never take the worker down.
pub fn spawn_worker(
    pool: SqlitePool,
    mailer: Mailer,
    queue: TaskQueue,
    mut receiver: UnboundedReceiver<Task>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("task worker started");
        while let Some(task) = receiver.recv().await {
            let name = task.name();
            match run_task(&pool, &mailer, &queue, task).await {
                Ok(summary) => info!(task = name, %summary, "task completed"),
                Err(e) => error!(task = name, error = %e, "task failed"),
            }
        }
        info!("task worker stopped");
    })
}

pub async fn run_task(
    pool: &SqlitePool,
    mailer: &Mailer,
    queue: &TaskQueue,
    task: Task,
) -> Result<String, TaskError> {
    match task {
        Task::SendWelcomeEmail { user_id } => email::send_welcome_email(pool, mailer, &user_id).await,
        Task::SendNotificationEmail { user_id, subject, message } => {
            email::send_notification_email(pool, mailer, &user_id, &subject, &message).await
        }
        Task::SendPasswordResetEmail { user_id, reset_link } => {
            email::send_password_reset_email(pool, mailer, &user_id, &reset_link).await
        }
        Task::SendAdminNotification { subject, message } => {
            email::send_admin_notification(pool, mailer, &subject, &message).await
        }
        Task::SendBulkNotifications { user_ids, subject, message, retries } => {
            email::send_bulk_notifications(pool, mailer, queue, &user_ids, &subject, &message, retries)
                .await
        }
        Task::CleanupOldLogs => reports::cleanup_old_logs(pool).await,
        Task::GenerateDailyReport => reports::generate_daily_report(pool, queue).await,
        Task::ProcessApiAnalytics => reports::process_api_analytics(pool).await,
    }
}
