use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::auth;
use crate::state::AppState;
use crate::tasks::Task;

#[derive(Debug, Deserialize)]
pub struct BulkNotifyRequest {
    pub user_ids: Vec<String>,
    pub subject: String,
    pub message: String,
}

/// Queue a bulk notification run. Staff only; delivery happens in the worker.
pub async fn bulk_notify(
    req: HttpRequest,
    data: web::Json<BulkNotifyRequest>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let user = match auth::authenticate(&req, &state.pool).await {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    if !user.is_staff {
        return auth::forbidden();
    }

    let body = data.into_inner();
    if body.user_ids.is_empty() {
        return HttpResponse::BadRequest().json(json!({"error": "user_ids must not be empty"}));
    }

    let user_count = body.user_ids.len();
    state.tasks.enqueue(Task::SendBulkNotifications {
        user_ids: body.user_ids,
        subject: body.subject,
        message: body.message,
        retries: 0,
    });

    HttpResponse::Accepted().json(json!({
        "message": "Bulk notification queued",
        "user_count": user_count
    }))
}
