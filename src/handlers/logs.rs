use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use sqlx::Row;

use crate::auth;
use crate::models::ApiLogEntry;
use crate::state::AppState;

/// Latest 100 log rows, newest first. Staff only.
pub async fn list_logs(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let user = match auth::authenticate(&req, &state.pool).await {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    if !user.is_staff {
        return auth::forbidden();
    }

    let rows = sqlx::query(
        "SELECT l.id, l.endpoint, l.method, l.user_id, u.username AS user_username,
                l.ip_address, l.timestamp, l.response_status, l.response_time
         FROM api_logs l
         LEFT JOIN users u ON u.id = l.user_id
         ORDER BY datetime(l.timestamp) DESC
         LIMIT 100",
    )
    .fetch_all(&state.pool)
    .await;

    match rows {
        Ok(rs) => {
            let entries: Vec<ApiLogEntry> = rs
                .into_iter()
                .map(|r| ApiLogEntry {
                    id: r.get::<String, _>("id"),
                    endpoint: r.get::<String, _>("endpoint"),
                    method: r.get::<String, _>("method"),
                    user_id: r.try_get::<Option<String>, _>("user_id").unwrap_or(None),
                    user_username: r.try_get::<Option<String>, _>("user_username").unwrap_or(None),
                    ip_address: r.get::<String, _>("ip_address"),
                    timestamp: r.get::<String, _>("timestamp"),
                    response_status: r.get::<i64, _>("response_status"),
                    response_time: r.get::<f64, _>("response_time"),
                })
                .collect();
            HttpResponse::Ok().json(entries)
        }
        Err(_) => HttpResponse::InternalServerError().finish(),
    }
}

/// Log rows are append-only for everyone but superusers.
pub async fn delete_log(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let user = match auth::authenticate(&req, &state.pool).await {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    if !user.is_superuser {
        return auth::forbidden();
    }

    let id = path.into_inner();
    let result = sqlx::query("DELETE FROM api_logs WHERE id = ?")
        .bind(&id)
        .execute(&state.pool)
        .await;

    match result {
        Ok(r) if r.rows_affected() > 0 => {
            HttpResponse::Ok().json(json!({"message": "Log entry deleted"}))
        }
        Ok(_) => HttpResponse::NotFound().json(json!({"error": "Log entry not found"})),
        Err(_) => HttpResponse::InternalServerError().finish(),
    }
}
