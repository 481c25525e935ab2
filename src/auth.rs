use actix_web::http::header::HeaderMap;
use actix_web::{HttpRequest, HttpResponse};
use serde_json::json;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Extract the key from an `Authorization: Token <key>` header.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("Authorization")?.to_str().ok()?;
    let key = value.strip_prefix("Token ")?.trim();
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

pub async fn user_id_for_token(pool: &SqlitePool, token: &str) -> Option<String> {
    sqlx::query_scalar::<_, String>("SELECT user_id FROM auth_tokens WHERE token = ? LIMIT 1")
        .bind(token)
        .fetch_optional(pool)
        .await
        .ok()
        .flatten()
}

pub async fn authenticate(req: &HttpRequest, pool: &SqlitePool) -> Option<AuthUser> {
    let token = token_from_headers(req.headers())?;

    let row = sqlx::query(
        "SELECT u.id, u.username, u.email, u.is_staff, u.is_superuser
         FROM auth_tokens t
         JOIN users u ON u.id = t.user_id
         WHERE t.token = ?
         LIMIT 1",
    )
    .bind(&token)
    .fetch_optional(pool)
    .await
    .ok()??;

    Some(AuthUser {
        id: row.get::<String, _>("id"),
        username: row.get::<String, _>("username"),
        email: row.get::<String, _>("email"),
        is_staff: row.get::<i64, _>("is_staff") != 0,
        is_superuser: row.get::<i64, _>("is_superuser") != 0,
    })
}

/// Return the user's existing token or mint a new one.
pub async fn get_or_create_token(pool: &SqlitePool, user_id: &str) -> Result<String, sqlx::Error> {
    if let Some(token) =
        sqlx::query_scalar::<_, String>("SELECT token FROM auth_tokens WHERE user_id = ? LIMIT 1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?
    {
        return Ok(token);
    }

    let token = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO auth_tokens (token, user_id, created_at) VALUES (?, ?, ?)")
        .bind(&token)
        .bind(user_id)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(pool)
        .await?;

    Ok(token)
}

pub fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({
        "error": "Authentication token missing or invalid"
    }))
}

pub fn forbidden() -> HttpResponse {
    HttpResponse::Forbidden().json(json!({
        "error": "Admin privileges required"
    }))
}
