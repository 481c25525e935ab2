use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use sqlx::{Row, SqlitePool};

use crate::auth::{self, AuthUser};
use crate::models::{ProfileResponse, UpdateProfileRequest};
use crate::state::AppState;

async fn load_or_create_profile(
    pool: &SqlitePool,
    user: &AuthUser,
) -> Result<ProfileResponse, sqlx::Error> {
    let existing = sqlx::query(
        "SELECT telegram_username, telegram_chat_id, phone_number, bio, created_at, updated_at
         FROM user_profiles WHERE user_id = ? LIMIT 1",
    )
    .bind(&user.id)
    .fetch_optional(pool)
    .await?;

    let row = match existing {
        Some(row) => row,
        None => {
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query(
                "INSERT INTO user_profiles (user_id, created_at, updated_at) VALUES (?, ?, ?)",
            )
            .bind(&user.id)
            .bind(&now)
            .bind(&now)
            .execute(pool)
            .await?;

            sqlx::query(
                "SELECT telegram_username, telegram_chat_id, phone_number, bio, created_at, updated_at
                 FROM user_profiles WHERE user_id = ? LIMIT 1",
            )
            .bind(&user.id)
            .fetch_one(pool)
            .await?
        }
    };

    Ok(ProfileResponse {
        user: json!({
            "id": user.id,
            "username": user.username,
            "email": user.email,
        }),
        telegram_username: row.try_get::<Option<String>, _>("telegram_username").unwrap_or(None),
        telegram_chat_id: row.try_get::<Option<String>, _>("telegram_chat_id").unwrap_or(None),
        phone_number: row.try_get::<Option<String>, _>("phone_number").unwrap_or(None),
        bio: row.try_get::<Option<String>, _>("bio").unwrap_or(None),
        created_at: row.get::<String, _>("created_at"),
        updated_at: row.get::<String, _>("updated_at"),
    })
}

pub async fn get_profile(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let user = match auth::authenticate(&req, &state.pool).await {
        Some(user) => user,
        None => return auth::unauthorized(),
    };

    match load_or_create_profile(&state.pool, &user).await {
        Ok(profile) => HttpResponse::Ok().json(profile),
        Err(_) => HttpResponse::InternalServerError().json(json!({"error": "Failed to load profile"})),
    }
}

pub async fn update_profile(
    req: HttpRequest,
    data: web::Json<UpdateProfileRequest>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let user = match auth::authenticate(&req, &state.pool).await {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    let update = data.into_inner();
    let pool = &state.pool;

    // Make sure the row exists before the full-replace update.
    if let Err(_) = load_or_create_profile(pool, &user).await {
        return HttpResponse::InternalServerError().json(json!({"error": "Failed to load profile"}));
    }

    let result = sqlx::query(
        "UPDATE user_profiles
         SET telegram_username = ?, telegram_chat_id = ?, phone_number = ?, bio = ?, updated_at = ?
         WHERE user_id = ?",
    )
    .bind(&update.telegram_username)
    .bind(&update.telegram_chat_id)
    .bind(&update.phone_number)
    .bind(&update.bio)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(&user.id)
    .execute(pool)
    .await;

    if result.is_err() {
        return HttpResponse::InternalServerError()
            .json(json!({"error": "Failed to update profile"}));
    }

    match load_or_create_profile(pool, &user).await {
        Ok(profile) => HttpResponse::Ok().json(profile),
        Err(_) => HttpResponse::InternalServerError().json(json!({"error": "Failed to load profile"})),
    }
}
