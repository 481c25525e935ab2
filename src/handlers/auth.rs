use std::collections::BTreeMap;

use actix_web::{web, HttpResponse};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::json;
use sqlx::Row;
use tracing::{error, warn};
use uuid::Uuid;

use crate::auth::get_or_create_token;
use crate::models::{LoginRequest, PasswordResetRequest, RegisterRequest};
use crate::state::AppState;
use crate::tasks::Task;

pub async fn register(
    data: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let req = data.into_inner();
    let pool = &state.pool;

    // Field-keyed validation errors, collected before touching the database.
    let mut errors: BTreeMap<&str, Vec<String>> = BTreeMap::new();

    let username = req.username.unwrap_or_default();
    let email = req.email.unwrap_or_default();
    let password = req.password.unwrap_or_default();
    let password_confirm = req.password_confirm.unwrap_or_default();

    if username.trim().is_empty() {
        errors.entry("username").or_default().push("This field is required".to_string());
    }
    if email.trim().is_empty() {
        errors.entry("email").or_default().push("This field is required".to_string());
    }
    if password.len() < 8 {
        errors
            .entry("password")
            .or_default()
            .push("Password must be at least 8 characters".to_string());
    }
    if password != password_confirm {
        errors.entry("password").or_default().push("Passwords don't match".to_string());
    }

    if errors.is_empty() {
        match sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM users WHERE username = ?")
            .bind(&username)
            .fetch_one(pool)
            .await
        {
            Ok(count) if count > 0 => {
                errors
                    .entry("username")
                    .or_default()
                    .push("A user with that username already exists".to_string());
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "registration lookup failed");
                return HttpResponse::InternalServerError()
                    .json(json!({"error": "Failed to create user"}));
            }
        }
    }

    if !errors.is_empty() {
        return HttpResponse::BadRequest().json(errors);
    }

    let hashed_password = match bcrypt::hash(&password, bcrypt::DEFAULT_COST) {
        Ok(hash) => hash,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(json!({"error": "Password hashing failed"}))
        }
    };

    let user_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    let inserted = sqlx::query(
        "INSERT INTO users (id, username, email, password, first_name, last_name, date_joined) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user_id)
    .bind(&username)
    .bind(&email)
    .bind(&hashed_password)
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&now)
    .execute(pool)
    .await;

    if let Err(e) = inserted {
        error!(error = %e, "failed to create user");
        return HttpResponse::InternalServerError().json(json!({"error": "Failed to create user"}));
    }

    // Profile row is created with the account; a failure here is recoverable
    // since the profile handlers create the row on first access.
    if let Err(e) = sqlx::query(
        "INSERT INTO user_profiles (user_id, created_at, updated_at) VALUES (?, ?, ?)",
    )
    .bind(&user_id)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    {
        warn!(error = %e, "failed to create profile row at registration");
    }

    let token = match get_or_create_token(pool, &user_id).await {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "failed to create auth token");
            return HttpResponse::InternalServerError()
                .json(json!({"error": "Failed to create token"}));
        }
    };

    state.tasks.enqueue(Task::SendWelcomeEmail {
        user_id: user_id.clone(),
    });

    HttpResponse::Created().json(json!({
        "message": "User registered successfully!",
        "user_id": user_id,
        "username": username,
        "token": token,
        "email_sent": "Welcome email will be sent shortly"
    }))
}

pub async fn login(data: web::Json<LoginRequest>, state: web::Data<AppState>) -> HttpResponse {
    let req = data.into_inner();
    let pool = &state.pool;

    let (username, password) = match (req.username, req.password) {
        (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => (u, p),
        _ => {
            return HttpResponse::BadRequest()
                .json(json!({"error": "Username and password are required"}))
        }
    };

    let row = sqlx::query("SELECT id, username, password FROM users WHERE username = ? LIMIT 1")
        .bind(&username)
        .fetch_optional(pool)
        .await;

    let row = match row {
        Ok(Some(r)) => r,
        _ => return HttpResponse::Unauthorized().json(json!({"error": "Invalid credentials"})),
    };

    let user_id = row.get::<String, _>("id");
    let hashed = row.get::<String, _>("password");

    let is_valid = bcrypt::verify(&password, &hashed).unwrap_or(false);
    if !is_valid {
        return HttpResponse::Unauthorized().json(json!({"error": "Invalid credentials"}));
    }

    let token = match get_or_create_token(pool, &user_id).await {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "failed to issue auth token");
            return HttpResponse::InternalServerError()
                .json(json!({"error": "Failed to create token"}));
        }
    };

    HttpResponse::Ok().json(json!({
        "message": "Login successful",
        "token": token,
        "user_id": user_id,
        "username": username
    }))
}

/// Always answers 200 so the endpoint can't be used to probe which accounts
/// exist. The reset mail goes out through the task queue.
pub async fn password_reset(
    data: web::Json<PasswordResetRequest>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let req = data.into_inner();
    let pool = &state.pool;

    let identifier = req
        .username
        .clone()
        .or(req.email.clone())
        .unwrap_or_default();
    if identifier.is_empty() {
        return HttpResponse::BadRequest().json(json!({"error": "username or email is required"}));
    }

    let user_id = sqlx::query_scalar::<_, String>(
        "SELECT id FROM users WHERE username = ? OR email = ? LIMIT 1",
    )
    .bind(&identifier)
    .bind(&identifier)
    .fetch_optional(pool)
    .await
    .ok()
    .flatten();

    if let Some(user_id) = user_id {
        let reset_token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        // Only mail a token that actually made it into the table; the response
        // stays 200 either way.
        let stored = sqlx::query(
            "INSERT INTO password_resets (token, user_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(&reset_token)
        .bind(&user_id)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(pool)
        .await;

        match stored {
            Ok(_) => {
                let base_url = std::env::var("PUBLIC_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:8080".to_string());
                state.tasks.enqueue(Task::SendPasswordResetEmail {
                    user_id,
                    reset_link: format!("{}/reset?token={}", base_url, reset_token),
                });
            }
            Err(e) => error!(error = %e, "failed to store password reset token"),
        }
    }

    HttpResponse::Ok().json(json!({
        "message": "If the account exists, a password reset email has been sent"
    }))
}
