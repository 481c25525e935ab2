pub mod auth;
pub mod profile;
pub mod logs;
pub mod notify;
pub mod files;

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use sqlx::SqlitePool;

use crate::middleware::ApiLogger;
use crate::state::AppState;

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": "1.0.0"
    }))
}

pub async fn public_endpoint() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "Welcome to the Internship API!",
        "server_time": chrono::Utc::now().to_rfc3339(),
        "api_version": "1.0",
        "endpoints": {
            "public": "/api/public",
            "protected": "/api/protected",
            "register": "/api/register",
            "login": "/api/login",
            "profile": "/api/profile",
            "logs": "/api/logs"
        },
        "authentication": "Token authentication required for protected endpoints"
    }))
}

pub async fn protected_endpoint(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let user = match crate::auth::authenticate(&req, &state.pool).await {
        Some(user) => user,
        None => return crate::auth::unauthorized(),
    };

    HttpResponse::Ok().json(json!({
        "message": format!("Hello {}! This is a protected endpoint.", user.username),
        "user_id": user.id,
        "username": user.username,
        "email": user.email,
        "access_time": chrono::Utc::now().to_rfc3339(),
        "is_staff": user.is_staff,
        "is_superuser": user.is_superuser
    }))
}

/// The `/api` scope with request logging applied; shared by main and tests.
pub fn api_scope(pool: &SqlitePool) -> impl actix_web::dev::HttpServiceFactory {
    web::scope("/api")
        .wrap(ApiLogger::new(pool.clone()))
        .route("/public", web::get().to(public_endpoint))
        .route("/protected", web::get().to(protected_endpoint))
        .route("/register", web::post().to(auth::register))
        .route("/login", web::post().to(auth::login))
        .route("/password-reset", web::post().to(auth::password_reset))
        .route("/profile", web::get().to(profile::get_profile))
        .route("/profile", web::put().to(profile::update_profile))
        .route("/logs", web::get().to(logs::list_logs))
        .route("/logs/{id}", web::delete().to(logs::delete_log))
        .route("/notify", web::post().to(notify::bulk_notify))
        .route("/files/{id}", web::get().to(files::download_file))
}
