use actix_web::{web, HttpRequest, HttpResponse};
use sqlx::Row;

use crate::auth;
use crate::state::AppState;

/// Download a stored report workbook. Staff only.
pub async fn download_file(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let user = match auth::authenticate(&req, &state.pool).await {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    if !user.is_staff {
        return auth::forbidden();
    }

    let id = path.into_inner();
    let row = sqlx::query("SELECT filename, mime, bytes FROM files WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.pool)
        .await;

    match row {
        Ok(Some(r)) => {
            let filename = r.get::<String, _>("filename");
            let mime = r.get::<String, _>("mime");
            let bytes = r.get::<Vec<u8>, _>("bytes");
            HttpResponse::Ok()
                .append_header(("Content-Type", mime))
                .append_header((
                    "Content-Disposition",
                    format!("attachment; filename=\"{}\"", filename),
                ))
                .body(bytes)
        }
        Ok(None) => HttpResponse::NotFound().finish(),
        Err(_) => HttpResponse::InternalServerError().finish(),
    }
}
