use std::future::{ready, Ready};
use std::rc::Rc;
use std::time::Instant;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::Error;
use futures_util::future::LocalBoxFuture;
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::auth;

/// Writes one api_logs row per completed request. Logging is best-effort:
/// any failure is logged and swallowed so it never affects the response.
pub struct ApiLogger {
    pool: SqlitePool,
}

impl ApiLogger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = ApiLoggerMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiLoggerMiddleware {
            service: Rc::new(service),
            pool: self.pool.clone(),
        }))
    }
}

pub struct ApiLoggerMiddleware<S> {
    service: Rc<S>,
    pool: SqlitePool,
}

fn client_ip(req: &ServiceRequest) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl<S, B> Service<ServiceRequest> for ApiLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let pool = self.pool.clone();

        let start = Instant::now();
        let method = req.method().to_string();
        let endpoint = req.path().to_string();
        let ip_address = client_ip(&req);
        let token = auth::token_from_headers(req.headers());

        Box::pin(async move {
            let res = service.call(req).await?;

            let response_status = res.status().as_u16() as i64;
            let response_time = start.elapsed().as_secs_f64();

            let user_id = match token {
                Some(token) => auth::user_id_for_token(&pool, &token).await,
                None => None,
            };

            let inserted = sqlx::query(
                "INSERT INTO api_logs \
                 (id, endpoint, method, user_id, ip_address, timestamp, response_status, response_time) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&endpoint)
            .bind(&method)
            .bind(&user_id)
            .bind(&ip_address)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(response_status)
            .bind(response_time)
            .execute(&pool)
            .await;

            if let Err(e) = inserted {
                warn!(%endpoint, %method, error = %e, "failed to write api log");
            }

            Ok(res)
        })
    }
}
