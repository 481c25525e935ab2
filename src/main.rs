use actix_cors::Cors;
use actix_web::middleware::NormalizePath;
use actix_web::{web, App, HttpServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use internship_api::services::email::Mailer;
use internship_api::state::AppState;
use internship_api::{bot, db, handlers, tasks};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .unwrap_or(8080);
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://app.db".to_string());

    let pool = db::init_pool(&database_url)
        .await
        .expect("Failed to initialize SQLite pool");

    let (queue, receiver) = tasks::TaskQueue::new();
    let mailer = Mailer::from_env();
    if !mailer.is_configured() {
        info!("EMAIL_API_URL not set, outgoing mail will be logged only");
    }
    tasks::spawn_worker(pool.clone(), mailer, queue.clone(), receiver);
    tasks::scheduler::spawn(queue.clone());

    match std::env::var("TELEGRAM_BOT_TOKEN") {
        Ok(token) if !token.is_empty() => {
            bot::spawn(pool.clone(), token);
        }
        _ => info!("TELEGRAM_BOT_TOKEN not set, bot disabled"),
    }

    let app_state = web::Data::new(AppState::new(pool.clone(), queue));

    info!(port, "starting HTTP server");
    HttpServer::new(move || {
        App::new()
            .wrap(NormalizePath::trim())
            .wrap(Cors::permissive())
            .app_data(app_state.clone())
            .route("/health", web::get().to(handlers::health_check))
            .service(handlers::api_scope(&pool))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
