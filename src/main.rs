use actix_cors::Cors;
use actix_web::{
    self, App, HttpServer,
    middleware::{Logger, from_fn},
    web,
};
use std::sync::{Arc, LazyLock};

use crate::{
    configs::{RedisCache, connect_database},
    middlewares::authentication,
    modules::{
        conversation::{
            handle::{PgBackend, ServiceOf},
            repository_pg::ConversationPgRepository,
            service::ConversationService,
        },
        file_upload::{ImageUploadService, LocalBlobStore, UploadConfig},
        message::repository_pg::MessageRepositoryPg,
        post::repository_pg::PostRepositoryPg,
        user::{cache::CachedUserRepository, repository_pg::UserRepositoryPg},
    },
};

mod api;
mod configs;
mod constants;
mod middlewares;
mod modules;
#[cfg(test)]
mod test;
mod utils;

pub static ENV: LazyLock<constants::Env> = LazyLock::new(|| {
    dotenvy::dotenv().ok();
    env_logger::init();
    // the sync poller logs through tracing; `log` output stays with env_logger
    let _ = tracing_subscriber::fmt().try_init();
    log::info!("Environment variables loaded from .env file");
    constants::Env::default()
});

#[actix_web::get("/")]
async fn health_check(db_pool: web::Data<sqlx::PgPool>) -> &'static str {
    match sqlx::query("SELECT 1").execute(db_pool.get_ref()).await {
        Ok(_) => "Server is running",
        Err(e) => {
            log::error!("Health check failed: {}", e);
            "Database unavailable"
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let db_pool =
        connect_database().await.map_err(|_| std::io::Error::other("Database connection error"))?;

    let redis_pool =
        RedisCache::new().await.map_err(|_| std::io::Error::other("Redis connection error"))?;

    let user_repo = CachedUserRepository::new(
        Arc::new(UserRepositoryPg::new(db_pool.clone())),
        Arc::new(redis_pool),
    );
    let uploader = ImageUploadService::new(
        Arc::new(LocalBlobStore::new(ENV.upload_dir.as_str(), ENV.upload_base_url.as_str())),
        UploadConfig::with_max_file_size(ENV.max_image_size),
    );

    let conversation_service: ServiceOf<PgBackend> = ConversationService::with_dependencies(
        Arc::new(ConversationPgRepository::new(db_pool.clone())),
        Arc::new(MessageRepositoryPg::new(db_pool.clone())),
        Arc::new(PostRepositoryPg::new(db_pool.clone())),
        Arc::new(user_repo),
        uploader,
    );
    let conversation_service = web::Data::new(conversation_service);

    log::info!("Starting server at http://{}:{}", ENV.ip.as_str(), ENV.port);
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(ENV.frontend_url.as_str())
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(conversation_service.clone())
            .app_data(web::Data::new(db_pool.clone()))
            .service(health_check)
            .service(
                web::scope("/api")
                    .wrap(from_fn(authentication))
                    .configure(modules::conversation::route::configure::<PgBackend>),
            )
    })
    .bind((ENV.ip.as_str(), ENV.port))?
    .workers(2)
    .run()
    .await
}
