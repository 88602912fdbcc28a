use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;

use crate::auth::TokenLifecycle;
use crate::configuration::AuthSettings;
use crate::logger::RequestLogger;
use crate::middleware::JwtMiddleware;
use crate::routes::{health_check, login, logout, me, refresh};

pub fn run(
    listener: TcpListener,
    pool: PgPool,
    lifecycle: TokenLifecycle,
    auth_settings: AuthSettings,
) -> Result<Server, std::io::Error> {
    let codec = lifecycle.codec().clone();
    let pool = web::Data::new(pool);
    let lifecycle = web::Data::new(lifecycle);
    let auth_settings = web::Data::new(auth_settings);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(RequestLogger)
            .app_data(pool.clone())
            .app_data(lifecycle.clone())
            .app_data(auth_settings.clone())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout)),
            )
            // Protected routes (require a valid access token)
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(codec.clone()))
                    .route("/me", web::get().to(me)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
