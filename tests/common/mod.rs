#![allow(dead_code)]

use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::net::TcpListener;

use workout_tracker::auth::password::hash_password;
use workout_tracker::auth::TokenLifecycle;
use workout_tracker::configuration::{get_configuration, AuthSettings, DatabaseSettings};
use workout_tracker::startup::run;

pub const TEST_PASSWORD: &str = "SecurePass123";

pub struct TestApp {
    pub address: String,
    pub db_pool: PgPool,
    pub lifecycle: TokenLifecycle,
    pub auth: AuthSettings,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Insert a user the login route can authenticate, returning its id.
    pub async fn create_user(&self, email: &str) -> i64 {
        create_user(&self.db_pool, email).await
    }
}

pub fn test_auth_settings() -> AuthSettings {
    let mut auth = get_configuration()
        .expect("Failed to read configuration.")
        .auth;
    auth.cookie_secure = false;
    auth
}

/// A migrated throwaway database, no HTTP server.
pub async fn test_pool() -> PgPool {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    configure_database(&configuration.database).await
}

pub async fn test_lifecycle() -> (PgPool, TokenLifecycle) {
    let pool = test_pool().await;
    let lifecycle = TokenLifecycle::new(pool.clone(), &test_auth_settings());
    (pool, lifecycle)
}

pub async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let db_pool = test_pool().await;
    let auth = test_auth_settings();
    let lifecycle = TokenLifecycle::new(db_pool.clone(), &auth);

    let server = run(listener, db_pool.clone(), lifecycle.clone(), auth.clone())
        .expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        db_pool,
        lifecycle,
        auth,
    }
}

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");

    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

pub async fn create_user(pool: &PgPool, email: &str) -> i64 {
    // bcrypt's minimum cost; production hashes come from the user service
    let password_hash = hash_password(TEST_PASSWORD, 4).expect("Failed to hash password");
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO users (email, password_hash) VALUES ($1, $2) RETURNING id",
    )
    .bind(email)
    .bind(password_hash)
    .fetch_one(pool)
    .await
    .expect("Failed to insert user")
}
