use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::time::Duration;

use workout_tracker::auth::TokenLifecycle;
use workout_tracker::configuration::get_configuration;
use workout_tracker::startup::run;
use workout_tracker::sweeper::spawn_expiry_sweeper;
use workout_tracker::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    let configuration = get_configuration().map_err(|e| {
        tracing::error!(error = %e, "Failed to read configuration");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    tracing::info!("Configuration loaded");

    let pool = PgPoolOptions::new()
        .max_connections(configuration.database.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create connection pool");
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Database connection error")
        })?;
    tracing::info!("Database connection pool created");

    let auth_settings = configuration.auth.clone();
    let lifecycle = TokenLifecycle::new(pool.clone(), &auth_settings);

    let sweeper = spawn_expiry_sweeper(
        lifecycle.clone(),
        Duration::from_secs(auth_settings.sweep_interval_secs),
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!(address = %address, "Server listening");

    let result = run(listener, pool, lifecycle, auth_settings)?.await;
    sweeper.abort();

    result
}
