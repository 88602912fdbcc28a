use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Build the JSON subscriber. `RUST_LOG` overrides `default_filter`.
pub fn get_subscriber(default_filter: &str) -> impl Subscriber + Send + Sync {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .json()
        .with_current_span(true);

    Registry::default().with(env_filter).with(formatting_layer)
}

/// Install structured JSON logging as the global default.
///
/// Also bridges `log` records (actix-web's access logger) into `tracing`.
pub fn init_telemetry() {
    get_subscriber("info").init();
}
