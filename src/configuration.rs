use crate::error::ConfigError;

/// Access tokens live five minutes.
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 5 * 60;
/// Refresh tokens live thirty days.
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

const MIN_SECRET_LENGTH: usize = 32;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub auth: AuthSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Token lifecycle settings
///
/// The signing secret is read once at startup and never rotated while the
/// process runs.
#[derive(serde::Deserialize, Clone)]
pub struct AuthSettings {
    pub secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: i64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: i64,
    /// How long a rotation waits on a contended row lock before giving up.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,
}

impl AuthSettings {
    /// Settings with the standard TTLs and the given secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_token_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_token_ttl_secs: DEFAULT_REFRESH_TOKEN_TTL_SECS,
            lock_timeout_ms: default_lock_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            cookie_secure: default_cookie_secure(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("auth.secret".to_string()));
        }
        if self.secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "auth.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if self.access_token_ttl_secs <= 0 {
            return Err(ConfigError::InvalidValue(
                "auth.access_token_ttl_secs must be positive".to_string(),
            ));
        }
        if self.refresh_token_ttl_secs <= 0 {
            return Err(ConfigError::InvalidValue(
                "auth.refresh_token_ttl_secs must be positive".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_access_ttl() -> i64 {
    DEFAULT_ACCESS_TOKEN_TTL_SECS
}

fn default_refresh_ttl() -> i64 {
    DEFAULT_REFRESH_TOKEN_TTL_SECS
}

fn default_lock_timeout() -> u64 {
    2_000
}

fn default_sweep_interval() -> u64 {
    60 * 60
}

fn default_cookie_secure() -> bool {
    true
}

/// Load settings from `configuration.{yaml,toml,json}` and `APP_*` environment
/// variables (`APP_AUTH__SECRET`, `APP_DATABASE__PORT`, ...), environment winning.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;
    settings.auth.validate()?;
    Ok(settings)
}
