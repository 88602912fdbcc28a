/// Error Handling Module
///
/// One error enum per concern, each with its own `Display`, all folding into
/// `AppError` which knows how to render itself as an HTTP response.
///
/// 1. Access-token codec errors
/// 2. Refresh-token store errors
/// 3. Token lifecycle errors
/// 4. Configuration and validation errors
/// 5. Unified application error and HTTP mapping

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// Postgres SQLSTATE raised when `lock_timeout` elapses.
const LOCK_NOT_AVAILABLE: &str = "55P03";
/// Postgres SQLSTATE for a unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

/// ============================================================================
/// 1. ACCESS TOKEN ERRORS
/// ============================================================================

/// Failures of signing or verifying a short-lived access token.
///
/// None of these are retried; a caller presenting a bad token must obtain a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessTokenError {
    InvalidSignature,
    UnsupportedAlgorithm,
    Expired,
    Malformed,
    Signing(String),
}

impl fmt::Display for AccessTokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessTokenError::InvalidSignature => write!(f, "Access token signature is invalid"),
            AccessTokenError::UnsupportedAlgorithm => {
                write!(f, "Access token uses an unsupported signing algorithm")
            }
            AccessTokenError::Expired => write!(f, "Access token has expired"),
            AccessTokenError::Malformed => write!(f, "Access token is malformed"),
            AccessTokenError::Signing(msg) => write!(f, "Access token signing failed: {}", msg),
        }
    }
}

impl StdError for AccessTokenError {}

/// ============================================================================
/// 2. STORE ERRORS
/// ============================================================================

/// Failures talking to the refresh-token table.
#[derive(Debug)]
pub enum StoreError {
    /// Connection or pool failure. Safe to retry the whole operation.
    Unavailable(String),
    /// The row lock could not be acquired within `lock_timeout`.
    LockTimeout,
    /// The enclosing transaction failed to commit; nothing it staged is visible.
    CommitFailure(String),
    /// Two live rows would share one fingerprint.
    FingerprintCollision,
    Query(String),
}

impl StoreError {
    /// Whether the caller may retry the whole operation from scratch.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::LockTimeout)
    }

    pub fn commit(err: sqlx::Error) -> Self {
        StoreError::CommitFailure(err.to_string())
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "Token store unavailable: {}", msg),
            StoreError::LockTimeout => write!(f, "Timed out waiting for refresh token lock"),
            StoreError::CommitFailure(msg) => write!(f, "Transaction commit failed: {}", msg),
            StoreError::FingerprintCollision => {
                write!(f, "Refresh token fingerprint already in use")
            }
            StoreError::Query(msg) => write!(f, "Token store query failed: {}", msg),
        }
    }
}

impl StdError for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(LOCK_NOT_AVAILABLE) => StoreError::LockTimeout,
                Some(UNIQUE_VIOLATION) => StoreError::FingerprintCollision,
                _ => StoreError::Query(err.to_string()),
            },
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Query(err.to_string()),
        }
    }
}

/// ============================================================================
/// 3. AUTHENTICATION ERRORS
/// ============================================================================

/// Errors surfaced by the token lifecycle manager and the auth routes.
#[derive(Debug)]
pub enum AuthError {
    /// The refresh secret is unknown, revoked or expired. The caller must log in again.
    TokenNotFound,
    MissingToken,
    InvalidCredentials,
    AccessToken(AccessTokenError),
    Store(StoreError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::TokenNotFound => write!(f, "Refresh token not found"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
            AuthError::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthError::AccessToken(e) => write!(f, "{}", e),
            AuthError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl StdError for AuthError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            AuthError::AccessToken(e) => Some(e),
            AuthError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AccessTokenError> for AuthError {
    fn from(err: AccessTokenError) -> Self {
        AuthError::AccessToken(err)
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Store(err)
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::Store(err.into())
    }
}

/// ============================================================================
/// 4. CONFIGURATION AND VALIDATION ERRORS
/// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => ConfigError::MissingRequired(key),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}

/// Validation errors for request payloads
#[derive(Debug, Clone)]
pub enum ValidationError {
    EmptyField(String),
    TooLong(String, usize),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
        }
    }
}

impl StdError for ValidationError {}

/// ============================================================================
/// 5. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type returned by route handlers
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Auth(AuthError),
    Config(ConfigError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<AccessTokenError> for AppError {
    fn from(err: AccessTokenError) -> Self {
        AppError::Auth(AuthError::AccessToken(err))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Auth(AuthError::Store(err))
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Auth(AuthError::Store(err.into()))
    }
}

// ============================================================================
// HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for correlating with server logs
    pub error_id: String,
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl AppError {
    /// Status, machine code and client-facing message.
    ///
    /// Refresh-token failures all read the same so a caller cannot tell a
    /// revoked secret from an expired or never-issued one.
    fn classify(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            AppError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Request validation failed",
            ),
            AppError::Auth(e) => match e {
                AuthError::TokenNotFound => (
                    StatusCode::UNAUTHORIZED,
                    "REAUTHENTICATE",
                    "Session is no longer valid, please log in again",
                ),
                AuthError::MissingToken => (
                    StatusCode::UNAUTHORIZED,
                    "MISSING_TOKEN",
                    "Missing authentication token",
                ),
                AuthError::InvalidCredentials => (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_CREDENTIALS",
                    "Invalid email or password",
                ),
                AuthError::AccessToken(AccessTokenError::Expired) => (
                    StatusCode::UNAUTHORIZED,
                    "TOKEN_EXPIRED",
                    "Access token has expired",
                ),
                AuthError::AccessToken(AccessTokenError::Signing(_)) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error",
                ),
                AuthError::AccessToken(_) => (
                    StatusCode::UNAUTHORIZED,
                    "TOKEN_INVALID",
                    "Invalid access token",
                ),
                AuthError::Store(s) if s.is_transient() => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable, please try again",
                ),
                AuthError::Store(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error occurred",
                ),
            },
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                "Server configuration error",
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error",
            ),
        }
    }

    pub fn to_response_body(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = self.classify();
        let message = match self {
            AppError::Validation(e) => e.to_string(),
            _ => message.to_string(),
        };
        (
            status,
            ErrorResponse::new(request_id.to_string(), message, code.to_string(), status.as_u16()),
        )
    }

    fn log(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::Auth(AuthError::Store(e)) => {
                tracing::error!(request_id = request_id, error = %e, "Token store error");
            }
            AppError::Auth(AuthError::AccessToken(AccessTokenError::Signing(msg))) => {
                tracing::error!(request_id = request_id, error = %msg, "Access token signing failed");
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::Config(e) => {
                tracing::error!(request_id = request_id, error = %e, "Configuration error");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log(&request_id);

        let (status, body) = self.to_response_body(&request_id);
        HttpResponse::build(status).json(body)
    }

    fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_not_found_is_unauthorized() {
        let err = AppError::from(AuthError::TokenNotFound);
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let (_, body) = err.to_response_body("req-1");
        assert_eq!(body.code, "REAUTHENTICATE");
        assert_eq!(body.error_id, "req-1");
    }

    #[test]
    fn test_transient_store_errors_are_retryable() {
        let lock = AppError::from(StoreError::LockTimeout);
        assert_eq!(lock.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let pool = AppError::from(StoreError::Unavailable("pool timed out".to_string()));
        assert_eq!(pool.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let commit = AppError::from(StoreError::CommitFailure("broken pipe".to_string()));
        assert_eq!(commit.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_access_token_errors_map_to_401() {
        for err in [
            AccessTokenError::InvalidSignature,
            AccessTokenError::UnsupportedAlgorithm,
            AccessTokenError::Expired,
            AccessTokenError::Malformed,
        ] {
            assert_eq!(AppError::from(err).status_code(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_pool_timeout_maps_to_unavailable() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_row_not_found_is_a_query_error() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Query(_)));
        assert!(!err.is_transient());
    }
}
