/// Password verification for the login route.
///
/// Only verification lives here; accounts and their hashes are created by the
/// user service.

use bcrypt::{hash, verify};
use sqlx::PgPool;

use crate::auth::SubjectId;
use crate::error::{AppError, AuthError};

/// Verify a password against a bcrypt hash.
///
/// # Errors
/// Returns `AppError::Internal` if the stored hash cannot be parsed.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    verify(password, password_hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

/// Hash a password with the given bcrypt cost.
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost).map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Resolve an email/password pair to the owning subject.
///
/// Unknown email and wrong password produce the same `InvalidCredentials`
/// error to avoid user enumeration.
pub async fn authenticate(
    pool: &PgPool,
    email: &str,
    password: &str,
) -> Result<SubjectId, AppError> {
    let user = sqlx::query_as::<_, (i64, String)>(
        "SELECT id, password_hash FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    let (subject_id, password_hash) = match user {
        Some(user) => user,
        None => return Err(AuthError::InvalidCredentials.into()),
    };

    if !verify_password(password, &password_hash)? {
        return Err(AuthError::InvalidCredentials.into());
    }

    Ok(subject_id)
}
