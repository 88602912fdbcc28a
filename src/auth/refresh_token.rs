/// Refresh Token Store
///
/// Persistent record of issued refresh credentials in the `refresh_tokens`
/// table. Refresh secrets are:
/// - 32 bytes from the OS CSPRNG, URL-safe base64 encoded
/// - Fingerprinted with SHA-256 before storage (the raw secret is never stored)
/// - Single-use: rotation revokes the presented row before inserting its successor
///
/// Every operation takes the executor to run on, so the lifecycle manager can
/// compose several of them inside one transaction (`&mut *tx`) or run a single
/// statement straight on the pool.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sqlx::PgExecutor;

use crate::auth::fingerprint::Fingerprint;
use crate::auth::SubjectId;
use crate::error::StoreError;

/// Raw refresh secret length in bytes, before encoding.
pub const REFRESH_SECRET_BYTES: usize = 32;

/// Audit-only request metadata. Never used in any decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginHint {
    pub user_agent: String,
    pub ip: String,
}

impl OriginHint {
    pub fn new(user_agent: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ip: ip.into(),
        }
    }
}

/// A persisted refresh credential.
#[derive(Debug, Clone)]
pub struct RefreshCredential {
    pub id: i64,
    pub subject_id: SubjectId,
    pub secret_fingerprint: Fingerprint,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub origin: OriginHint,
}

impl RefreshCredential {
    #[inline]
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Values the caller supplies for a new row. The database assigns `id` and
/// `issued_at`, and stores `expires_at` as `issued_at + ttl` from the same clock.
#[derive(Debug, Clone)]
pub struct NewRefreshCredential {
    pub subject_id: SubjectId,
    pub secret_fingerprint: Fingerprint,
    pub ttl: Duration,
    pub origin: OriginHint,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: i64,
    subject_id: i64,
    fingerprint: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    user_agent: String,
    ip: String,
}

impl From<CredentialRow> for RefreshCredential {
    fn from(row: CredentialRow) -> Self {
        Self {
            id: row.id,
            subject_id: row.subject_id,
            secret_fingerprint: Fingerprint::from_stored(row.fingerprint),
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
            origin: OriginHint {
                user_agent: row.user_agent,
                ip: row.ip,
            },
        }
    }
}

/// Generate a new raw refresh secret.
///
/// This is the value handed to the client, exactly once.
pub fn generate_refresh_secret() -> String {
    let mut bytes = [0u8; REFRESH_SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE.encode(bytes)
}

/// Insert a new credential and return its id.
///
/// # Errors
/// `StoreError::FingerprintCollision` if an unrevoked row already has this
/// fingerprint, expired or not.
pub async fn save<'e, E>(executor: E, credential: &NewRefreshCredential) -> Result<i64, StoreError>
where
    E: PgExecutor<'e>,
{
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO refresh_tokens (subject_id, fingerprint, issued_at, expires_at, user_agent, ip)
        VALUES ($1, $2, NOW(), NOW() + $3 * INTERVAL '1 millisecond', $4, $5)
        RETURNING id
        "#,
    )
    .bind(credential.subject_id)
    .bind(credential.secret_fingerprint.as_str())
    .bind(credential.ttl.num_milliseconds() as f64)
    .bind(&credential.origin.user_agent)
    .bind(&credential.origin.ip)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Fetch the active (not revoked, not expired) row for a fingerprint.
pub async fn find_active<'e, E>(
    executor: E,
    fingerprint: &Fingerprint,
) -> Result<Option<RefreshCredential>, StoreError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, CredentialRow>(
        r#"
        SELECT id, subject_id, fingerprint, issued_at, expires_at, revoked_at, user_agent, ip
        FROM refresh_tokens
        WHERE fingerprint = $1 AND revoked_at IS NULL AND expires_at > NOW()
        "#,
    )
    .bind(fingerprint.as_str())
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Into::into))
}

/// Same filter as [`find_active`], but takes an exclusive row lock held until
/// the enclosing transaction ends.
///
/// A second caller locking the same row blocks until the first commits, then
/// re-evaluates the filter against the committed row, so it sees a revoked
/// credential as not found.
pub async fn find_active_for_update<'e, E>(
    executor: E,
    fingerprint: &Fingerprint,
) -> Result<Option<RefreshCredential>, StoreError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, CredentialRow>(
        r#"
        SELECT id, subject_id, fingerprint, issued_at, expires_at, revoked_at, user_agent, ip
        FROM refresh_tokens
        WHERE fingerprint = $1 AND revoked_at IS NULL AND expires_at > NOW()
        FOR UPDATE
        "#,
    )
    .bind(fingerprint.as_str())
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Into::into))
}

/// Most recent row for a fingerprint in any state. Audit logging only; never
/// used to authorize anything.
pub async fn find_by_fingerprint<'e, E>(
    executor: E,
    fingerprint: &Fingerprint,
) -> Result<Option<RefreshCredential>, StoreError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, CredentialRow>(
        r#"
        SELECT id, subject_id, fingerprint, issued_at, expires_at, revoked_at, user_agent, ip
        FROM refresh_tokens
        WHERE fingerprint = $1
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(fingerprint.as_str())
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Into::into))
}

/// Revoke the row for a fingerprint.
///
/// Idempotent: an unknown or already revoked fingerprint is not an error, and
/// the first `revoked_at` is kept. Returns the number of rows revoked by this call.
pub async fn revoke<'e, E>(executor: E, fingerprint: &Fingerprint) -> Result<u64, StoreError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked_at = NOW()
        WHERE fingerprint = $1 AND revoked_at IS NULL
        "#,
    )
    .bind(fingerprint.as_str())
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Revoke every unrevoked row of one subject. The `UPDATE` takes the same
/// exclusive row locks as [`find_active_for_update`].
pub async fn revoke_all_for_subject<'e, E>(
    executor: E,
    subject_id: SubjectId,
) -> Result<u64, StoreError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked_at = NOW()
        WHERE subject_id = $1 AND revoked_at IS NULL
        "#,
    )
    .bind(subject_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Delete every row whose expiry has passed, revoked or not.
pub async fn sweep_expired<'e, E>(executor: E) -> Result<u64, StoreError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < NOW()")
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// Bound how long the current transaction waits on row locks.
///
/// Only meaningful inside a transaction; the setting ends with it.
pub async fn set_lock_timeout<'e, E>(executor: E, timeout_ms: u64) -> Result<(), StoreError>
where
    E: PgExecutor<'e>,
{
    sqlx::query("SELECT set_config('lock_timeout', $1, true)")
        .bind(format!("{}ms", timeout_ms))
        .execute(executor)
        .await?;

    Ok(())
}
