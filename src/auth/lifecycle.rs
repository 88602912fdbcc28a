/// Token Lifecycle Manager
///
/// Issues, rotates and revokes token pairs. A refresh credential moves
/// `Active -> Revoked` on rotation or logout, or becomes `Expired` by time;
/// both are terminal.
///
/// Rotation runs as one transaction in a fixed order:
/// lock the presented row, sign the new access token, revoke the presented row,
/// insert its successor, commit. Locking first serializes concurrent rotations
/// of the same secret: the loser waits on the lock, then sees the row revoked and
/// gets `TokenNotFound`. Revoking before inserting keeps at most one live
/// successor per secret. Any failure drops the transaction, which rolls back.

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::auth::fingerprint::{fingerprint, Fingerprint};
use crate::auth::jwt::AccessTokenCodec;
use crate::auth::refresh_token::{self as store, NewRefreshCredential, OriginHint, RefreshCredential};
use crate::auth::SubjectId;
use crate::configuration::AuthSettings;
use crate::error::{AuthError, StoreError};

/// An access token and the raw refresh secret issued alongside it.
///
/// The refresh secret exists in plaintext only here; the store keeps its
/// fingerprint.
#[derive(Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// What the store knows about a presented secret that failed to rotate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Revoked,
    Expired,
    Unknown,
}

/// Revocation wins over expiry: a revoked secret presented again is the reuse
/// signal regardless of its age.
fn classify_rejection(row: Option<&RefreshCredential>, now: DateTime<Utc>) -> Rejection {
    match row {
        Some(credential) if credential.is_revoked() => Rejection::Revoked,
        Some(credential) if credential.is_expired_at(now) => Rejection::Expired,
        _ => Rejection::Unknown,
    }
}

#[derive(Debug, Clone)]
pub struct TokenLifecycle {
    pool: PgPool,
    codec: AccessTokenCodec,
    refresh_ttl: Duration,
    lock_timeout_ms: u64,
}

impl TokenLifecycle {
    pub fn new(pool: PgPool, settings: &AuthSettings) -> Self {
        Self {
            pool,
            codec: AccessTokenCodec::from_settings(settings),
            refresh_ttl: Duration::seconds(settings.refresh_token_ttl_secs),
            lock_timeout_ms: settings.lock_timeout_ms,
        }
    }

    pub fn codec(&self) -> &AccessTokenCodec {
        &self.codec
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue a fresh token pair for an authenticated subject.
    ///
    /// # Errors
    /// Signing failures and store failures propagate unchanged.
    #[tracing::instrument(name = "issue_login", skip(self, origin))]
    pub async fn issue_login(
        &self,
        subject_id: SubjectId,
        origin: OriginHint,
    ) -> Result<TokenPair, AuthError> {
        let access_token = self.codec.sign(subject_id)?;

        let refresh_token = store::generate_refresh_secret();
        let credential = self.new_credential(subject_id, fingerprint(&refresh_token), origin);
        let credential_id = store::save(&self.pool, &credential).await?;

        tracing::info!(credential_id, "Refresh credential issued");

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Exchange a valid refresh secret for a new token pair, revoking the old one.
    ///
    /// # Errors
    /// - `AuthError::TokenNotFound` if the secret is unknown, revoked or expired
    /// - `AuthError::Store(StoreError::LockTimeout)` if another rotation holds the
    ///   row for longer than the configured lock timeout
    /// - any signing, store or commit failure; nothing is persisted in that case
    #[tracing::instrument(name = "rotate", skip_all)]
    pub async fn rotate(&self, raw_refresh_token: &str) -> Result<TokenPair, AuthError> {
        let presented = fingerprint(raw_refresh_token);

        let mut tx = self.begin().await?;

        let current = match store::find_active_for_update(&mut *tx, &presented).await? {
            Some(credential) => credential,
            None => {
                drop(tx);
                self.audit_rejected(&presented).await;
                return Err(AuthError::TokenNotFound);
            }
        };

        let access_token = self.codec.sign(current.subject_id)?;

        store::revoke(&mut *tx, &presented).await?;

        let refresh_token = store::generate_refresh_secret();
        let successor = self.new_credential(
            current.subject_id,
            fingerprint(&refresh_token),
            current.origin.clone(),
        );
        let successor_id = store::save(&mut *tx, &successor).await?;

        tx.commit().await.map_err(StoreError::commit)?;

        tracing::info!(
            subject_id = current.subject_id,
            revoked_id = current.id,
            credential_id = successor_id,
            "Refresh credential rotated"
        );

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Revoke a refresh secret.
    ///
    /// Never fails from the caller's point of view: unknown, revoked and expired
    /// secrets are a silent no-op, and store failures are logged and swallowed so
    /// the response does not reveal whether the secret was valid.
    #[tracing::instrument(name = "logout", skip_all)]
    pub async fn logout(&self, raw_refresh_token: &str) {
        let presented = fingerprint(raw_refresh_token);

        match self.revoke_locked(&presented).await {
            Ok(Some(subject_id)) => {
                tracing::info!(subject_id, "Refresh credential revoked on logout");
            }
            Ok(None) => {
                tracing::debug!(fingerprint = presented.short(), "Logout with inactive refresh token");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to revoke refresh credential on logout");
            }
        }
    }

    /// Revoke every live refresh credential of a subject.
    pub async fn revoke_all(&self, subject_id: SubjectId) -> Result<u64, AuthError> {
        let mut tx = self.begin().await?;
        let revoked = store::revoke_all_for_subject(&mut *tx, subject_id).await?;
        tx.commit().await.map_err(StoreError::commit)?;

        tracing::info!(subject_id, revoked, "All refresh credentials revoked for subject");
        Ok(revoked)
    }

    /// Verify an access token. Stateless: never touches the store.
    pub fn verify_access(&self, access_token: &str) -> Result<SubjectId, AuthError> {
        Ok(self.codec.verify(access_token)?)
    }

    /// Delete expired rows. Meant for the periodic sweeper, not the request path.
    pub async fn sweep_expired(&self) -> Result<u64, AuthError> {
        Ok(store::sweep_expired(&self.pool).await?)
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await?;
        store::set_lock_timeout(&mut *tx, self.lock_timeout_ms).await?;
        Ok(tx)
    }

    /// Lock-then-revoke in its own transaction, so logout obeys the same
    /// locking discipline as rotation.
    async fn revoke_locked(&self, presented: &Fingerprint) -> Result<Option<SubjectId>, StoreError> {
        let mut tx = self.begin().await?;

        let subject_id = match store::find_active_for_update(&mut *tx, presented).await? {
            Some(credential) => credential.subject_id,
            None => return Ok(None),
        };

        store::revoke(&mut *tx, presented).await?;
        tx.commit().await.map_err(StoreError::commit)?;

        Ok(Some(subject_id))
    }

    fn new_credential(
        &self,
        subject_id: SubjectId,
        secret_fingerprint: Fingerprint,
        origin: OriginHint,
    ) -> NewRefreshCredential {
        NewRefreshCredential {
            subject_id,
            secret_fingerprint,
            ttl: self.refresh_ttl,
            origin,
        }
    }

    /// Record why a presented secret was rejected. The caller always gets
    /// `TokenNotFound`; only the log tells revoked, expired and unknown apart.
    async fn audit_rejected(&self, presented: &Fingerprint) {
        let row = match store::find_by_fingerprint(&self.pool, presented).await {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(error = %e, "Could not audit rejected refresh token");
                return;
            }
        };

        let subject_id = row.as_ref().map(|c| c.subject_id);
        let credential_id = row.as_ref().map(|c| c.id);

        match classify_rejection(row.as_ref(), Utc::now()) {
            Rejection::Revoked => {
                tracing::warn!(
                    subject_id,
                    credential_id,
                    "Revoked refresh token presented, possible reuse"
                );
            }
            Rejection::Expired => {
                tracing::warn!(subject_id, credential_id, "Expired refresh token presented");
            }
            Rejection::Unknown => {
                tracing::debug!(fingerprint = presented.short(), "Unknown refresh token presented");
            }
        }
    }
}
