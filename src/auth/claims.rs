/// Access token claim set
///
/// Registered claims only (RFC 7519): the subject, issue and expiry times, and a
/// random token id so two assertions minted in the same second still differ.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::SubjectId;
use crate::error::AccessTokenError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (principal id, decimal string)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Token id
    pub jti: String,
}

impl Claims {
    pub fn new(subject_id: SubjectId, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: subject_id.to_string(),
            exp: (issued_at + ttl).timestamp(),
            iat: issued_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn subject_id(&self) -> Result<SubjectId, AccessTokenError> {
        self.sub
            .parse::<SubjectId>()
            .map_err(|_| AccessTokenError::Malformed)
    }
}
