/// Access Token Codec
///
/// Signs and verifies short-lived HS256 JWTs. Verification is pure: signature,
/// pinned algorithm and expiry are checked against the process-held key with no
/// store lookup, so access tokens cannot be revoked and live only as long as
/// their TTL.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::fmt;

use crate::auth::claims::Claims;
use crate::auth::SubjectId;
use crate::configuration::AuthSettings;
use crate::error::AccessTokenError;

/// The only algorithm this service issues or accepts.
const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Clone)]
pub struct AccessTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl fmt::Debug for AccessTokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenCodec")
            .field("algorithm", &ALGORITHM)
            .field("ttl_secs", &self.ttl.num_seconds())
            .finish_non_exhaustive()
    }
}

impl AccessTokenCodec {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self::new(
            settings.secret.as_bytes(),
            Duration::seconds(settings.access_token_ttl_secs),
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign an access token for `subject_id`, expiring one TTL from now.
    pub fn sign(&self, subject_id: SubjectId) -> Result<String, AccessTokenError> {
        self.sign_at(subject_id, Utc::now())
    }

    /// Sign as if issued at `issued_at`.
    pub fn sign_at(
        &self,
        subject_id: SubjectId,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AccessTokenError> {
        let claims = Claims::new(subject_id, issued_at, self.ttl);

        encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AccessTokenError::Signing(e.to_string()))
    }

    /// Verify a token and return its subject.
    ///
    /// The algorithm is pinned to HS256 regardless of what the token header
    /// claims, and no clock leeway is granted on expiry.
    pub fn verify(&self, token: &str) -> Result<SubjectId, AccessTokenError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => AccessTokenError::InvalidSignature,
                ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                    AccessTokenError::UnsupportedAlgorithm
                }
                ErrorKind::ExpiredSignature => AccessTokenError::Expired,
                _ => AccessTokenError::Malformed,
            }
        })?;

        data.claims.subject_id()
    }
}
