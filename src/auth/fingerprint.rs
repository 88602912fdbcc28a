/// Refresh Secret Fingerprinting
///
/// A fingerprint is the SHA-256 digest of a raw refresh secret, URL-safe base64
/// encoded. It is the only form of the secret that is ever persisted, and the
/// lookup key for the refresh token table.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::fmt;

/// Storable, one-way form of a raw refresh secret.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters only, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }

    pub(crate) fn from_stored(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({}..)", self.short())
    }
}

/// Fingerprint a raw secret. Pure and deterministic.
pub fn fingerprint(raw_secret: impl AsRef<[u8]>) -> Fingerprint {
    let digest = Sha256::digest(raw_secret.as_ref());
    Fingerprint(URL_SAFE.encode(digest))
}
