/// Authentication module
///
/// Access token codec, refresh token store and the lifecycle manager that
/// ties them together, plus password verification for the login route.

mod claims;
pub mod fingerprint;
pub mod jwt;
pub mod lifecycle;
pub mod password;
pub mod refresh_token;

/// Identifier of the authenticated principal (the `users.id` it belongs to).
pub type SubjectId = i64;

pub use claims::Claims;
pub use fingerprint::{fingerprint, Fingerprint};
pub use jwt::AccessTokenCodec;
pub use lifecycle::{TokenLifecycle, TokenPair};
pub use refresh_token::{OriginHint, RefreshCredential};
