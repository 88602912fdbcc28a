mod auth;
mod health_check;

pub use auth::{login, logout, me, refresh, AuthResponse, LoginRequest, RefreshRequest, REFRESH_COOKIE};
pub use health_check::health_check;
