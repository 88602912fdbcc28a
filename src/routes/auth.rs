/// Authentication Routes
///
/// Thin HTTP adapters over the token lifecycle: login, refresh, logout and the
/// current subject. The refresh secret travels in an HttpOnly cookie scoped to
/// `/auth`; API clients may send it in the JSON body instead.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::auth::password::authenticate;
use crate::auth::{OriginHint, TokenLifecycle, TokenPair};
use crate::configuration::AuthSettings;
use crate::error::{AppError, AuthError, ValidationError};
use crate::middleware::AuthenticatedSubject;

pub const REFRESH_COOKIE: &str = "refresh_token";
const REFRESH_COOKIE_PATH: &str = "/auth";
const MAX_EMAIL_LENGTH: usize = 254;
const MAX_USER_AGENT_LENGTH: usize = 512;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Default)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Serialize)]
pub struct SubjectResponse {
    pub subject_id: i64,
}

/// POST /auth/login
///
/// # Errors
/// - 400: empty or oversized fields
/// - 401: unknown email or wrong password (indistinguishable)
/// - 503: store unavailable, safe to retry
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    pool: web::Data<PgPool>,
    lifecycle: web::Data<TokenLifecycle>,
    settings: web::Data<AuthSettings>,
) -> Result<HttpResponse, AppError> {
    let email = form.email.trim();
    if email.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()).into());
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH).into());
    }
    if form.password.is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()).into());
    }

    let subject_id = authenticate(pool.get_ref(), email, &form.password).await?;
    let pair = lifecycle.issue_login(subject_id, origin_hint(&req)).await?;

    Ok(token_response(pair, lifecycle.get_ref(), settings.get_ref()))
}

/// POST /auth/refresh
///
/// Rotates the presented refresh secret. A secret is accepted once; replaying
/// it, or presenting a revoked or expired one, yields 401 and the client must
/// log in again.
pub async fn refresh(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    lifecycle: web::Data<TokenLifecycle>,
    settings: web::Data<AuthSettings>,
) -> Result<HttpResponse, AppError> {
    let raw = presented_refresh_token(&req, body).ok_or(AuthError::MissingToken)?;

    let pair = lifecycle.rotate(&raw).await?;

    Ok(token_response(pair, lifecycle.get_ref(), settings.get_ref()))
}

/// POST /auth/logout
///
/// Always 204, whether or not the secret was valid, and clears the cookie.
pub async fn logout(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    lifecycle: web::Data<TokenLifecycle>,
) -> HttpResponse {
    if let Some(raw) = presented_refresh_token(&req, body) {
        lifecycle.logout(&raw).await;
    }

    let mut cookie = Cookie::build(REFRESH_COOKIE, "")
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .finish();
    cookie.make_removal();

    HttpResponse::NoContent().cookie(cookie).finish()
}

/// GET /api/me
pub async fn me(subject: web::ReqData<AuthenticatedSubject>) -> HttpResponse {
    HttpResponse::Ok().json(SubjectResponse {
        subject_id: subject.0,
    })
}

fn presented_refresh_token(
    req: &HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
) -> Option<String> {
    body.and_then(|b| b.into_inner().refresh_token)
        .or_else(|| req.cookie(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .filter(|token| !token.is_empty())
}

fn origin_hint(req: &HttpRequest) -> OriginHint {
    let user_agent = req
        .headers()
        .get(actix_web::http::header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(|ua| ua.chars().take(MAX_USER_AGENT_LENGTH).collect::<String>())
        .unwrap_or_default();
    let ip = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or_default()
        .to_string();

    OriginHint::new(user_agent, ip)
}

fn token_response(
    pair: TokenPair,
    lifecycle: &TokenLifecycle,
    settings: &AuthSettings,
) -> HttpResponse {
    let cookie = Cookie::build(REFRESH_COOKIE, pair.refresh_token.clone())
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .secure(settings.cookie_secure)
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::seconds(lifecycle.refresh_ttl().num_seconds()))
        .finish();

    HttpResponse::Ok().cookie(cookie).json(AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: lifecycle.codec().ttl().num_seconds(),
    })
}
