/// Bearer Token Middleware
///
/// Verifies the access token in the `Authorization` header and injects the
/// authenticated subject into request extensions. Verification is stateless,
/// so this guard never touches the database.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::{AccessTokenCodec, SubjectId};
use crate::error::{AppError, AuthError};

/// Subject of a verified access token, available to handlers as
/// `web::ReqData<AuthenticatedSubject>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedSubject(pub SubjectId);

/// Extract the token from a `Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub struct JwtMiddleware {
    codec: AccessTokenCodec,
}

impl JwtMiddleware {
    pub fn new(codec: AccessTokenCodec) -> Self {
        Self { codec }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            codec: self.codec.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    codec: AccessTokenCodec,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let verified = req
            .headers()
            .get(actix_web::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(bearer_token)
            .ok_or(AuthError::MissingToken)
            .and_then(|token| self.codec.verify(token).map_err(AuthError::from));

        match verified {
            Ok(subject_id) => {
                req.extensions_mut().insert(AuthenticatedSubject(subject_id));
                tracing::debug!(subject_id, "Access token verified");

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => {
                let err: Error = AppError::from(e).into();
                Box::pin(async move { Err(err) })
            }
        }
    }
}
