//! JWT Authentication Middleware
//!
//! Validates the bearer token from the Authorization header and injects the
//! authenticated user id into request extensions for route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::{authenticate, TokenService};
use crate::error::{ErrorResponse, INVALID_TOKEN_MESSAGE};

/// The user a protected request acts as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: i64,
}

/// JWT middleware for protecting routes
///
/// Every failure (missing header, wrong scheme, bad signature, expired)
/// produces the same 401 body.
pub struct JwtMiddleware {
    tokens: Arc<TokenService>,
}

impl JwtMiddleware {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
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
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    tokens: Arc<TokenService>,
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
        let header = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match authenticate(header, &self.tokens) {
            Ok(user_id) => {
                req.extensions_mut().insert(AuthenticatedUser { id: user_id });
                tracing::debug!(user_id, "Bearer token accepted");

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(_) => {
                tracing::warn!(path = %req.path(), "Rejected unauthenticated request");
                let response =
                    HttpResponse::Unauthorized().json(ErrorResponse::new(INVALID_TOKEN_MESSAGE));
                Box::pin(async move {
                    Err(actix_web::error::InternalError::from_response(
                        INVALID_TOKEN_MESSAGE,
                        response,
                    )
                    .into())
                })
            }
        }
    }
}
