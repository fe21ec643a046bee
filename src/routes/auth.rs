//! Authentication Routes
//!
//! Login, refresh exchange, logout, and the public key set.

use actix_web::{http::header, web, HttpResponse};
use serde::Deserialize;

use crate::auth::{AuthService, Jwks, SigningKeypair};
use crate::error::{AppError, ErrorContext};
use crate::validators::require;

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Refresh and logout request
#[derive(Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

/// POST /auth/login
///
/// Returns `{refresh_token, refresh_token_expiry, access_token}`.
///
/// # Errors
/// - 400: email or password missing
/// - 401: invalid credentials (unknown email and wrong password look the same)
/// - 500: Internal server error
pub async fn login(
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let email = require("email", &form.email)?;
    let password = require("password", &form.password)?;

    let tokens = auth.login(email, password).await.map_err(|e| context.record(e))?;

    Ok(HttpResponse::Ok().json(tokens))
}

/// POST /auth/refresh
///
/// Exchanges a refresh token for a new access token. The refresh token stays
/// valid until it expires unless rotation is enabled, in which case the
/// response also carries its replacement.
///
/// # Errors
/// - 400: refresh_token missing
/// - 401: unknown or expired refresh token
/// - 500: Internal server error
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let secret = require("refresh_token", &form.refresh_token)?;
    let outcome = auth.refresh(secret).await.map_err(|e| context.record(e))?;

    Ok(HttpResponse::Ok().json(outcome))
}

/// POST /auth/logout
pub async fn logout(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_logout");

    let secret = require("refresh_token", &form.refresh_token)?;
    auth.logout(secret).await.map_err(|e| context.record(e))?;

    Ok(HttpResponse::NoContent().finish())
}

/// GET /.well-known/jwks.json
pub async fn jwks(keypair: web::Data<SigningKeypair>) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("jwks");
    let jwks = Jwks::from_keypair(keypair.get_ref())
        .map_err(|e| context.record(AppError::Internal(e.to_string())))?;

    Ok(HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "public, max-age=3600"))
        .json(jwks))
}
