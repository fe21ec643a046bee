//! Error handling for the whole service.
//!
//! Each component owns a small closed error enum. Handlers convert them into
//! [`AppError`], which decides the HTTP status and the client-safe message.
//! Details only ever go to the server log.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

use crate::validators::ValidationError;

// ============================================================================
// COMPONENT ERRORS
// ============================================================================

/// Failures while creating or loading the signing keypair.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("unable to create certificate directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to read key file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to write key file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode PEM block: {0}")]
    Pem(String),
    #[error("failed to parse EC private key: {0}")]
    Parse(String),
    #[error("failed to encode key: {0}")]
    Encode(String),
}

/// Failures of the token signer/verifier.
///
/// `Parse` covers anything wrong with the token itself (malformed, bad
/// signature, unexpected algorithm); `Validation` covers time-based claims.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to parse token: {0}")]
    Parse(String),
    #[error("token validation failed: {0}")]
    Validation(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("invalid password hash: {0}")]
    InvalidHash(String),
}

/// Error kinds returned by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("conflicting record: {0}")]
    Conflict(String),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("store failure: {0}")]
    Internal(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            return StoreError::NotFound;
        }
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::Conflict(db_err.message().to_string());
            }
        }
        StoreError::Internal(err)
    }
}

/// Outcomes of the authentication flows.
///
/// The variants only say which generic message the caller gets; the
/// specific reason is logged where it happens.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("invalid or expired refresh token")]
    InvalidRefreshToken,
    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

/// Anything that stops the process from serving. There is no degraded mode.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },
    #[error("signing key error: {0}")]
    Key(#[from] KeyError),
    #[error("password hasher error: {0}")]
    Password(#[from] PasswordError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// UNIFIED APPLICATION ERROR
// ============================================================================

pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";
pub const INVALID_REFRESH_TOKEN_MESSAGE: &str = "Invalid or expired refresh token";
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password";
const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound("Resource not found".to_string()),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::InvalidInput(field) => AppError::Validation(format!("{} is required", field)),
            StoreError::Internal(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::Unauthorized(INVALID_CREDENTIALS_MESSAGE),
            AuthError::InvalidToken => AppError::Unauthorized(INVALID_TOKEN_MESSAGE),
            AuthError::InvalidRefreshToken => AppError::Unauthorized(INVALID_REFRESH_TOKEN_MESSAGE),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Internal(err.to_string())
    }
}

// ============================================================================
// HTTP RESPONSE MAPPING
// ============================================================================

/// JSON body of every error response
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Converts errors to HTTP responses with the matching log line
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, _request_id: &str) -> (StatusCode, ErrorResponse) {
        let status = ResponseError::status_code(self);
        let message = match self {
            AppError::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        };

        (status, ErrorResponse::new(message))
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::debug!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::Unauthorized(e) => {
                tracing::debug!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::NotFound(e) => {
                tracing::debug!(request_id = request_id, error = %e, "Resource not found");
            }
            AppError::Conflict(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Duplicate entry attempt");
            }
            AppError::Unavailable(e) => {
                tracing::error!(request_id = request_id, error = %e, "Dependency unavailable");
            }
            AppError::Internal(e) => {
                tracing::error!(request_id = request_id, error = %e, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, body) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Per-request context attached to log lines of a single operation
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub operation: &'static str,
}

impl ErrorContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            operation,
        }
    }

    /// Log `error` with this context and hand it back for propagation
    pub fn record<E: Into<AppError>>(&self, error: E) -> AppError {
        let error = error.into();
        match &error {
            AppError::Internal(_) | AppError::Unavailable(_) => tracing::error!(
                request_id = %self.request_id,
                operation = self.operation,
                error = %error,
                "Operation failed"
            ),
            _ => tracing::debug!(
                request_id = %self.request_id,
                operation = self.operation,
                error = %error,
                "Operation rejected"
            ),
        }
        error
    }
}
