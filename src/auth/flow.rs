//! Authentication flows: login, refresh exchange, logout and bearer checks.
//!
//! There is no session object. Every request either presents credentials,
//! a refresh secret, or an access token, and is judged on that alone.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::OnceCell;

use crate::auth::jwt::TokenService;
use crate::auth::password::PasswordHasher;
use crate::auth::refresh_token::{generate_refresh_token, hash_token, RefreshTokenLedger, RefreshTokenRecord};
use crate::error::{AuthError, StoreError};
use crate::users::UserStore;

/// A refresh secret as handed to the client
#[derive(Debug, Clone, Serialize)]
pub struct IssuedRefreshToken {
    pub refresh_token: String,
    /// Unix timestamp (seconds)
    pub refresh_token_expiry: i64,
}

/// Successful login response
#[derive(Debug, Clone, Serialize)]
pub struct LoginTokens {
    #[serde(flatten)]
    pub refresh: IssuedRefreshToken,
    pub access_token: String,
}

/// Successful refresh response.
///
/// `rotated` is only present when rotation-on-use is enabled.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub access_token: String,
    #[serde(flatten)]
    pub rotated: Option<IssuedRefreshToken>,
}

#[derive(Clone)]
pub struct AuthService {
    tokens: Arc<TokenService>,
    ledger: RefreshTokenLedger,
    users: UserStore,
    hasher: PasswordHasher,
    rotate_refresh_tokens: bool,
    // verified against when the email is unknown, so both login failures cost one Argon2 run
    dummy_hash: Arc<OnceCell<String>>,
}

impl AuthService {
    pub fn new(
        tokens: Arc<TokenService>,
        ledger: RefreshTokenLedger,
        users: UserStore,
        hasher: PasswordHasher,
        rotate_refresh_tokens: bool,
    ) -> Self {
        Self {
            tokens,
            ledger,
            users,
            hasher,
            rotate_refresh_tokens,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Hash a new user's password on the blocking pool
    pub async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();

        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))??;
        Ok(hash)
    }

    /// Exchange email and password for a refresh token and an access token.
    ///
    /// Unknown email and wrong password both yield `InvalidCredentials`.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginTokens, AuthError> {
        let credentials = match self.users.get_by_email(email).await {
            Ok(credentials) => credentials,
            Err(StoreError::NotFound) => {
                let dummy = self.dummy_hash().await?;
                self.verify_password(password, dummy).await?;
                tracing::warn!("Login rejected: unknown email");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        if !self.verify_password(password, &credentials.password_hash).await? {
            tracing::warn!(user_id = credentials.id, "Login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let refresh = self.issue_refresh_token(credentials.id).await?;
        let access_token = self.tokens.issue_access_token(credentials.id)?;

        tracing::info!(user_id = credentials.id, "User logged in");
        Ok(LoginTokens { refresh, access_token })
    }

    /// Exchange a refresh secret for a new access token
    pub async fn refresh(&self, secret: &str) -> Result<RefreshOutcome, AuthError> {
        let record = self.find_refresh_record(secret).await?;

        let user_id: i64 = record.owner_id.parse().map_err(|_| {
            tracing::error!(token_id = record.id, "Refresh token has an unparseable owner id");
            AuthError::Internal(format!("refresh token {} has invalid owner id", record.id))
        })?;

        let user = match self.users.get_by_id(user_id).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                tracing::warn!(user_id, "Refresh rejected: owner no longer exists");
                return Err(AuthError::InvalidRefreshToken);
            }
            Err(e) => return Err(e.into()),
        };

        let access_token = self.tokens.issue_access_token(user.id)?;

        let rotated = if self.rotate_refresh_tokens {
            let generated = generate_refresh_token();
            let replacement = match self
                .ledger
                .rotate(record.id, &record.owner_id, &generated.hash)
                .await
            {
                Ok(replacement) => replacement,
                // lost a race with another exchange of the same secret
                Err(StoreError::NotFound) => return Err(AuthError::InvalidRefreshToken),
                Err(e) => return Err(e.into()),
            };
            Some(IssuedRefreshToken {
                refresh_token: generated.secret,
                refresh_token_expiry: replacement.expires_at.timestamp(),
            })
        } else {
            None
        };

        tracing::info!(user_id = user.id, rotated = rotated.is_some(), "Access token refreshed");
        Ok(RefreshOutcome { access_token, rotated })
    }

    /// Delete the ledger row behind a refresh secret
    pub async fn logout(&self, secret: &str) -> Result<(), AuthError> {
        let record = self.find_refresh_record(secret).await?;

        match self.ledger.delete_by_id(record.id).await {
            Ok(()) => {
                tracing::info!(owner_id = %record.owner_id, "Refresh token revoked");
                Ok(())
            }
            Err(StoreError::NotFound) => Err(AuthError::InvalidRefreshToken),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of unexpired refresh tokens a user holds
    pub async fn active_refresh_tokens(&self, user_id: i64) -> Result<usize, AuthError> {
        let tokens = self.ledger.list_valid_for_owner(&user_id.to_string()).await?;
        Ok(tokens.len())
    }

    async fn issue_refresh_token(&self, user_id: i64) -> Result<IssuedRefreshToken, AuthError> {
        let generated = generate_refresh_token();
        let record = self.ledger.issue(&user_id.to_string(), &generated.hash).await?;

        Ok(IssuedRefreshToken {
            refresh_token: generated.secret,
            refresh_token_expiry: record.expires_at.timestamp(),
        })
    }

    async fn find_refresh_record(&self, secret: &str) -> Result<RefreshTokenRecord, AuthError> {
        match self.ledger.find_valid_by_hash(&hash_token(secret)).await {
            Ok(record) => Ok(record),
            Err(StoreError::NotFound) => {
                tracing::warn!("Refresh token unknown or expired");
                Err(AuthError::InvalidRefreshToken)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// A hash of a fixed password under the configured parameters, built on first use
    async fn dummy_hash(&self) -> Result<&str, AuthError> {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| self.hash_password("login-timing-placeholder"))
            .await?;
        Ok(hash.as_str())
    }

    // Argon2 is CPU-bound; keep it off the async workers
    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let hash = hash.to_string();

        let valid = tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))??;
        Ok(valid)
    }
}

/// Resolve an `Authorization` header value to the authenticated user id.
///
/// The header must be exactly `Bearer <token>`. Every failure is the same
/// `InvalidToken`; the specific reason only goes to the debug log.
pub fn authenticate(header: Option<&str>, tokens: &TokenService) -> Result<i64, AuthError> {
    let header = header.ok_or_else(|| {
        tracing::debug!("Missing Authorization header");
        AuthError::InvalidToken
    })?;

    let parts: Vec<&str> = header.split(' ').collect();
    let token = match parts.as_slice() {
        ["Bearer", token] if !token.is_empty() => *token,
        _ => {
            tracing::debug!("Malformed Authorization header");
            return Err(AuthError::InvalidToken);
        }
    };

    let claims = tokens.validate(token).map_err(|e| {
        tracing::debug!(error = %e, "Access token rejected");
        AuthError::InvalidToken
    })?;

    claims.user_id().ok_or_else(|| {
        tracing::debug!("Access token subject is not a user id");
        AuthError::InvalidToken
    })
}
