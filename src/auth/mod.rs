//! Authentication module
//!
//! Signing keys, access tokens, refresh tokens, password hashing, and the
//! flows composed from them.

pub mod claims;
pub mod flow;
pub mod jwks;
pub mod jwt;
pub mod keys;
pub mod password;
pub mod refresh_token;

pub use claims::Claims;
pub use flow::{authenticate, AuthService, LoginTokens, RefreshOutcome};
pub use jwks::Jwks;
pub use jwt::TokenService;
pub use keys::{KeyStore, SigningKeypair};
pub use password::PasswordHasher;
pub use refresh_token::RefreshTokenLedger;
