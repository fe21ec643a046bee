//! Access Token Signing and Validation
//!
//! Access tokens are compact JWS tokens signed with ES256 (ECDSA P-256 +
//! SHA-256). Validation accepts ES256 only.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::auth::claims::{Claims, TokenClaims};
use crate::auth::keys::SigningKeypair;
use crate::configuration::AuthSettings;
use crate::error::{KeyError, TokenError};

/// The only algorithm tokens are signed with or accepted in
pub const PINNED_ALGORITHM: Algorithm = Algorithm::ES256;

/// Signs and verifies access tokens with the service keypair
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_token_expiry: i64,
}

impl TokenService {
    /// # Arguments
    /// * `keypair` - Service signing keypair
    /// * `issuer` - Value of the `iss` claim on minted tokens
    /// * `access_token_expiry` - Access token lifetime in seconds
    pub fn new(
        keypair: &SigningKeypair,
        issuer: impl Into<String>,
        access_token_expiry: i64,
    ) -> Result<Self, KeyError> {
        let encoding_key = EncodingKey::from_ec_der(&keypair.private_key_der()?);
        let decoding_key = DecodingKey::from_ec_pem(keypair.public_key_pem()?.as_bytes())
            .map_err(|e| KeyError::Encode(e.to_string()))?;

        let mut validation = Validation::new(PINNED_ALGORITHM);
        validation.leeway = 0;
        validation.validate_nbf = true;
        // tokens are not minted for a specific audience
        validation.validate_aud = false;

        Ok(Self {
            encoding_key,
            decoding_key,
            validation,
            issuer: issuer.into(),
            access_token_expiry,
        })
    }

    pub fn from_settings(keypair: &SigningKeypair, settings: &AuthSettings) -> Result<Self, KeyError> {
        Self::new(keypair, settings.issuer.clone(), settings.access_token_expiry)
    }

    /// Serialize and sign a claim set into a compact token
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        encode(&Header::new(PINNED_ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Mint an access token whose subject is `user_id`
    pub fn issue_access_token(&self, user_id: i64) -> Result<String, TokenError> {
        let claims = Claims::for_subject(user_id, self.issuer.clone(), self.access_token_expiry)?;
        self.sign(&claims)
    }

    /// Verify a token and return its registered claims.
    ///
    /// # Errors
    /// * `TokenError::Parse` - malformed token, bad signature, or any algorithm but ES256
    /// * `TokenError::Validation` - expired, or not yet valid
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate_claims(token).map(|claims| claims.registered)
    }

    /// Verify a token and return registered and custom claims merged into one mapping
    pub fn validate_to_map(&self, token: &str) -> Result<Map<String, Value>, TokenError> {
        self.validate_claims(token).map(TokenClaims::into_map)
    }

    fn validate_claims(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let data = decode::<Map<String, Value>>(token, &self.decoding_key, &self.validation)
            .map_err(classify)?;

        TokenClaims::from_object(data.claims).map_err(|e| TokenError::Parse(e.to_string()))
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => {
            TokenError::Validation(err.to_string())
        }
        _ => TokenError::Parse(err.to_string()),
    }
}
