//! JWT claim sets.
//!
//! Registered claims (RFC 7519) are a typed struct; anything else a token
//! carries lives in a separate extension map and is merged back in only when
//! a flat claim mapping is requested.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TokenError;

/// Names of the registered claims, in the order they are reported
pub const REGISTERED_CLAIMS: [&str; 7] = ["sub", "iss", "aud", "exp", "nbf", "iat", "jti"];

/// `aud` may be a single string or a list of strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

/// Registered claims of an access token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    /// Expiration time (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Not before (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Issued at (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl Claims {
    /// Claims for a user's access token valid for `expiry_seconds` from now
    ///
    /// # Errors
    /// `TokenError::Signing` when the expiry overflows a Unix timestamp
    pub fn for_subject(
        subject: impl ToString,
        issuer: impl Into<String>,
        expiry_seconds: i64,
    ) -> Result<Self, TokenError> {
        let now = chrono::Utc::now().timestamp();
        let exp = now.checked_add(expiry_seconds).ok_or_else(|| {
            TokenError::Signing(format!("token lifetime {}s is out of range", expiry_seconds))
        })?;

        Ok(Self {
            sub: Some(subject.to_string()),
            iss: Some(issuer.into()),
            exp: Some(exp),
            iat: Some(now),
            ..Self::default()
        })
    }

    /// Parse the subject as a numeric user id
    pub fn user_id(&self) -> Option<i64> {
        self.sub.as_deref().and_then(|sub| sub.parse().ok())
    }
}

/// Claims as decoded from a token: registered claims plus extensions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenClaims {
    pub registered: Claims,
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    /// Split a decoded JSON object into registered and extension claims
    pub fn from_object(mut object: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let mut registered = Map::new();
        for name in REGISTERED_CLAIMS {
            if let Some(value) = object.remove(name) {
                registered.insert(name.to_string(), value);
            }
        }

        Ok(Self {
            registered: serde_json::from_value(Value::Object(registered))?,
            extra: object,
        })
    }

    /// Flatten into a single claim mapping.
    ///
    /// Every registered claim is present (null when absent); extension claims
    /// never shadow a registered one.
    pub fn into_map(self) -> Map<String, Value> {
        let mut merged = self.extra;
        let r = self.registered;

        merged.insert("sub".to_string(), json_or_null(r.sub));
        merged.insert("iss".to_string(), json_or_null(r.iss));
        merged.insert("aud".to_string(), json_or_null(r.aud));
        merged.insert("exp".to_string(), json_or_null(r.exp));
        merged.insert("nbf".to_string(), json_or_null(r.nbf));
        merged.insert("iat".to_string(), json_or_null(r.iat));
        merged.insert("jti".to_string(), json_or_null(r.jti));

        merged
    }
}

fn json_or_null<T: Serialize>(value: Option<T>) -> Value {
    value
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(Value::Null)
}
