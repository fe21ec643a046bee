//! JSON Web Key Set for the service's public key.
//!
//! The key id is the RFC 7638 SHA-256 thumbprint, base64url without padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::auth::keys::SigningKeypair;
use crate::error::KeyError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
    pub kid: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub use_: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// A set containing exactly the keypair's public half
    pub fn from_keypair(keypair: &SigningKeypair) -> Result<Self, KeyError> {
        Ok(Self {
            keys: vec![Jwk::from_public_key(keypair.public_key())?],
        })
    }
}

impl Jwk {
    pub fn from_public_key(key: &PublicKey) -> Result<Self, KeyError> {
        let point = key.to_encoded_point(false);
        let (x, y) = match (point.x(), point.y()) {
            (Some(x), Some(y)) => (&x[..], &y[..]),
            _ => return Err(KeyError::Encode("public key is the identity point".to_string())),
        };

        let (crv, alg) = curve_for_coordinate_bits(x.len() * 8)?;
        let x = URL_SAFE_NO_PAD.encode(x);
        let y = URL_SAFE_NO_PAD.encode(y);
        let kid = thumbprint(crv, &x, &y);

        Ok(Self {
            kty: "EC".to_string(),
            crv: crv.to_string(),
            x,
            y,
            kid,
            alg: alg.to_string(),
            use_: "sig".to_string(),
        })
    }
}

// P-521 coordinates are padded to 66 bytes
fn curve_for_coordinate_bits(bits: usize) -> Result<(&'static str, &'static str), KeyError> {
    match bits {
        256 => Ok(("P-256", "ES256")),
        384 => Ok(("P-384", "ES384")),
        528 => Ok(("P-521", "ES512")),
        other => Err(KeyError::Encode(format!("unsupported EC coordinate size: {} bits", other))),
    }
}

/// Required members in lexicographic order, no whitespace
fn thumbprint(crv: &str, x: &str, y: &str) -> String {
    let canonical = format!(r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#, crv, x, y);
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwks_contains_exactly_the_public_key() {
        let keypair = SigningKeypair::generate();
        let jwks = Jwks::from_keypair(&keypair).expect("Failed to build JWKS");

        assert_eq!(jwks.keys.len(), 1);
        let jwk = &jwks.keys[0];
        assert_eq!(jwk.kty, "EC");
        assert_eq!(jwk.crv, "P-256");
        assert_eq!(jwk.alg, "ES256");
        assert_eq!(jwk.use_, "sig");

        // rebuild the point from the published coordinates
        let mut sec1 = vec![0x04];
        sec1.extend(URL_SAFE_NO_PAD.decode(&jwk.x).unwrap());
        sec1.extend(URL_SAFE_NO_PAD.decode(&jwk.y).unwrap());
        let rebuilt = PublicKey::from_sec1_bytes(&sec1).expect("Coordinates should form a point");
        assert_eq!(&rebuilt, keypair.public_key());
    }

    #[test]
    fn test_serialized_shape() {
        let jwks = Jwks::from_keypair(&SigningKeypair::generate()).unwrap();
        let value = serde_json::to_value(&jwks).unwrap();
        let key = &value["keys"][0];

        assert_eq!(key["use"], "sig");
        assert!(key.get("use_").is_none());
        assert!(key.get("d").is_none(), "private scalar must never be published");
    }

    #[test]
    fn test_kid_is_stable_thumbprint() {
        let keypair = SigningKeypair::generate();
        let first = Jwks::from_keypair(&keypair).unwrap();
        let second = Jwks::from_keypair(&keypair).unwrap();

        let jwk = &first.keys[0];
        assert_eq!(jwk.kid, second.keys[0].kid);
        // 32-byte digest, base64url without padding
        assert_eq!(jwk.kid.len(), 43);
        assert_eq!(jwk.kid, thumbprint("P-256", &jwk.x, &jwk.y));

        let other = Jwks::from_keypair(&SigningKeypair::generate()).unwrap();
        assert_ne!(jwk.kid, other.keys[0].kid);
    }

    #[test]
    fn test_algorithm_follows_coordinate_size() {
        assert_eq!(curve_for_coordinate_bits(256).unwrap().1, "ES256");
        assert_eq!(curve_for_coordinate_bits(384).unwrap().1, "ES384");
        assert_eq!(curve_for_coordinate_bits(528).unwrap().1, "ES512");
        assert!(curve_for_coordinate_bits(224).is_err());
    }
}
