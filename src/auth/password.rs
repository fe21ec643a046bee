//! Password Hashing and Verification
//!
//! Argon2id with a per-password random salt. The default cost is the RFC 9106
//! second recommended ("low-memory") profile: 64 MiB, 3 passes, 4 lanes. That
//! trades some brute-force resistance for a smaller footprint on constrained
//! hosts. Hashes are PHC strings, so verification always uses the parameters a
//! hash was created with.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::configuration::PasswordSettings;
use crate::error::PasswordError;

/// Argon2id hasher with fixed cost parameters
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, PasswordError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| PasswordError::Hashing(format!("invalid argon2 parameters: {}", e)))?;
        Ok(Self { params })
    }

    /// RFC 9106 low-memory profile
    pub fn low_memory() -> Self {
        Self {
            params: Params::new(64 * 1024, 3, 4, None).expect("RFC 9106 parameters are valid"),
        }
    }

    pub fn from_settings(settings: &PasswordSettings) -> Result<Self, PasswordError> {
        Self::new(settings.memory_kib, settings.iterations, settings.parallelism)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password into a PHC string
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::Hashing(e.to_string()))
    }

    /// Verify a password against a stored PHC hash.
    ///
    /// Returns `Ok(false)` on mismatch; `Err` only when the stored hash is unusable.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

        let valid = self
            .argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok();

        tracing::debug!(valid, "Password verification completed");
        Ok(valid)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::low_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> PasswordHasher {
        PasswordHasher::new(1024, 1, 1).unwrap()
    }

    #[test]
    fn test_hash_is_argon2id_phc() {
        let hash = fast_hasher().hash("ValidPassword123").expect("Failed to hash password");

        assert_ne!(hash, "ValidPassword123");
        assert!(hash.starts_with("$argon2id$v=19$"));
    }

    #[test]
    fn test_verify_password() {
        let hasher = fast_hasher();
        let hash = hasher.hash("correct").unwrap();

        assert!(hasher.verify("correct", &hash).unwrap());
        assert!(!hasher.verify("incorrect", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let hasher = fast_hasher();
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn test_verify_uses_parameters_from_hash() {
        let hash = fast_hasher().hash("correct").unwrap();
        // a differently tuned hasher still verifies old hashes
        assert!(PasswordHasher::low_memory().verify("correct", &hash).unwrap());
    }

    #[test]
    fn test_low_memory_profile() {
        let hash = PasswordHasher::low_memory().hash("pw").unwrap();
        assert!(hash.contains("m=65536,t=3,p=4"));
    }

    #[test]
    fn test_invalid_hash() {
        assert!(matches!(
            fast_hasher().verify("password", "invalid_hash"),
            Err(PasswordError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(PasswordHasher::new(1, 0, 0).is_err());
    }
}
