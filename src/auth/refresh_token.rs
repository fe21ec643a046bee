//! Refresh Token Ledger
//!
//! Refresh tokens are:
//! - 64 bytes from the OS random source, hex-encoded (this is what the client stores)
//! - Hashed with SHA-256 before storage; the raw secret is never persisted
//! - Looked up by hash, and only while `expires_at` is in the future

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{SqliteConnection, SqlitePool};

use crate::db;
use crate::error::StoreError;

const SECRET_BYTES: usize = 64;

/// A freshly generated refresh secret and the hash that gets persisted
pub struct RefreshSecret {
    pub secret: String,
    pub hash: String,
}

/// Generate a new refresh secret.
///
/// The secret goes back to the client exactly once; only `hash` is stored.
pub fn generate_refresh_token() -> RefreshSecret {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);

    let secret: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    let hash = hash_token(&secret);

    RefreshSecret { secret, hash }
}

/// Hash a refresh token using SHA-256
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A persisted refresh token row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub owner_id: String,
    #[serde(skip_serializing)]
    pub hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Database-backed store of refresh token hashes
#[derive(Clone)]
pub struct RefreshTokenLedger {
    pool: SqlitePool,
    validity: Duration,
}

impl RefreshTokenLedger {
    /// # Arguments
    /// * `pool` - Database connection pool
    /// * `validity_seconds` - Lifetime of newly issued tokens
    ///
    /// # Errors
    /// `InvalidInput` when the lifetime is not a positive, representable duration
    pub fn new(pool: SqlitePool, validity_seconds: i64) -> Result<Self, StoreError> {
        let validity = Duration::try_seconds(validity_seconds)
            .filter(|validity| *validity > Duration::zero())
            .ok_or(StoreError::InvalidInput("validity_seconds"))?;

        Ok(Self { pool, validity })
    }

    /// Persist a new token hash for `owner_id` and return the stored row
    ///
    /// # Errors
    /// * `InvalidInput` - either argument is empty
    /// * `Conflict` - the hash is already present
    pub async fn issue(&self, owner_id: &str, secret_hash: &str) -> Result<RefreshTokenRecord, StoreError> {
        check_issue_input(owner_id, secret_hash)?;

        let mut tx = self.pool.begin().await?;
        let record = self.insert(&mut tx, owner_id, secret_hash).await?;
        tx.commit().await?;

        tracing::debug!(owner_id = %owner_id, token_id = record.id, "Refresh token issued");
        Ok(record)
    }

    /// Replace token `old_id` with a new hash for the same owner.
    ///
    /// The delete and the insert commit together: on any error the old token
    /// is still valid.
    ///
    /// # Errors
    /// * `NotFound` - `old_id` was already gone
    /// * `InvalidInput` / `Conflict` - as for [`issue`](Self::issue)
    pub async fn rotate(
        &self,
        old_id: i64,
        owner_id: &str,
        secret_hash: &str,
    ) -> Result<RefreshTokenRecord, StoreError> {
        check_issue_input(owner_id, secret_hash)?;

        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE id = ?")
            .bind(old_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        let record = self.insert(&mut tx, owner_id, secret_hash).await?;
        tx.commit().await?;

        tracing::debug!(owner_id = %owner_id, old_id, token_id = record.id, "Refresh token rotated");
        Ok(record)
    }

    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        owner_id: &str,
        secret_hash: &str,
    ) -> Result<RefreshTokenRecord, StoreError> {
        let issued_at = db::now();
        let expires_at = issued_at
            .checked_add_signed(self.validity)
            .ok_or(StoreError::InvalidInput("validity_seconds"))?;

        let id = sqlx::query(
            r#"
            INSERT INTO refresh_tokens (owner_id, hash, issued_at, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(owner_id)
        .bind(secret_hash)
        .bind(issued_at)
        .bind(expires_at)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT id, owner_id, hash, issued_at, expires_at
            FROM refresh_tokens
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(record)
    }

    /// Find an unexpired token by hash.
    ///
    /// Unknown and expired hashes both return `NotFound`.
    pub async fn find_valid_by_hash(&self, hash: &str) -> Result<RefreshTokenRecord, StoreError> {
        sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT id, owner_id, hash, issued_at, expires_at
            FROM refresh_tokens
            WHERE hash = ? AND expires_at > ?
            "#,
        )
        .bind(hash)
        .bind(db::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    /// All unexpired tokens belonging to `owner_id`
    pub async fn list_valid_for_owner(&self, owner_id: &str) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        let tokens = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT id, owner_id, hash, issued_at, expires_at
            FROM refresh_tokens
            WHERE owner_id = ? AND expires_at > ?
            ORDER BY issued_at DESC, id DESC
            "#,
        )
        .bind(owner_id)
        .bind(db::now())
        .fetch_all(&self.pool)
        .await?;

        Ok(tokens)
    }

    /// Delete a single token.
    ///
    /// # Errors
    /// `NotFound` when no row was deleted
    pub async fn delete_by_id(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        tracing::debug!(token_id = id, "Refresh token deleted");
        Ok(())
    }
}

fn check_issue_input(owner_id: &str, secret_hash: &str) -> Result<(), StoreError> {
    if owner_id.trim().is_empty() {
        return Err(StoreError::InvalidInput("owner_id"));
    }
    if secret_hash.is_empty() {
        return Err(StoreError::InvalidInput("hash"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn expire(pool: &SqlitePool, id: i64) {
        sqlx::query("UPDATE refresh_tokens SET expires_at = ? WHERE id = ?")
            .bind(db::now() - Duration::seconds(1))
            .bind(id)
            .execute(pool)
            .await
            .expect("Failed to expire token");
    }

    #[test]
    fn test_generate_refresh_token() {
        let token = generate_refresh_token();

        // 64 bytes hex-encoded
        assert_eq!(token.secret.len(), 128);
        assert!(token.secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(token.hash, hash_token(&token.secret));
    }

    #[test]
    fn test_token_hashing() {
        let token = generate_refresh_token();

        // Hash should not equal plaintext
        assert_ne!(token.secret, token.hash);
        // Hash should be 64 chars (SHA-256 hex)
        assert_eq!(token.hash.len(), 64);
        assert_ne!(generate_refresh_token().hash, token.hash);
    }

    #[tokio::test]
    async fn test_issue_then_find_by_hash() {
        let (_dir, pool) = db::test_pool().await;
        let ledger = RefreshTokenLedger::new(pool, 30 * 24 * 60 * 60).unwrap();
        let token = generate_refresh_token();

        let record = ledger.issue("1", &token.hash).await.expect("Failed to issue");
        assert_eq!(record.owner_id, "1");
        assert_eq!(record.hash, token.hash);
        assert_eq!((record.expires_at - record.issued_at).num_days(), 30);

        let found = ledger.find_valid_by_hash(&token.hash).await.expect("Token should be found");
        assert_eq!(found.id, record.id);

        // the raw secret is never a lookup key
        assert!(matches!(
            ledger.find_valid_by_hash(&token.secret).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_issue_rejects_empty_input() {
        let (_dir, pool) = db::test_pool().await;
        let ledger = RefreshTokenLedger::new(pool, 60).unwrap();

        assert!(matches!(ledger.issue("", "abc").await, Err(StoreError::InvalidInput("owner_id"))));
        assert!(matches!(ledger.issue("1", "").await, Err(StoreError::InvalidInput("hash"))));
    }

    #[tokio::test]
    async fn test_duplicate_hash_is_conflict() {
        let (_dir, pool) = db::test_pool().await;
        let ledger = RefreshTokenLedger::new(pool, 60).unwrap();

        ledger.issue("1", "same-hash").await.unwrap();
        assert!(matches!(ledger.issue("2", "same-hash").await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_expired_token_is_not_found() {
        let (_dir, pool) = db::test_pool().await;
        let ledger = RefreshTokenLedger::new(pool.clone(), 60).unwrap();
        let token = generate_refresh_token();

        let record = ledger.issue("1", &token.hash).await.unwrap();
        expire(&pool, record.id).await;

        assert!(matches!(
            ledger.find_valid_by_hash(&token.hash).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            ledger.find_valid_by_hash("never-issued").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_valid_for_owner() {
        let (_dir, pool) = db::test_pool().await;
        let ledger = RefreshTokenLedger::new(pool.clone(), 60).unwrap();

        let first = ledger.issue("1", &generate_refresh_token().hash).await.unwrap();
        ledger.issue("1", &generate_refresh_token().hash).await.unwrap();
        ledger.issue("2", &generate_refresh_token().hash).await.unwrap();
        expire(&pool, first.id).await;

        let tokens = ledger.list_valid_for_owner("1").await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(tokens.iter().all(|t| t.owner_id == "1"));
        assert!(ledger.list_valid_for_owner("3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_id() {
        let (_dir, pool) = db::test_pool().await;
        let ledger = RefreshTokenLedger::new(pool, 60).unwrap();
        let token = generate_refresh_token();

        let record = ledger.issue("1", &token.hash).await.unwrap();
        ledger.delete_by_id(record.id).await.expect("Delete should succeed");

        assert!(matches!(ledger.find_valid_by_hash(&token.hash).await, Err(StoreError::NotFound)));
        assert!(matches!(ledger.delete_by_id(record.id).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_rejects_unusable_validity() {
        let (_dir, pool) = db::test_pool().await;

        for seconds in [0, -60, i64::MAX] {
            assert!(
                matches!(
                    RefreshTokenLedger::new(pool.clone(), seconds),
                    Err(StoreError::InvalidInput("validity_seconds"))
                ),
                "accepted validity {}",
                seconds
            );
        }
    }

    #[tokio::test]
    async fn test_rotate_replaces_token() {
        let (_dir, pool) = db::test_pool().await;
        let ledger = RefreshTokenLedger::new(pool, 60).unwrap();
        let old = generate_refresh_token();
        let new = generate_refresh_token();

        let record = ledger.issue("1", &old.hash).await.unwrap();
        let rotated = ledger.rotate(record.id, "1", &new.hash).await.expect("Rotate should succeed");

        assert_ne!(rotated.id, record.id);
        assert!(matches!(ledger.find_valid_by_hash(&old.hash).await, Err(StoreError::NotFound)));
        assert_eq!(ledger.find_valid_by_hash(&new.hash).await.unwrap().id, rotated.id);
        assert!(matches!(
            ledger.rotate(record.id, "1", &generate_refresh_token().hash).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_failed_rotate_keeps_old_token() {
        let (_dir, pool) = db::test_pool().await;
        let ledger = RefreshTokenLedger::new(pool, 60).unwrap();
        let old = generate_refresh_token();

        let record = ledger.issue("1", &old.hash).await.unwrap();
        ledger.issue("2", "taken-hash").await.unwrap();

        assert!(matches!(
            ledger.rotate(record.id, "1", "taken-hash").await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(ledger.find_valid_by_hash(&old.hash).await.unwrap().id, record.id);
    }
}
