//! User directory over the relational store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db;
use crate::error::StoreError;

/// Public view of a user; the password hash is never part of it
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What login needs to check a password
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserCredentials {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
}

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a user and return it as stored.
    ///
    /// # Errors
    /// * `Conflict` - the email is already registered
    pub async fn create(&self, email: &str, name: &str, password_hash: &str) -> Result<User, StoreError> {
        let now = db::now();
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO users (email, name, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, name, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = user.id, "User created");
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, name, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    /// Look up the stored credentials for an email address
    pub async fn get_by_email(&self, email: &str) -> Result<UserCredentials, StoreError> {
        sqlx::query_as::<_, UserCredentials>(
            "SELECT id, email, password_hash FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, created_at, updated_at
            FROM users
            ORDER BY id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// Delete a user together with their refresh tokens.
    ///
    /// # Errors
    /// * `NotFound` - no such user
    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        let revoked = sqlx::query("DELETE FROM refresh_tokens WHERE owner_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        tracing::info!(user_id = id, revoked_refresh_tokens = revoked, "User deleted");
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
