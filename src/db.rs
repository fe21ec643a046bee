//! SQLite connection pool and schema migrations.

use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::migrate::MigrateError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::configuration::DatabaseSettings;

/// Open the pool, creating the database directory and file when missing
pub async fn get_connection_pool(settings: &DatabaseSettings) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = settings.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(&settings.path)
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .connect_with(options)
        .await
}

/// Apply the embedded migrations in `./migrations`
pub async fn migrate(pool: &SqlitePool) -> Result<(), MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Check that the store answers
pub async fn ping(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

/// Current time at whole-second precision.
///
/// Stored timestamps all go through here so they compare correctly as text.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

#[cfg(test)]
pub(crate) async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let settings = DatabaseSettings {
        path: dir.path().join("data").join("test.db"),
        max_connections: 2,
    };

    let pool = get_connection_pool(&settings)
        .await
        .expect("Failed to open database");
    migrate(&pool).await.expect("Failed to migrate the database");

    (dir, pool)
}
