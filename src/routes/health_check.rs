use actix_web::{web, HttpResponse};
use sqlx::SqlitePool;

use crate::db;
use crate::error::AppError;

pub async fn health_check(pool: web::Data<SqlitePool>) -> Result<HttpResponse, AppError> {
    if let Err(e) = db::ping(pool.get_ref()).await {
        tracing::error!(error = %e, "Database health check failed");
        return Err(AppError::Unavailable("Database unavailable".to_string()));
    }

    tracing::debug!("Health check endpoint called");
    Ok(HttpResponse::Ok().content_type("text/plain").body("OK"))
}
