use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::auth::AuthService;
use crate::error::{AppError, ErrorContext, StoreError};
use crate::middleware::AuthenticatedUser;
use crate::users::{User, UserStore};

#[derive(Serialize)]
pub struct AccessSummary {
    pub last_access: String,
    pub permissions: Vec<&'static str>,
}

#[derive(Serialize)]
pub struct ProtectedData {
    pub message: &'static str,
    pub user: User,
    pub data: AccessSummary,
}

#[derive(Serialize)]
pub struct UserStats {
    pub user_id: i64,
    pub active_refresh_tokens: usize,
}

/// GET /protected/data
pub async fn protected_data(
    user: web::ReqData<AuthenticatedUser>,
    users: web::Data<UserStore>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("protected_data");

    // the token can outlive the account
    let user = users.get_by_id(user.id).await.map_err(|e| {
        context.record(match e {
            StoreError::NotFound => AppError::NotFound("User not found".to_string()),
            other => other.into(),
        })
    })?;

    Ok(HttpResponse::Ok().json(ProtectedData {
        message: "This is protected data",
        user,
        data: AccessSummary {
            last_access: chrono::Utc::now().to_rfc3339(),
            permissions: vec!["read", "write", "delete"],
        },
    }))
}

/// GET /protected/stats
pub async fn protected_stats(
    user: web::ReqData<AuthenticatedUser>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("protected_stats");

    let active_refresh_tokens = auth
        .active_refresh_tokens(user.id)
        .await
        .map_err(|e| context.record(e))?;

    Ok(HttpResponse::Ok().json(UserStats {
        user_id: user.id,
        active_refresh_tokens,
    }))
}
