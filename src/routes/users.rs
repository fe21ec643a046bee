//! User Routes
//!
//! Account creation is public; listing, lookup and deletion sit behind the
//! bearer gate.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::AuthService;
use crate::error::{AppError, ErrorContext, StoreError};
use crate::users::{User, UserStore};
use crate::validators::{is_valid_email, is_valid_name, is_valid_password};

const MAX_PAGE_SIZE: i64 = 100;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Serialize)]
pub struct UserList {
    pub users: Vec<User>,
    /// Users in this page
    pub count: usize,
    /// Users in the directory
    pub total: i64,
}

/// POST /users
///
/// # Errors
/// - 400: missing or invalid email, name, or password
/// - 409: email already registered
pub async fn create_user(
    form: web::Json<CreateUserRequest>,
    users: web::Data<UserStore>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_create");

    let email = is_valid_email(&form.email)?;
    let name = is_valid_name(&form.name)?;
    let password = is_valid_password(&form.password)?;

    let password_hash = auth.hash_password(&password).await.map_err(|e| context.record(e))?;

    let user = users
        .create(&email, &name, &password_hash)
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => {
                context.record(AppError::Conflict("Email already registered".to_string()))
            }
            other => context.record(other),
        })?;

    Ok(HttpResponse::Created().json(user))
}

/// GET /users?limit&offset
pub async fn list_users(
    query: web::Query<Pagination>,
    users: web::Data<UserStore>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_list");

    let page = users
        .list(query.limit(), query.offset())
        .await
        .map_err(|e| context.record(e))?;
    let total = users.count().await.map_err(|e| context.record(e))?;

    Ok(HttpResponse::Ok().json(UserList {
        count: page.len(),
        users: page,
        total,
    }))
}

/// GET /users/{id}
pub async fn get_user(
    path: web::Path<String>,
    users: web::Data<UserStore>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_get");
    let id = parse_user_id(&path)?;

    let user = users.get_by_id(id).await.map_err(|e| context.record(not_found_as_user(e)))?;

    Ok(HttpResponse::Ok().json(user))
}

/// DELETE /users/{id}
///
/// Also removes the user's refresh tokens.
pub async fn delete_user(
    path: web::Path<String>,
    users: web::Data<UserStore>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_delete");
    let id = parse_user_id(&path)?;

    users.delete(id).await.map_err(|e| context.record(not_found_as_user(e)))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "User deleted successfully"
    })))
}

fn parse_user_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Validation("Invalid user ID".to_string()))
}

fn not_found_as_user(err: StoreError) -> AppError {
    match err {
        StoreError::NotFound => AppError::NotFound("User not found".to_string()),
        other => other.into(),
    }
}
