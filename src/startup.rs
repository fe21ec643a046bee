use actix_web::dev::Server;
use actix_web::{guard, middleware::Logger, web, App, HttpServer};
use sqlx::SqlitePool;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AuthService, PasswordHasher, RefreshTokenLedger, SigningKeypair, TokenService};
use crate::configuration::Settings;
use crate::error::{AppError, StartupError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    create_user, delete_user, get_user, health_check, jwks, list_users, login, logout,
    protected_data, protected_stats, refresh,
};
use crate::users::UserStore;

/// Everything the handlers share. Built once; read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub keypair: SigningKeypair,
    pub tokens: Arc<TokenService>,
    pub users: UserStore,
    pub auth: AuthService,
}

impl AppState {
    pub fn build(
        pool: SqlitePool,
        keypair: SigningKeypair,
        settings: &Settings,
    ) -> Result<Self, StartupError> {
        settings.auth.validate()?;

        let tokens = Arc::new(TokenService::from_settings(&keypair, &settings.auth)?);
        let hasher = PasswordHasher::from_settings(&settings.password)?;
        let users = UserStore::new(pool.clone());
        let ledger = RefreshTokenLedger::new(pool.clone(), settings.auth.refresh_token_expiry)
            .map_err(|e| StartupError::InvalidSetting {
                key: "auth.refresh_token_expiry",
                reason: e.to_string(),
            })?;

        let auth = AuthService::new(
            tokens.clone(),
            ledger,
            users.clone(),
            hasher,
            settings.auth.rotate_refresh_tokens,
        );

        Ok(Self {
            pool,
            keypair,
            tokens,
            users,
            auth,
        })
    }
}

pub fn run(listener: TcpListener, state: AppState) -> Result<Server, std::io::Error> {
    let pool = web::Data::new(state.pool);
    let keypair = web::Data::new(state.keypair);
    let users = web::Data::new(state.users);
    let auth = web::Data::new(state.auth);
    let tokens = state.tokens;

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(LoggerMiddleware)
            .wrap(Logger::default())

            // Shared state
            .app_data(pool.clone())
            .app_data(keypair.clone())
            .app_data(users.clone())
            .app_data(auth.clone())
            .app_data(json_config())
            .app_data(query_config())

            // Public routes (no authentication required)
            .route("/health", web::get().to(health_check))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/logout", web::post().to(logout))
            .route("/.well-known/jwks.json", web::get().to(jwks))
            .service(
                web::resource("/users")
                    .guard(guard::Post())
                    .route(web::post().to(create_user)),
            )

            // Protected routes (require JWT authentication)
            .service(
                web::resource("/users")
                    .wrap(JwtMiddleware::new(tokens.clone()))
                    .route(web::get().to(list_users)),
            )
            .service(
                web::resource("/users/{id}")
                    .wrap(JwtMiddleware::new(tokens.clone()))
                    .route(web::get().to(get_user))
                    .route(web::delete().to(delete_user)),
            )
            .service(
                web::scope("/protected")
                    .wrap(JwtMiddleware::new(tokens.clone()))
                    .route("/data", web::get().to(protected_data))
                    .route("/stats", web::get().to(protected_stats)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

// Extractor failures use the same `{"error": ...}` body as everything else
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        tracing::debug!(error = %err, "Rejected request body");
        AppError::Validation("Invalid JSON".to_string()).into()
    })
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        tracing::debug!(error = %err, "Rejected query string");
        AppError::Validation("Invalid query parameters".to_string()).into()
    })
}
