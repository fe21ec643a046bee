use std::path::PathBuf;

use crate::error::StartupError;

/// Upper bound on either token lifetime (ten years)
pub const MAX_TOKEN_LIFETIME: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub password: PasswordSettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

impl ApplicationSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Token lifecycle and signing key settings
#[derive(serde::Deserialize, Clone, Debug)]
pub struct AuthSettings {
    pub certs_dir: PathBuf,
    pub key_name: String,
    pub issuer: String,
    pub access_token_expiry: i64,  // seconds (86400 for 24 hours)
    pub refresh_token_expiry: i64, // seconds (2592000 for 30 days)
    pub rotate_refresh_tokens: bool,
}

impl AuthSettings {
    /// Both lifetimes must be positive and at most [`MAX_TOKEN_LIFETIME`]
    pub fn validate(&self) -> Result<(), StartupError> {
        check_lifetime("auth.access_token_expiry", self.access_token_expiry)?;
        check_lifetime("auth.refresh_token_expiry", self.refresh_token_expiry)
    }
}

fn check_lifetime(key: &'static str, seconds: i64) -> Result<(), StartupError> {
    if seconds <= 0 || seconds > MAX_TOKEN_LIFETIME {
        return Err(StartupError::InvalidSetting {
            key,
            reason: format!("{} is not within 1..={} seconds", seconds, MAX_TOKEN_LIFETIME),
        });
    }
    Ok(())
}

/// Argon2id cost parameters. Defaults follow the RFC 9106 low-memory profile.
#[derive(serde::Deserialize, Clone, Debug)]
pub struct PasswordSettings {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

/// Load settings from defaults, `configuration.*` and `APP_` variables, then validate them
pub fn get_configuration() -> Result<Settings, StartupError> {
    let settings = config::Config::builder()
        .set_default("application.host", "127.0.0.1")?
        .set_default("application.port", 8080)?
        .set_default("database.path", "./app/data/app.db")?
        .set_default("database.max_connections", 5)?
        .set_default("auth.certs_dir", "./app/certs")?
        .set_default("auth.key_name", "jwt")?
        .set_default("auth.issuer", "http://localhost")?
        .set_default("auth.access_token_expiry", 24 * 60 * 60)?
        .set_default("auth.refresh_token_expiry", 30 * 24 * 60 * 60)?
        .set_default("auth.rotate_refresh_tokens", false)?
        .set_default("password.memory_kib", 64 * 1024)?
        .set_default("password.iterations", 3)?
        .set_default("password.parallelism", 4)?
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings = settings.try_deserialize::<Settings>()?;
    settings.auth.validate()?;
    Ok(settings)
}
