#![allow(dead_code)]

use std::net::TcpListener;

use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use token_auth::auth::{KeyStore, SigningKeypair};
use token_auth::configuration::{get_configuration, Settings};
use token_auth::db::{get_connection_pool, migrate};
use token_auth::startup::{run, AppState};

pub const PASSWORD: &str = "correct horse battery staple";

pub struct TestApp {
    pub address: String,
    pub db_pool: SqlitePool,
    pub settings: Settings,
    pub client: reqwest::Client,
    _dir: TempDir,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(customise: impl FnOnce(&mut Settings)) -> TestApp {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let mut settings = get_configuration().expect("Failed to read configuration.");
    settings.database.path = dir.path().join("data").join("app.db");
    settings.auth.certs_dir = dir.path().join("certs");
    // cheap hashing keeps the suite fast
    settings.password.memory_kib = 1024;
    settings.password.iterations = 1;
    settings.password.parallelism = 1;
    customise(&mut settings);

    let keypair = KeyStore::from_settings(&settings.auth)
        .ensure_keypair()
        .expect("Failed to prepare signing key");
    let db_pool = get_connection_pool(&settings.database)
        .await
        .expect("Failed to open database");
    migrate(&db_pool).await.expect("Failed to migrate the database.");

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let state = AppState::build(db_pool.clone(), keypair, &settings).expect("Failed to build state");
    let server = run(listener, state).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        db_pool,
        settings,
        client: reqwest::Client::new(),
        _dir: dir,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// The keypair the server signs with, reloaded from disk
    pub fn signing_keypair(&self) -> SigningKeypair {
        KeyStore::from_settings(&self.settings.auth)
            .load()
            .expect("Failed to load signing key")
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Create an account and return its id
    pub async fn create_user(&self, email: &str) -> i64 {
        let response = self
            .post_json(
                "/users",
                &json!({"email": email, "name": "Test User", "password": PASSWORD}),
            )
            .await;
        assert_eq!(201, response.status().as_u16());

        let body: Value = response.json().await.expect("Failed to parse response");
        body["id"].as_i64().expect("User id missing")
    }

    /// Log in and return the response body
    pub async fn login(&self, email: &str) -> Value {
        let response = self
            .post_json("/auth/login", &json!({"email": email, "password": PASSWORD}))
            .await;
        assert_eq!(200, response.status().as_u16());
        response.json().await.expect("Failed to parse response")
    }

    /// Create an account, log in, and return the access token
    pub async fn access_token_for(&self, email: &str) -> String {
        self.create_user(email).await;
        let tokens = self.login(email).await;
        tokens["access_token"].as_str().unwrap().to_string()
    }
}
