mod common;

use common::{spawn_app, PASSWORD};
use serde_json::{json, Value};

#[tokio::test]
async fn create_user_returns_201_without_password_hash() {
    let app = spawn_app().await;

    let response = app
        .post_json(
            "/users",
            &json!({"email": "john@example.com", "name": "John Doe", "password": PASSWORD}),
        )
        .await;

    assert_eq!(201, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert!(body["id"].as_i64().is_some());
    assert_eq!(body["email"], "john@example.com");
    assert_eq!(body["name"], "John Doe");
    assert!(body.get("password_hash").is_none());

    // only an argon2id hash is stored
    let (stored,): (String,) = sqlx::query_as("SELECT password_hash FROM users WHERE email = ?")
        .bind("john@example.com")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to fetch created user");
    assert!(stored.starts_with("$argon2id$"));
}

#[tokio::test]
async fn create_user_returns_409_for_duplicate_email() {
    let app = spawn_app().await;
    app.create_user("john@example.com").await;

    let response = app
        .post_json(
            "/users",
            &json!({"email": "john@example.com", "name": "Other", "password": PASSWORD}),
        )
        .await;

    assert_eq!(409, response.status().as_u16());
    let error: Value = response.json().await.unwrap();
    assert_eq!(error, json!({"error": "Email already registered"}));
}

#[tokio::test]
async fn create_user_returns_400_for_invalid_input() {
    let app = spawn_app().await;

    let cases = vec![
        (json!({"name": "John", "password": PASSWORD}), "missing the email"),
        (json!({"email": "john@example.com", "password": PASSWORD}), "missing the name"),
        (json!({"email": "john@example.com", "name": "John"}), "missing the password"),
        (json!({"email": "notanemail", "name": "John", "password": PASSWORD}), "invalid email"),
        (json!({"email": "user@@example.com", "name": "John", "password": PASSWORD}), "double at"),
    ];

    for (body, description) in cases {
        let response = app.post_json("/users", &body).await;
        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 Bad Request when the payload was {}.",
            description
        );
    }
}

#[tokio::test]
async fn user_listing_requires_a_token() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/users"))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let error: Value = response.json().await.unwrap();
    assert_eq!(error, json!({"error": "Invalid or expired token"}));
}

#[tokio::test]
async fn list_users_returns_users_and_count() {
    let app = spawn_app().await;
    let token = app.access_token_for("a@x.com").await;
    app.create_user("b@x.com").await;
    app.create_user("c@x.com").await;

    let body: Value = app.get_with_token("/users", &token).await.json().await.unwrap();
    assert_eq!(body["count"], 3);
    assert_eq!(body["users"].as_array().unwrap().len(), 3);

    let page: Value = app
        .get_with_token("/users?limit=1&offset=1", &token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page["count"], 1);
    assert_eq!(page["total"], 3);
    assert_eq!(page["users"][0]["email"], "b@x.com");

    let bad = app.get_with_token("/users?limit=many", &token).await;
    assert_eq!(400, bad.status().as_u16());
}

#[tokio::test]
async fn get_user_by_id() {
    let app = spawn_app().await;
    let token = app.access_token_for("a@x.com").await;
    let id = app.create_user("b@x.com").await;

    let response = app.get_with_token(&format!("/users/{}", id), &token).await;
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], "b@x.com");

    let missing = app.get_with_token("/users/9999", &token).await;
    assert_eq!(404, missing.status().as_u16());
    let error: Value = missing.json().await.unwrap();
    assert_eq!(error, json!({"error": "User not found"}));

    let invalid = app.get_with_token("/users/abc", &token).await;
    assert_eq!(400, invalid.status().as_u16());
}

#[tokio::test]
async fn delete_user_removes_account_and_refresh_tokens() {
    let app = spawn_app().await;
    let token = app.access_token_for("admin@x.com").await;
    let id = app.create_user("b@x.com").await;
    let tokens = app.login("b@x.com").await;

    let response = app
        .client
        .delete(app.url(&format!("/users/{}", id)))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"message": "User deleted successfully"}));

    let gone = app.get_with_token(&format!("/users/{}", id), &token).await;
    assert_eq!(404, gone.status().as_u16());

    let refresh = app
        .post_json("/auth/refresh", &json!({"refresh_token": tokens["refresh_token"]}))
        .await;
    assert_eq!(401, refresh.status().as_u16());

    // the deleted user's access token is still signed, but the account is gone
    let orphan = app
        .get_with_token("/protected/data", tokens["access_token"].as_str().unwrap())
        .await;
    assert_eq!(404, orphan.status().as_u16());

    let again = app
        .client
        .delete(app.url(&format!("/users/{}", id)))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(404, again.status().as_u16());
}
