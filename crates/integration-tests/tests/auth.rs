//! Integration tests for registration, login and logout.
//!
//! Requires a running server and database. Run with:
//! `cargo test -p bazaar-integration-tests -- --ignored`

use bazaar_integration_tests::{PASSWORD, base_url, client, register};
use reqwest::StatusCode;
use serde_json::{Value, json};

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_register_then_me() {
    let user = register("ada").await;
    assert_eq!(user.body["role"], "customer");

    let me: Value = user
        .client
        .get(format!("{}/api/auth/me", base_url()))
        .send()
        .await
        .expect("Failed to get me")
        .json()
        .await
        .expect("Failed to read me");

    assert_eq!(me["email"], user.email.as_str());
}

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_logout_ends_session() {
    let user = register("grace").await;

    let resp = user
        .client
        .post(format!("{}/api/auth/logout", base_url()))
        .send()
        .await
        .expect("Failed to log out");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = user
        .client
        .get(format!("{}/api/auth/me", base_url()))
        .send()
        .await
        .expect("Failed to get me");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_login_checks_password() {
    let user = register("linus").await;
    let other = client();

    let resp = other
        .post(format!("{}/api/auth/login", base_url()))
        .json(&json!({ "email": user.email, "password": "not-the-password" }))
        .send()
        .await
        .expect("Failed to log in");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = other
        .post(format!("{}/api/auth/login", base_url()))
        .json(&json!({ "email": user.email.to_uppercase(), "password": PASSWORD }))
        .send()
        .await
        .expect("Failed to log in");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_duplicate_email_conflicts() {
    let user = register("barbara").await;

    let resp = client()
        .post(format!("{}/api/auth/register", base_url()))
        .json(&json!({ "email": user.email, "password": PASSWORD, "name": "Again" }))
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}
