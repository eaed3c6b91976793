//! Integration tests for Bazaar.
//!
//! The tests talk to a running server over HTTP and are `#[ignore]`d by
//! default.
//!
//! # Running Tests
//!
//! ```bash
//! bazaar migrate
//! BAZAAR_WEBHOOK_SECRET=... cargo run -p bazaar-server
//! BAZAAR_WEBHOOK_SECRET=... cargo test -p bazaar-integration-tests -- --ignored
//! ```
//!
//! # Environment Variables
//!
//! - `BAZAAR_TEST_URL` - Server base URL (default `http://localhost:3000`)
//! - `BAZAAR_WEBHOOK_SECRET` - Same secret the server uses, for payment tests
//!
//! Every test registers fresh accounts and stores with random suffixes, so
//! runs do not interfere with each other. The server rate limits auth
//! routes; tests send a distinct `X-Real-IP` per client.

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

/// Password used for every test account.
pub const PASSWORD: &str = "correct-horse-battery";

/// Base URL of the server under test.
#[must_use]
pub fn base_url() -> String {
    std::env::var("BAZAAR_TEST_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Short random suffix for unique emails and slugs.
#[must_use]
pub fn unique(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", id.get(..10).unwrap_or(&id))
}

/// An HTTP client with its own cookie jar, playing one user.
pub struct TestUser {
    pub client: Client,
    pub email: String,
    pub body: Value,
}

/// Build a cookie-keeping client that claims a random client IP.
///
/// # Panics
///
/// Panics if the client cannot be built.
#[must_use]
pub fn client() -> Client {
    let octet = Uuid::new_v4().as_bytes()[0];
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        "x-real-ip",
        format!("198.51.100.{octet}")
            .parse()
            .expect("valid header value"),
    );
    Client::builder()
        .cookie_store(true)
        .default_headers(headers)
        .build()
        .expect("Failed to create HTTP client")
}

/// Register a new account and keep its session.
///
/// # Panics
///
/// Panics if registration fails.
pub async fn register(name: &str) -> TestUser {
    let client = client();
    let email = format!("{}@bazaar.test", unique(name));
    let resp = client
        .post(format!("{}/api/auth/register", base_url()))
        .json(&json!({ "email": email, "password": PASSWORD, "name": name }))
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = resp.json().await.expect("Failed to read user");
    TestUser {
        client,
        email,
        body,
    }
}

/// Register a seller with a fresh store and return the store JSON.
///
/// # Panics
///
/// Panics if any request fails.
pub async fn seller_with_store() -> (TestUser, Value) {
    let seller = register("seller").await;
    let store: Value = seller
        .client
        .post(format!("{}/api/stores", base_url()))
        .json(&json!({ "name": "Test Store", "slug": unique("store"), "shipping_fee": "5.00" }))
        .send()
        .await
        .expect("Failed to create store")
        .error_for_status()
        .expect("Store creation rejected")
        .json()
        .await
        .expect("Failed to read store");
    (seller, store)
}

/// Create a product in a store and return the product JSON.
///
/// # Panics
///
/// Panics if the request fails.
pub async fn create_product(seller: &TestUser, store_id: i64, price: &str, stock: i32) -> Value {
    seller
        .client
        .post(format!("{}/api/stores/{store_id}/products", base_url()))
        .json(&json!({ "name": unique("Product"), "price": price, "stock": stock }))
        .send()
        .await
        .expect("Failed to create product")
        .error_for_status()
        .expect("Product creation rejected")
        .json()
        .await
        .expect("Failed to read product")
}

/// Checkout body with a valid address.
#[must_use]
pub fn checkout_details() -> Value {
    json!({
        "name": "Test Customer",
        "line1": "1 Main Street",
        "city": "Springfield",
        "postal_code": "12345",
        "country": "US",
        "phone": "+1 555 0100",
    })
}
