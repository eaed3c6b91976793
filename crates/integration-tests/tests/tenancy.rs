//! Integration tests for store ownership and role checks.
//!
//! Requires a running server and database. Run with:
//! `cargo test -p bazaar-integration-tests -- --ignored`

use bazaar_integration_tests::{base_url, register, seller_with_store, unique};
use reqwest::StatusCode;
use serde_json::{Value, json};

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_creating_a_store_makes_a_seller() {
    let (seller, store) = seller_with_store().await;
    assert_eq!(store["active"], true);

    let me: Value = seller
        .client
        .get(format!("{}/api/auth/me", base_url()))
        .send()
        .await
        .expect("Failed to get me")
        .json()
        .await
        .expect("Failed to read me");
    assert_eq!(me["role"], "seller");
}

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_other_sellers_cannot_manage_a_store() {
    let (_owner, store) = seller_with_store().await;
    let (intruder, _) = seller_with_store().await;
    let store_id = store["id"].as_i64().expect("id");

    let resp = intruder
        .client
        .get(format!("{}/api/stores/{store_id}/orders", base_url()))
        .send()
        .await
        .expect("Failed to list orders");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = intruder
        .client
        .post(format!("{}/api/stores/{store_id}/products", base_url()))
        .json(&json!({ "name": "Sneaky", "price": "1.00" }))
        .send()
        .await
        .expect("Failed to create product");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_admin_routes_reject_customers() {
    let customer = register("customer").await;

    let resp = customer
        .client
        .get(format!("{}/api/admin/kpis", base_url()))
        .send()
        .await
        .expect("Failed to get KPIs");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_store_slugs_are_unique() {
    let (seller, store) = seller_with_store().await;

    let resp = seller
        .client
        .post(format!("{}/api/stores", base_url()))
        .json(&json!({ "name": "Copy", "slug": store["slug"] }))
        .send()
        .await
        .expect("Failed to create store");
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_duplicate_promotion_code_conflicts() {
    let (seller, store) = seller_with_store().await;
    let url = format!("{}/api/stores/{}/promotions", base_url(), store["id"]);
    let code = unique("SAVE").to_uppercase().replace('-', "");

    let first = seller
        .client
        .post(&url)
        .json(&json!({ "code": code, "kind": "percentage", "value": "10" }))
        .send()
        .await
        .expect("Failed to create promotion");
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = seller
        .client
        .post(&url)
        .json(&json!({ "code": code.to_lowercase(), "kind": "fixed_amount", "value": "5" }))
        .send()
        .await
        .expect("Failed to create promotion");
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_category_reorder() {
    let (seller, store) = seller_with_store().await;
    let url = format!("{}/api/stores/{}/categories", base_url(), store["id"]);

    let mut ids = Vec::new();
    for name in ["First", "Second", "Third"] {
        let category: Value = seller
            .client
            .post(&url)
            .json(&json!({ "name": name }))
            .send()
            .await
            .expect("Failed to create category")
            .json()
            .await
            .expect("Failed to read category");
        ids.push(category["id"].clone());
    }

    let reordered: Value = seller
        .client
        .put(format!("{url}/reorder"))
        .json(&json!([
            { "id": ids[2], "position": 0 },
            { "id": ids[0], "position": 1 },
            { "id": ids[1], "position": 2 },
        ]))
        .send()
        .await
        .expect("Failed to reorder")
        .json()
        .await
        .expect("Failed to read categories");

    let names: Vec<&str> = reordered
        .as_array()
        .expect("list")
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(names, ["Third", "First", "Second"]);

    // A partial list is rejected
    let resp = seller
        .client
        .put(format!("{url}/reorder"))
        .json(&json!([{ "id": ids[0], "position": 0 }]))
        .send()
        .await
        .expect("Failed to reorder");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
