//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                              - Liveness
//! GET  /health/ready                        - Readiness (database)
//!
//! # Auth (rate limited)
//! POST /api/auth/register                   - Create account and log in
//! POST /api/auth/login                      - Log in
//! POST /api/auth/logout                     - Log out
//! GET  /api/auth/me                         - Current user
//!
//! # Storefront (public)
//! GET  /api/shop/{store_slug}               - Store
//! GET  /api/shop/{store_slug}/categories    - Categories
//! GET  /api/shop/{store_slug}/products      - Product listing
//! GET  /api/shop/{store_slug}/products/{product_slug} - Product detail
//! GET  /api/shop/{store_slug}/courses       - Published courses
//! GET  /api/shop/{store_slug}/courses/{course_id}     - Course outline
//!
//! # Cart (session)
//! GET|DELETE       /api/shop/{store_slug}/cart
//! POST             /api/shop/{store_slug}/cart/items
//! PATCH|DELETE     /api/shop/{store_slug}/cart/items/{product_id}
//! PUT|DELETE       /api/shop/{store_slug}/cart/promotion
//! POST             /api/shop/{store_slug}/checkout
//!
//! # Account
//! GET  /api/account/orders
//! GET  /api/account/orders/{order_id}
//! POST /api/account/orders/{order_id}/cancel
//!
//! # Seller dashboard
//! /api/stores/...                           - See [`dashboard`]
//!
//! # Platform admin
//! /api/admin/...                            - See [`admin`]
//!
//! # Webhooks (rate limited)
//! POST /api/webhooks/payments               - Payment events
//! ```

pub mod account;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod dashboard;
pub mod health;
pub mod shop;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, patch, post, put},
};

use crate::middleware::{auth_rate_limiter, webhook_rate_limiter};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .layer(auth_rate_limiter())
}

/// Create the storefront routes router, scoped by store slug.
pub fn shop_routes() -> Router<AppState> {
    Router::new()
        .route("/{store_slug}", get(shop::store))
        .route("/{store_slug}/categories", get(shop::categories))
        .route("/{store_slug}/products", get(shop::products))
        .route("/{store_slug}/products/{product_slug}", get(shop::product))
        .route("/{store_slug}/courses", get(shop::courses))
        .route("/{store_slug}/courses/{course_id}", get(shop::course))
        .route("/{store_slug}/cart", get(cart::show).delete(cart::clear))
        .route("/{store_slug}/cart/items", post(cart::add_item))
        .route(
            "/{store_slug}/cart/items/{product_id}",
            patch(cart::update_item).delete(cart::remove_item),
        )
        .route(
            "/{store_slug}/cart/promotion",
            put(cart::apply_promotion).delete(cart::remove_promotion),
        )
        .route("/{store_slug}/checkout", post(checkout::place_order))
}

/// Create the customer account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(account::orders))
        .route("/orders/{order_id}", get(account::order))
        .route("/orders/{order_id}/cancel", post(account::cancel_order))
}

/// Create all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/auth", auth_routes())
        .nest("/api/shop", shop_routes())
        .nest("/api/account", account_routes())
        .nest("/api/stores", dashboard::router())
        .nest("/api/admin", admin::router())
        .nest("/api/webhooks", webhooks::router().layer(webhook_rate_limiter()))
}
