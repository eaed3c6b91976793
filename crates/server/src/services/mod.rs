//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Registration and login (Argon2id password hashes)
//! - `cart` - Session-held carts priced against live products
//! - `catalog_cache` - Short-lived cache for public catalog reads
//! - `checkout` - Turning a cart into a pending order
//! - `email` - Order confirmation email over SMTP
//! - `images` - Product image uploads to the external image host
//! - `orders` - Order status changes, payments and deliveries
//! - `webhook` - Payment webhook signature verification

pub mod auth;
pub mod cart;
pub mod catalog_cache;
pub mod checkout;
pub mod email;
pub mod images;
pub mod orders;
pub mod webhook;

pub use auth::{AuthError, AuthService};
pub use cart::{CartService, CartServiceError};
pub use catalog_cache::CatalogCache;
pub use checkout::{CheckoutError, CheckoutService};
pub use email::{EmailError, EmailService};
pub use images::{ImageHostClient, ImageHostError};
pub use orders::{OrderError, OrderService};
pub use webhook::WebhookError;
