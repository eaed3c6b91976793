//! Domain models for the marketplace.
//!
//! These types are validated domain objects, separate from the database row
//! types in [`crate::db`]. Most of them serialize directly into API responses.

pub mod analytics;
pub mod cart;
pub mod catalog;
pub mod course;
pub mod customer;
pub mod delivery;
pub mod order;
pub mod promotion;
pub mod session;
pub mod store;
pub mod transaction;
pub mod user;

pub use session::{CurrentUser, keys as session_keys};
