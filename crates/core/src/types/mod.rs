//! Core types for Bazaar.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod pagination;
pub mod price;
pub mod reorder;
pub mod slug;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use pagination::{Page, PageRequest};
pub use price::{CurrencyCode, Price, UnknownCurrency, round_cents};
pub use reorder::{PositionUpdate, ReorderError, ensure_same_members, validate_reorder};
pub use slug::{Slug, SlugError};
pub use status::*;
